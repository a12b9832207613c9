//! Clock-sweep ring of keys for second-chance eviction.
//!
//! Keys occupy slots of a ring that a hand sweeps over. An access sets the
//! slot's referenced bit; the sweep clears set bits and picks the first slot
//! whose bit is already clear.
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                           ClockRing<K>                               │
//!   │                                                                      │
//!   │   slots: Vec<Option<Slot<K>>>                                        │
//!   │   hand ─────────────────────────────┐                                │
//!   │                                     ▼                                │
//!   │   index: FxHashMap<K, usize>   slot[0] = { A, ref:1 }                │
//!   │                                slot[1] = { B, ref:0 }  ◄─ victim     │
//!   │                                slot[2] = { C, ref:1 }                │
//!   │                                slot[3] = None  (free, reused first)  │
//!   │                                                                      │
//!   │   pop_victim: [A ref=1] clear, advance → [B ref=0] evict             │
//!   └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Notes
//! - The ring grows on demand; freed slots are reused before it grows again.
//! - A full sweep clears every bit, so `pop_victim` terminates after at most
//!   two passes.
//! - `debug_validate_invariants()` is available in debug/test builds.

use std::hash::Hash;

use rustc_hash::FxHashMap;

#[derive(Debug)]
struct Slot<K> {
    key: K,
    referenced: bool,
}

/// Ring of keys implementing the CLOCK (second-chance) victim choice.
#[derive(Debug)]
pub struct ClockRing<K> {
    slots: Vec<Option<Slot<K>>>,
    free: Vec<usize>,
    index: FxHashMap<K, usize>,
    hand: usize,
}

impl<K> ClockRing<K>
where
    K: Copy + Eq + Hash,
{
    /// Creates an empty ring with room for `capacity` keys.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            index: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            hand: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Adds `key` unreferenced. Returns `false` if already present.
    pub fn insert(&mut self, key: K) -> bool {
        if self.index.contains_key(&key) {
            return false;
        }
        let slot = Some(Slot {
            key,
            referenced: false,
        });
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = slot;
                idx
            },
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            },
        };
        self.index.insert(key, idx);
        true
    }

    /// Sets the referenced bit; returns `false` if `key` is absent.
    pub fn touch(&mut self, key: &K) -> bool {
        let Some(&idx) = self.index.get(key) else {
            return false;
        };
        match self.slots.get_mut(idx).and_then(|slot| slot.as_mut()) {
            Some(slot) => {
                slot.referenced = true;
                true
            },
            None => false,
        }
    }

    pub fn remove(&mut self, key: &K) -> bool {
        let Some(idx) = self.index.remove(key) else {
            return false;
        };
        if let Some(slot) = self.slots.get_mut(idx) {
            *slot = None;
        }
        self.free.push(idx);
        true
    }

    /// Sweeps from the hand and removes the first unreferenced key.
    pub fn pop_victim(&mut self) -> Option<K> {
        if self.index.is_empty() {
            return None;
        }
        let ring = self.slots.len();
        for _ in 0..2 * ring {
            let idx = self.hand;
            self.hand = (self.hand + 1) % ring;
            let Some(slot) = self.slots[idx].as_mut() else {
                continue;
            };
            if slot.referenced {
                slot.referenced = false;
                continue;
            }
            let key = slot.key;
            self.slots[idx] = None;
            self.free.push(idx);
            self.index.remove(&key);
            return Some(key);
        }
        None
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.hand = 0;
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        let occupied = self.slots.iter().filter(|slot| slot.is_some()).count();
        assert_eq!(occupied, self.index.len());
        assert_eq!(occupied + self.free.len(), self.slots.len());
        for (key, &idx) in &self.index {
            let slot = self.slots[idx].as_ref().expect("index points to empty slot");
            assert!(&slot.key == key);
        }
        if !self.slots.is_empty() {
            assert!(self.hand < self.slots.len());
        }
    }
}
