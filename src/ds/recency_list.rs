//! Arena-backed doubly linked list of keys with O(1) lookup by key.
//!
//! Nodes live in a `Vec` of slots and link to each other by slot index, so
//! moving a key to the front or unlinking it never allocates. A free list
//! recycles slots of removed keys. The key → slot index is an `FxHashMap`.
//!
//! ## Architecture
//!
//! ```text
//!   slots: Vec<Option<Node<K>>>          index: FxHashMap<K, usize>
//!   ┌──────┬─────────────────────────┐   ┌─────┬──────┐
//!   │  0   │ { key: A, prev: -, next: 2 } │ A   │  0   │
//!   │  1   │ None  (free)            │   │ C   │  2   │
//!   │  2   │ { key: C, prev: 0, next: 3 } │ D   │  3   │
//!   │  3   │ { key: D, prev: 2, next: - } └─────┴──────┘
//!   └──────┴─────────────────────────┘
//!
//!   head ─► [A] ◄──► [C] ◄──► [D] ◄── tail
//!           newest            oldest
//! ```
//!
//! ## Operations
//! - `push_front(key)`: link a new key at the head
//! - `move_to_front(key)`: detach + attach at head
//! - `pop_back()`: unlink the tail key
//! - `remove(key)`: unlink an arbitrary key
//!
//! All operations are O(1). `debug_validate_invariants()` is available in
//! debug/test builds.

use std::hash::Hash;

use rustc_hash::FxHashMap;

#[derive(Debug)]
struct Node<K> {
    key: K,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Ordered set of keys, newest at the front.
#[derive(Debug)]
pub struct RecencyList<K> {
    slots: Vec<Option<Node<K>>>,
    free: Vec<usize>,
    index: FxHashMap<K, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<K> RecencyList<K>
where
    K: Copy + Eq + Hash,
{
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty list with room for `capacity` keys.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            index: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            head: None,
            tail: None,
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

    /// Newest key.
    pub fn front(&self) -> Option<&K> {
        self.head.and_then(|idx| self.node(idx)).map(|node| &node.key)
    }

    /// Oldest key.
    pub fn back(&self) -> Option<&K> {
        self.tail.and_then(|idx| self.node(idx)).map(|node| &node.key)
    }

    /// Links `key` at the front. Returns `false` (and leaves the list
    /// unchanged) if the key is already present.
    pub fn push_front(&mut self, key: K) -> bool {
        if self.index.contains_key(&key) {
            return false;
        }
        let node = Node {
            key,
            prev: None,
            next: None,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            },
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            },
        };
        self.index.insert(key, idx);
        self.attach_front(idx);
        true
    }

    /// Moves `key` to the front; returns `false` if absent.
    pub fn move_to_front(&mut self, key: &K) -> bool {
        let Some(&idx) = self.index.get(key) else {
            return false;
        };
        if self.head != Some(idx) {
            self.detach(idx);
            self.attach_front(idx);
        }
        true
    }

    /// Unlinks and returns the oldest key.
    pub fn pop_back(&mut self) -> Option<K> {
        let idx = self.tail?;
        self.unlink(idx)
    }

    /// Unlinks `key`; returns `false` if absent.
    pub fn remove(&mut self, key: &K) -> bool {
        match self.index.get(key) {
            Some(&idx) => self.unlink(idx).is_some(),
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.head = None;
        self.tail = None;
    }

    /// Keys from newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = &K> + '_ {
        let mut current = self.head;
        std::iter::from_fn(move || {
            let node = self.node(current?)?;
            current = node.next;
            Some(&node.key)
        })
    }

    fn node(&self, idx: usize) -> Option<&Node<K>> {
        self.slots.get(idx).and_then(|slot| slot.as_ref())
    }

    fn node_mut(&mut self, idx: usize) -> Option<&mut Node<K>> {
        self.slots.get_mut(idx).and_then(|slot| slot.as_mut())
    }

    fn unlink(&mut self, idx: usize) -> Option<K> {
        self.detach(idx);
        let node = self.slots.get_mut(idx)?.take()?;
        self.free.push(idx);
        self.index.remove(&node.key);
        Some(node.key)
    }

    fn detach(&mut self, idx: usize) {
        let Some((prev, next)) = self.node(idx).map(|node| (node.prev, node.next)) else {
            return;
        };
        match prev {
            Some(p) => {
                if let Some(node) = self.node_mut(p) {
                    node.next = next;
                }
            },
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(node) = self.node_mut(n) {
                    node.prev = prev;
                }
            },
            None => self.tail = prev,
        }
        if let Some(node) = self.node_mut(idx) {
            node.prev = None;
            node.next = None;
        }
    }

    fn attach_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(node) = self.node_mut(idx) {
            node.prev = None;
            node.next = old_head;
        }
        match old_head {
            Some(h) => {
                if let Some(node) = self.node_mut(h) {
                    node.prev = Some(idx);
                }
            },
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        let mut count = 0usize;
        let mut prev = None;
        let mut current = self.head;
        while let Some(idx) = current {
            let node = self.node(idx).expect("linked slot is empty");
            assert_eq!(node.prev, prev);
            assert_eq!(self.index.get(&node.key), Some(&idx));
            prev = Some(idx);
            current = node.next;
            count += 1;
            assert!(count <= self.index.len(), "cycle in recency list");
        }
        assert_eq!(self.tail, prev);
        assert_eq!(count, self.index.len());
        assert_eq!(self.slots.len() - self.free.len(), self.index.len());
    }
}

impl<K> Default for RecencyList<K>
where
    K: Copy + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_back_returns_oldest() {
        let mut list = RecencyList::new();
        list.push_front(1u64);
        list.push_front(2);
        list.push_front(3);
        assert_eq!(list.pop_back(), Some(1));
        assert_eq!(list.pop_back(), Some(2));
        assert_eq!(list.len(), 1);
        list.debug_validate_invariants();
    }

    #[test]
    fn move_to_front_protects_key() {
        let mut list = RecencyList::new();
        for key in 0..4u64 {
            list.push_front(key);
        }
        assert!(list.move_to_front(&0));
        assert_eq!(list.front(), Some(&0));
        assert_eq!(list.pop_back(), Some(1));
        assert!(!list.move_to_front(&99));
        list.debug_validate_invariants();
    }

    #[test]
    fn duplicate_push_is_rejected() {
        let mut list = RecencyList::new();
        assert!(list.push_front(7u64));
        assert!(!list.push_front(7));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn remove_middle_and_reuse_slot() {
        let mut list = RecencyList::new();
        list.push_front(1u64);
        list.push_front(2);
        list.push_front(3);
        assert!(list.remove(&2));
        assert!(!list.remove(&2));
        list.push_front(4);
        assert_eq!(list.iter().copied().collect::<Vec<_>>(), vec![4, 3, 1]);
        list.debug_validate_invariants();
    }

    #[test]
    fn clear_empties_everything() {
        let mut list = RecencyList::new();
        list.push_front(1u64);
        list.clear();
        assert!(list.is_empty());
        assert_eq!(list.back(), None);
        list.debug_validate_invariants();
    }
}
