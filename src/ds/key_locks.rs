//! Per-key mutual exclusion with reference-counted entries.
//!
//! [`KeyLockTable::lock`] returns a guard that excludes every other holder of
//! the same key while leaving other keys untouched. Lock entries are created
//! on demand and dropped again as soon as the last holder or waiter for a key
//! releases it, so the table only ever holds keys with pending operations.
//!
//! ```text
//!   shards[selector(key)]: Mutex<FxHashMap<K, Arc<Mutex<()>>>>
//!
//!   lock(k):   shard.lock ─► clone/insert Arc ─► shard.unlock ─► arc.lock()
//!   drop(g):   arc.unlock ─► shard.lock ─► strong_count == 2 ? remove : keep
//! ```
//!
//! Entries can only be cloned while the shard lock is held, so a strong
//! count of two under that lock (the map's and the releasing guard's) means
//! no other thread holds or waits on the key.

use std::hash::Hash;
use std::sync::Arc;

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use rustc_hash::FxHashMap;

use crate::ds::shard::ShardSelector;

const DEFAULT_SHARDS: usize = 16;

type Shard<K> = Mutex<FxHashMap<K, Arc<Mutex<()>>>>;

/// Sharded table of per-key locks.
#[derive(Debug)]
pub struct KeyLockTable<K> {
    shards: Vec<Shard<K>>,
    selector: ShardSelector,
}

impl<K> KeyLockTable<K>
where
    K: Copy + Eq + Hash,
{
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    pub fn with_shards(shards: usize) -> Self {
        let selector = ShardSelector::new(shards, 0x6365_6c6c);
        let shards = (0..selector.shard_count())
            .map(|_| Mutex::new(FxHashMap::default()))
            .collect();
        Self { shards, selector }
    }

    /// Blocks until `key` is free and returns its guard.
    pub fn lock(&self, key: K) -> KeyGuard<'_, K> {
        let entry = {
            let mut shard = self.shard(&key).lock();
            Arc::clone(shard.entry(key).or_default())
        };
        let guard = Mutex::lock_arc(&entry);
        KeyGuard {
            table: self,
            key,
            entry,
            guard: Some(guard),
        }
    }

    /// Number of keys with a holder or waiter.
    pub fn active_keys(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    fn shard(&self, key: &K) -> &Shard<K> {
        &self.shards[self.selector.shard_for_key(key)]
    }

    fn release(&self, key: &K, entry: &Arc<Mutex<()>>) {
        let mut shard = self.shard(key).lock();
        if Arc::strong_count(entry) == 2 {
            shard.remove(key);
        }
    }
}

impl<K> Default for KeyLockTable<K>
where
    K: Copy + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive hold on one key; released on drop.
pub struct KeyGuard<'a, K>
where
    K: Copy + Eq + Hash,
{
    table: &'a KeyLockTable<K>,
    key: K,
    entry: Arc<Mutex<()>>,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl<K> KeyGuard<'_, K>
where
    K: Copy + Eq + Hash,
{
    pub fn key(&self) -> K {
        self.key
    }
}

impl<K> Drop for KeyGuard<'_, K>
where
    K: Copy + Eq + Hash,
{
    fn drop(&mut self) {
        // The guard's own Arc must go before the count check.
        drop(self.guard.take());
        self.table.release(&self.key, &self.entry);
    }
}
