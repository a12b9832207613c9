//! Deterministic key-to-shard mapping.
//!
//! Used by [`KeyLockTable`](crate::ds::KeyLockTable) to spread per-key lock
//! entries across independently locked shards, so that lock bookkeeping for
//! unrelated cells does not contend on one map.
//!
//! ```text
//!   key ──► FxHasher(seed, key) ──► hash % shards ──► shard index
//!
//!   ┌─────────┬─────────┬─────────┬─────────┐
//!   │ Shard 0 │ Shard 1 │ Shard 2 │ Shard 3 │
//!   │  7, 11  │  2, 90  │ 13, 44  │  5, 8   │
//!   └─────────┴─────────┴─────────┴─────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```
//! use cellcache::ds::ShardSelector;
//!
//! let selector = ShardSelector::new(4, 0);
//! let shard = selector.shard_for_key(&123u64);
//! assert!(shard < 4);
//! assert_eq!(selector.shard_for_key(&123u64), shard);
//! ```

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

/// Seeded hash selector mapping keys to `[0, shards)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSelector {
    shards: usize,
    seed: u64,
}

impl ShardSelector {
    /// Creates a selector for `shards` shards. Zero is clamped to one.
    pub fn new(shards: usize, seed: u64) -> Self {
        Self {
            shards: shards.max(1),
            seed,
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards
    }

    /// Maps a key to its shard; the same key always maps to the same shard.
    pub fn shard_for_key<K: Hash>(&self, key: &K) -> usize {
        let mut hasher = FxHasher::default();
        self.seed.hash(&mut hasher);
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards
    }
}

impl Default for ShardSelector {
    fn default() -> Self {
        Self::new(1, 0)
    }
}
