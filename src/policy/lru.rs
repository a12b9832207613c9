//! Least-recently-used victim order.
//!
//! Every hit moves the key to the front of a [`RecencyList`]; the victim is
//! the key at the back, i.e. the one untouched for longest. Default policy
//! of [`EvictionPolicy`](crate::policy::EvictionPolicy).
//!
//! ```text
//!   record_access(C)          pop_victim()
//!   [A] [B] [C] [D]    ──►    [C] [A] [B] [D]   ──►  D
//!   front         back        front         back
//! ```

use std::hash::Hash;

use crate::ds::RecencyList;
use crate::traits::ReplacementPolicy;

#[derive(Debug)]
pub struct LruPolicy<K> {
    order: RecencyList<K>,
}

impl<K> LruPolicy<K>
where
    K: Copy + Eq + Hash,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            order: RecencyList::with_capacity(capacity),
        }
    }

    /// Key that would be evicted next.
    pub fn peek_victim(&self) -> Option<&K> {
        self.order.back()
    }
}

impl<K> ReplacementPolicy<K> for LruPolicy<K>
where
    K: Copy + Eq + Hash + Send,
{
    fn record_insert(&mut self, key: K) {
        if !self.order.push_front(key) {
            self.order.move_to_front(&key);
        }
    }

    fn record_access(&mut self, key: &K) {
        self.order.move_to_front(key);
    }

    fn remove(&mut self, key: &K) -> bool {
        self.order.remove(key)
    }

    fn pop_victim(&mut self) -> Option<K> {
        self.order.pop_back()
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn clear(&mut self) {
        self.order.clear();
    }

    fn name(&self) -> &'static str {
        "lru"
    }
}
