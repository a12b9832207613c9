//! First-in, first-out victim order.
//!
//! Keys are evicted in the order they became resident; hits do not change
//! that order. Useful for scan-like access (e.g. a classifier sweeping a
//! volume once) where recency carries no signal.

use std::hash::Hash;

use crate::ds::RecencyList;
use crate::traits::ReplacementPolicy;

#[derive(Debug)]
pub struct FifoPolicy<K> {
    order: RecencyList<K>,
}

impl<K> FifoPolicy<K>
where
    K: Copy + Eq + Hash,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            order: RecencyList::with_capacity(capacity),
        }
    }

    /// Oldest resident key.
    pub fn peek_oldest(&self) -> Option<&K> {
        self.order.back()
    }
}

impl<K> ReplacementPolicy<K> for FifoPolicy<K>
where
    K: Copy + Eq + Hash + Send,
{
    fn record_insert(&mut self, key: K) {
        self.order.push_front(key);
    }

    fn record_access(&mut self, _key: &K) {}

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
        "fifo"
    }
}
