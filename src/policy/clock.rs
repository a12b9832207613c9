//! CLOCK (second-chance) victim order.
//!
//! Approximates LRU with a single referenced bit per key, so a hit costs a
//! bit store rather than a list splice. See [`ClockRing`] for the sweep.

use std::hash::Hash;

use crate::ds::ClockRing;
use crate::traits::ReplacementPolicy;

#[derive(Debug)]
pub struct ClockPolicy<K> {
    ring: ClockRing<K>,
}

impl<K> ClockPolicy<K>
where
    K: Copy + Eq + Hash,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: ClockRing::with_capacity(capacity.saturating_add(1)),
        }
    }
}

impl<K> ReplacementPolicy<K> for ClockPolicy<K>
where
    K: Copy + Eq + Hash + Send,
{
    fn record_insert(&mut self, key: K) {
        if !self.ring.insert(key) {
            self.ring.touch(&key);
        }
    }

    fn record_access(&mut self, key: &K) {
        self.ring.touch(key);
    }

    fn remove(&mut self, key: &K) -> bool {
        self.ring.remove(key)
    }

    fn pop_victim(&mut self) -> Option<K> {
        self.ring.pop_victim()
    }

    fn len(&self) -> usize {
        self.ring.len()
    }

    fn clear(&mut self) {
        self.ring.clear();
    }

    fn name(&self) -> &'static str {
        "clock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn referenced_keys_get_a_second_chance() {
        let mut policy = ClockPolicy::new(3);
        policy.record_insert(1u64);
        policy.record_insert(2);
        policy.record_insert(3);
        policy.record_access(&1);
        assert_eq!(policy.pop_victim(), Some(2));
        assert_eq!(policy.pop_victim(), Some(3));
        assert_eq!(policy.pop_victim(), Some(1));
    }
}
