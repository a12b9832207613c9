//! Replacement policies for the bounded cell cache.
//!
//! | Policy  | Victim                         | Hit cost        |
//! |---------|--------------------------------|-----------------|
//! | `Lru`   | least recently accessed        | list splice     |
//! | `Fifo`  | earliest inserted              | none            |
//! | `Clock` | first unreferenced on sweep    | bit store       |

pub mod clock;
pub mod fifo;
pub mod lru;

use std::hash::Hash;

use crate::traits::ReplacementPolicy;

pub use clock::ClockPolicy;
pub use fifo::FifoPolicy;
pub use lru::LruPolicy;

/// Selects the replacement policy of a bounded cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EvictionPolicy {
    #[default]
    Lru,
    Fifo,
    Clock,
}

impl EvictionPolicy {
    /// Instantiates the policy sized for `capacity` resident keys.
    pub fn build<K>(self, capacity: usize) -> Box<dyn ReplacementPolicy<K>>
    where
        K: Copy + Eq + Hash + Send + 'static,
    {
        match self {
            Self::Lru => Box::new(LruPolicy::new(capacity)),
            Self::Fifo => Box::new(FifoPolicy::new(capacity)),
            Self::Clock => Box::new(ClockPolicy::new(capacity)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_policy_evicts_each_key_once() {
        for policy in [EvictionPolicy::Lru, EvictionPolicy::Fifo, EvictionPolicy::Clock] {
            let mut p = policy.build::<u64>(8);
            for key in 0..8 {
                p.record_insert(key);
            }
            p.record_access(&3);
            let mut victims: Vec<u64> = std::iter::from_fn(|| p.pop_victim()).collect();
            victims.sort_unstable();
            assert_eq!(victims, (0..8).collect::<Vec<_>>(), "{}", p.name());
        }
    }
}
