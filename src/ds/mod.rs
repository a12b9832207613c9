pub mod clock_ring;
pub mod key_locks;
pub mod recency_list;
pub mod shard;

pub use clock_ring::ClockRing;
pub use key_locks::{KeyGuard, KeyLockTable};
pub use recency_list::RecencyList;
pub use shard::ShardSelector;
