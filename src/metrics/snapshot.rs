/// Bounded cache counters plus gauges captured at snapshot time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub load_failures: u64,
    pub coalesced_waits: u64,
    pub evictions: u64,
    pub removal_failures: u64,
    pub invalidations: u64,
    pub persists: u64,

    pub resident: usize,
    pub capacity: usize,
}

impl CacheMetricsSnapshot {
    /// Fraction of lookups served without a load; 0 when nothing was looked up.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiskMetricsSnapshot {
    pub block_reads: u64,
    pub block_misses: u64,
    pub corrupt_blocks: u64,
    pub block_writes: u64,
    pub clean_skips: u64,
    pub write_failures: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IoSyncMetricsSnapshot {
    pub pending_hits: u64,
    pub writes_queued: u64,
    pub writes_completed: u64,
    pub writes_failed: u64,
    pub writes_superseded: u64,
    /// Loads answered by an evicted cell a consumer still held.
    pub held_hits: u64,

    pub pending: usize,
    pub held: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueMetricsSnapshot {
    pub enqueued: u64,
    pub priority_raises: u64,
    pub executed: u64,
    pub cancelled: u64,
    pub task_failures: u64,

    pub queued: usize,
    pub workers: usize,
}
