use std::sync::atomic::{AtomicU64, Ordering};

use crate::metrics::snapshot::{
    CacheMetricsSnapshot, DiskMetricsSnapshot, IoSyncMetricsSnapshot, QueueMetricsSnapshot,
};
use crate::metrics::traits::{
    CacheMetricsRecorder, DiskMetricsRecorder, IoSyncMetricsRecorder, QueueMetricsRecorder,
};

/// Monotonic counter shared between threads.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    #[inline]
    pub fn incr(&self) {
        self.add(1);
    }

    #[inline]
    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct CacheMetrics {
    pub hits: Counter,
    pub misses: Counter,
    pub loads: Counter,
    pub load_failures: Counter,
    pub coalesced_waits: Counter,
    pub evictions: Counter,
    pub removal_failures: Counter,
    pub invalidations: Counter,
    pub persists: Counter,
}

impl CacheMetrics {
    /// Snapshot with the given gauges filled in.
    pub fn snapshot_with(&self, resident: usize, capacity: usize) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            hits: self.hits.get(),
            misses: self.misses.get(),
            loads: self.loads.get(),
            load_failures: self.load_failures.get(),
            coalesced_waits: self.coalesced_waits.get(),
            evictions: self.evictions.get(),
            removal_failures: self.removal_failures.get(),
            invalidations: self.invalidations.get(),
            persists: self.persists.get(),
            resident,
            capacity,
        }
    }
}

impl CacheMetricsRecorder for CacheMetrics {
    fn record_hit(&self) {
        self.hits.incr();
    }

    fn record_miss(&self) {
        self.misses.incr();
    }

    fn record_load(&self) {
        self.loads.incr();
    }

    fn record_load_failure(&self) {
        self.load_failures.incr();
    }

    fn record_coalesced_wait(&self) {
        self.coalesced_waits.incr();
    }

    fn record_eviction(&self) {
        self.evictions.incr();
    }

    fn record_removal_failure(&self) {
        self.removal_failures.incr();
    }

    fn record_invalidation(&self) {
        self.invalidations.incr();
    }

    fn record_persist(&self) {
        self.persists.incr();
    }
}

#[derive(Debug, Default)]
pub struct DiskMetrics {
    pub block_reads: Counter,
    pub block_misses: Counter,
    pub corrupt_blocks: Counter,
    pub block_writes: Counter,
    pub clean_skips: Counter,
    pub write_failures: Counter,
    pub bytes_read: Counter,
    pub bytes_written: Counter,
}

impl DiskMetrics {
    pub fn snapshot(&self) -> DiskMetricsSnapshot {
        DiskMetricsSnapshot {
            block_reads: self.block_reads.get(),
            block_misses: self.block_misses.get(),
            corrupt_blocks: self.corrupt_blocks.get(),
            block_writes: self.block_writes.get(),
            clean_skips: self.clean_skips.get(),
            write_failures: self.write_failures.get(),
            bytes_read: self.bytes_read.get(),
            bytes_written: self.bytes_written.get(),
        }
    }
}

impl DiskMetricsRecorder for DiskMetrics {
    fn record_block_read(&self, bytes: usize) {
        self.block_reads.incr();
        self.bytes_read.add(bytes as u64);
    }

    fn record_block_missing(&self) {
        self.block_misses.incr();
    }

    fn record_block_corrupt(&self) {
        self.corrupt_blocks.incr();
    }

    fn record_block_write(&self, bytes: usize) {
        self.block_writes.incr();
        self.bytes_written.add(bytes as u64);
    }

    fn record_clean_skip(&self) {
        self.clean_skips.incr();
    }

    fn record_write_failure(&self) {
        self.write_failures.incr();
    }
}

#[derive(Debug, Default)]
pub struct IoSyncMetrics {
    pub pending_hits: Counter,
    pub writes_queued: Counter,
    pub writes_completed: Counter,
    pub writes_failed: Counter,
    pub writes_superseded: Counter,
    pub held_hits: Counter,
}

impl IoSyncMetrics {
    pub fn snapshot_with(&self, pending: usize, held: usize) -> IoSyncMetricsSnapshot {
        IoSyncMetricsSnapshot {
            pending_hits: self.pending_hits.get(),
            writes_queued: self.writes_queued.get(),
            writes_completed: self.writes_completed.get(),
            writes_failed: self.writes_failed.get(),
            writes_superseded: self.writes_superseded.get(),
            held_hits: self.held_hits.get(),
            pending,
            held,
        }
    }
}

impl IoSyncMetricsRecorder for IoSyncMetrics {
    fn record_pending_hit(&self) {
        self.pending_hits.incr();
    }

    fn record_write_queued(&self) {
        self.writes_queued.incr();
    }

    fn record_write_completed(&self) {
        self.writes_completed.incr();
    }

    fn record_write_failed(&self) {
        self.writes_failed.incr();
    }

    fn record_write_superseded(&self) {
        self.writes_superseded.incr();
    }

    fn record_held_hit(&self) {
        self.held_hits.incr();
    }
}

#[derive(Debug, Default)]
pub struct QueueMetrics {
    pub enqueued: Counter,
    pub priority_raises: Counter,
    pub executed: Counter,
    pub cancelled: Counter,
    pub task_failures: Counter,
}

impl QueueMetrics {
    pub fn snapshot_with(&self, queued: usize, workers: usize) -> QueueMetricsSnapshot {
        QueueMetricsSnapshot {
            enqueued: self.enqueued.get(),
            priority_raises: self.priority_raises.get(),
            executed: self.executed.get(),
            cancelled: self.cancelled.get(),
            task_failures: self.task_failures.get(),
            queued,
            workers,
        }
    }
}

impl QueueMetricsRecorder for QueueMetrics {
    fn record_enqueued(&self) {
        self.enqueued.incr();
    }

    fn record_priority_raised(&self) {
        self.priority_raises.incr();
    }

    fn record_executed(&self) {
        self.executed.incr();
    }

    fn record_cancelled(&self, count: usize) {
        self.cancelled.add(count as u64);
    }

    fn record_task_failure(&self) {
        self.task_failures.incr();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_snapshot_reflects_recorded_events() {
        let metrics = CacheMetrics::default();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_miss();
        metrics.record_eviction();
        let snapshot = metrics.snapshot_with(5, 10);
        assert_eq!(snapshot.hits, 2);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.evictions, 1);
        assert_eq!(snapshot.resident, 5);
        assert_eq!(snapshot.capacity, 10);
    }

    #[test]
    fn disk_bytes_accumulate() {
        let metrics = DiskMetrics::default();
        metrics.record_block_write(128);
        metrics.record_block_write(64);
        metrics.record_block_read(32);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.block_writes, 2);
        assert_eq!(snapshot.bytes_written, 192);
        assert_eq!(snapshot.bytes_read, 32);
    }

    #[test]
    fn queue_cancellations_add_counts() {
        let metrics = QueueMetrics::default();
        metrics.record_cancelled(3);
        metrics.record_cancelled(2);
        assert_eq!(metrics.snapshot_with(0, 1).cancelled, 5);
    }
}
