//! # Metrics Trait Hierarchy
//!
//! Recording, snapshotting and export are separate traits so that cache code
//! only ever writes counters, tests and benches read snapshots, and
//! production monitoring plugs in an exporter.
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────────────┐ ┌──────────────────────┐ ┌──────────────────────┐ ┌──────────────────────┐
//!   │ CacheMetricsRecorder │ │ DiskMetricsRecorder  │ │ IoSyncMetricsRecorder│ │ QueueMetricsRecorder │
//!   │ hit/miss/load/evict  │ │ read/write/corrupt   │ │ pending/queued/write │ │ enqueue/cancel/run   │
//!   └──────────┬───────────┘ └──────────┬───────────┘ └──────────┬───────────┘ └──────────┬───────────┘
//!              │ LoaderRemoverCache     │ DiskCellCache          │ IoSync                 │ SharedQueue
//!              ▼                        ▼                        ▼                        ▼
//!   ┌──────────────────────────────────────────────────────────────────────────────────────────────────┐
//!   │  MetricsSnapshotProvider<S>  (tests/bench)          MetricsExporter<S>  (production monitoring)  │
//!   └──────────────────────────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Recorders take `&self` because every recording site runs on shared
//! handles from many threads; implementations use relaxed atomics.

/// Counters for the bounded in-memory cache.
pub trait CacheMetricsRecorder {
    fn record_hit(&self);
    fn record_miss(&self);
    fn record_load(&self);
    fn record_load_failure(&self);
    fn record_coalesced_wait(&self);
    fn record_eviction(&self);
    fn record_removal_failure(&self);
    fn record_invalidation(&self);
    fn record_persist(&self);
}

/// Counters for block file I/O.
pub trait DiskMetricsRecorder {
    fn record_block_read(&self, bytes: usize);
    fn record_block_missing(&self);
    fn record_block_corrupt(&self);
    fn record_block_write(&self, bytes: usize);
    fn record_clean_skip(&self);
    fn record_write_failure(&self);
}

/// Counters for the IoSync layer.
pub trait IoSyncMetricsRecorder {
    fn record_pending_hit(&self);
    fn record_write_queued(&self);
    fn record_write_completed(&self);
    fn record_write_failed(&self);
    fn record_write_superseded(&self);
    fn record_held_hit(&self);
}

/// Counters for the shared fetch queue.
pub trait QueueMetricsRecorder {
    fn record_enqueued(&self);
    fn record_priority_raised(&self);
    fn record_executed(&self);
    fn record_cancelled(&self, count: usize);
    fn record_task_failure(&self);
}

/// Produce a point-in-time snapshot of metrics.
pub trait MetricsSnapshotProvider<S> {
    fn snapshot(&self) -> S;
}

/// Publish snapshots to a monitoring system.
pub trait MetricsExporter<S> {
    fn export(&self, snapshot: &S);
}
