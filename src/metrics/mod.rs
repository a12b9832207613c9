//! Counters, snapshots and exporters for every cache layer.
//!
//! Each layer owns one metrics struct built from [`Counter`]s and exposes a
//! `metrics()` snapshot. Snapshots are plain `Copy` data that a
//! [`PrometheusTextExporter`] can render.

pub mod exporter;
pub mod metrics_impl;
pub mod snapshot;
pub mod traits;

pub use exporter::PrometheusTextExporter;
pub use metrics_impl::{CacheMetrics, Counter, DiskMetrics, IoSyncMetrics, QueueMetrics};
pub use snapshot::{
    CacheMetricsSnapshot, DiskMetricsSnapshot, IoSyncMetricsSnapshot, QueueMetricsSnapshot,
};
pub use traits::{
    CacheMetricsRecorder, DiskMetricsRecorder, IoSyncMetricsRecorder, MetricsExporter,
    MetricsSnapshotProvider, QueueMetricsRecorder,
};
