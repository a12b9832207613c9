use std::io::Write;

use parking_lot::Mutex;

use crate::metrics::snapshot::{
    CacheMetricsSnapshot, DiskMetricsSnapshot, IoSyncMetricsSnapshot, QueueMetricsSnapshot,
};
use crate::metrics::traits::MetricsExporter;

/// Prometheus text exporter for cell cache snapshots.
///
/// Writes the Prometheus text exposition format so the output can be scraped
/// directly or forwarded to a collector. Write errors are dropped; exporting
/// never affects cache behaviour.
#[derive(Debug)]
pub struct PrometheusTextExporter<W: Write + Send + Sync> {
    prefix: String,
    writer: Mutex<W>,
}

impl<W: Write + Send + Sync> PrometheusTextExporter<W> {
    pub fn new(prefix: impl Into<String>, writer: W) -> Self {
        Self {
            prefix: prefix.into(),
            writer: Mutex::new(writer),
        }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn write_counter(&self, name: &str, value: u64) {
        let mut writer = self.writer.lock();
        let _ = writeln!(writer, "# TYPE {} counter", name);
        let _ = writeln!(writer, "{} {}", name, value);
    }

    fn write_gauge(&self, name: &str, value: u64) {
        let mut writer = self.writer.lock();
        let _ = writeln!(writer, "# TYPE {} gauge", name);
        let _ = writeln!(writer, "{} {}", name, value);
    }

    fn metric_name(&self, suffix: &str) -> String {
        if self.prefix.is_empty() {
            suffix.to_string()
        } else {
            format!("{}_{}", self.prefix, suffix)
        }
    }
}

impl<W: Write + Send + Sync> MetricsExporter<CacheMetricsSnapshot> for PrometheusTextExporter<W> {
    fn export(&self, snapshot: &CacheMetricsSnapshot) {
        self.write_counter(&self.metric_name("hits_total"), snapshot.hits);
        self.write_counter(&self.metric_name("misses_total"), snapshot.misses);
        self.write_counter(&self.metric_name("loads_total"), snapshot.loads);
        self.write_counter(
            &self.metric_name("load_failures_total"),
            snapshot.load_failures,
        );
        self.write_counter(
            &self.metric_name("coalesced_waits_total"),
            snapshot.coalesced_waits,
        );
        self.write_counter(&self.metric_name("evictions_total"), snapshot.evictions);
        self.write_counter(
            &self.metric_name("removal_failures_total"),
            snapshot.removal_failures,
        );
        self.write_counter(
            &self.metric_name("invalidations_total"),
            snapshot.invalidations,
        );
        self.write_counter(&self.metric_name("persists_total"), snapshot.persists);
        self.write_gauge(&self.metric_name("resident_cells"), snapshot.resident as u64);
        self.write_gauge(&self.metric_name("capacity"), snapshot.capacity as u64);
    }
}

impl<W: Write + Send + Sync> MetricsExporter<DiskMetricsSnapshot> for PrometheusTextExporter<W> {
    fn export(&self, snapshot: &DiskMetricsSnapshot) {
        self.write_counter(&self.metric_name("block_reads_total"), snapshot.block_reads);
        self.write_counter(
            &self.metric_name("block_misses_total"),
            snapshot.block_misses,
        );
        self.write_counter(
            &self.metric_name("corrupt_blocks_total"),
            snapshot.corrupt_blocks,
        );
        self.write_counter(
            &self.metric_name("block_writes_total"),
            snapshot.block_writes,
        );
        self.write_counter(&self.metric_name("clean_skips_total"), snapshot.clean_skips);
        self.write_counter(
            &self.metric_name("write_failures_total"),
            snapshot.write_failures,
        );
        self.write_counter(&self.metric_name("bytes_read_total"), snapshot.bytes_read);
        self.write_counter(
            &self.metric_name("bytes_written_total"),
            snapshot.bytes_written,
        );
    }
}

impl<W: Write + Send + Sync> MetricsExporter<IoSyncMetricsSnapshot> for PrometheusTextExporter<W> {
    fn export(&self, snapshot: &IoSyncMetricsSnapshot) {
        self.write_counter(
            &self.metric_name("pending_hits_total"),
            snapshot.pending_hits,
        );
        self.write_counter(
            &self.metric_name("writes_queued_total"),
            snapshot.writes_queued,
        );
        self.write_counter(
            &self.metric_name("writes_completed_total"),
            snapshot.writes_completed,
        );
        self.write_counter(
            &self.metric_name("writes_failed_total"),
            snapshot.writes_failed,
        );
        self.write_counter(
            &self.metric_name("writes_superseded_total"),
            snapshot.writes_superseded,
        );
        self.write_counter(&self.metric_name("held_hits_total"), snapshot.held_hits);
        self.write_gauge(&self.metric_name("pending_writes"), snapshot.pending as u64);
        self.write_gauge(&self.metric_name("held_cells"), snapshot.held as u64);
    }
}

impl<W: Write + Send + Sync> MetricsExporter<QueueMetricsSnapshot> for PrometheusTextExporter<W> {
    fn export(&self, snapshot: &QueueMetricsSnapshot) {
        self.write_counter(&self.metric_name("enqueued_total"), snapshot.enqueued);
        self.write_counter(
            &self.metric_name("priority_raises_total"),
            snapshot.priority_raises,
        );
        self.write_counter(&self.metric_name("executed_total"), snapshot.executed);
        self.write_counter(&self.metric_name("cancelled_total"), snapshot.cancelled);
        self.write_counter(
            &self.metric_name("task_failures_total"),
            snapshot.task_failures,
        );
        self.write_gauge(&self.metric_name("queued_tasks"), snapshot.queued as u64);
        self.write_gauge(&self.metric_name("workers"), snapshot.workers as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_snapshot_renders_prefixed_counters_and_gauges() {
        let exporter = PrometheusTextExporter::new("cellcache", Vec::new());
        exporter.export(&CacheMetricsSnapshot {
            hits: 7,
            resident: 3,
            capacity: 100,
            ..Default::default()
        });
        let text = String::from_utf8(exporter.into_inner()).unwrap();
        assert!(text.contains("# TYPE cellcache_hits_total counter\ncellcache_hits_total 7\n"));
        assert!(text.contains("# TYPE cellcache_resident_cells gauge\ncellcache_resident_cells 3\n"));
        assert!(text.contains("cellcache_capacity 100\n"));
    }

    #[test]
    fn empty_prefix_uses_bare_names() {
        let exporter = PrometheusTextExporter::new("", Vec::new());
        exporter.export(&QueueMetricsSnapshot {
            cancelled: 4,
            ..Default::default()
        });
        let text = String::from_utf8(exporter.into_inner()).unwrap();
        assert!(text.contains("\ncancelled_total 4\n"));
    }
}
