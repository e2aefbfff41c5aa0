//! Metrics collection and reporting for the publisher

use serde::Serialize;
use snap_cassandra_core::error::PublishError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Thread-safe metrics collector
#[derive(Debug)]
pub struct MetricsCollector {
    /// Total publish calls that decoded successfully
    pub batches_total: AtomicU64,

    /// Total metric records received
    pub metrics_total: AtomicU64,

    /// Primary table rows written
    pub rows_written_total: AtomicU64,

    /// Tag index rows written
    pub tag_rows_written_total: AtomicU64,

    /// Metrics skipped because their value could not be stored
    pub invalid_values_total: AtomicU64,

    /// Failed row writes
    pub store_errors_total: AtomicU64,

    /// Payloads that could not be decoded
    pub decode_errors_total: AtomicU64,

    /// Total processing time
    pub processing_time_total_ms: AtomicU64,

    /// Start time for rate calculations
    start_time: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            batches_total: AtomicU64::new(0),
            metrics_total: AtomicU64::new(0),
            rows_written_total: AtomicU64::new(0),
            tag_rows_written_total: AtomicU64::new(0),
            invalid_values_total: AtomicU64::new(0),
            store_errors_total: AtomicU64::new(0),
            decode_errors_total: AtomicU64::new(0),
            processing_time_total_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a decoded batch of `metrics` records
    pub fn record_batch(&self, metrics: u64) {
        self.batches_total.fetch_add(1, Ordering::Relaxed);
        self.metrics_total.fetch_add(metrics, Ordering::Relaxed);
    }

    pub fn increment_rows_written(&self) {
        self.rows_written_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_tag_rows_written(&self) {
        self.tag_rows_written_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an error against the matching counter
    pub fn record_error(&self, error: &PublishError) {
        let counter = match error {
            PublishError::InvalidDataType(_) => &self.invalid_values_total,
            PublishError::Store(_) | PublishError::Closed => &self.store_errors_total,
            PublishError::Decode(_) | PublishError::UnknownContentType(_) => {
                &self.decode_errors_total
            }
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Add processing time
    pub fn add_processing_time(&self, duration: Duration) {
        let millis = duration.as_millis() as u64;
        self.processing_time_total_ms
            .fetch_add(millis, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches_total: self.batches_total.load(Ordering::Relaxed),
            metrics_total: self.metrics_total.load(Ordering::Relaxed),
            rows_written_total: self.rows_written_total.load(Ordering::Relaxed),
            tag_rows_written_total: self.tag_rows_written_total.load(Ordering::Relaxed),
            invalid_values_total: self.invalid_values_total.load(Ordering::Relaxed),
            store_errors_total: self.store_errors_total.load(Ordering::Relaxed),
            decode_errors_total: self.decode_errors_total.load(Ordering::Relaxed),
            processing_time_total_ms: self.processing_time_total_ms.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Generate Prometheus format metrics
    pub fn prometheus_format(&self) -> String {
        let snapshot = self.snapshot();
        let counters = [
            (
                "batches_total",
                "Total number of batches published",
                snapshot.batches_total,
            ),
            (
                "metrics_total",
                "Total number of metrics received",
                snapshot.metrics_total,
            ),
            (
                "rows_written_total",
                "Rows written to the metrics table",
                snapshot.rows_written_total,
            ),
            (
                "tag_rows_written_total",
                "Rows written to the tags table",
                snapshot.tag_rows_written_total,
            ),
            (
                "invalid_values_total",
                "Metrics with a value that cannot be stored",
                snapshot.invalid_values_total,
            ),
            (
                "store_errors_total",
                "Failed row writes",
                snapshot.store_errors_total,
            ),
            (
                "decode_errors_total",
                "Batches that could not be decoded",
                snapshot.decode_errors_total,
            ),
            (
                "processing_time_total_ms",
                "Total processing time in milliseconds",
                snapshot.processing_time_total_ms,
            ),
        ];

        let mut out = String::new();
        for (name, help, value) in counters {
            out.push_str(&format!(
                "# HELP snap_cassandra_{name} {help}\n\
                 # TYPE snap_cassandra_{name} counter\n\
                 snap_cassandra_{name} {value}\n\n"
            ));
        }
        out.push_str(&format!(
            "# HELP snap_cassandra_uptime_seconds Publisher uptime in seconds\n\
             # TYPE snap_cassandra_uptime_seconds gauge\n\
             snap_cassandra_uptime_seconds {}\n",
            snapshot.uptime_seconds
        ));
        out
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub batches_total: u64,
    pub metrics_total: u64,
    pub rows_written_total: u64,
    pub tag_rows_written_total: u64,
    pub invalid_values_total: u64,
    pub store_errors_total: u64,
    pub decode_errors_total: u64,
    pub processing_time_total_ms: u64,
    pub uptime_seconds: u64,
}

/// Helper for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Finish timing and record to metrics collector
    pub fn finish(self, collector: &MetricsCollector) {
        collector.add_processing_time(self.start.elapsed());
    }
}
