// Private module declaration
mod server;

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Event appends (throughput, latency, optimistic concurrency conflicts)
// - Snapshot lookups (fast path vs bisection, reads per lookup)
// - Degraded metadata queries and decode failures
// - Publishing and snapshot writes
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Event Store
    pub events_appended: IntCounterVec,
    pub concurrency_conflicts: IntCounter,
    pub append_duration: Histogram,

    // Snapshot Repository
    pub snapshot_lookups: IntCounterVec,
    pub snapshot_reads: IntCounter,
    pub snapshots_written: IntCounter,

    // Reads & metadata
    pub metadata_unknown: IntCounterVec,
    pub decode_failures: IntCounterVec,

    // Publishing
    pub events_published: IntCounter,
    pub publish_failures: IntCounter,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let events_appended = IntCounterVec::new(
            Opts::new("events_appended_total", "Total events appended to the log"),
            &["stream"],
        )?;
        registry.register(Box::new(events_appended.clone()))?;

        let concurrency_conflicts = IntCounter::new(
            "concurrency_conflicts_total",
            "Appends rejected by the optimistic concurrency check",
        )?;
        registry.register(Box::new(concurrency_conflicts.clone()))?;

        let append_duration = Histogram::with_opts(
            HistogramOpts::new("append_duration_seconds", "Event append duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(append_duration.clone()))?;

        let snapshot_lookups = IntCounterVec::new(
            Opts::new("snapshot_lookups_total", "Snapshot lookups by resolution path"),
            &["path"],
        )?;
        registry.register(Box::new(snapshot_lookups.clone()))?;

        let snapshot_reads = IntCounter::new(
            "snapshot_reads_total",
            "Single-record reads issued while searching snapshot shards",
        )?;
        registry.register(Box::new(snapshot_reads.clone()))?;

        let snapshots_written = IntCounter::new("snapshots_written_total", "Snapshots appended")?;
        registry.register(Box::new(snapshots_written.clone()))?;

        let metadata_unknown = IntCounterVec::new(
            Opts::new(
                "metadata_unknown_total",
                "Shard metadata queries that degraded to an unknown offset",
            ),
            &["query"],
        )?;
        registry.register(Box::new(metadata_unknown.clone()))?;

        let decode_failures = IntCounterVec::new(
            Opts::new("decode_failures_total", "Records that failed to decode"),
            &["kind"],
        )?;
        registry.register(Box::new(decode_failures.clone()))?;

        let events_published = IntCounter::new(
            "events_published_total",
            "Committed events forwarded to publishing streams",
        )?;
        registry.register(Box::new(events_published.clone()))?;

        let publish_failures = IntCounter::new(
            "publish_failures_total",
            "Committed events that could not be published",
        )?;
        registry.register(Box::new(publish_failures.clone()))?;

        Ok(Self {
            registry,
            events_appended,
            concurrency_conflicts,
            append_duration,
            snapshot_lookups,
            snapshot_reads,
            snapshots_written,
            metadata_unknown,
            decode_failures,
            events_published,
            publish_failures,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_append(&self, stream_role: &str, events: usize, duration_secs: f64) {
        self.events_appended
            .with_label_values(&[stream_role])
            .inc_by(events as u64);
        self.append_duration.observe(duration_secs);
    }

    pub fn record_conflict(&self) {
        self.concurrency_conflicts.inc();
    }

    pub fn record_snapshot_lookup(&self, path: &str, reads: u64) {
        self.snapshot_lookups.with_label_values(&[path]).inc();
        self.snapshot_reads.inc_by(reads);
    }

    pub fn record_snapshot_written(&self) {
        self.snapshots_written.inc();
    }

    pub fn record_metadata_unknown(&self, query: &str) {
        self.metadata_unknown.with_label_values(&[query]).inc();
    }

    pub fn record_decode_failure(&self, kind: &str) {
        self.decode_failures.with_label_values(&[kind]).inc();
    }

    pub fn record_publish(&self, success: bool) {
        if success {
            self.events_published.inc();
        } else {
            self.publish_failures.inc();
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}
