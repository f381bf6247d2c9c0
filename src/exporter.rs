//! Prometheus Exporter
//!
//! Mirrors a [`StatsSnapshot`] into a private Prometheus registry. Cache
//! counters are cumulative, so exported counters advance by the difference
//! since the previous update.

use prometheus::{
    Encoder, Gauge, GaugeVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

use crate::cache::StatsSnapshot;
use crate::error::Result;

const NAMESPACE: &str = "tiercache";

/// Cache statistics as Prometheus metrics
pub struct MetricsExporter {
    registry: Registry,

    hits: IntCounterVec,
    misses: IntCounter,
    operations: IntCounterVec,
    rejections: IntCounterVec,
    compressed_writes: IntCounter,
    encoded_bytes: IntCounterVec,
    warmups: IntCounterVec,
    batch_ops: IntCounter,
    latency: GaugeVec,
    hit_ratio: Gauge,

    local_entries: IntGauge,
    local_bytes: IntGauge,
    local_utilization: Gauge,
    local_removals: IntCounterVec,

    remote_available: IntGauge,
    remote_failures: IntCounterVec,

    queue_depth: IntGaugeVec,
    health: IntGaugeVec,
    tracked_keys: IntGauge,
    predictions: IntGauge,
}

fn opts(name: &str, help: &str) -> Opts {
    Opts::new(name, help).namespace(NAMESPACE)
}

impl MetricsExporter {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let hits = IntCounterVec::new(opts("hits_total", "Cache hits by tier"), &["tier"])?;
        let misses = IntCounter::with_opts(opts("misses_total", "Lookups that missed both tiers"))?;
        let operations =
            IntCounterVec::new(opts("operations_total", "Writes and deletes"), &["operation"])?;
        let rejections = IntCounterVec::new(
            opts("rejections_total", "Operations rejected before reaching a tier"),
            &["reason"],
        )?;
        let compressed_writes = IntCounter::with_opts(opts(
            "compressed_writes_total",
            "Writes stored LZ4-compressed",
        ))?;
        let encoded_bytes = IntCounterVec::new(
            opts("encoded_bytes_total", "Serialized and stored payload bytes"),
            &["stage"],
        )?;
        let warmups = IntCounterVec::new(opts("warmups_total", "Warmup items applied"), &["result"])?;
        let batch_ops = IntCounter::with_opts(opts(
            "batch_operations_total",
            "Batch operations applied",
        ))?;
        let latency = GaugeVec::new(
            opts("latency_seconds", "Moving-average operation latency"),
            &["operation"],
        )?;
        let hit_ratio = Gauge::with_opts(opts("hit_ratio", "Hits over completed lookups"))?;

        let local_entries = IntGauge::with_opts(opts("local_entries", "Local store entries"))?;
        let local_bytes = IntGauge::with_opts(opts("local_bytes", "Local store payload bytes"))?;
        let local_utilization =
            Gauge::with_opts(opts("local_utilization", "Local store occupancy (0-1)"))?;
        let local_removals = IntCounterVec::new(
            opts("local_removals_total", "Local entries removed by eviction or expiry"),
            &["cause"],
        )?;

        let remote_available =
            IntGauge::with_opts(opts("remote_available", "1 while the remote store is in use"))?;
        let remote_failures = IntCounterVec::new(
            opts("remote_failures_total", "Failed remote store calls"),
            &["kind"],
        )?;

        let queue_depth =
            IntGaugeVec::new(opts("queue_depth", "Pending background work"), &["queue"])?;
        let health = IntGaugeVec::new(
            opts("health_status", "0 healthy, 1 warning, 2 critical"),
            &["component"],
        )?;
        let tracked_keys =
            IntGauge::with_opts(opts("tracked_keys", "Keys with access history"))?;
        let predictions =
            IntGauge::with_opts(opts("predictions", "Keys with an access prediction"))?;

        registry.register(Box::new(hits.clone()))?;
        registry.register(Box::new(misses.clone()))?;
        registry.register(Box::new(operations.clone()))?;
        registry.register(Box::new(rejections.clone()))?;
        registry.register(Box::new(compressed_writes.clone()))?;
        registry.register(Box::new(encoded_bytes.clone()))?;
        registry.register(Box::new(warmups.clone()))?;
        registry.register(Box::new(batch_ops.clone()))?;
        registry.register(Box::new(latency.clone()))?;
        registry.register(Box::new(hit_ratio.clone()))?;
        registry.register(Box::new(local_entries.clone()))?;
        registry.register(Box::new(local_bytes.clone()))?;
        registry.register(Box::new(local_utilization.clone()))?;
        registry.register(Box::new(local_removals.clone()))?;
        registry.register(Box::new(remote_available.clone()))?;
        registry.register(Box::new(remote_failures.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(health.clone()))?;
        registry.register(Box::new(tracked_keys.clone()))?;
        registry.register(Box::new(predictions.clone()))?;

        Ok(Self {
            registry,
            hits,
            misses,
            operations,
            rejections,
            compressed_writes,
            encoded_bytes,
            warmups,
            batch_ops,
            latency,
            hit_ratio,
            local_entries,
            local_bytes,
            local_utilization,
            local_removals,
            remote_available,
            remote_failures,
            queue_depth,
            health,
            tracked_keys,
            predictions,
        })
    }

    /// Bring every metric up to date with `stats`
    pub fn update(&self, stats: &StatsSnapshot) {
        let m = &stats.metrics;

        advance(&self.hits.with_label_values(&["remote"]), m.remote_hits);
        advance(&self.hits.with_label_values(&["local"]), m.local_hits);
        advance(&self.misses, m.misses);
        advance(&self.operations.with_label_values(&["set"]), m.sets);
        advance(&self.operations.with_label_values(&["delete"]), m.deletes);
        advance(
            &self.rejections.with_label_values(&["validation"]),
            m.validation_failures,
        );
        advance(&self.rejections.with_label_values(&["rate_limit"]), m.rate_limited);
        advance(
            &self.rejections.with_label_values(&["serialization"]),
            m.serialization_errors,
        );
        advance(&self.compressed_writes, m.compressed_writes);
        advance(
            &self.encoded_bytes.with_label_values(&["serialized"]),
            m.bytes_before_compression,
        );
        advance(
            &self.encoded_bytes.with_label_values(&["stored"]),
            m.bytes_after_compression,
        );
        advance(&self.warmups.with_label_values(&["ok"]), m.warmup_processed);
        advance(&self.warmups.with_label_values(&["failed"]), m.warmup_failed);
        advance(&self.batch_ops, m.batch_ops_applied);

        self.latency
            .with_label_values(&["get"])
            .set(m.get_latency_us as f64 / 1e6);
        self.latency
            .with_label_values(&["set"])
            .set(m.set_latency_us as f64 / 1e6);
        self.hit_ratio.set(m.hit_ratio);

        self.local_entries.set(stats.local.entries as i64);
        self.local_bytes.set(stats.local.size_bytes as i64);
        self.local_utilization.set(stats.local.utilization);
        advance(
            &self.local_removals.with_label_values(&["eviction"]),
            stats.local.evictions,
        );
        advance(
            &self.local_removals.with_label_values(&["expiry"]),
            stats.local.expirations,
        );

        self.remote_available.set(i64::from(stats.remote_available));
        if let Some(remote) = &stats.remote {
            advance(&self.remote_failures.with_label_values(&["error"]), remote.errors);
            advance(
                &self.remote_failures.with_label_values(&["timeout"]),
                remote.timeouts,
            );
        }

        self.queue_depth
            .with_label_values(&["warmup"])
            .set(stats.queues.warmup as i64);
        self.queue_depth
            .with_label_values(&["batch"])
            .set(stats.queues.batch as i64);
        self.queue_depth
            .with_label_values(&["resync"])
            .set(stats.queues.resync as i64);

        self.health
            .with_label_values(&["overall"])
            .set(stats.health.status.as_gauge());
        for component in &stats.health.components {
            self.health
                .with_label_values(&[component.name.as_str()])
                .set(component.status.as_gauge());
        }

        self.tracked_keys.set(stats.tracked_keys as i64);
        self.predictions.set(stats.predictions as i64);
    }

    /// Text exposition format, with its content type
    pub fn encode(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((encoder.format_type().to_string(), buffer))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Move a counter forward to `total`; never moves backwards
fn advance(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}
