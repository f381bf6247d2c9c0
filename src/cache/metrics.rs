//! Cache Metrics Collection
//!
//! Lock-free counters updated on the hot path, plus the [`StatsSnapshot`]
//! assembled by `CacheManager::get_stats`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

use super::health::HealthReport;
use super::local::LocalStats;
use super::remote::{RemoteInfo, RemoteStats};

/// Cache metrics collector
#[derive(Debug, Default)]
pub struct CacheMetrics {
    // Tier hits and misses
    remote_hits: AtomicU64,
    remote_misses: AtomicU64,
    local_hits: AtomicU64,
    local_misses: AtomicU64,
    /// Lookups that missed both tiers
    misses: AtomicU64,

    // Operations
    sets: AtomicU64,
    deletes: AtomicU64,
    validation_failures: AtomicU64,
    rate_limited: AtomicU64,
    serialization_errors: AtomicU64,

    // Compression
    compressed_writes: AtomicU64,
    bytes_before_compression: AtomicU64,
    bytes_after_compression: AtomicU64,

    // Background work
    warmup_processed: AtomicU64,
    warmup_failed: AtomicU64,
    batch_ops_applied: AtomicU64,

    // Latencies (microseconds, exponential moving average)
    get_latency_us: AtomicU64,
    set_latency_us: AtomicU64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_remote_hit(&self) {
        self.remote_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remote_miss(&self) {
        self.remote_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_local_hit(&self) {
        self.local_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_local_miss(&self) {
        self.local_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_validation_failure(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_serialization_error(&self) {
        self.serialization_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an encoded write; `compressed` tells whether LZ4 was applied
    pub fn record_encoding(&self, raw_len: usize, stored_len: usize, compressed: bool) {
        if compressed {
            self.compressed_writes.fetch_add(1, Ordering::Relaxed);
        }
        self.bytes_before_compression
            .fetch_add(raw_len as u64, Ordering::Relaxed);
        self.bytes_after_compression
            .fetch_add(stored_len as u64, Ordering::Relaxed);
    }

    pub fn record_warmup(&self, ok: bool) {
        if ok {
            self.warmup_processed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.warmup_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_batch_applied(&self, ops: usize) {
        self.batch_ops_applied
            .fetch_add(ops as u64, Ordering::Relaxed);
    }

    pub fn record_get_latency(&self, duration: Duration) {
        update_latency_ema(&self.get_latency_us, duration);
    }

    pub fn record_set_latency(&self, duration: Duration) {
        update_latency_ema(&self.set_latency_us, duration);
    }

    pub fn remote_hits(&self) -> u64 {
        self.remote_hits.load(Ordering::Relaxed)
    }

    pub fn local_hits(&self) -> u64 {
        self.local_hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Hits over all completed lookups
    pub fn hit_ratio(&self) -> f64 {
        let hits = (self.remote_hits() + self.local_hits()) as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Stored bytes over serialized bytes (1.0 = no saving)
    pub fn compression_ratio(&self) -> f64 {
        let before = self.bytes_before_compression.load(Ordering::Relaxed);
        if before == 0 {
            1.0
        } else {
            self.bytes_after_compression.load(Ordering::Relaxed) as f64 / before as f64
        }
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            remote_hits: load(&self.remote_hits),
            remote_misses: load(&self.remote_misses),
            local_hits: load(&self.local_hits),
            local_misses: load(&self.local_misses),
            misses: load(&self.misses),
            hit_ratio: self.hit_ratio(),
            sets: load(&self.sets),
            deletes: load(&self.deletes),
            validation_failures: load(&self.validation_failures),
            rate_limited: load(&self.rate_limited),
            serialization_errors: load(&self.serialization_errors),
            compressed_writes: load(&self.compressed_writes),
            bytes_before_compression: load(&self.bytes_before_compression),
            bytes_after_compression: load(&self.bytes_after_compression),
            compression_ratio: self.compression_ratio(),
            warmup_processed: load(&self.warmup_processed),
            warmup_failed: load(&self.warmup_failed),
            batch_ops_applied: load(&self.batch_ops_applied),
            get_latency_us: load(&self.get_latency_us),
            set_latency_us: load(&self.set_latency_us),
        }
    }
}

fn update_latency_ema(target: &AtomicU64, duration: Duration) {
    let new_us = duration.as_micros() as u64;
    let alpha = 0.1;

    loop {
        let current = target.load(Ordering::Relaxed);
        let updated = if current == 0 {
            new_us
        } else {
            ((1.0 - alpha) * current as f64 + alpha * new_us as f64) as u64
        };

        if target
            .compare_exchange_weak(current, updated, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            break;
        }
    }
}

/// Latency measurement helper
pub struct LatencyTracker {
    start: Instant,
}

impl LatencyTracker {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Point-in-time copy of [`CacheMetrics`]
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub remote_hits: u64,
    pub remote_misses: u64,
    pub local_hits: u64,
    pub local_misses: u64,
    pub misses: u64,
    pub hit_ratio: f64,
    pub sets: u64,
    pub deletes: u64,
    pub validation_failures: u64,
    pub rate_limited: u64,
    pub serialization_errors: u64,
    pub compressed_writes: u64,
    pub bytes_before_compression: u64,
    pub bytes_after_compression: u64,
    pub compression_ratio: f64,
    pub warmup_processed: u64,
    pub warmup_failed: u64,
    pub batch_ops_applied: u64,
    pub get_latency_us: u64,
    pub set_latency_us: u64,
}

/// Pending background work
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueDepths {
    pub warmup: usize,
    pub batch: usize,
    /// Keys changed locally while the remote store was unavailable
    pub resync: usize,
}

/// Everything `get_stats` reports; assembled without remote I/O
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub metrics: MetricsSnapshot,
    pub local: LocalStats,
    /// `None` when no remote store is configured
    pub remote: Option<RemoteStats>,
    pub remote_configured: bool,
    pub remote_available: bool,
    /// Last info fetched by the health checker
    pub remote_info: Option<RemoteInfo>,
    pub queues: QueueDepths,
    pub health: HealthReport,
    pub audit_records: usize,
    pub tracked_keys: usize,
    pub predictions: usize,
}

impl StatsSnapshot {
    /// Overall hit ratio
    pub fn hit_ratio(&self) -> f64 {
        self.metrics.hit_ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_ratio() {
        let m = CacheMetrics::new();
        assert_eq!(m.hit_ratio(), 0.0);

        m.record_remote_hit();
        m.record_local_hit();
        m.record_local_hit();
        m.record_miss();

        assert_eq!(m.hit_ratio(), 0.75);
        let snap = m.snapshot();
        assert_eq!(snap.remote_hits, 1);
        assert_eq!(snap.local_hits, 2);
        assert_eq!(snap.misses, 1);
    }

    #[test]
    fn test_compression_counters() {
        let m = CacheMetrics::new();
        assert_eq!(m.compression_ratio(), 1.0);

        m.record_encoding(1000, 200, true);
        m.record_encoding(100, 101, false);

        let snap = m.snapshot();
        assert_eq!(snap.compressed_writes, 1);
        assert_eq!(snap.bytes_before_compression, 1100);
        assert_eq!(snap.bytes_after_compression, 301);
        assert!(snap.compression_ratio < 0.3);
    }

    #[test]
    fn test_latency_ema() {
        let m = CacheMetrics::new();
        m.record_get_latency(Duration::from_micros(100));
        assert_eq!(m.snapshot().get_latency_us, 100);

        m.record_get_latency(Duration::from_micros(200));
        let ema = m.snapshot().get_latency_us;
        assert!((109..=110).contains(&ema), "ema was {}", ema);
    }

    #[test]
    fn test_latency_tracker() {
        let tracker = LatencyTracker::start();
        std::thread::sleep(Duration::from_millis(5));
        assert!(tracker.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn test_background_counters() {
        let m = CacheMetrics::new();
        m.record_warmup(true);
        m.record_warmup(false);
        m.record_batch_applied(7);

        let snap = m.snapshot();
        assert_eq!(snap.warmup_processed, 1);
        assert_eq!(snap.warmup_failed, 1);
        assert_eq!(snap.batch_ops_applied, 7);
    }
}
