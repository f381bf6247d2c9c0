//! Cache Manager - Remote Store with Local Fallback
//!
//! Orchestrates the remote tier (Redis) and the in-process local tier behind
//! one typed API. Reads prefer the remote store while it is available and
//! fall back to the local store; writes always land locally and go to the
//! remote store best-effort.
//!
//! Validation failures and rate-limit rejections never surface as errors:
//! they are audited, counted and turned into a miss or a no-op. Only
//! encoding/decoding failures are returned to the caller.
//!
//! Writes and deletes that miss the remote store during an outage are
//! journaled and replayed by the health checker before the remote store is
//! trusted again, so a recovered remote never serves a value older than the
//! local one.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::audit::{AuditLog, AuditRecord};
use super::codec::{Codec, Encoded};
use super::config::CacheConfig;
use super::health::{ComponentHealth, HealthReport, HealthStatus};
use super::local::LocalStore;
use super::memoize;
use super::metrics::{CacheMetrics, LatencyTracker, QueueDepths, StatsSnapshot};
use super::policy::EvictionStrategy;
use super::predictor::{AccessPrediction, AccessTracker};
use super::rate_limit::{Operation, RateLimiter};
use super::remote::{RedisBackend, RemoteBackend, RemoteInfo, RemoteStore, RemoteWrite};
use super::validator::{display_key, KeyPattern, Validator};
use super::workers::{self, BatchOp, WarmupItem, WorkQueue, WorkerHandle};
use crate::error::{Error, Result};

/// Tier that served a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Remote,
    Local,
}

impl std::fmt::Display for CacheTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheTier::Remote => write!(f, "remote"),
            CacheTier::Local => write!(f, "local"),
        }
    }
}

/// Where a write landed
#[derive(Debug, Clone, Copy)]
struct WriteOutcome {
    local: bool,
    /// `None` when the remote store was not attempted
    remote: Option<bool>,
}

/// Journal bound; past it the whole local store is replayed after a flush
const MAX_RESYNC_KEYS: usize = 10_000;

/// Local changes the remote store has not seen
#[derive(Debug, Default)]
struct Resync {
    /// Flush the remote store before replaying keys
    flush: bool,
    /// Too many keys to track; replay every local key
    overflowed: bool,
    keys: HashSet<String>,
}

impl Resync {
    fn record(&mut self, key: &str) {
        if self.overflowed || self.keys.contains(key) {
            return;
        }
        if self.keys.len() >= MAX_RESYNC_KEYS {
            warn!(limit = MAX_RESYNC_KEYS, "Resync journal full, remote will be rebuilt");
            self.overflowed = true;
            self.flush = true;
            self.keys.clear();
            return;
        }
        self.keys.insert(key.to_string());
    }

    fn record_clear(&mut self) {
        self.flush = true;
        self.overflowed = false;
        self.keys.clear();
    }

    /// Put back a batch that could not be replayed; newer entries stay
    fn merge(&mut self, earlier: Resync) {
        if earlier.overflowed {
            self.overflowed = true;
            self.keys.clear();
        }
        self.flush |= earlier.flush;
        for key in &earlier.keys {
            self.record(key);
        }
    }

    fn is_empty(&self) -> bool {
        !self.flush && !self.overflowed && self.keys.is_empty()
    }

    fn len(&self) -> usize {
        self.keys.len()
    }
}

impl WriteOutcome {
    fn stored(&self) -> bool {
        self.local || self.remote == Some(true)
    }

    fn succeeded(&self) -> bool {
        self.local && self.remote != Some(false)
    }
}

/// Dual-tier cache manager
///
/// Create with [`CacheManager::open`] (or one of the sync constructors
/// followed by [`CacheManager::start`]) and call [`CacheManager::shutdown`]
/// before dropping the last handle.
pub struct CacheManager {
    config: CacheConfig,
    codec: Codec,
    validator: Validator,
    rate_limiter: RateLimiter,
    local: LocalStore,
    remote: Option<RemoteStore>,
    audit: AuditLog,
    metrics: CacheMetrics,
    access: AccessTracker,
    health: RwLock<HealthReport>,
    remote_info: RwLock<Option<RemoteInfo>>,
    resync: Mutex<Resync>,
    /// Local eviction count at the previous health check
    evictions_seen: AtomicU64,
    warmup_queue: WorkQueue<WarmupItem>,
    batch_queue: WorkQueue<BatchOp>,
    /// Serializes batch flushes so a sync flush observes in-flight batches
    batch_flush: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
    workers: Mutex<Vec<WorkerHandle>>,
}

impl CacheManager {
    /// Create a manager, connecting to Redis when `remote_url` is set
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        let backend = match config.redis() {
            Some(settings) => {
                Some(Arc::new(RedisBackend::connect(&settings)?) as Arc<dyn RemoteBackend>)
            }
            None => None,
        };
        Self::build(config, backend)
    }

    /// Create a manager over an explicit remote backend
    pub fn with_backend(config: CacheConfig, backend: Arc<dyn RemoteBackend>) -> Result<Self> {
        config.validate()?;
        Self::build(config, Some(backend))
    }

    /// Create a local-only manager, ignoring any `remote_url`
    pub fn local_only(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        Self::build(config, None)
    }

    fn build(config: CacheConfig, backend: Option<Arc<dyn RemoteBackend>>) -> Result<Self> {
        let remote = backend.map(|b| RemoteStore::new(b, config.remote_timeout()));

        info!(
            remote = remote.as_ref().map_or("none", |r| r.backend_name()),
            max_local_entries = config.max_local_entries,
            strategy = %config.eviction_strategy,
            "Cache manager created"
        );

        Ok(Self {
            codec: Codec::new(config.compression()),
            validator: Validator::new(config.validator()),
            rate_limiter: RateLimiter::new(&config.rate_limits),
            local: LocalStore::new(config.max_local_entries, config.eviction_strategy),
            remote,
            audit: AuditLog::new(config.audit_capacity, config.audit_logging_enabled),
            metrics: CacheMetrics::new(),
            access: AccessTracker::new(config.access_history_len),
            health: RwLock::new(HealthReport::pending()),
            remote_info: RwLock::new(None),
            resync: Mutex::new(Resync::default()),
            evictions_seen: AtomicU64::new(0),
            warmup_queue: WorkQueue::new(),
            batch_queue: WorkQueue::new(),
            batch_flush: tokio::sync::Mutex::new(()),
            shutdown: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
            config,
        })
    }

    /// Create a manager and start its background workers
    pub async fn open(config: CacheConfig) -> Result<Arc<Self>> {
        let manager = Arc::new(Self::new(config)?);
        manager.start();
        Ok(manager)
    }

    /// Create a manager over `backend` and start its background workers
    pub async fn open_with_backend(
        config: CacheConfig,
        backend: Arc<dyn RemoteBackend>,
    ) -> Result<Arc<Self>> {
        let manager = Arc::new(Self::with_backend(config, backend)?);
        manager.start();
        Ok(manager)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Spawn the background workers (idempotent; no-op after shutdown)
    pub fn start(self: &Arc<Self>) {
        let mut running = self.workers.lock();
        if !running.is_empty() || self.shutdown.is_cancelled() {
            return;
        }
        *running = workers::spawn_all(self, &self.shutdown);
        info!(workers = running.len(), "Cache workers started");
    }

    /// Stop the workers and apply any queued work
    ///
    /// Workers get `shutdown_timeout` to finish; stragglers are aborted.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let mut running = std::mem::take(&mut *self.workers.lock());

        let joined = tokio::time::timeout(
            self.config.shutdown_timeout(),
            futures::future::join_all(running.iter_mut().map(|w| &mut w.handle)),
        )
        .await;

        if joined.is_err() {
            for worker in &running {
                if !worker.handle.is_finished() {
                    warn!(worker = worker.name, "Worker did not stop in time, aborting");
                    worker.handle.abort();
                }
            }
        }

        let flushed = self.flush_batch().await;
        let mut warmed = 0usize;
        while let Some(item) = self.warmup_queue.pop() {
            self.apply_warmup(item).await;
            warmed += 1;
        }

        info!(flushed, warmed, "Cache manager shut down");
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled() && !self.workers.lock().is_empty()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get a value, preferring the remote store
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get_with_ttl(key, None).await
    }

    /// Get a value, restarting its expiry with `ttl_override` on a hit
    pub async fn get_with_ttl<T: DeserializeOwned>(
        &self,
        key: &str,
        ttl_override: Option<Duration>,
    ) -> Result<Option<T>> {
        let tracker = LatencyTracker::start();
        if !self.check_key("get", key) || !self.admit(Operation::Get, key) {
            return Ok(None);
        }

        let Some((payload, tier)) = self.lookup(key).await else {
            self.metrics.record_miss();
            debug!(key = %display_key(key), "Cache miss");
            return Ok(None);
        };

        let value = self.decode::<T>("get", key, &payload)?;

        if let Some(ttl) = ttl_override {
            let refreshed = match tier {
                CacheTier::Remote => self.remote_store_expire(key, ttl).await,
                CacheTier::Local => self.local.touch(key, ttl),
            };
            debug!(key = %display_key(key), %tier, refreshed, "Expiry refreshed");
        }

        if self.config.monitoring_enabled {
            self.access.record(key);
        }
        self.audit.record("get", key, true, Some(format!("{} hit", tier)));
        self.metrics.record_get_latency(tracker.elapsed());
        debug!(key = %display_key(key), %tier, "Cache hit");

        Ok(Some(value))
    }

    async fn remote_store_expire(&self, key: &str, ttl: Duration) -> bool {
        match &self.remote {
            Some(remote) => remote.expire(key, ttl).await,
            None => false,
        }
    }

    /// Remote first (when available), then local
    async fn lookup(&self, key: &str) -> Option<(Bytes, CacheTier)> {
        if let Some(remote) = self.available_remote() {
            match remote.get(key).await {
                Some(payload) => {
                    self.metrics.record_remote_hit();
                    return Some((payload, CacheTier::Remote));
                }
                None => self.metrics.record_remote_miss(),
            }
        }

        match self.local.get(key) {
            Some(payload) => {
                self.metrics.record_local_hit();
                Some((payload, CacheTier::Local))
            }
            None => {
                self.metrics.record_local_miss();
                None
            }
        }
    }

    /// Get several values; keys absent from both tiers are omitted
    pub async fn get_multi<T, K>(&self, keys: &[K]) -> Result<HashMap<String, T>>
    where
        T: DeserializeOwned,
        K: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let valid: Vec<String> = keys
            .iter()
            .map(|k| k.as_ref())
            .filter(|k| seen.insert(*k))
            .filter(|k| self.check_key("get_multi", k))
            .map(str::to_string)
            .collect();

        if valid.is_empty() || !self.admit(Operation::Get, &batch_label(valid.len())) {
            return Ok(HashMap::new());
        }

        let mut payloads = match self.available_remote() {
            Some(remote) => remote.get_many(&valid).await,
            None => HashMap::new(),
        };
        for _ in 0..payloads.len() {
            self.metrics.record_remote_hit();
        }

        for key in &valid {
            if payloads.contains_key(key) {
                continue;
            }
            match self.local.get(key) {
                Some(payload) => {
                    self.metrics.record_local_hit();
                    payloads.insert(key.clone(), payload);
                }
                None => {
                    self.metrics.record_local_miss();
                    self.metrics.record_miss();
                }
            }
        }

        let mut values = HashMap::with_capacity(payloads.len());
        for (key, payload) in payloads {
            let value = self.decode::<T>("get_multi", &key, &payload)?;
            if self.config.monitoring_enabled {
                self.access.record(&key);
            }
            values.insert(key, value);
        }

        self.audit.record(
            "get_multi",
            &batch_label(valid.len()),
            true,
            Some(format!("{} of {} found", values.len(), valid.len())),
        );
        Ok(values)
    }

    /// Keys matching a glob (`*`, `?`) across both tiers, sorted
    pub async fn get_keys(&self, pattern: &str) -> Vec<String> {
        let matcher = match KeyPattern::new(pattern) {
            Ok(matcher) => matcher,
            Err(e) => {
                warn!("Rejected key pattern: {}", e);
                return Vec::new();
            }
        };

        let mut keys: Vec<String> = self
            .local
            .keys()
            .into_iter()
            .filter(|k| matcher.matches(k))
            .collect();

        if let Some(remote) = self.available_remote() {
            keys.extend(remote.keys(matcher.remote_glob()).await);
        }

        keys.sort();
        keys.dedup();
        keys
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Store a value in both tiers
    ///
    /// `ttl` defaults to `default_ttl_seconds`; a zero TTL never expires.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        let tracker = LatencyTracker::start();
        if !self.check_key("set", key) || !self.admit(Operation::Set, key) {
            return Ok(());
        }

        let encoded = self.encode("set", key, value)?;
        if !self.accept_encoded("set", key, &encoded) {
            return Ok(());
        }

        let ttl = ttl.unwrap_or_else(|| self.config.default_ttl());
        let outcome = self
            .write_through(key, encoded.payload, ttl, metadata)
            .await;

        let details = match outcome.remote {
            Some(true) => "local+remote",
            Some(false) => "local, remote failed",
            None => "local only",
        };
        self.audit
            .record("set", key, outcome.stored(), Some(details.to_string()));
        self.metrics.record_set_latency(tracker.elapsed());
        Ok(())
    }

    /// Remove a key from both tiers; returns whether either tier held it
    ///
    /// Deletes are never dropped by the rate limiter; going over the delete
    /// quota is only counted and logged.
    pub async fn delete(&self, key: &str) -> bool {
        if !self.check_key("delete", key) {
            return false;
        }
        let within_quota = self.meter_delete(key);

        let local = self.local.delete(key);
        let remote = match self.available_remote() {
            Some(remote) => remote.delete(key).await,
            None => None,
        };
        if self.remote.is_some() && remote.is_none() {
            self.resync.lock().record(key);
        }
        self.access.forget(key);
        self.metrics.record_delete();
        let details = (!within_quota).then(|| "over delete quota".to_string());
        self.audit.record("delete", key, true, details);
        local || remote == Some(true)
    }

    /// Queue several writes (default TTL); `sync` applies them before returning
    ///
    /// Invalid keys and oversized values are skipped. Returns the number of
    /// operations queued.
    pub async fn batch_set<I, K, T>(&self, items: I, sync: bool) -> Result<usize>
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Serialize,
    {
        let ttl = self.config.default_ttl();
        let mut ops = Vec::new();
        for (key, value) in items {
            let key = key.into();
            if !self.check_key("batch_set", &key) {
                continue;
            }
            let encoded = self.encode("batch_set", &key, &value)?;
            if !self.accept_encoded("batch_set", &key, &encoded) {
                continue;
            }
            ops.push(BatchOp::Set {
                key,
                payload: encoded.payload,
                ttl,
            });
        }
        if ops.is_empty() || !self.admit(Operation::Batch, &batch_label(ops.len())) {
            return Ok(0);
        }
        Ok(self.enqueue_batch(ops, sync).await)
    }

    /// Queue several deletes; `sync` applies them before returning
    ///
    /// Like [`CacheManager::delete`], never dropped by the rate limiter.
    pub async fn batch_delete<K: AsRef<str>>(&self, keys: &[K], sync: bool) -> usize {
        let ops: Vec<BatchOp> = keys
            .iter()
            .map(|k| k.as_ref())
            .filter(|k| self.check_key("batch_delete", k))
            .map(|k| BatchOp::Delete { key: k.to_string() })
            .collect();
        if ops.is_empty() {
            return 0;
        }
        self.meter_delete(&batch_label(ops.len()));
        self.enqueue_batch(ops, sync).await
    }

    /// Queue ops; after shutdown no worker drains the queue, so flush inline
    async fn enqueue_batch(&self, ops: Vec<BatchOp>, sync: bool) -> usize {
        let queued = ops.len();
        self.batch_queue.push_many(ops);
        if sync || self.shutdown.is_cancelled() {
            self.flush_batch().await;
        }
        queued
    }

    /// Apply everything currently queued, in `batch_size` chunks
    pub async fn flush_batch(&self) -> usize {
        let _flush = self.batch_flush.lock().await;
        let mut applied = 0;
        loop {
            let ops = self.batch_queue.drain(self.config.batch_size);
            if ops.is_empty() {
                break;
            }
            applied += self.apply_batch(ops).await;
        }
        applied
    }

    /// Mirror a chunk locally, then send it to the remote store pipelined
    ///
    /// Only the last operation per key survives.
    async fn apply_batch(&self, ops: Vec<BatchOp>) -> usize {
        let mut last: HashMap<String, usize> = HashMap::with_capacity(ops.len());
        for (idx, op) in ops.iter().enumerate() {
            last.insert(op.key().to_string(), idx);
        }

        let mut writes: Vec<RemoteWrite> = Vec::new();
        let mut deletes: Vec<String> = Vec::new();
        for (idx, op) in ops.into_iter().enumerate() {
            if last.get(op.key()) != Some(&idx) {
                continue;
            }
            match op {
                BatchOp::Set { key, payload, ttl } => {
                    self.local.set(&key, payload.clone(), ttl, None);
                    self.metrics.record_set();
                    writes.push((key, payload, ttl));
                }
                BatchOp::Delete { key } => {
                    self.local.delete(&key);
                    self.access.forget(&key);
                    self.metrics.record_delete();
                    deletes.push(key);
                }
            }
        }

        let mut remote_ok = None;
        if let Some(remote) = self.available_remote() {
            let sets = remote.set_many(&writes).await;
            let dels = remote.delete_many(&deletes).await;
            remote_ok = Some(sets && dels);
        }
        if self.remote.is_some() && remote_ok != Some(true) {
            let mut resync = self.resync.lock();
            for key in writes.iter().map(|(k, _, _)| k).chain(deletes.iter()) {
                resync.record(key);
            }
        }

        let applied = writes.len() + deletes.len();
        self.metrics.record_batch_applied(applied);
        self.audit.record(
            "batch",
            &batch_label(applied),
            remote_ok != Some(false),
            Some(format!("{} sets, {} deletes", writes.len(), deletes.len())),
        );
        applied
    }

    /// Queue a value for background population
    ///
    /// Applied inline when the warmup worker is disabled or the manager has
    /// shut down.
    pub async fn warmup_cache<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        if !self.check_key("warmup", key) || !self.admit(Operation::Set, key) {
            return Ok(());
        }

        let encoded = self.encode("warmup", key, value)?;
        if !self.accept_encoded("warmup", key, &encoded) {
            return Ok(());
        }

        let item = WarmupItem {
            key: key.to_string(),
            encoded,
            ttl: ttl.unwrap_or_else(|| self.config.default_ttl()),
            metadata,
        };
        if !self.config.warmup_enabled || self.shutdown.is_cancelled() {
            self.apply_warmup(item).await;
            return Ok(());
        }
        self.warmup_queue.push(item);
        // Shutdown may have drained the queue between the check and the push
        if self.shutdown.is_cancelled() {
            while let Some(item) = self.warmup_queue.pop() {
                self.apply_warmup(item).await;
            }
        }
        Ok(())
    }

    /// Write one warmup item; false when any attempted tier rejected it
    pub(crate) async fn apply_warmup(&self, item: WarmupItem) -> bool {
        let outcome = self
            .write_through(&item.key, item.encoded.payload, item.ttl, item.metadata)
            .await;
        let ok = outcome.succeeded();
        self.metrics.record_warmup(ok);
        self.audit.record("warmup", &item.key, ok, None);
        ok
    }

    async fn write_through(
        &self,
        key: &str,
        payload: Bytes,
        ttl: Duration,
        metadata: Option<serde_json::Value>,
    ) -> WriteOutcome {
        let local = self.local.set(key, payload.clone(), ttl, metadata);
        let remote = match self.available_remote() {
            Some(remote) => Some(remote.set(key, payload, ttl).await),
            None => None,
        };
        if self.remote.is_some() && remote != Some(true) {
            self.resync.lock().record(key);
        }
        self.metrics.record_set();
        WriteOutcome { local, remote }
    }

    /// Flush both tiers
    ///
    /// A remote flush that cannot happen now is replayed on recovery.
    pub async fn clear(&self) {
        self.local.clear();
        if let Some(remote) = &self.remote {
            let flushed = match self.available_remote() {
                Some(remote) => remote.flush().await,
                None => false,
            };
            if flushed {
                // Older journaled keys are gone from both tiers now
                *self.resync.lock() = Resync::default();
            } else {
                warn!(backend = remote.backend_name(), "Remote flush deferred until recovery");
                self.resync.lock().record_clear();
            }
        }
        self.access.clear();
        self.audit.record("clear", "*", true, None);
        info!("Cache cleared");
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Probe the remote store, sweep expired entries and grade health
    ///
    /// A reachable remote store is only trusted again once the local changes
    /// it missed have been replayed.
    pub async fn run_health_check(&self) -> HealthReport {
        let remote_health = match &self.remote {
            None => ComponentHealth::remote(false, false),
            Some(remote) => {
                let mut reachable = remote.ping().await && self.replay_outage(remote).await;
                if reachable {
                    remote.restore();
                    // Changes journaled while the replay was in flight
                    reachable = self.replay_outage(remote).await;
                }
                if reachable {
                    let info = remote.info().await;
                    if info.is_some() {
                        *self.remote_info.write() = info;
                    }
                }
                ComponentHealth::remote(true, reachable)
            }
        };

        let purged = self.local.purge_expired();
        if purged > 0 {
            debug!(purged, "Swept expired local entries");
        }

        let evictions = self.local.evictions();
        let previous = self.evictions_seen.swap(evictions, Ordering::Relaxed);
        let evicted = evictions.saturating_sub(previous);
        let report = HealthReport::new(vec![
            remote_health,
            ComponentHealth::local(self.local.capacity(), self.local.utilization(), evicted),
        ]);

        let previous = std::mem::replace(&mut *self.health.write(), report.clone());
        if previous.checked_at.is_some() && previous.status != report.status {
            match report.status {
                HealthStatus::Healthy => info!(status = %report.status, "Cache health changed"),
                _ => warn!(status = %report.status, "Cache health changed"),
            }
        }
        report
    }

    /// Push journaled local changes to the remote store
    ///
    /// Journaled keys still held locally are written with their remaining
    /// TTL; the rest are deleted. On failure the journal is restored.
    async fn replay_outage(&self, remote: &RemoteStore) -> bool {
        let pending = std::mem::take(&mut *self.resync.lock());
        if pending.is_empty() {
            return true;
        }

        let keys: Vec<String> = if pending.overflowed {
            self.local.keys()
        } else {
            pending.keys.iter().cloned().collect()
        };

        let mut writes: Vec<RemoteWrite> = Vec::new();
        let mut deletes: Vec<String> = Vec::new();
        for key in keys {
            let live = self.local.peek(&key).and_then(|entry| match entry.remaining_ttl() {
                None => Some((entry.value().clone(), Duration::ZERO)),
                Some(left) if !left.is_zero() => Some((entry.value().clone(), left)),
                Some(_) => None,
            });
            match live {
                Some((payload, ttl)) => writes.push((key, payload, ttl)),
                None if !pending.flush => deletes.push(key),
                None => {}
            }
        }

        if remote.reconcile(pending.flush, &writes, &deletes).await {
            info!(
                flushed = pending.flush,
                writes = writes.len(),
                deletes = deletes.len(),
                "Replayed outage changes to remote store"
            );
            self.audit.record(
                "resync",
                &batch_label(writes.len() + deletes.len()),
                true,
                None,
            );
            true
        } else {
            warn!(
                keys = writes.len() + deletes.len(),
                "Remote replay failed, remote store stays unavailable"
            );
            self.resync.lock().merge(pending);
            false
        }
    }

    /// Recompute access predictions, returning how many keys qualify
    pub fn run_prediction(&self) -> usize {
        self.access.analyze(Utc::now())
    }

    /// Switch the local eviction strategy at runtime
    pub fn set_eviction_strategy(&self, strategy: EvictionStrategy) {
        let previous = self.local.strategy();
        self.local.set_strategy(strategy);
        info!(%previous, %strategy, "Eviction strategy changed");
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Counters and state of both tiers; performs no remote I/O
    pub fn get_stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            metrics: self.metrics.snapshot(),
            local: self.local.stats(),
            remote: self.remote.as_ref().map(|r| r.stats()),
            remote_configured: self.remote.is_some(),
            remote_available: self.is_remote_available(),
            remote_info: self.remote_info.read().clone(),
            queues: QueueDepths {
                warmup: self.warmup_queue.len(),
                batch: self.batch_queue.len(),
                resync: self.resync.lock().len(),
            },
            health: self.health.read().clone(),
            audit_records: self.audit.len(),
            tracked_keys: self.access.tracked_keys(),
            predictions: self.access.prediction_count(),
        }
    }

    /// Latest health report
    pub fn health(&self) -> HealthReport {
        self.health.read().clone()
    }

    /// Newest audit records first
    pub fn recent_audit(&self, limit: usize) -> Vec<AuditRecord> {
        self.audit.recent(limit)
    }

    /// Retained failed operations
    pub fn audit_failures(&self) -> Vec<AuditRecord> {
        self.audit.failures()
    }

    /// Predictions from the last analysis, soonest first
    pub fn predictions(&self) -> Vec<AccessPrediction> {
        self.access.predictions()
    }

    /// Deterministic key for a function call; see [`memoize::cache_key`]
    pub fn cache_key<I, D>(&self, prefix: &str, args: I) -> String
    where
        I: IntoIterator<Item = D>,
        D: std::fmt::Display,
    {
        memoize::cache_key(prefix, args)
    }

    pub fn is_remote_available(&self) -> bool {
        self.remote.as_ref().is_some_and(|r| r.is_available())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    pub fn remote(&self) -> Option<&RemoteStore> {
        self.remote.as_ref()
    }

    pub(crate) fn warmup_queue(&self) -> &WorkQueue<WarmupItem> {
        &self.warmup_queue
    }

    pub(crate) fn batch_queue(&self) -> &WorkQueue<BatchOp> {
        &self.batch_queue
    }

    // =========================================================================
    // Gates
    // =========================================================================

    fn available_remote(&self) -> Option<&RemoteStore> {
        self.remote.as_ref().filter(|r| r.is_available())
    }

    /// Key validation; rejections are counted and audited
    fn check_key(&self, op: &str, key: &str) -> bool {
        if !self.config.security_enabled {
            return true;
        }
        match self.validator.validate_key(key) {
            Ok(()) => true,
            Err(e) => {
                self.reject(op, key, &e);
                self.metrics.record_validation_failure();
                false
            }
        }
    }

    /// Serialized-size validation; accepted payloads feed the compression counters
    ///
    /// The limit applies before compression so a compressible value cannot
    /// slip past it and be inflated again on read.
    fn accept_encoded(&self, op: &str, key: &str, encoded: &Encoded) -> bool {
        if self.config.security_enabled {
            if let Err(e) = self.validator.validate_value_size(key, encoded.raw_len) {
                self.reject(op, key, &e);
                self.metrics.record_validation_failure();
                return false;
            }
        }
        self.metrics
            .record_encoding(encoded.raw_len, encoded.len(), encoded.is_compressed());
        true
    }

    fn admit(&self, op: Operation, key: &str) -> bool {
        if !self.config.rate_limit_enabled || self.rate_limiter.allow(op) {
            return true;
        }
        let err = Error::RateLimitExceeded(op.to_string());
        self.reject(op.as_str(), key, &err);
        self.metrics.record_rate_limited();
        false
    }

    /// Count a delete against its quota without ever refusing it
    fn meter_delete(&self, key: &str) -> bool {
        if !self.config.rate_limit_enabled || self.rate_limiter.allow(Operation::Delete) {
            return true;
        }
        warn!(key = %display_key(key), "Delete over quota, applied anyway");
        self.metrics.record_rate_limited();
        false
    }

    fn reject(&self, op: &str, key: &str, err: &Error) {
        warn!(op, key = %display_key(key), "Cache operation rejected: {}", err);
        self.audit.record(op, key, false, Some(err.to_string()));
    }

    fn encode<T: Serialize + ?Sized>(&self, op: &str, key: &str, value: &T) -> Result<Encoded> {
        self.codec.encode(value).map_err(|e| {
            self.metrics.record_serialization_error();
            self.reject(op, key, &e);
            e
        })
    }

    fn decode<T: DeserializeOwned>(&self, op: &str, key: &str, payload: &[u8]) -> Result<T> {
        self.codec.decode(payload).map_err(|e| {
            self.metrics.record_serialization_error();
            self.reject(op, key, &e);
            e
        })
    }
}

fn batch_label(n: usize) -> String {
    format!("[{} keys]", n)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::rate_limit::{RateLimit, RateLimits};
    use crate::cache::remote::InMemoryRemoteBackend;
    use assert_matches::assert_matches;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        id: u32,
        name: String,
    }

    fn local_manager() -> CacheManager {
        CacheManager::local_only(CacheConfig::default()).unwrap()
    }

    fn remote_manager() -> (Arc<InMemoryRemoteBackend>, CacheManager) {
        let backend = Arc::new(InMemoryRemoteBackend::new());
        let manager = CacheManager::with_backend(CacheConfig::default(), backend.clone()).unwrap();
        (backend, manager)
    }

    #[tokio::test]
    async fn test_local_only_roundtrip() {
        let cache = local_manager();
        let profile = Profile {
            id: 1,
            name: "Ada".into(),
        };

        cache.set("profile.1", &profile, None, None).await.unwrap();
        let got: Option<Profile> = cache.get("profile.1").await.unwrap();
        assert_eq!(got, Some(profile));

        let missing: Option<Profile> = cache.get("profile.2").await.unwrap();
        assert!(missing.is_none());

        let stats = cache.get_stats();
        assert_eq!(stats.metrics.local_hits, 1);
        assert_eq!(stats.metrics.misses, 1);
        assert!(!stats.remote_configured);
        assert!(!stats.remote_available);
    }

    #[tokio::test]
    async fn test_write_lands_in_both_tiers_and_remote_is_authoritative() {
        let (backend, cache) = remote_manager();
        cache.set("k", "v1", None, None).await.unwrap();

        assert!(backend.raw_get("k").is_some());
        assert!(cache.local().contains("k"));

        // Change only the remote copy; reads follow the remote store
        backend
            .set("k", cache.codec.encode("v2").unwrap().payload, Duration::ZERO)
            .await
            .unwrap();
        let got: Option<String> = cache.get("k").await.unwrap();
        assert_eq!(got.as_deref(), Some("v2"));
        assert_eq!(cache.get_stats().metrics.remote_hits, 1);
    }

    #[tokio::test]
    async fn test_remote_hit_is_not_copied_locally() {
        let (backend, cache) = remote_manager();
        backend
            .set("only.remote", cache.codec.encode(&7u32).unwrap().payload, Duration::ZERO)
            .await
            .unwrap();

        let got: Option<u32> = cache.get("only.remote").await.unwrap();
        assert_eq!(got, Some(7));
        assert!(!cache.local().contains("only.remote"));
    }

    #[tokio::test]
    async fn test_fallback_when_remote_fails() {
        let (backend, cache) = remote_manager();
        backend.set_failing(true);

        cache.set("k", &42u64, None, None).await.unwrap();
        assert!(!cache.is_remote_available());

        let got: Option<u64> = cache.get("k").await.unwrap();
        assert_eq!(got, Some(42));
        assert_eq!(cache.get_stats().metrics.local_hits, 1);
    }

    #[tokio::test]
    async fn test_health_check_restores_remote() {
        let (backend, cache) = remote_manager();
        backend.set_failing(true);
        cache.get::<u8>("k").await.unwrap();
        assert!(!cache.is_remote_available());

        let report = cache.run_health_check().await;
        assert_eq!(report.status, HealthStatus::Critical);

        backend.set_failing(false);
        let report = cache.run_health_check().await;
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(cache.is_remote_available());
        assert_eq!(cache.get_stats().remote_info.unwrap().backend, "memory");
    }

    #[tokio::test]
    async fn test_outage_writes_replayed_before_remote_trusted() {
        let (backend, cache) = remote_manager();
        cache.set("k", "v1", None, None).await.unwrap();
        cache.set("gone", "x", None, None).await.unwrap();
        cache.set("kept", "y", Some(Duration::from_secs(60)), None).await.unwrap();

        backend.set_failing(true);
        cache.set("k", "v2", None, None).await.unwrap();
        assert!(cache.delete("gone").await);
        assert_eq!(cache.get_stats().queues.resync, 2);

        // Still failing: the journal survives the failed check
        let report = cache.run_health_check().await;
        assert_eq!(report.status, HealthStatus::Critical);
        assert_eq!(cache.get_stats().queues.resync, 2);

        backend.set_failing(false);
        cache.run_health_check().await;
        assert!(cache.is_remote_available());
        assert_eq!(cache.get_stats().queues.resync, 0);

        assert_eq!(cache.get::<String>("k").await.unwrap().as_deref(), Some("v2"));
        assert!(cache.get::<String>("gone").await.unwrap().is_none());
        assert!(backend.raw_get("gone").is_none());
        assert_eq!(cache.get::<String>("kept").await.unwrap().as_deref(), Some("y"));
    }

    #[tokio::test]
    async fn test_outage_batch_and_clear_replayed() {
        let (backend, cache) = remote_manager();
        cache.set("old", &1, None, None).await.unwrap();

        backend.set_failing(true);
        cache.get::<i32>("old").await.unwrap();
        cache.clear().await;
        cache.batch_set(vec![("fresh", 2)], true).await.unwrap();
        assert!(backend.raw_get("old").is_some());

        backend.set_failing(false);
        cache.run_health_check().await;
        assert!(backend.raw_get("old").is_none());
        assert!(backend.raw_get("fresh").is_some());
        assert!(cache.get::<i32>("old").await.unwrap().is_none());
        assert_eq!(cache.get::<i32>("fresh").await.unwrap(), Some(2));
    }

    #[test]
    fn test_resync_journal_overflows_to_full_replay() {
        let mut resync = Resync::default();
        for i in 0..MAX_RESYNC_KEYS {
            resync.record(&format!("k{}", i));
        }
        assert!(!resync.overflowed);
        resync.record("k0");
        assert_eq!(resync.len(), MAX_RESYNC_KEYS);

        resync.record("one.more");
        assert!(resync.overflowed && resync.flush);
        assert_eq!(resync.len(), 0);
        assert!(!resync.is_empty());

        let mut current = Resync::default();
        current.record("newer");
        current.merge(resync);
        assert!(current.overflowed);
    }

    #[tokio::test]
    async fn test_full_local_store_stays_healthy() {
        let cache = CacheManager::local_only(CacheConfig {
            max_local_entries: 4,
            ..Default::default()
        })
        .unwrap();
        for i in 0..4 {
            cache.set(&format!("k{}", i), &i, None, None).await.unwrap();
        }
        cache.run_health_check().await;
        let local = cache.health().component("local").cloned().unwrap();
        assert_eq!(local.status, HealthStatus::Healthy);

        // Turning the whole store over between checks is thrashing
        for i in 4..8 {
            cache.set(&format!("k{}", i), &i, None, None).await.unwrap();
        }
        let report = cache.run_health_check().await;
        assert_eq!(report.component("local").unwrap().status, HealthStatus::Warning);

        let report = cache.run_health_check().await;
        assert_eq!(report.component("local").unwrap().status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_local_only_health_is_warning() {
        let cache = local_manager();
        let report = cache.run_health_check().await;
        assert_eq!(report.status, HealthStatus::Warning);
        assert_eq!(
            report.component("remote").unwrap().status,
            HealthStatus::Warning
        );
    }

    #[tokio::test]
    async fn test_invalid_key_fails_closed() {
        let cache = local_manager();
        cache.set("bad key", &1, None, None).await.unwrap();
        assert!(cache.local().is_empty());

        let got: Option<i32> = cache.get("bad key").await.unwrap();
        assert!(got.is_none());

        let failures = cache.audit_failures();
        assert_eq!(failures.len(), 2);
        assert!(failures.iter().all(|r| !r.success));
        assert_eq!(cache.get_stats().metrics.validation_failures, 2);
    }

    #[tokio::test]
    async fn test_security_disabled_accepts_any_key() {
        let cache = CacheManager::local_only(CacheConfig {
            security_enabled: false,
            ..Default::default()
        })
        .unwrap();
        cache.set("free form key", &1, None, None).await.unwrap();
        assert_eq!(cache.get::<i32>("free form key").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_oversized_value_rejected() {
        let cache = CacheManager::local_only(CacheConfig {
            max_value_bytes: 16,
            compression_threshold_bytes: 1 << 20,
            ..Default::default()
        })
        .unwrap();

        cache.set("big", &"x".repeat(64), None, None).await.unwrap();
        assert!(cache.get::<String>("big").await.unwrap().is_none());
        assert_eq!(cache.audit_failures()[0].operation, "set");
    }

    #[tokio::test]
    async fn test_compressible_oversized_value_rejected() {
        let cache = CacheManager::local_only(CacheConfig {
            max_value_bytes: 1000,
            compression_threshold_bytes: 64,
            ..Default::default()
        })
        .unwrap();
        let big = "a".repeat(50_000);
        assert!(cache.codec.encode(&big).unwrap().len() < 1000);

        cache.set("big", &big, None, None).await.unwrap();
        cache.warmup_cache("big.warm", &big, None, None).await.unwrap();
        assert_eq!(cache.batch_set(vec![("big.batch", &big)], true).await.unwrap(), 0);

        assert!(cache.local().is_empty());
        assert!(cache.get::<String>("big").await.unwrap().is_none());
        assert_eq!(cache.get_stats().metrics.validation_failures, 3);
        assert_eq!(cache.get_stats().metrics.compressed_writes, 0);
    }

    #[tokio::test]
    async fn test_serialization_errors_surface() {
        let cache = local_manager();

        let mut bad = HashMap::new();
        bad.insert((1, 2), "tuple keys are not JSON");
        let err = cache.set("k", &bad, None, None).await.unwrap_err();
        assert!(err.is_serialization());

        cache.set("k", "text", None, None).await.unwrap();
        let err = cache.get::<u64>("k").await.unwrap_err();
        assert_matches!(err, Error::Serialization(_));
        assert_eq!(cache.get_stats().metrics.serialization_errors, 2);
    }

    #[tokio::test]
    async fn test_rate_limit_fails_closed() {
        let limit = RateLimit::new(2, 60);
        let cache = CacheManager::local_only(CacheConfig {
            rate_limits: RateLimits {
                get: limit,
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap();
        cache.set("k", &1, None, None).await.unwrap();

        assert_eq!(cache.get::<i32>("k").await.unwrap(), Some(1));
        assert_eq!(cache.get::<i32>("k").await.unwrap(), Some(1));
        assert_eq!(cache.get::<i32>("k").await.unwrap(), None);
        assert_eq!(cache.get_stats().metrics.rate_limited, 1);
        assert!(cache.audit_failures()[0]
            .details
            .as_deref()
            .unwrap()
            .contains("Rate limit"));
    }

    #[tokio::test]
    async fn test_deletes_are_never_rate_limited() {
        let limit = RateLimit::new(1, 60);
        let cache = CacheManager::local_only(CacheConfig {
            rate_limits: RateLimits {
                delete: limit,
                batch: limit,
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap();
        for key in ["a", "b", "c", "d"] {
            cache.set(key, &1, None, None).await.unwrap();
        }

        assert!(cache.delete("a").await);
        assert!(cache.delete("b").await);
        assert!(cache.get::<i32>("b").await.unwrap().is_none());

        assert_eq!(cache.batch_delete(&["c"], true).await, 1);
        assert_eq!(cache.batch_delete(&["d"], true).await, 1);
        assert!(!cache.local().contains("d"));

        let stats = cache.get_stats();
        assert_eq!(stats.metrics.rate_limited, 3);
        assert!(cache.audit_failures().is_empty());
        let over = cache.recent_audit(10);
        assert!(over
            .iter()
            .any(|r| r.key == "b" && r.details.as_deref() == Some("over delete quota")));
    }

    #[tokio::test]
    async fn test_get_with_ttl_refreshes_local_expiry() {
        let cache = local_manager();
        cache
            .set("k", &1, Some(Duration::from_millis(50)), None)
            .await
            .unwrap();
        cache
            .get_with_ttl::<i32>("k", Some(Duration::from_secs(60)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(cache.get::<i32>("k").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_get_multi_merges_tiers() {
        let (backend, cache) = remote_manager();
        cache.set("a", &1, None, None).await.unwrap();
        backend.set_failing(true);
        cache.set("b", &2, None, None).await.unwrap();
        backend.set_failing(false);
        cache.run_health_check().await;

        let found: HashMap<String, i32> = cache
            .get_multi(&["a", "b", "c", "a", "bad key"])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found["a"], 1);
        assert_eq!(found["b"], 2);
    }

    #[tokio::test]
    async fn test_batch_sync_applies_before_return() {
        let (backend, cache) = remote_manager();
        let items: Vec<(String, u32)> = (0..5).map(|i| (format!("b{}", i), i)).collect();

        assert_eq!(cache.batch_set(items, true).await.unwrap(), 5);
        assert_eq!(cache.get::<u32>("b3").await.unwrap(), Some(3));
        assert!(backend.raw_get("b4").is_some());
        assert_eq!(cache.get_stats().queues.batch, 0);

        assert_eq!(cache.batch_delete(&["b0", "b1"], true).await, 2);
        assert!(cache.get::<u32>("b0").await.unwrap().is_none());
        assert!(backend.raw_get("b1").is_none());
    }

    #[tokio::test]
    async fn test_batch_last_operation_wins() {
        let cache = local_manager();
        cache
            .batch_set(vec![("k", 1), ("k", 2)], false)
            .await
            .unwrap();
        cache.batch_delete(&["k"], false).await;
        cache.batch_set(vec![("k", 3)], false).await.unwrap();

        assert_eq!(cache.flush_batch().await, 1);
        assert_eq!(cache.get::<i32>("k").await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_async_batch_waits_for_flush() {
        let cache = local_manager();
        cache.batch_set(vec![("k", 1)], false).await.unwrap();
        assert!(!cache.local().contains("k"));
        assert_eq!(cache.get_stats().queues.batch, 1);

        cache.flush_batch().await;
        assert!(cache.local().contains("k"));
    }

    #[tokio::test]
    async fn test_warmup_inline_when_disabled() {
        let cache = CacheManager::local_only(CacheConfig {
            warmup_enabled: false,
            ..Default::default()
        })
        .unwrap();
        cache.warmup_cache("w", &"seed", None, None).await.unwrap();
        assert_eq!(cache.get::<String>("w").await.unwrap().as_deref(), Some("seed"));
        assert_eq!(cache.get_stats().metrics.warmup_processed, 1);
    }

    #[tokio::test]
    async fn test_get_keys_unions_tiers() {
        let (backend, cache) = remote_manager();
        cache.set("user.1", &1, None, None).await.unwrap();
        backend
            .set("user.2", Bytes::from_static(b"\x001"), Duration::ZERO)
            .await
            .unwrap();
        cache.local().set("user.3", Bytes::from_static(b"\x001"), Duration::ZERO, None);
        cache.set("order.1", &1, None, None).await.unwrap();

        assert_eq!(cache.get_keys("user.*").await, vec!["user.1", "user.2", "user.3"]);
        assert_eq!(cache.get_keys("*").await.len(), 4);

        // Brackets are literal in both tiers
        assert!(cache.get_keys("user.[12]").await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let (backend, cache) = remote_manager();
        cache.set("a", &1, None, None).await.unwrap();
        cache.set("b", &2, None, None).await.unwrap();

        assert!(cache.delete("a").await);
        assert!(!cache.delete("a").await);
        assert!(backend.raw_get("a").is_none());

        cache.clear().await;
        assert!(cache.local().is_empty());
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_compression_counters_in_stats() {
        let cache = CacheManager::local_only(CacheConfig {
            compression_threshold_bytes: 32,
            ..Default::default()
        })
        .unwrap();
        let text = "compressible ".repeat(100);
        cache.set("doc", &text, None, None).await.unwrap();

        let stats = cache.get_stats();
        assert_eq!(stats.metrics.compressed_writes, 1);
        assert!(stats.metrics.bytes_after_compression < stats.metrics.bytes_before_compression);
        assert!(stats.local.size_bytes < text.len());
        assert_eq!(cache.get::<String>("doc").await.unwrap(), Some(text));
    }

    #[tokio::test]
    async fn test_access_tracking_and_predictions() {
        let cache = local_manager();
        cache.set("hot", &1, None, None).await.unwrap();
        for _ in 0..4 {
            cache.get::<i32>("hot").await.unwrap();
        }
        cache.get::<i32>("cold").await.unwrap();

        assert_eq!(cache.run_prediction(), 1);
        assert_eq!(cache.predictions()[0].key, "hot");
        assert_eq!(cache.get_stats().tracked_keys, 1);
    }

    #[tokio::test]
    async fn test_runtime_strategy_switch() {
        let cache = CacheManager::local_only(CacheConfig {
            max_local_entries: 2,
            ..Default::default()
        })
        .unwrap();
        cache.set_eviction_strategy(EvictionStrategy::Fifo);
        cache.set("a", &1, None, None).await.unwrap();
        cache.set("b", &2, None, None).await.unwrap();
        cache.get::<i32>("a").await.unwrap();
        cache.set("c", &3, None, None).await.unwrap();

        assert!(!cache.local().contains("a"));
        assert_eq!(cache.get_stats().local.strategy, EvictionStrategy::Fifo);
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let cache = Arc::new(local_manager());
        cache.start();
        cache.start();
        assert!(cache.is_running());

        cache.batch_set(vec![("q", 1)], false).await.unwrap();
        cache.shutdown().await;
        assert!(!cache.is_running());
        assert!(cache.local().contains("q"));

        cache.start();
        assert!(!cache.is_running());

        // No worker is left to drain queues
        cache.batch_set(vec![("after", 2)], false).await.unwrap();
        cache.warmup_cache("warm.after", &3, None, None).await.unwrap();
        assert!(cache.local().contains("after"));
        assert!(cache.local().contains("warm.after"));
        assert_eq!(cache.get_stats().queues.batch, 0);
        assert_eq!(cache.get_stats().queues.warmup, 0);
    }

    #[test]
    fn test_cache_key_helper() {
        let cache = local_manager();
        let a = cache.cache_key("reports.build", [1, 2]);
        let b = cache.cache_key("reports.build", [1, 2]);
        assert_eq!(a, b);
        assert!(a.starts_with("reports.build."));
    }
}
