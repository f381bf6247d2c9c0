//! Remote Store - Shared Network Cache Tier
//!
//! The remote tier is reached through a pluggable [`RemoteBackend`]. Redis is
//! the production backend; [`InMemoryRemoteBackend`] stands in for it in tests
//! and can be told to fail on demand.
//!
//! # Design
//!
//! - [`RemoteStore`] bounds every backend call with a timeout
//! - Any failure marks the store unavailable; the hot path then skips it
//! - Only the health checker can mark the store available again, after
//!   [`RemoteStore::ping`] succeeds and outage writes are reconciled
//! - Errors never leave this module; callers see a miss or `false`

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use deadpool_redis::{Pool, PoolConfig, Runtime};
use redis::AsyncCommands;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::validator::KeyPattern;
use crate::error::{Error, Result};

/// A remote write: key, payload, TTL (zero = no expiry)
pub type RemoteWrite = (String, Bytes, Duration);

/// Server-side facts reported by the remote backend
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RemoteInfo {
    /// Backend kind
    pub backend: String,
    /// Number of keys in the selected database
    pub key_count: u64,
}

// =============================================================================
// Backend Trait
// =============================================================================

/// Remote storage backend trait
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Backend name for logs and stats
    fn name(&self) -> &'static str;

    /// Get a payload
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Store a payload (zero TTL = no expiry)
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()>;

    /// Delete a key, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Fetch several payloads in one round-trip, aligned with `keys`
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Bytes>>>;

    /// Store several payloads in one round-trip
    async fn set_many(&self, items: &[RemoteWrite]) -> Result<()>;

    /// Delete several keys in one round-trip
    async fn delete_many(&self, keys: &[String]) -> Result<u64>;

    /// Reset a key's expiry, returning whether the key exists
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Keys matching a glob pattern
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Remove every key
    async fn flush(&self) -> Result<()>;

    /// Liveness check
    async fn ping(&self) -> Result<()>;

    /// Server-side statistics
    async fn info(&self) -> Result<RemoteInfo>;
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

// =============================================================================
// Redis Backend
// =============================================================================

/// Connection settings for [`RedisBackend`]
#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub url: String,
    pub pool_size: usize,
    /// Wait/create/recycle timeout for pooled connections
    pub pool_timeout: Duration,
}

/// Redis backend over a deadpool connection pool
pub struct RedisBackend {
    pool: Pool,
}

impl RedisBackend {
    /// Build the pool; no connection is made until first use
    pub fn connect(settings: &RedisSettings) -> Result<Self> {
        let mut config = deadpool_redis::Config::from_url(&settings.url);
        let mut pool_config = PoolConfig::new(settings.pool_size.max(1));
        pool_config.timeouts.wait = Some(settings.pool_timeout);
        pool_config.timeouts.create = Some(settings.pool_timeout);
        pool_config.timeouts.recycle = Some(settings.pool_timeout);
        config.pool = Some(pool_config);

        let pool = config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| Error::Config(format!("failed to create Redis pool: {}", e)))?;

        info!(pool_size = settings.pool_size, "Redis connection pool created");
        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| Error::RemoteUnavailable(e.to_string()))
    }
}

#[async_trait]
impl RemoteBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let mut conn = self.conn().await?;
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        let mut conn = self.conn().await?;
        if ttl.is_zero() {
            let _: () = conn.set(key, value.as_ref()).await?;
        } else {
            let _: () = conn.pset_ex(key, value.as_ref(), ttl_millis(ttl)).await?;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        let removed: u64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Bytes>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn().await?;
        let values: Vec<Option<Vec<u8>>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await?;
        Ok(values.into_iter().map(|v| v.map(Bytes::from)).collect())
    }

    async fn set_many(&self, items: &[RemoteWrite]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        for (key, value, ttl) in items {
            if ttl.is_zero() {
                pipe.set(key, value.as_ref()).ignore();
            } else {
                pipe.pset_ex(key, value.as_ref(), ttl_millis(*ttl)).ignore();
            }
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        let removed: u64 = conn.del(keys).await?;
        Ok(removed)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn().await?;
        let updated: bool = if ttl.is_zero() {
            conn.persist(key).await?
        } else {
            conn.pexpire(key, ttl_millis(ttl) as i64).await?
        };
        // PERSIST answers false for a key without expiry; check existence instead
        if ttl.is_zero() && !updated {
            return Ok(conn.exists(key).await?);
        }
        Ok(updated)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        let mut iter: redis::AsyncIter<'_, String> = conn.scan_match(pattern).await?;
        let mut keys = Vec::new();
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        Ok(keys)
    }

    async fn flush(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn info(&self) -> Result<RemoteInfo> {
        let mut conn = self.conn().await?;
        let key_count: u64 = redis::cmd("DBSIZE").query_async(&mut conn).await?;
        Ok(RemoteInfo {
            backend: self.name().to_string(),
            key_count,
        })
    }
}

// =============================================================================
// In-Memory Backend
// =============================================================================

/// In-memory remote backend for testing
///
/// Honours TTLs, and can be switched into a failing mode or given an
/// artificial latency to exercise the fallback paths.
#[derive(Default)]
pub struct InMemoryRemoteBackend {
    storage: DashMap<String, (Bytes, Option<Instant>)>,
    failing: AtomicBool,
    latency_ms: AtomicU64,
    calls: AtomicU64,
}

impl InMemoryRemoteBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every subsequent call
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of backend calls made so far
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.storage
            .iter()
            .filter(|e| e.value().1.map_or(true, |d| d > now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read a payload directly, bypassing failure injection
    pub fn raw_get(&self, key: &str) -> Option<Bytes> {
        self.read(key)
    }

    async fn enter(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::RemoteUnavailable("injected failure".into()));
        }
        Ok(())
    }

    fn deadline(ttl: Duration) -> Option<Instant> {
        (!ttl.is_zero()).then(|| Instant::now() + ttl)
    }

    fn read(&self, key: &str) -> Option<Bytes> {
        {
            let entry = self.storage.get(key)?;
            let (value, deadline) = entry.value();
            if deadline.map_or(true, |d| d > Instant::now()) {
                return Some(value.clone());
            }
        }
        self.storage
            .remove_if(key, |_, (_, deadline)| deadline.is_some_and(|d| d <= Instant::now()));
        None
    }
}

#[async_trait]
impl RemoteBackend for InMemoryRemoteBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.enter().await?;
        Ok(self.read(key))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        self.enter().await?;
        self.storage
            .insert(key.to_string(), (value, Self::deadline(ttl)));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.enter().await?;
        Ok(self.storage.remove(key).is_some())
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Bytes>>> {
        self.enter().await?;
        Ok(keys.iter().map(|k| self.read(k)).collect())
    }

    async fn set_many(&self, items: &[RemoteWrite]) -> Result<()> {
        self.enter().await?;
        for (key, value, ttl) in items {
            self.storage
                .insert(key.clone(), (value.clone(), Self::deadline(*ttl)));
        }
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64> {
        self.enter().await?;
        Ok(keys
            .iter()
            .filter(|k| self.storage.remove(k.as_str()).is_some())
            .count() as u64)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.enter().await?;
        if self.read(key).is_none() {
            return Ok(false);
        }
        match self.storage.get_mut(key) {
            Some(mut entry) => {
                entry.value_mut().1 = Self::deadline(ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.enter().await?;
        let pattern = KeyPattern::new(pattern)?;
        let now = Instant::now();
        Ok(self
            .storage
            .iter()
            .filter(|e| e.value().1.map_or(true, |d| d > now))
            .filter(|e| pattern.matches(e.key()))
            .map(|e| e.key().clone())
            .collect())
    }

    async fn flush(&self) -> Result<()> {
        self.enter().await?;
        self.storage.clear();
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.enter().await
    }

    async fn info(&self) -> Result<RemoteInfo> {
        self.enter().await?;
        Ok(RemoteInfo {
            backend: self.name().to_string(),
            key_count: self.len() as u64,
        })
    }
}

// =============================================================================
// Remote Store Adapter
// =============================================================================

/// Availability-tracking wrapper around a [`RemoteBackend`]
pub struct RemoteStore {
    backend: Arc<dyn RemoteBackend>,
    available: AtomicBool,
    timeout: Duration,
    errors: AtomicU64,
    timeouts: AtomicU64,
}

impl RemoteStore {
    /// Wrap a backend; the store starts out available
    pub fn new(backend: Arc<dyn RemoteBackend>, timeout: Duration) -> Self {
        Self {
            backend,
            available: AtomicBool::new(true),
            timeout,
            errors: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    fn mark_unavailable(&self, op: &'static str, reason: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        if self.available.swap(false, Ordering::AcqRel) {
            warn!(
                op,
                backend = self.backend.name(),
                "Remote store unavailable, falling back to local: {}",
                reason
            );
        } else {
            debug!(op, "Remote call failed while unavailable: {}", reason);
        }
    }

    /// Run a backend call under the timeout, absorbing failures
    async fn call<T, F>(&self, op: &'static str, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                self.mark_unavailable(op, &e.to_string());
                None
            }
            Err(_) => {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
                let err = Error::RemoteUnavailable(format!("timed out after {:?}", self.timeout));
                self.mark_unavailable(op, &err.to_string());
                None
            }
        }
    }

    /// Hot-path guard: skip the backend entirely while unavailable
    async fn guarded<T, F>(&self, op: &'static str, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        if !self.is_available() {
            return None;
        }
        self.call(op, fut).await
    }

    pub async fn get(&self, key: &str) -> Option<Bytes> {
        self.guarded("get", self.backend.get(key)).await.flatten()
    }

    pub async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> bool {
        self.guarded("set", self.backend.set(key, value, ttl))
            .await
            .is_some()
    }

    /// Delete a key; `None` when the backend was not reached
    pub async fn delete(&self, key: &str) -> Option<bool> {
        self.guarded("delete", self.backend.delete(key)).await
    }

    /// Fetch several keys; only hits are returned
    pub async fn get_many(&self, keys: &[String]) -> HashMap<String, Bytes> {
        if keys.is_empty() {
            return HashMap::new();
        }
        let values = self
            .guarded("get_many", self.backend.get_many(keys))
            .await
            .unwrap_or_default();
        keys.iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|v| (key.clone(), v)))
            .collect()
    }

    pub async fn set_many(&self, items: &[RemoteWrite]) -> bool {
        if items.is_empty() {
            return true;
        }
        self.guarded("set_many", self.backend.set_many(items))
            .await
            .is_some()
    }

    pub async fn delete_many(&self, keys: &[String]) -> bool {
        if keys.is_empty() {
            return true;
        }
        self.guarded("delete_many", self.backend.delete_many(keys))
            .await
            .is_some()
    }

    pub async fn expire(&self, key: &str, ttl: Duration) -> bool {
        self.guarded("expire", self.backend.expire(key, ttl))
            .await
            .unwrap_or(false)
    }

    pub async fn keys(&self, pattern: &str) -> Vec<String> {
        self.guarded("keys", self.backend.keys(pattern))
            .await
            .unwrap_or_default()
    }

    pub async fn flush(&self) -> bool {
        self.guarded("flush", self.backend.flush()).await.is_some()
    }

    pub async fn info(&self) -> Option<RemoteInfo> {
        self.guarded("info", self.backend.info()).await
    }

    /// Ping the backend regardless of availability
    ///
    /// Does not restore availability; see [`RemoteStore::restore`].
    pub async fn ping(&self) -> bool {
        self.call("ping", self.backend.ping()).await.is_some()
    }

    /// Mark the store available again
    pub fn restore(&self) {
        if !self.available.swap(true, Ordering::AcqRel) {
            info!(backend = self.backend.name(), "Remote store is reachable again");
        }
    }

    /// Replay local changes made while unavailable, regardless of availability
    ///
    /// Flushes first when `flush` is set, then writes and deletes. Stops at
    /// the first failing call.
    pub async fn reconcile(&self, flush: bool, writes: &[RemoteWrite], deletes: &[String]) -> bool {
        if flush && self.call("flush", self.backend.flush()).await.is_none() {
            return false;
        }
        if !writes.is_empty() && self.call("set_many", self.backend.set_many(writes)).await.is_none()
        {
            return false;
        }
        if !deletes.is_empty()
            && self
                .call("delete_many", self.backend.delete_many(deletes))
                .await
                .is_none()
        {
            return false;
        }
        debug!(
            flush,
            writes = writes.len(),
            deletes = deletes.len(),
            "Remote store reconciled"
        );
        true
    }

    /// Get adapter statistics
    pub fn stats(&self) -> RemoteStats {
        RemoteStats {
            backend: self.backend.name(),
            available: self.is_available(),
            errors: self.errors(),
            timeouts: self.timeouts(),
        }
    }
}

/// Remote adapter statistics
#[derive(Debug, Clone, Serialize)]
pub struct RemoteStats {
    pub backend: &'static str,
    pub available: bool,
    pub errors: u64,
    pub timeouts: u64,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    fn store() -> (Arc<InMemoryRemoteBackend>, RemoteStore) {
        let backend = Arc::new(InMemoryRemoteBackend::new());
        let store = RemoteStore::new(backend.clone(), Duration::from_millis(200));
        (backend, store)
    }

    #[tokio::test]
    async fn test_basic_operations() {
        let (_, remote) = store();

        assert!(remote.set("a", Bytes::from_static(b"1"), TTL).await);
        assert_eq!(remote.get("a").await.unwrap().as_ref(), b"1");
        assert_eq!(remote.delete("a").await, Some(true));
        assert_eq!(remote.delete("a").await, Some(false));
        assert!(remote.get("a").await.is_none());
        assert!(remote.is_available());
    }

    #[tokio::test]
    async fn test_failure_marks_unavailable_and_skips_backend() {
        let (backend, remote) = store();
        backend.set_failing(true);

        assert!(remote.get("a").await.is_none());
        assert!(!remote.is_available());
        assert_eq!(remote.errors(), 1);

        let calls = backend.calls();
        backend.set_failing(false);
        assert!(!remote.set("a", Bytes::from_static(b"1"), TTL).await);
        assert_eq!(remote.delete("a").await, None);
        assert_eq!(backend.calls(), calls);
    }

    #[tokio::test]
    async fn test_ping_then_restore() {
        let (backend, remote) = store();
        backend.set_failing(true);
        remote.get("a").await;
        assert!(!remote.ping().await);
        assert!(!remote.is_available());

        backend.set_failing(false);
        assert!(remote.ping().await);
        assert!(!remote.is_available(), "ping alone does not restore");
        remote.restore();
        assert!(remote.is_available());
    }

    #[tokio::test]
    async fn test_reconcile_bypasses_availability() {
        let (backend, remote) = store();
        remote.set("stale", Bytes::from_static(b"0"), TTL).await;
        remote.set("gone", Bytes::from_static(b"0"), TTL).await;
        backend.set_failing(true);
        remote.get("stale").await;
        assert!(!remote.is_available());

        let writes = vec![("stale".to_string(), Bytes::from_static(b"1"), TTL)];
        let deletes = vec!["gone".to_string()];
        assert!(!remote.reconcile(false, &writes, &deletes).await);

        backend.set_failing(false);
        assert!(remote.ping().await);
        assert!(!remote.is_available());
        assert!(remote.reconcile(false, &writes, &deletes).await);
        assert_eq!(backend.raw_get("stale").unwrap().as_ref(), b"1");
        assert!(backend.raw_get("gone").is_none());

        remote.restore();
        assert!(remote.is_available());
    }

    #[tokio::test]
    async fn test_timeout_counts_as_unavailable() {
        let backend = Arc::new(InMemoryRemoteBackend::new());
        backend.set_latency(Duration::from_millis(100));
        let remote = RemoteStore::new(backend, Duration::from_millis(10));

        assert!(remote.get("a").await.is_none());
        assert!(!remote.is_available());
        assert_eq!(remote.timeouts(), 1);
    }

    #[tokio::test]
    async fn test_batch_operations() {
        let (backend, remote) = store();
        let items = vec![
            ("a".to_string(), Bytes::from_static(b"1"), TTL),
            ("b".to_string(), Bytes::from_static(b"2"), Duration::ZERO),
        ];
        assert!(remote.set_many(&items).await);

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let found = remote.get_many(&keys).await;
        assert_eq!(found.len(), 2);
        assert_eq!(found["b"].as_ref(), b"2");

        assert!(remote.delete_many(&keys[..1]).await);
        assert!(backend.raw_get("a").is_none());
        assert!(backend.raw_get("b").is_some());
    }

    #[tokio::test]
    async fn test_ttl_expiry_and_expire() {
        let (_, remote) = store();
        remote
            .set("short", Bytes::from_static(b"1"), Duration::from_millis(20))
            .await;
        assert!(remote.expire("short", TTL).await);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(remote.get("short").await.is_some());

        remote
            .set("gone", Bytes::from_static(b"1"), Duration::from_millis(10))
            .await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(remote.get("gone").await.is_none());
        assert!(!remote.expire("gone", TTL).await);
    }

    #[tokio::test]
    async fn test_keys_flush_and_info() {
        let (_, remote) = store();
        for key in ["user.1", "user.2", "order.1"] {
            remote.set(key, Bytes::from_static(b"x"), TTL).await;
        }

        let mut keys = remote.keys("user.*").await;
        keys.sort();
        assert_eq!(keys, vec!["user.1", "user.2"]);

        let info = remote.info().await.unwrap();
        assert_eq!(info.key_count, 3);
        assert_eq!(info.backend, "memory");

        assert!(remote.flush().await);
        assert!(remote.keys("*").await.is_empty());
    }
}
