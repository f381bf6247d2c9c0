//! Local Store - In-process Fallback Cache
//!
//! Bounded map of encoded payloads, used when the remote store misses or is
//! unreachable.
//!
//! # Design
//!
//! - One coarse mutex guards the map; no lock is held across an await
//! - Entry-count capacity with strategy-driven eviction on insert
//! - Lazy expiry on read plus an explicit sweep (`purge_expired`)

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use super::entry::CacheEntry;
use super::policy::EvictionStrategy;
use crate::error::Error;

struct Inner {
    entries: HashMap<String, CacheEntry>,
    strategy: EvictionStrategy,
    /// Logical clock for insert/access ordering
    seq: u64,
    size_bytes: usize,
}

impl Inner {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let removed = self.entries.remove(key)?;
        self.size_bytes = self.size_bytes.saturating_sub(removed.size_bytes());
        Some(removed)
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired_at(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    /// Evict until at most `target` entries remain
    fn evict_to(&mut self, target: usize) -> usize {
        let excess = self.entries.len().saturating_sub(target);
        if excess == 0 {
            return 0;
        }
        let victims = self.strategy.select_victims(&self.entries, excess);
        for key in &victims {
            self.remove(key);
        }
        victims.len()
    }
}

/// In-process cache tier
pub struct LocalStore {
    inner: Mutex<Inner>,
    max_entries: usize,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl LocalStore {
    /// Create a store holding at most `max_entries` keys
    pub fn new(max_entries: usize, strategy: EvictionStrategy) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                strategy,
                seq: 0,
                size_bytes: 0,
            }),
            max_entries,
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Read a payload, counting the hit on the entry
    ///
    /// Expired entries are removed and reported as a miss without touching
    /// their counters.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let mut inner = self.inner.lock();
        let expired = inner.entries.get(key)?.is_expired();
        if expired {
            inner.remove(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let seq = inner.next_seq();
        let entry = inner.entries.get_mut(key)?;
        entry.record_hit(seq);
        Some(entry.value().clone())
    }

    /// Snapshot an entry without recording an access
    pub fn peek(&self, key: &str) -> Option<CacheEntry> {
        let inner = self.inner.lock();
        inner.entries.get(key).filter(|e| !e.is_expired()).cloned()
    }

    /// Insert or overwrite a payload
    ///
    /// A new key arriving at capacity first drops expired entries, then
    /// evicts by the current strategy. Returns false when nothing can be
    /// retained (`max_entries == 0`).
    pub fn set(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
        metadata: Option<serde_json::Value>,
    ) -> bool {
        if self.max_entries == 0 {
            let err = Error::CapacityExceeded { capacity: 0 };
            warn!(key, "Local store cannot retain entry: {}", err);
            return false;
        }

        let mut inner = self.inner.lock();
        if !inner.entries.contains_key(key) && inner.entries.len() + 1 > self.max_entries {
            let purged = inner.purge_expired(Instant::now());
            self.expirations.fetch_add(purged as u64, Ordering::Relaxed);

            let evicted = inner.evict_to(self.max_entries - 1);
            if evicted > 0 {
                self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
                debug!(evicted, strategy = %inner.strategy, "Evicted local entries");
            }
        }

        let seq = inner.next_seq();
        let entry = CacheEntry::new(value, ttl, metadata, seq);
        inner.size_bytes += entry.size_bytes();
        if let Some(old) = inner.entries.insert(key.to_string(), entry) {
            inner.size_bytes = inner.size_bytes.saturating_sub(old.size_bytes());
        }
        true
    }

    /// Remove a key, returning whether it was present
    pub fn delete(&self, key: &str) -> bool {
        self.inner.lock().remove(key).is_some()
    }

    /// Restart the expiry clock of a live entry
    pub fn touch(&self, key: &str, ttl: Duration) -> bool {
        let mut inner = self.inner.lock();
        match inner.entries.get_mut(key) {
            Some(entry) if !entry.is_expired() => {
                entry.refresh(ttl);
                true
            }
            _ => false,
        }
    }

    /// Check for a live key
    pub fn contains(&self, key: &str) -> bool {
        let inner = self.inner.lock();
        inner.entries.get(key).is_some_and(|e| !e.is_expired())
    }

    /// Live keys (unordered)
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let inner = self.inner.lock();
        inner
            .entries
            .iter()
            .filter(|(_, e)| !e.is_expired_at(now))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Evict down to capacity, returning the number of victims
    pub fn evict_if_over_capacity(&self) -> usize {
        let mut inner = self.inner.lock();
        let evicted = inner.evict_to(self.max_entries);
        self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        evicted
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let purged = self.inner.lock().purge_expired(Instant::now());
        self.expirations.fetch_add(purged as u64, Ordering::Relaxed);
        purged
    }

    /// Remove everything
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.size_bytes = 0;
    }

    /// Number of stored entries (including not-yet-swept expired ones)
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total payload bytes held
    pub fn size_bytes(&self) -> usize {
        self.inner.lock().size_bytes
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    /// Occupancy in 0.0 - 1.0 (a zero-capacity store counts as full)
    pub fn utilization(&self) -> f64 {
        if self.max_entries == 0 {
            return 1.0;
        }
        self.len() as f64 / self.max_entries as f64
    }

    pub fn strategy(&self) -> EvictionStrategy {
        self.inner.lock().strategy
    }

    /// Switch the eviction strategy; takes effect on the next eviction
    pub fn set_strategy(&self, strategy: EvictionStrategy) {
        self.inner.lock().strategy = strategy;
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    /// Get store statistics
    pub fn stats(&self) -> LocalStats {
        let inner = self.inner.lock();
        let entries = inner.entries.len();
        LocalStats {
            entries,
            max_entries: self.max_entries,
            size_bytes: inner.size_bytes,
            utilization: if self.max_entries == 0 {
                1.0
            } else {
                entries as f64 / self.max_entries as f64
            },
            strategy: inner.strategy,
            evictions: self.evictions(),
            expirations: self.expirations(),
        }
    }
}

/// Local store statistics
#[derive(Debug, Clone, Serialize)]
pub struct LocalStats {
    pub entries: usize,
    pub max_entries: usize,
    pub size_bytes: usize,
    /// Occupancy (0.0 - 1.0)
    pub utilization: f64,
    pub strategy: EvictionStrategy,
    pub evictions: u64,
    pub expirations: u64,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(300);

    fn payload(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    fn store(max: usize, strategy: EvictionStrategy) -> LocalStore {
        LocalStore::new(max, strategy)
    }

    #[test]
    fn test_set_get() {
        let local = store(10, EvictionStrategy::Lru);
        assert!(local.set("a", payload("one"), TTL, None));

        assert_eq!(local.get("a").unwrap().as_ref(), b"one");
        assert_eq!(local.len(), 1);
        assert_eq!(local.size_bytes(), 3);
        assert!(local.get("missing").is_none());
    }

    #[test]
    fn test_overwrite_updates_size_and_never_evicts() {
        let local = store(2, EvictionStrategy::Fifo);
        local.set("a", payload("1"), TTL, None);
        local.set("b", payload("22"), TTL, None);
        local.set("a", payload("4444"), TTL, None);

        assert_eq!(local.len(), 2);
        assert_eq!(local.size_bytes(), 6);
        assert_eq!(local.evictions(), 0);
        assert!(local.contains("b"));
    }

    #[test]
    fn test_capacity_bound_holds() {
        let local = store(5, EvictionStrategy::Lru);
        for i in 0..50 {
            local.set(&format!("k{}", i), payload("v"), TTL, None);
            assert!(local.len() <= 5);
        }
        assert_eq!(local.evictions(), 45);
    }

    #[test]
    fn test_lru_eviction_keeps_recently_read() {
        let local = store(3, EvictionStrategy::Lru);
        local.set("a", payload("1"), TTL, None);
        local.set("b", payload("2"), TTL, None);
        local.set("c", payload("3"), TTL, None);
        local.get("a");
        local.set("d", payload("4"), TTL, None);

        assert!(local.contains("a"));
        assert!(!local.contains("b"));
        assert!(local.contains("c"));
        assert!(local.contains("d"));
    }

    #[test]
    fn test_lfu_eviction_drops_least_read() {
        let local = store(3, EvictionStrategy::Lfu);
        local.set("a", payload("1"), TTL, None);
        local.set("b", payload("2"), TTL, None);
        local.set("c", payload("3"), TTL, None);
        for _ in 0..3 {
            local.get("a");
            local.get("c");
        }
        local.get("b");
        local.set("d", payload("4"), TTL, None);

        assert!(!local.contains("b"));
        assert_eq!(local.len(), 3);
    }

    #[test]
    fn test_fifo_eviction_ignores_reads() {
        let local = store(3, EvictionStrategy::Fifo);
        for key in ["a", "b", "c"] {
            local.set(key, payload(key), TTL, None);
        }
        local.get("a");
        local.set("d", payload("d"), TTL, None);

        let mut keys = local.keys();
        keys.sort();
        assert_eq!(keys, vec!["b", "c", "d"]);
    }

    #[test]
    fn test_expired_entries_purged_before_eviction() {
        let local = store(2, EvictionStrategy::Lru);
        local.set("old", payload("1"), Duration::from_millis(1), None);
        local.set("keep", payload("2"), TTL, None);
        std::thread::sleep(Duration::from_millis(10));

        local.set("new", payload("3"), TTL, None);
        assert!(local.contains("keep"));
        assert!(local.contains("new"));
        assert_eq!(local.evictions(), 0);
        assert_eq!(local.expirations(), 1);
    }

    #[test]
    fn test_lazy_expiry_on_get() {
        let local = store(10, EvictionStrategy::Lru);
        local.set("a", payload("1"), Duration::from_millis(1), None);
        std::thread::sleep(Duration::from_millis(10));

        assert!(local.get("a").is_none());
        assert_eq!(local.len(), 0);
        assert_eq!(local.expirations(), 1);
    }

    #[test]
    fn test_zero_capacity_retains_nothing() {
        let local = store(0, EvictionStrategy::Lru);
        assert!(!local.set("a", payload("1"), TTL, None));
        assert!(local.is_empty());
        assert_eq!(local.utilization(), 1.0);
    }

    #[test]
    fn test_touch_extends_life() {
        let local = store(10, EvictionStrategy::Lru);
        local.set("a", payload("1"), Duration::from_millis(30), None);
        assert!(local.touch("a", TTL));
        std::thread::sleep(Duration::from_millis(50));

        assert!(local.get("a").is_some());
        assert!(!local.touch("missing", TTL));
    }

    #[test]
    fn test_peek_does_not_count_hits() {
        let local = store(10, EvictionStrategy::Lfu);
        local.set("a", payload("1"), TTL, Some(serde_json::json!({"owner": "report"})));
        local.get("a");
        local.peek("a");

        let entry = local.peek("a").unwrap();
        assert_eq!(entry.hit_count(), 1);
        assert_eq!(entry.metadata().unwrap()["owner"], "report");
    }

    #[test]
    fn test_strategy_switch_and_manual_eviction() {
        let local = store(4, EvictionStrategy::Lru);
        for key in ["a", "b", "c", "d"] {
            local.set(key, payload(key), TTL, None);
        }
        local.set_strategy(EvictionStrategy::Random);
        assert_eq!(local.strategy(), EvictionStrategy::Random);
        assert_eq!(local.evict_if_over_capacity(), 0);

        local.set("e", payload("e"), TTL, None);
        assert_eq!(local.len(), 4);
    }

    #[test]
    fn test_delete_and_clear() {
        let local = store(10, EvictionStrategy::Lru);
        local.set("a", payload("1"), TTL, None);
        local.set("b", payload("2"), TTL, None);

        assert!(local.delete("a"));
        assert!(!local.delete("a"));
        assert_eq!(local.size_bytes(), 1);

        local.clear();
        assert!(local.is_empty());
        assert_eq!(local.size_bytes(), 0);
    }

    #[test]
    fn test_stats() {
        let local = store(4, EvictionStrategy::Fifo);
        local.set("a", payload("12"), TTL, None);
        local.set("b", payload("34"), TTL, None);

        let stats = local.stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.size_bytes, 4);
        assert_eq!(stats.utilization, 0.5);
        assert_eq!(stats.strategy, EvictionStrategy::Fifo);
    }
}
