//! Cache Entry Types
//!
//! A [`CacheEntry`] is one live key in the local store. Recency and insertion
//! order are tracked twice: as wall-clock `Instant`s for reporting and as
//! store-local sequence numbers so that victim ordering never depends on
//! clock resolution.

use std::time::{Duration, Instant};

use bytes::Bytes;

/// An encoded value held by the local store
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Encoded payload (codec header + body)
    value: Bytes,
    /// Time of insert or last overwrite
    created_at: Instant,
    /// Relative expiry (zero = no expiry)
    ttl: Duration,
    /// Successful reads since insert
    hit_count: u64,
    /// Time of the last successful read
    last_accessed_at: Option<Instant>,
    /// Opaque caller metadata
    metadata: Option<serde_json::Value>,
    /// Store sequence number at insert
    insert_seq: u64,
    /// Store sequence number at insert or last read
    access_seq: u64,
}

impl CacheEntry {
    /// Create a new entry stamped with sequence number `seq`
    pub fn new(
        value: Bytes,
        ttl: Duration,
        metadata: Option<serde_json::Value>,
        seq: u64,
    ) -> Self {
        Self {
            value,
            created_at: Instant::now(),
            ttl,
            hit_count: 0,
            last_accessed_at: None,
            metadata,
            insert_seq: seq,
            access_seq: seq,
        }
    }

    /// Get the payload (cheap clone)
    #[inline]
    pub fn value(&self) -> &Bytes {
        &self.value
    }

    /// Payload size in bytes
    #[inline]
    pub fn size_bytes(&self) -> usize {
        self.value.len()
    }

    #[inline]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[inline]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    #[inline]
    pub fn hit_count(&self) -> u64 {
        self.hit_count
    }

    /// Last read time, falling back to creation time
    #[inline]
    pub fn last_accessed_at(&self) -> Instant {
        self.last_accessed_at.unwrap_or(self.created_at)
    }

    pub fn metadata(&self) -> Option<&serde_json::Value> {
        self.metadata.as_ref()
    }

    #[inline]
    pub fn insert_seq(&self) -> u64 {
        self.insert_seq
    }

    #[inline]
    pub fn access_seq(&self) -> u64 {
        self.access_seq
    }

    /// Check whether the entry has expired at `now`
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        if self.ttl.is_zero() {
            return false;
        }
        now.saturating_duration_since(self.created_at) > self.ttl
    }

    /// Check whether the entry has expired
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Time left before expiry (`None` = never expires)
    pub fn remaining_ttl(&self) -> Option<Duration> {
        if self.ttl.is_zero() {
            return None;
        }
        Some(self.ttl.saturating_sub(self.created_at.elapsed()))
    }

    /// Record a successful read
    pub fn record_hit(&mut self, seq: u64) {
        self.hit_count += 1;
        self.last_accessed_at = Some(Instant::now());
        self.access_seq = seq;
    }

    /// Restart the expiry clock with a new TTL
    pub fn refresh(&mut self, ttl: Duration) {
        self.created_at = Instant::now();
        self.ttl = ttl;
    }
}
