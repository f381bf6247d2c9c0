//! Audit Log
//!
//! Capped, in-memory record of cache operations. The oldest records are
//! dropped once the buffer is full.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use super::validator::display_key;

/// One audited operation
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub key: String,
    pub success: bool,
    pub details: Option<String>,
}

/// Ring buffer of audit records
pub struct AuditLog {
    records: Mutex<VecDeque<AuditRecord>>,
    capacity: usize,
    enabled: AtomicBool,
    total: AtomicU64,
}

impl AuditLog {
    pub fn new(capacity: usize, enabled: bool) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity,
            enabled: AtomicBool::new(enabled),
            total: AtomicU64::new(0),
        }
    }

    /// Append a record (no-op while disabled)
    pub fn record(&self, operation: &str, key: &str, success: bool, details: Option<String>) {
        if !self.is_enabled() || self.capacity == 0 {
            return;
        }

        let record = AuditRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            operation: operation.to_string(),
            key: display_key(key),
            success,
            details,
        };

        let mut records = self.records.lock();
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Most recent records, newest first
    pub fn recent(&self, limit: usize) -> Vec<AuditRecord> {
        self.records
            .lock()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Retained failed operations, oldest first
    pub fn failures(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| !r.success)
            .cloned()
            .collect()
    }

    /// Records currently retained
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records written since creation (including dropped ones)
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}
