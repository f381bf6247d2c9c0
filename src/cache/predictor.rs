//! Access-pattern Prediction
//!
//! Keeps a short history of hit timestamps per key and estimates when each
//! key will be read next. Predictions are advisory; nothing in the cache acts
//! on them automatically.

use std::collections::VecDeque;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;

/// Minimum history before a key gets a prediction
pub const MIN_HISTORY: usize = 3;

/// Histories idle for longer than this are dropped by `analyze`
const STALE_AFTER_SECS: i64 = 3600;

/// Estimated next access for one key
#[derive(Debug, Clone, Serialize)]
pub struct AccessPrediction {
    pub key: String,
    pub samples: usize,
    /// Mean gap between accesses, in seconds
    pub mean_interval_secs: f64,
    /// Variance of the gaps, in seconds squared
    pub interval_variance: f64,
    pub next_access: DateTime<Utc>,
    /// `1 / (1 + stddev / mean)`, 0 when the mean gap is zero
    pub confidence: f64,
}

/// Per-key access history with periodic analysis
pub struct AccessTracker {
    history: DashMap<String, VecDeque<DateTime<Utc>>>,
    history_len: usize,
    predictions: RwLock<Vec<AccessPrediction>>,
}

impl AccessTracker {
    pub fn new(history_len: usize) -> Self {
        Self {
            history: DashMap::new(),
            history_len: history_len.max(1),
            predictions: RwLock::new(Vec::new()),
        }
    }

    /// Record a hit on `key`
    pub fn record(&self, key: &str) {
        self.record_at(key, Utc::now());
    }

    pub fn record_at(&self, key: &str, at: DateTime<Utc>) {
        let mut samples = self.history.entry(key.to_string()).or_default();
        if samples.len() >= self.history_len {
            samples.pop_front();
        }
        samples.push_back(at);
    }

    /// Drop the history of one key
    pub fn forget(&self, key: &str) {
        self.history.remove(key);
    }

    /// Recompute predictions, dropping stale histories
    pub fn analyze(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - ChronoDuration::seconds(STALE_AFTER_SECS);
        self.history
            .retain(|_, samples| samples.back().is_some_and(|last| *last >= cutoff));

        let mut predictions: Vec<AccessPrediction> = self
            .history
            .iter()
            .filter_map(|entry| predict(entry.key(), entry.value()))
            .collect();
        predictions.sort_by(|a, b| a.next_access.cmp(&b.next_access));

        let count = predictions.len();
        *self.predictions.write() = predictions;
        count
    }

    /// Predictions from the last analysis, soonest first
    pub fn predictions(&self) -> Vec<AccessPrediction> {
        self.predictions.read().clone()
    }

    pub fn prediction_count(&self) -> usize {
        self.predictions.read().len()
    }

    /// Keys with recorded history
    pub fn tracked_keys(&self) -> usize {
        self.history.len()
    }

    pub fn clear(&self) {
        self.history.clear();
        self.predictions.write().clear();
    }
}

fn predict(key: &str, samples: &VecDeque<DateTime<Utc>>) -> Option<AccessPrediction> {
    if samples.len() < MIN_HISTORY {
        return None;
    }

    let intervals: Vec<f64> = samples
        .iter()
        .zip(samples.iter().skip(1))
        .map(|(a, b)| (*b - *a).num_milliseconds() as f64 / 1000.0)
        .collect();

    let n = intervals.len() as f64;
    let mean = intervals.iter().sum::<f64>() / n;
    let variance = intervals.iter().map(|i| (i - mean).powi(2)).sum::<f64>() / n;
    let confidence = if mean > 0.0 {
        1.0 / (1.0 + variance.sqrt() / mean)
    } else {
        0.0
    };

    let last = *samples.back()?;
    let next_access = last + ChronoDuration::milliseconds((mean * 1000.0) as i64);

    Some(AccessPrediction {
        key: key.to_string(),
        samples: samples.len(),
        mean_interval_secs: mean,
        interval_variance: variance,
        next_access,
        confidence,
    })
}
