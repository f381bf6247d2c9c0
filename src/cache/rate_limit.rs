//! Sliding-window Rate Limiting
//!
//! One window per operation class, each behind its own lock so that a burst
//! of reads cannot starve writes.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Operation classes with independent quotas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Get,
    Set,
    Delete,
    Batch,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Get,
        Operation::Set,
        Operation::Delete,
        Operation::Batch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Get => "get",
            Operation::Set => "set",
            Operation::Delete => "delete",
            Operation::Batch => "batch",
        }
    }

    fn index(&self) -> usize {
        match self {
            Operation::Get => 0,
            Operation::Set => 1,
            Operation::Delete => 2,
            Operation::Batch => 3,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quota for one operation class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Requests admitted per window
    pub max_requests: usize,
    /// Window length in seconds
    pub window_secs: u64,
}

impl RateLimit {
    pub const fn new(max_requests: usize, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Per-operation quotas
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimits {
    pub get: RateLimit,
    pub set: RateLimit,
    pub delete: RateLimit,
    pub batch: RateLimit,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            get: RateLimit::new(10_000, 60),
            set: RateLimit::new(5_000, 60),
            delete: RateLimit::new(5_000, 60),
            batch: RateLimit::new(1_000, 60),
        }
    }
}

impl RateLimits {
    pub fn for_op(&self, op: Operation) -> RateLimit {
        match op {
            Operation::Get => self.get,
            Operation::Set => self.set,
            Operation::Delete => self.delete,
            Operation::Batch => self.batch,
        }
    }
}

struct Window {
    limit: RateLimit,
    admitted: Mutex<VecDeque<Instant>>,
    rejected: AtomicU64,
}

/// Sliding-window rate limiter
pub struct RateLimiter {
    windows: [Window; 4],
}

impl RateLimiter {
    pub fn new(limits: &RateLimits) -> Self {
        let window = |op: Operation| Window {
            limit: limits.for_op(op),
            admitted: Mutex::new(VecDeque::new()),
            rejected: AtomicU64::new(0),
        };
        Self {
            windows: Operation::ALL.map(window),
        }
    }

    /// Admit one request of class `op`
    pub fn allow(&self, op: Operation) -> bool {
        self.admit_at(op, Instant::now())
    }

    pub(crate) fn admit_at(&self, op: Operation, now: Instant) -> bool {
        let window = &self.windows[op.index()];
        let span = window.limit.window();
        let mut admitted = window.admitted.lock();

        while let Some(&oldest) = admitted.front() {
            if now.saturating_duration_since(oldest) >= span {
                admitted.pop_front();
            } else {
                break;
            }
        }

        if admitted.len() < window.limit.max_requests {
            admitted.push_back(now);
            true
        } else {
            window.rejected.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Requests currently counted in the window of `op`
    pub fn in_window(&self, op: Operation) -> usize {
        self.windows[op.index()].admitted.lock().len()
    }

    /// Requests rejected for `op` so far
    pub fn rejected(&self, op: Operation) -> u64 {
        self.windows[op.index()].rejected.load(Ordering::Relaxed)
    }

    pub fn limit(&self, op: Operation) -> RateLimit {
        self.windows[op.index()].limit
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(&RateLimits::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: usize, window_secs: u64) -> RateLimiter {
        let limit = RateLimit::new(max, window_secs);
        RateLimiter::new(&RateLimits {
            get: limit,
            set: limit,
            delete: limit,
            batch: limit,
        })
    }

    #[test]
    fn test_admits_up_to_quota() {
        let rl = limiter(3, 60);
        let now = Instant::now();
        assert!(rl.admit_at(Operation::Get, now));
        assert!(rl.admit_at(Operation::Get, now));
        assert!(rl.admit_at(Operation::Get, now));
        assert!(!rl.admit_at(Operation::Get, now));
        assert_eq!(rl.in_window(Operation::Get), 3);
        assert_eq!(rl.rejected(Operation::Get), 1);
    }

    #[test]
    fn test_window_slides() {
        let rl = limiter(2, 1);
        let start = Instant::now();
        assert!(rl.admit_at(Operation::Set, start));
        assert!(rl.admit_at(Operation::Set, start + Duration::from_millis(500)));
        assert!(!rl.admit_at(Operation::Set, start + Duration::from_millis(900)));

        // First admission falls out of the window
        assert!(rl.admit_at(Operation::Set, start + Duration::from_millis(1000)));
        assert!(!rl.admit_at(Operation::Set, start + Duration::from_millis(1100)));
        assert!(rl.admit_at(Operation::Set, start + Duration::from_millis(1500)));
    }

    #[test]
    fn test_rejections_are_not_recorded() {
        let rl = limiter(1, 1);
        let start = Instant::now();
        assert!(rl.admit_at(Operation::Delete, start));
        for i in 1..10 {
            assert!(!rl.admit_at(Operation::Delete, start + Duration::from_millis(i * 50)));
        }
        assert_eq!(rl.in_window(Operation::Delete), 1);
        assert!(rl.admit_at(Operation::Delete, start + Duration::from_secs(1)));
    }

    #[test]
    fn test_classes_are_independent() {
        let rl = limiter(1, 60);
        let now = Instant::now();
        assert!(rl.admit_at(Operation::Get, now));
        assert!(!rl.admit_at(Operation::Get, now));
        assert!(rl.admit_at(Operation::Set, now));
        assert!(rl.admit_at(Operation::Batch, now));
    }

    #[test]
    fn test_default_quotas() {
        let rl = RateLimiter::default();
        assert_eq!(rl.limit(Operation::Get), RateLimit::new(10_000, 60));
        assert_eq!(rl.limit(Operation::Batch).max_requests, 1_000);
    }
}
