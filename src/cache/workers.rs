//! Background Workers
//!
//! Four long-running tasks share the manager through an `Arc` and stop when
//! the manager's cancellation token fires:
//!
//! - warmup: drains the warmup queue into both tiers
//! - batch: applies queued batch writes/deletes with pipelined remote calls
//! - health: pings and resyncs the remote store, sweeps expired entries, grades health
//! - predictor: recomputes access-pattern predictions

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::codec::Encoded;
use super::manager::CacheManager;

/// First warmup retry delay
pub const WARMUP_BACKOFF_BASE: Duration = Duration::from_millis(100);
/// Warmup retry delay ceiling
pub const WARMUP_BACKOFF_MAX: Duration = Duration::from_secs(5);
/// Consecutive failures before the warmup worker starts backing off
pub const WARMUP_FAILURE_THRESHOLD: u32 = 3;

// =============================================================================
// Work Queue
// =============================================================================

/// FIFO with wake-up notification
pub struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
    notify: Notify,
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    pub fn push(&self, item: T) {
        self.items.lock().push_back(item);
        self.notify.notify_one();
    }

    pub fn push_many(&self, items: impl IntoIterator<Item = T>) {
        self.items.lock().extend(items);
        self.notify.notify_one();
    }

    pub fn pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Take up to `max` items from the front
    pub fn drain(&self, max: usize) -> Vec<T> {
        let mut items = self.items.lock();
        let n = max.min(items.len());
        items.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves after the next push (or immediately if one is pending)
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A value queued for proactive population
#[derive(Debug, Clone)]
pub struct WarmupItem {
    pub key: String,
    pub encoded: Encoded,
    pub ttl: Duration,
    pub metadata: Option<serde_json::Value>,
}

/// A queued batch operation
#[derive(Debug, Clone)]
pub enum BatchOp {
    Set {
        key: String,
        payload: Bytes,
        ttl: Duration,
    },
    Delete {
        key: String,
    },
}

impl BatchOp {
    pub fn key(&self) -> &str {
        match self {
            BatchOp::Set { key, .. } | BatchOp::Delete { key } => key,
        }
    }
}

/// A spawned worker task
pub struct WorkerHandle {
    pub name: &'static str,
    pub handle: JoinHandle<()>,
}

// =============================================================================
// Worker Loops
// =============================================================================

/// Spawn every worker enabled by the manager's configuration
pub(crate) fn spawn_all(manager: &Arc<CacheManager>, token: &CancellationToken) -> Vec<WorkerHandle> {
    let config = manager.config();
    let mut workers = Vec::with_capacity(4);

    if config.warmup_enabled {
        workers.push(WorkerHandle {
            name: "warmup",
            handle: tokio::spawn(run_warmup(Arc::clone(manager), token.child_token())),
        });
    }
    workers.push(WorkerHandle {
        name: "batch",
        handle: tokio::spawn(run_batch(Arc::clone(manager), token.child_token())),
    });
    workers.push(WorkerHandle {
        name: "health",
        handle: tokio::spawn(run_health(Arc::clone(manager), token.child_token())),
    });
    if config.monitoring_enabled {
        workers.push(WorkerHandle {
            name: "predictor",
            handle: tokio::spawn(run_predictor(Arc::clone(manager), token.child_token())),
        });
    }

    workers
}

/// Drain the warmup queue, backing off after repeated failures
#[instrument(skip(manager, token))]
pub(crate) async fn run_warmup(manager: Arc<CacheManager>, token: CancellationToken) {
    info!("Starting warmup worker");
    let mut failures = 0u32;
    let mut backoff = WARMUP_BACKOFF_BASE;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = manager.warmup_queue().notified() => {}
        }

        // Items left behind on cancellation are applied by the shutdown flush
        while !token.is_cancelled() {
            let Some(item) = manager.warmup_queue().pop() else {
                break;
            };

            let key = item.key.clone();
            if manager.apply_warmup(item).await {
                failures = 0;
                backoff = WARMUP_BACKOFF_BASE;
                continue;
            }

            failures += 1;
            if failures >= WARMUP_FAILURE_THRESHOLD {
                warn!(key = %key, failures, ?backoff, "Warmup failing, backing off");
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(WARMUP_BACKOFF_MAX);
            }
        }
    }

    info!("Warmup worker stopped");
}

/// Apply queued batch operations on every poll or push
#[instrument(skip(manager, token))]
pub(crate) async fn run_batch(manager: Arc<CacheManager>, token: CancellationToken) {
    info!("Starting batch worker");
    let mut tick = interval(manager.config().batch_poll_interval());
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tick.tick() => {}
            _ = manager.batch_queue().notified() => {}
        }

        let applied = manager.flush_batch().await;
        if applied > 0 {
            debug!(applied, "Applied batch operations");
        }
    }

    info!("Batch worker stopped");
}

/// Periodic health check; the first check runs immediately
#[instrument(skip(manager, token))]
pub(crate) async fn run_health(manager: Arc<CacheManager>, token: CancellationToken) {
    info!("Starting health worker");
    let mut tick = interval(manager.config().health_check_interval());
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tick.tick() => {
                let report = manager.run_health_check().await;
                debug!(status = %report.status, "Health check complete");
            }
        }
    }

    info!("Health worker stopped");
}

/// Periodic access-pattern analysis
#[instrument(skip(manager, token))]
pub(crate) async fn run_predictor(manager: Arc<CacheManager>, token: CancellationToken) {
    info!("Starting prediction worker");
    let period = manager.config().prediction_interval();
    let mut tick = interval_at(Instant::now() + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tick.tick() => {
                let count = manager.run_prediction();
                debug!(count, "Access predictions refreshed");
            }
        }
    }

    info!("Prediction worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_fifo_and_drain() {
        let q = WorkQueue::new();
        q.push_many(1..=5);
        q.push(6);

        assert_eq!(q.len(), 6);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.drain(3), vec![2, 3, 4]);
        assert_eq!(q.drain(10), vec![5, 6]);
        assert!(q.is_empty());
        assert!(q.drain(1).is_empty());
    }

    #[tokio::test]
    async fn test_push_before_wait_is_not_lost() {
        let q: WorkQueue<u32> = WorkQueue::new();
        q.push(1);
        tokio::time::timeout(Duration::from_secs(1), q.notified())
            .await
            .expect("pending notification should resolve");
    }

    #[test]
    fn test_batch_op_key() {
        let set = BatchOp::Set {
            key: "a".into(),
            payload: Bytes::from_static(b"\x001"),
            ttl: Duration::ZERO,
        };
        assert_eq!(set.key(), "a");
        assert_eq!(BatchOp::Delete { key: "b".into() }.key(), "b");
    }
}
