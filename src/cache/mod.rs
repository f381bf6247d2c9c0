//! Dual-tier Cache
//!
//! A shared remote tier (Redis) in front of a bounded in-process local tier.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Cache Manager                             │
//! │   validate key → rate limit → encode/compress → tiers → audit     │
//! ├──────────────────────────────────┬───────────────────────────────┤
//! │  Remote Store (Redis)            │  Local Store (HashMap)        │
//! │  deadpool connection pool        │  LRU / LFU / FIFO / Random    │
//! │  per-call timeout                │  lazy + periodic expiry       │
//! │  sticky unavailability           │  capacity bound               │
//! └──────────────────────────────────┴───────────────────────────────┘
//!        ▲                    ▲                   ▲              ▲
//!     warmup               batch               health        predictor
//!     worker               worker              worker        worker
//! ```
//!
//! Reads prefer the remote tier while it is available and fall back to the
//! local tier. Writes always land in the local tier so a remote outage does
//! not lose recently written keys. A failed remote call marks the remote
//! tier unavailable until the health worker reaches it again and has
//! replayed the local changes it missed.

pub mod audit;
pub mod codec;
pub mod config;
pub mod entry;
pub mod health;
pub mod local;
pub mod memoize;
pub mod metrics;
pub mod policy;
pub mod predictor;
pub mod rate_limit;
pub mod remote;
pub mod validator;
pub mod workers;

mod manager;
mod proptest;

pub use audit::{AuditLog, AuditRecord};
pub use codec::{Codec, CompressionAlgorithm, CompressionConfig, Compressor, Encoded};
pub use config::CacheConfig;
pub use entry::CacheEntry;
pub use health::{ComponentHealth, HealthReport, HealthStatus};
pub use local::{LocalStats, LocalStore};
pub use manager::{CacheManager, CacheTier};
pub use memoize::{cache_key, KeyBuilder, Memoizer};
pub use metrics::{CacheMetrics, MetricsSnapshot, QueueDepths, StatsSnapshot};
pub use policy::EvictionStrategy;
pub use predictor::{AccessPrediction, AccessTracker};
pub use rate_limit::{Operation, RateLimit, RateLimiter, RateLimits};
pub use remote::{
    InMemoryRemoteBackend, RedisBackend, RedisSettings, RemoteBackend, RemoteInfo, RemoteStats,
    RemoteStore,
};
pub use validator::{KeyPattern, Validator, ValidatorConfig};
