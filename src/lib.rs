//! tiercache - Remote Cache with Local Fallback
//!
//! A dual-tier cache manager: Redis as the shared tier, a bounded in-process
//! store as the fallback tier, plus validation, rate limiting, auditing,
//! compression and background maintenance.
//!
//! ```no_run
//! use std::time::Duration;
//! use tiercache::{CacheConfig, CacheManager};
//!
//! # async fn demo() -> tiercache::Result<()> {
//! let cache = CacheManager::open(CacheConfig::with_remote("redis://127.0.0.1:6379/0")).await?;
//!
//! cache.set("user.42", &"Ada", Some(Duration::from_secs(60)), None).await?;
//! let name: Option<String> = cache.get("user.42").await?;
//! assert_eq!(name.as_deref(), Some("Ada"));
//!
//! cache.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`cache`] - Cache manager, tiers and background workers
//! - [`error`] - Error types
//! - [`exporter`] - Prometheus export of cache statistics

pub mod cache;
pub mod error;
pub mod exporter;

pub use cache::{
    cache_key, CacheConfig, CacheManager, EvictionStrategy, HealthStatus, KeyBuilder, Memoizer,
    StatsSnapshot,
};
pub use error::{Error, Result};
pub use exporter::MetricsExporter;
