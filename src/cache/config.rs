//! Cache Configuration
//!
//! [`CacheConfig`] can be built in code, loaded from YAML, or both; every
//! field has a default so a partial file is enough.
//!
//! ```yaml
//! remote_url: redis://127.0.0.1:6379/0
//! max_local_entries: 5000
//! eviction_strategy: LFU
//! rate_limits:
//!   get: { max_requests: 20000, window_secs: 60 }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::codec::{CompressionAlgorithm, CompressionConfig};
use super::policy::EvictionStrategy;
use super::rate_limit::RateLimits;
use super::remote::RedisSettings;
use super::validator::ValidatorConfig;
use crate::error::{Error, Result};

/// Cache manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Remote store URL; `None` runs local-only
    pub remote_url: Option<String>,
    /// TTL applied when a write does not name one (0 = no expiry)
    pub default_ttl_seconds: u64,
    /// Local store capacity in entries
    pub max_local_entries: usize,
    /// Serialized values above this size are compressed
    pub compression_threshold_bytes: usize,
    /// LZ4 high-compression level
    pub compression_level: i32,
    /// Remote connection pool size
    pub connection_pool_size: usize,
    pub eviction_strategy: EvictionStrategy,
    /// Run the warmup worker (otherwise warmups are applied inline)
    pub warmup_enabled: bool,
    /// Maximum operations applied per batch flush
    pub batch_size: usize,
    /// Access tracking and the prediction worker
    pub monitoring_enabled: bool,
    /// Key and value validation
    pub security_enabled: bool,
    pub rate_limit_enabled: bool,
    pub audit_logging_enabled: bool,

    pub max_key_length: usize,
    /// Serialized size limit, checked before compression
    pub max_value_bytes: usize,
    /// Bound on each foreground remote call
    pub remote_timeout_ms: u64,
    /// Pool wait/create/recycle timeout
    pub pool_timeout_ms: u64,
    pub audit_capacity: usize,
    /// Timestamps kept per key for prediction
    pub access_history_len: usize,
    pub rate_limits: RateLimits,
    pub health_check_interval_secs: u64,
    pub prediction_interval_secs: u64,
    pub batch_poll_interval_ms: u64,
    /// Time allowed for workers to stop before they are aborted
    pub shutdown_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            default_ttl_seconds: 300,
            max_local_entries: 1000,
            compression_threshold_bytes: 1024,
            compression_level: 4,
            connection_pool_size: 10,
            eviction_strategy: EvictionStrategy::Lru,
            warmup_enabled: true,
            batch_size: 100,
            monitoring_enabled: true,
            security_enabled: true,
            rate_limit_enabled: true,
            audit_logging_enabled: true,
            max_key_length: 256,
            max_value_bytes: 10 * 1024 * 1024,
            remote_timeout_ms: 500,
            pool_timeout_ms: 5000,
            audit_capacity: 1000,
            access_history_len: 100,
            rate_limits: RateLimits::default(),
            health_check_interval_secs: 60,
            prediction_interval_secs: 300,
            batch_poll_interval_ms: 100,
            shutdown_timeout_ms: 5000,
        }
    }
}

impl CacheConfig {
    /// Local-only configuration
    pub fn local_only() -> Self {
        Self::default()
    }

    /// Configuration with a remote store
    pub fn with_remote(url: impl Into<String>) -> Self {
        Self {
            remote_url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Parse YAML
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("invalid cache config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&text)
    }

    /// Reject values the cache cannot run with
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.remote_url {
            if !(url.starts_with("redis://") || url.starts_with("rediss://")) {
                return Err(Error::Config(format!(
                    "remote_url must be a redis:// or rediss:// URL, got '{}'",
                    url
                )));
            }
        }
        if self.connection_pool_size == 0 {
            return Err(Error::Config("connection_pool_size must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be positive".into()));
        }
        if self.max_key_length == 0 {
            return Err(Error::Config("max_key_length must be positive".into()));
        }
        if self.remote_timeout_ms == 0 {
            return Err(Error::Config("remote_timeout_ms must be positive".into()));
        }
        if self.health_check_interval_secs == 0 || self.prediction_interval_secs == 0 {
            return Err(Error::Config("worker intervals must be positive".into()));
        }
        if self.batch_poll_interval_ms == 0 {
            return Err(Error::Config("batch_poll_interval_ms must be positive".into()));
        }
        if !(1..=12).contains(&self.compression_level) {
            return Err(Error::Config(format!(
                "compression_level must be within 1..=12, got {}",
                self.compression_level
            )));
        }
        for (name, limit) in [
            ("get", self.rate_limits.get),
            ("set", self.rate_limits.set),
            ("delete", self.rate_limits.delete),
            ("batch", self.rate_limits.batch),
        ] {
            if limit.window_secs == 0 {
                return Err(Error::Config(format!(
                    "rate limit window for '{}' must be positive",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn prediction_interval(&self) -> Duration {
        Duration::from_secs(self.prediction_interval_secs)
    }

    pub fn batch_poll_interval(&self) -> Duration {
        Duration::from_millis(self.batch_poll_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn compression(&self) -> CompressionConfig {
        CompressionConfig {
            algorithm: CompressionAlgorithm::Lz4,
            threshold_bytes: self.compression_threshold_bytes,
            level: self.compression_level,
        }
    }

    pub fn validator(&self) -> ValidatorConfig {
        ValidatorConfig {
            max_key_length: self.max_key_length,
            max_value_bytes: self.max_value_bytes,
        }
    }

    /// Redis settings, when a remote store is configured
    pub fn redis(&self) -> Option<RedisSettings> {
        self.remote_url.as_ref().map(|url| RedisSettings {
            url: url.clone(),
            pool_size: self.connection_pool_size,
            pool_timeout: Duration::from_millis(self.pool_timeout_ms),
        })
    }
}
