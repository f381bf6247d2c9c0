//! Error types for tiercache
//!
//! Only [`Error::Serialization`] ever crosses the public `get`/`set` boundary.
//! Every other variant is recovered inside the cache manager and surfaces
//! through audit records and metrics instead.

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur inside the cache layer
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Key or value rejected by validation
    #[error("Validation failed for key '{key}': {reason}")]
    Validation { key: String, reason: String },

    /// Rate limit exceeded for an operation class
    #[error("Rate limit exceeded for operation: {0}")]
    RateLimitExceeded(String),

    /// Remote store connection, timeout or protocol failure
    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    /// Value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Local store could not retain an entry even after eviction
    #[error("Local store capacity exceeded (capacity {capacity})")]
    CapacityExceeded { capacity: usize },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Redis protocol error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    // =========================================================================
    // Compression Errors
    // =========================================================================
    /// Compression failed
    #[error("Compression with {algorithm} failed: {reason}")]
    CompressionFailed { algorithm: String, reason: String },

    /// Decompression failed
    #[error("Decompression with {algorithm} failed: {reason}")]
    DecompressionFailed { algorithm: String, reason: String },
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl Error {
    /// Build a validation error for `key`
    pub fn validation(key: &str, reason: impl Into<String>) -> Self {
        Error::Validation {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error must be surfaced to the caller
    pub fn is_serialization(&self) -> bool {
        matches!(self, Error::Serialization(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_json_error_maps_to_serialization() {
        let err: Error = serde_json::from_str::<u32>("not a number").unwrap_err().into();
        assert!(err.is_serialization());
    }

    #[test]
    fn test_validation_display() {
        let err = Error::validation("bad key", "contains whitespace");
        assert_eq!(
            err.to_string(),
            "Validation failed for key 'bad key': contains whitespace"
        );
        assert!(!err.is_serialization());
    }
}
