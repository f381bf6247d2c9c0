//! Payload Codec
//!
//! Turns values into byte payloads and back. Values are serialized as JSON;
//! payloads above the configured threshold are LZ4-compressed. Every payload
//! starts with a one-byte header naming the algorithm, so reads detect on
//! their own whether decompression is needed.
//!
//! # Example
//!
//! ```
//! use tiercache::cache::codec::{Codec, CompressionAlgorithm, CompressionConfig};
//!
//! let codec = Codec::new(CompressionConfig { threshold_bytes: 16, ..Default::default() });
//!
//! let text = "repeat ".repeat(64);
//! let encoded = codec.encode(&text).unwrap();
//! assert_eq!(encoded.algorithm, CompressionAlgorithm::Lz4);
//!
//! let decoded: String = codec.decode(&encoded.payload).unwrap();
//! assert_eq!(decoded, text);
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

// =============================================================================
// Compression Algorithm
// =============================================================================

/// Supported compression algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionAlgorithm {
    /// No compression
    None,
    /// LZ4 - fast compression
    #[default]
    Lz4,
}

impl CompressionAlgorithm {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            CompressionAlgorithm::None => "none",
            CompressionAlgorithm::Lz4 => "lz4",
        }
    }

    /// Payload header byte for this algorithm
    pub fn header(&self) -> u8 {
        match self {
            CompressionAlgorithm::None => 0x00,
            CompressionAlgorithm::Lz4 => 0x01,
        }
    }

    /// Resolve a payload header byte
    pub fn from_header(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(CompressionAlgorithm::None),
            0x01 => Some(CompressionAlgorithm::Lz4),
            _ => None,
        }
    }
}

impl std::fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Compression Configuration
// =============================================================================

/// Configuration for payload compression
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    /// Algorithm applied to large payloads
    pub algorithm: CompressionAlgorithm,
    /// Payloads at or below this size are stored uncompressed
    pub threshold_bytes: usize,
    /// Compression level (algorithm-specific)
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            algorithm: CompressionAlgorithm::Lz4,
            threshold_bytes: 1024,
            level: 4,
        }
    }
}

// =============================================================================
// Compressor Trait
// =============================================================================

/// Trait for compression implementations
pub trait Compressor: Send + Sync {
    /// Get the algorithm identifier
    fn algorithm(&self) -> CompressionAlgorithm;

    /// Compress data
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress data
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Pass-through compressor (no compression)
pub struct NoopCompressor;

impl Compressor for NoopCompressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::None
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// LZ4 compressor (fast compression)
pub struct Lz4Compressor {
    level: i32,
}

impl Lz4Compressor {
    /// Create new LZ4 compressor with default settings
    pub fn new() -> Self {
        Self { level: 4 }
    }

    /// Create with custom compression level
    pub fn with_level(level: i32) -> Self {
        Self { level }
    }
}

impl Default for Lz4Compressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for Lz4Compressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::Lz4
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4::block::compress(
            data,
            Some(lz4::block::CompressionMode::HIGHCOMPRESSION(self.level)),
            true,
        )
        .map_err(|e| Error::CompressionFailed {
            algorithm: "LZ4".into(),
            reason: e.to_string(),
        })
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4::block::decompress(data, None).map_err(|e| Error::DecompressionFailed {
            algorithm: "LZ4".into(),
            reason: e.to_string(),
        })
    }
}

// =============================================================================
// Codec
// =============================================================================

/// An encoded payload ready for either store
#[derive(Debug, Clone)]
pub struct Encoded {
    /// Header byte followed by the (possibly compressed) body
    pub payload: Bytes,
    /// Serialized size before compression
    pub raw_len: usize,
    /// Algorithm recorded in the header
    pub algorithm: CompressionAlgorithm,
}

impl Encoded {
    /// Size of the stored payload
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty (never true for codec output)
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Whether compression was applied
    pub fn is_compressed(&self) -> bool {
        self.algorithm != CompressionAlgorithm::None
    }
}

/// Serializer + transparent compressor
pub struct Codec {
    config: CompressionConfig,
    noop: NoopCompressor,
    lz4: Lz4Compressor,
}

impl Codec {
    /// Create a codec with custom config
    pub fn new(config: CompressionConfig) -> Self {
        Self {
            lz4: Lz4Compressor::with_level(config.level),
            noop: NoopCompressor,
            config,
        }
    }

    fn compressor(&self, algorithm: CompressionAlgorithm) -> &dyn Compressor {
        match algorithm {
            CompressionAlgorithm::None => &self.noop,
            CompressionAlgorithm::Lz4 => &self.lz4,
        }
    }

    /// Serialize and (when large enough) compress a value
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Encoded> {
        let raw = serde_json::to_vec(value)?;
        Ok(self.encode_bytes(&raw))
    }

    /// Frame already-serialized bytes, compressing above the threshold
    ///
    /// Falls back to the uncompressed form when compression fails or does
    /// not shrink the data.
    pub fn encode_bytes(&self, raw: &[u8]) -> Encoded {
        let (algorithm, body) = if raw.len() <= self.config.threshold_bytes {
            (CompressionAlgorithm::None, None)
        } else {
            match self.compressor(self.config.algorithm).compress(raw) {
                Ok(compressed) if compressed.len() < raw.len() => {
                    (self.config.algorithm, Some(compressed))
                }
                Ok(_) => (CompressionAlgorithm::None, None),
                Err(e) => {
                    tracing::warn!("Compression failed, storing uncompressed: {}", e);
                    (CompressionAlgorithm::None, None)
                }
            }
        };

        let body: &[u8] = body.as_deref().unwrap_or(raw);
        let mut payload = BytesMut::with_capacity(body.len() + 1);
        payload.put_u8(algorithm.header());
        payload.put_slice(body);

        Encoded {
            payload: payload.freeze(),
            raw_len: raw.len(),
            algorithm,
        }
    }

    /// Strip the header and decompress, returning the serialized bytes
    pub fn decode_bytes(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let (&header, body) = payload
            .split_first()
            .ok_or_else(|| Error::Serialization("empty payload".into()))?;

        let algorithm = CompressionAlgorithm::from_header(header).ok_or_else(|| {
            Error::Serialization(format!("unknown payload header 0x{:02x}", header))
        })?;

        self.compressor(algorithm)
            .decompress(body)
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Decode a payload back into a value
    pub fn decode<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T> {
        let raw = self.decode_bytes(payload)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Get configuration
    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(CompressionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    const TEST_DATA: &[u8] = b"Hello, this is test data that should compress well. \
        It has some repetition: Hello, this is test data that should compress well.";

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Report {
        id: u64,
        title: String,
        sections: Vec<String>,
    }

    fn small_threshold() -> Codec {
        Codec::new(CompressionConfig {
            threshold_bytes: 32,
            ..Default::default()
        })
    }

    #[test]
    fn test_lz4_roundtrip() {
        let compressor = Lz4Compressor::new();

        let compressed = compressor.compress(TEST_DATA).unwrap();
        assert!(compressed.len() < TEST_DATA.len());

        let decompressed = compressor.decompress(&compressed).unwrap();
        assert_eq!(decompressed, TEST_DATA);
    }

    #[test]
    fn test_small_values_are_not_compressed() {
        let codec = Codec::default();
        let encoded = codec.encode("tiny").unwrap();

        assert_eq!(encoded.algorithm, CompressionAlgorithm::None);
        assert_eq!(encoded.payload[0], 0x00);
        assert_eq!(&encoded.payload[1..], b"\"tiny\"");
    }

    #[test]
    fn test_large_values_are_compressed_transparently() {
        let codec = small_threshold();
        let report = Report {
            id: 7,
            title: "quarterly".into(),
            sections: vec!["same section body".to_string(); 50],
        };

        let encoded = codec.encode(&report).unwrap();
        assert!(encoded.is_compressed());
        assert!(encoded.len() < encoded.raw_len);

        let decoded: Report = codec.decode(&encoded.payload).unwrap();
        assert_eq!(decoded, report);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let codec = Codec::new(CompressionConfig {
            threshold_bytes: TEST_DATA.len(),
            ..Default::default()
        });
        let encoded = codec.encode_bytes(TEST_DATA);
        assert_eq!(encoded.algorithm, CompressionAlgorithm::None);
    }

    #[test]
    fn test_incompressible_data_falls_back() {
        let codec = small_threshold();
        let noisy: Vec<u8> = (0..2000u32)
            .map(|i| (i.wrapping_mul(2654435761) >> 13) as u8)
            .collect();

        let encoded = codec.encode_bytes(&noisy);
        if encoded.algorithm == CompressionAlgorithm::None {
            assert_eq!(encoded.len(), noisy.len() + 1);
        } else {
            assert!(encoded.len() <= noisy.len());
        }
        assert_eq!(codec.decode_bytes(&encoded.payload).unwrap(), noisy);
    }

    #[test]
    fn test_unknown_header_is_serialization_error() {
        let codec = Codec::default();
        let err = codec.decode::<String>(&[0x7f, b'"', b'x', b'"']).unwrap_err();
        assert!(err.is_serialization());

        let err = codec.decode::<String>(&[]).unwrap_err();
        assert!(err.is_serialization());
    }

    #[test]
    fn test_type_mismatch_is_serialization_error() {
        let codec = Codec::default();
        let encoded = codec.encode(&"text").unwrap();
        let err = codec.decode::<u64>(&encoded.payload).unwrap_err();
        assert!(err.is_serialization());
    }

    #[test]
    fn test_algorithm_headers() {
        for alg in [CompressionAlgorithm::None, CompressionAlgorithm::Lz4] {
            assert_eq!(CompressionAlgorithm::from_header(alg.header()), Some(alg));
        }
        assert_eq!(CompressionAlgorithm::Lz4.to_string(), "lz4");
    }
}
