//! Property-Based Tests for the Cache Layer
//!
//! # Test Properties
//!
//! 1. **Codec Roundtrip**: decode(encode(v)) = v for any threshold
//! 2. **Capacity Bound**: the local store never holds more than its capacity
//! 3. **Key Validation**: the allowed alphabet is accepted, anything else rejected
//! 4. **Key Determinism**: keyword order never changes a derived key
//! 5. **Rate Limit Bound**: a window never admits more than its quota

#![cfg(test)]

use std::time::{Duration, Instant};

use bytes::Bytes;
use proptest::prelude::*;

use super::codec::{Codec, CompressionAlgorithm, CompressionConfig};
use super::local::LocalStore;
use super::memoize::KeyBuilder;
use super::policy::EvictionStrategy;
use super::rate_limit::{Operation, RateLimit, RateLimiter, RateLimits};
use super::validator::{Validator, ValidatorConfig};

// =============================================================================
// Property Strategies
// =============================================================================

fn strategy_strategy() -> impl Strategy<Value = EvictionStrategy> {
    prop::sample::select(EvictionStrategy::ALL.to_vec())
}

fn valid_key_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_.-]{1,64}"
}

/// Set or get on a small key space so overwrites and hits both happen
#[derive(Debug, Clone)]
enum LocalOp {
    Set(u8),
    Get(u8),
}

fn local_ops_strategy() -> impl Strategy<Value = Vec<LocalOp>> {
    prop::collection::vec(
        prop_oneof![
            (0u8..32).prop_map(LocalOp::Set),
            (0u8..32).prop_map(LocalOp::Get),
        ],
        1..200,
    )
}

// =============================================================================
// Codec Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_codec_roundtrip(value in ".{0,4000}", threshold in 0usize..2048) {
        let codec = Codec::new(CompressionConfig {
            algorithm: CompressionAlgorithm::Lz4,
            threshold_bytes: threshold,
            level: 4,
        });

        let encoded = codec.encode(&value).unwrap();
        let decoded: String = codec.decode(&encoded.payload).unwrap();
        prop_assert_eq!(decoded, value);
    }

    #[test]
    fn prop_compression_never_grows_payload(raw in prop::collection::vec(any::<u8>(), 0..8192)) {
        let codec = Codec::new(CompressionConfig {
            threshold_bytes: 0,
            ..Default::default()
        });

        let encoded = codec.encode_bytes(&raw);
        prop_assert!(encoded.len() <= raw.len() + 1);
        prop_assert_eq!(codec.decode_bytes(&encoded.payload).unwrap(), raw);
    }
}

// =============================================================================
// Local Store Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_local_store_respects_capacity(
        capacity in 1usize..16,
        strategy in strategy_strategy(),
        ops in local_ops_strategy(),
    ) {
        let store = LocalStore::new(capacity, strategy);
        for op in ops {
            match op {
                LocalOp::Set(k) => {
                    let key = format!("k{}", k);
                    prop_assert!(store.set(&key, Bytes::from(vec![k]), Duration::ZERO, None));
                    prop_assert!(store.contains(&key));
                }
                LocalOp::Get(k) => {
                    store.get(&format!("k{}", k));
                }
            }
            prop_assert!(store.len() <= capacity);
        }
    }
}

// =============================================================================
// Key Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_valid_alphabet_accepted(key in valid_key_strategy()) {
        let validator = Validator::new(ValidatorConfig::default());
        prop_assert!(validator.validate_key(&key).is_ok());
    }

    #[test]
    fn prop_foreign_char_rejected(
        head in "[a-z]{0,10}",
        bad in "[ :/*?\\[\\]{}\\n\\t@#$%]",
        tail in "[a-z]{0,10}",
    ) {
        let validator = Validator::new(ValidatorConfig::default());
        let key = format!("{}{}{}", head, bad, tail);
        prop_assert!(validator.validate_key(&key).is_err());
    }

    #[test]
    fn prop_kwarg_order_is_irrelevant(
        pairs in prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..8),
        prefix in "[a-z.]{1,20}",
    ) {
        let forward = pairs
            .iter()
            .fold(KeyBuilder::new(prefix.as_str()), |b, (k, v)| b.kwarg(k.as_str(), v));
        let backward = pairs
            .iter()
            .rev()
            .fold(KeyBuilder::new(prefix.as_str()), |b, (k, v)| b.kwarg(k.as_str(), v));

        let key = forward.build();
        prop_assert_eq!(&key, &backward.build());
        prop_assert!(Validator::new(ValidatorConfig::default()).validate_key(&key).is_ok());
    }
}

// =============================================================================
// Rate Limit Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_window_never_exceeds_quota(
        max_requests in 1usize..50,
        offsets_ms in prop::collection::vec(0u64..3000, 1..300),
    ) {
        let limit = RateLimit::new(max_requests, 1);
        let limiter = RateLimiter::new(&RateLimits {
            get: limit,
            ..Default::default()
        });

        let mut offsets = offsets_ms;
        offsets.sort_unstable();
        let base = Instant::now();
        let mut admitted: Vec<u64> = Vec::new();

        for offset in offsets {
            if limiter.admit_at(Operation::Get, base + Duration::from_millis(offset)) {
                admitted.push(offset);
            }
            let in_window = admitted.iter().filter(|t| offset - **t < 1000).count();
            prop_assert!(in_window <= max_requests);
        }
    }
}
