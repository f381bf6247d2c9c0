//! Function-result Memoization
//!
//! [`KeyBuilder`] derives deterministic cache keys from a prefix plus call
//! arguments; [`Memoizer`] wraps an async function so its results are served
//! from a [`CacheManager`] when one is attached.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::manager::CacheManager;
use crate::error::Result;

/// Longest prefix kept in a derived key
const MAX_PREFIX_LEN: usize = 128;

// =============================================================================
// Key Derivation
// =============================================================================

/// Builder for argument-derived cache keys
///
/// Positional arguments keep their order; keyword arguments are sorted by
/// name so the caller's ordering never changes the key.
#[derive(Debug, Clone, Default)]
pub struct KeyBuilder {
    prefix: String,
    args: Vec<String>,
    kwargs: BTreeMap<String, String>,
}

impl KeyBuilder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    /// Append a positional argument
    pub fn arg(mut self, value: impl Display) -> Self {
        self.args.push(value.to_string());
        self
    }

    /// Set a keyword argument (a repeated name replaces the earlier value)
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Display) -> Self {
        self.kwargs.insert(name.into(), value.to_string());
        self
    }

    /// `"{prefix}.{sha256 hex}"`, with the prefix reduced to valid key characters
    pub fn build(&self) -> String {
        let mut hasher = Sha256::new();
        write_segment(&mut hasher, &self.prefix);
        for arg in &self.args {
            hasher.update(b"|a");
            write_segment(&mut hasher, arg);
        }
        for (name, value) in &self.kwargs {
            hasher.update(b"|k");
            write_segment(&mut hasher, name);
            write_segment(&mut hasher, value);
        }

        format!("{}.{}", sanitize(&self.prefix), hex::encode(hasher.finalize()))
    }
}

// Length-prefixed so ("ab", "c") and ("a", "bc") hash differently
fn write_segment(hasher: &mut Sha256, segment: &str) {
    hasher.update((segment.len() as u64).to_le_bytes());
    hasher.update(segment.as_bytes());
}

fn sanitize(prefix: &str) -> String {
    let cleaned: String = prefix
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-' | '.' => c,
            _ => '_',
        })
        .take(MAX_PREFIX_LEN)
        .collect();
    if cleaned.is_empty() {
        "fn".to_string()
    } else {
        cleaned
    }
}

/// Key for positional arguments only
///
/// ```
/// use tiercache::cache::memoize::cache_key;
///
/// assert_eq!(cache_key("users.load", [42]), cache_key("users.load", [42]));
/// assert_ne!(cache_key("users.load", [1, 2]), cache_key("users.load", [2, 1]));
/// ```
pub fn cache_key<I, D>(prefix: &str, args: I) -> String
where
    I: IntoIterator<Item = D>,
    D: Display,
{
    args.into_iter()
        .fold(KeyBuilder::new(prefix), |builder, arg| builder.arg(arg))
        .build()
}

// =============================================================================
// Memoizer
// =============================================================================

type KeyFn<A> = Box<dyn Fn(KeyBuilder, &A) -> KeyBuilder + Send + Sync>;
type InnerFn<A, T> = Box<dyn Fn(A) -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// Async function wrapper whose results are cached
pub struct Memoizer<A, T> {
    name: String,
    ttl: Option<Duration>,
    key_fn: KeyFn<A>,
    func: InnerFn<A, T>,
}

impl<A, T> Memoizer<A, T>
where
    T: Serialize + DeserializeOwned,
{
    /// Wrap `func`; `key_fn` feeds the arguments that identify a call
    pub fn new<K, F, Fut>(name: impl Into<String>, key_fn: K, func: F) -> Self
    where
        K: Fn(KeyBuilder, &A) -> KeyBuilder + Send + Sync + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            name: name.into(),
            ttl: None,
            key_fn: Box::new(key_fn),
            func: Box::new(move |args| Box::pin(func(args))),
        }
    }

    /// TTL for stored results (the cache default when unset)
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cache key for `args`
    pub fn key_for(&self, args: &A) -> String {
        (self.key_fn)(KeyBuilder::new(self.name.as_str()), args).build()
    }

    /// Serve from `cache` or call through and store the result
    ///
    /// Cache problems never fail the call; only the inner function's own
    /// error is returned.
    pub async fn call(&self, cache: Option<&CacheManager>, args: A) -> Result<T> {
        let Some(cache) = cache else {
            return (self.func)(args).await;
        };

        let key = self.key_for(&args);
        match cache.get::<T>(&key).await {
            Ok(Some(value)) => {
                debug!(function = %self.name, "Memoized result served from cache");
                return Ok(value);
            }
            Ok(None) => {}
            Err(e) => warn!(function = %self.name, "Ignoring unreadable memoized result: {}", e),
        }

        let value = (self.func)(args).await?;
        if let Err(e) = cache.set(&key, &value, self.ttl, None).await {
            warn!(function = %self.name, "Result not memoized: {}", e);
        }
        Ok(value)
    }
}

impl<A, T> std::fmt::Debug for Memoizer<A, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memoizer")
            .field("name", &self.name)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
