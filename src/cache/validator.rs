//! Key and Value Validation
//!
//! Keys are restricted to `[A-Za-z0-9_.-]` with a bounded length. Values are
//! limited by their serialized size, before any compression.
//! Suspicious but otherwise legal keys (path traversal) are logged.

use regex::Regex;
use tracing::warn;

use crate::error::{Error, Result};

/// Length of keys shown in logs and audit records
const DISPLAY_KEY_LEN: usize = 64;

/// Validation limits
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Maximum key length in characters
    pub max_key_length: usize,
    /// Maximum serialized value size in bytes
    pub max_value_bytes: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_key_length: 256,
            max_value_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Key/value validator
#[derive(Debug, Clone, Default)]
pub struct Validator {
    config: ValidatorConfig,
}

impl Validator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Validate a cache key
    pub fn validate_key(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(Error::validation(key, "key is empty"));
        }

        let len = key.chars().count();
        if len > self.config.max_key_length {
            return Err(Error::validation(
                &display_key(key),
                format!("key length {} exceeds {}", len, self.config.max_key_length),
            ));
        }

        if let Some(bad) = key.chars().find(|c| !is_key_char(*c)) {
            return Err(Error::validation(
                &display_key(key),
                format!("invalid character {:?}", bad),
            ));
        }

        if key.contains("..") {
            warn!(key = %display_key(key), "Cache key contains path traversal sequence");
        }

        Ok(())
    }

    /// Validate the serialized size of a value
    pub fn validate_value_size(&self, key: &str, size: usize) -> Result<()> {
        if size > self.config.max_value_bytes {
            return Err(Error::validation(
                &display_key(key),
                format!(
                    "value size {} exceeds {} bytes",
                    size, self.config.max_value_bytes
                ),
            ));
        }
        Ok(())
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }
}

#[inline]
fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

/// Shorten a key for logs and audit records
pub fn display_key(key: &str) -> String {
    match key.char_indices().nth(DISPLAY_KEY_LEN) {
        Some((idx, _)) => format!("{}...", &key[..idx]),
        None => key.to_string(),
    }
}

// =============================================================================
// Key Patterns
// =============================================================================

/// Glob pattern over cache keys
///
/// `*` matches any run, `?` any single char and `\` makes the next char
/// literal. Everything else, brackets included, is literal.
#[derive(Debug, Clone)]
pub struct KeyPattern {
    glob: String,
    regex: Regex,
    remote_glob: String,
}

impl KeyPattern {
    /// Compile a glob pattern
    pub fn new(glob: &str) -> Result<Self> {
        let mut pattern = String::with_capacity(glob.len() + 8);
        let mut remote_glob = String::with_capacity(glob.len() + 4);
        pattern.push('^');
        let mut buf = [0u8; 4];
        let mut chars = glob.chars();
        while let Some(c) = chars.next() {
            let literal = match c {
                '*' | '?' => {
                    pattern.push_str(if c == '*' { ".*" } else { "." });
                    remote_glob.push(c);
                    continue;
                }
                // A trailing backslash is itself literal
                '\\' => chars.next().unwrap_or('\\'),
                other => other,
            };
            pattern.push_str(&regex::escape(literal.encode_utf8(&mut buf)));
            // Redis MATCH treats these as glob syntax
            if matches!(literal, '*' | '?' | '[' | ']' | '\\') {
                remote_glob.push('\\');
            }
            remote_glob.push(literal);
        }
        pattern.push('$');

        let regex = Regex::new(&pattern)
            .map_err(|e| Error::Config(format!("invalid key pattern '{}': {}", glob, e)))?;
        Ok(Self {
            glob: glob.to_string(),
            regex,
            remote_glob,
        })
    }

    /// The same pattern in Redis `SCAN MATCH` syntax
    pub fn remote_glob(&self) -> &str {
        &self.remote_glob
    }

    /// Whether the pattern matches every key
    pub fn is_match_all(&self) -> bool {
        !self.glob.is_empty() && self.glob.chars().all(|c| c == '*')
    }

    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }

    /// The original glob
    pub fn as_glob(&self) -> &str {
        &self.glob
    }
}
