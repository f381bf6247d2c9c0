//! Cache Eviction Policies
//!
//! Victim selection for the local store. Each strategy orders candidates by a
//! key derived from the entry; the first `count` candidates are evicted.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rand::seq::IteratorRandom;
use serde::{Deserialize, Serialize};

use super::entry::CacheEntry;
use crate::error::Error;

/// Eviction strategy for the local store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvictionStrategy {
    /// Least recently used
    #[default]
    Lru,
    /// Least frequently used (ties broken by recency)
    Lfu,
    /// First in, first out
    Fifo,
    /// Uniformly random
    Random,
}

impl EvictionStrategy {
    /// All strategies
    pub const ALL: [EvictionStrategy; 4] = [
        EvictionStrategy::Lru,
        EvictionStrategy::Lfu,
        EvictionStrategy::Fifo,
        EvictionStrategy::Random,
    ];

    /// Get the canonical name
    pub fn name(&self) -> &'static str {
        match self {
            EvictionStrategy::Lru => "LRU",
            EvictionStrategy::Lfu => "LFU",
            EvictionStrategy::Fifo => "FIFO",
            EvictionStrategy::Random => "RANDOM",
        }
    }

    /// Pick up to `count` keys to evict from `entries`
    pub fn select_victims(&self, entries: &HashMap<String, CacheEntry>, count: usize) -> Vec<String> {
        if count == 0 || entries.is_empty() {
            return Vec::new();
        }

        if *self == EvictionStrategy::Random {
            let mut rng = rand::thread_rng();
            return entries
                .keys()
                .choose_multiple(&mut rng, count)
                .into_iter()
                .cloned()
                .collect();
        }

        let mut candidates: Vec<(&String, (u64, u64))> = entries
            .iter()
            .map(|(key, entry)| (key, self.rank(entry)))
            .collect();

        // Lowest rank goes first
        candidates.sort_by_key(|(_, rank)| *rank);
        candidates
            .into_iter()
            .take(count)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Ordering key for deterministic strategies (lower = evict sooner)
    fn rank(&self, entry: &CacheEntry) -> (u64, u64) {
        match self {
            EvictionStrategy::Lru => (entry.access_seq(), 0),
            EvictionStrategy::Lfu => (entry.hit_count(), entry.access_seq()),
            EvictionStrategy::Fifo => (entry.insert_seq(), 0),
            EvictionStrategy::Random => (0, 0),
        }
    }
}

impl fmt::Display for EvictionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EvictionStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LRU" => Ok(EvictionStrategy::Lru),
            "LFU" => Ok(EvictionStrategy::Lfu),
            "FIFO" => Ok(EvictionStrategy::Fifo),
            "RANDOM" => Ok(EvictionStrategy::Random),
            other => Err(Error::Config(format!("unknown eviction strategy: {}", other))),
        }
    }
}
