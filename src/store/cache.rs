use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::models::{AggregateResult, CacheKey};

struct CacheEntry {
    value: AggregateResult,
    expires_at: Instant,
}

/// Fast volatile tier: aggregates keyed by canonical cache key with a
/// fixed time-to-live. An expired entry behaves as absent on the next
/// lookup and is dropped then.
///
/// Reads and writes for different keys are independent (sharded map).
pub struct PriceCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl PriceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<AggregateResult> {
        let expired = match self.entries.get(key.as_str()) {
            Some(entry) => {
                if entry.expires_at > Instant::now() {
                    debug!("Cache hit for key: {}", key);
                    return Some(entry.value.clone());
                }
                true
            }
            None => false,
        };

        if expired {
            self.entries.remove(key.as_str());
        }
        debug!("Cache miss for key: {}", key);
        None
    }

    pub fn put(&self, key: &CacheKey, value: AggregateResult) {
        self.entries.insert(
            key.as_str().to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
