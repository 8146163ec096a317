use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::models::{AggregateResult, CacheKey, SearchCriteria};
use crate::store::cache::PriceCache;
use crate::store::document::DocumentStore;

/// Outcome of a dual-tier write. Either tier may fail independently; a
/// partial write is degraded but never fatal.
#[derive(Debug, Clone, Copy)]
pub struct PersistSummary {
    pub store_ok: bool,
    pub cache_ok: bool,
}

impl PersistSummary {
    pub fn degraded(&self) -> bool {
        !(self.store_ok && self.cache_ok)
    }
}

/// Cache-then-store lookup and dual-tier write path.
pub struct StoreGateway {
    cache: PriceCache,
    store: Arc<dyn DocumentStore>,
}

impl StoreGateway {
    pub fn new(cache_ttl: Duration, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            cache: PriceCache::new(cache_ttl),
            store,
        }
    }

    /// Check the fast cache, then fall back to the durable store. `None`
    /// signals "absent" in both tiers and triggers orchestration upstream.
    pub fn lookup(&self, criteria: &SearchCriteria) -> Option<AggregateResult> {
        let key = CacheKey::from_criteria(criteria);

        if let Some(hit) = self.cache.get(&key) {
            return Some(hit);
        }

        match self.store.most_recent(criteria) {
            Ok(Some(record)) => {
                info!("Store hit for key: {}", key);
                Some(record)
            }
            Ok(None) => None,
            Err(e) => {
                // A store outage degrades a lookup to a miss
                warn!("Store lookup failed for {}: {}", key, e);
                None
            }
        }
    }

    /// Write the aggregate to both tiers. Each write is attempted
    /// regardless of how the other fares.
    pub fn persist(&self, aggregate: &AggregateResult) -> PersistSummary {
        let key = CacheKey::from_criteria(&aggregate.criteria);

        let store_ok = match self.store.insert(aggregate.clone()) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to persist {} to store: {}", key, e);
                false
            }
        };

        self.cache.put(&key, aggregate.clone());
        let cache_ok = true;

        if store_ok {
            info!(
                "Saved and cached {} results for key: {}",
                aggregate.total_results, key
            );
        } else {
            warn!("Partial save for {}: store={}, cache={}", key, store_ok, cache_ok);
        }

        PersistSummary { store_ok, cache_ok }
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}
