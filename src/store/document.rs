use parking_lot::RwLock;

use crate::error::StoreError;
use crate::models::{AggregateResult, CacheKey, SearchCriteria};

/// Durable tier for aggregates. The backing engine only needs to support
/// insert and a most-recent point lookup by criteria-derived filter.
pub trait DocumentStore: Send + Sync {
    fn insert(&self, record: AggregateResult) -> Result<(), StoreError>;

    /// Most recently written aggregate whose criteria normalize to the same
    /// key fields as the given criteria
    fn most_recent(
        &self,
        criteria: &SearchCriteria,
    ) -> Result<Option<AggregateResult>, StoreError>;
}

/// In-memory document store. Stands in for an external document database
/// in the demo binary and tests.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<AggregateResult>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl DocumentStore for MemoryStore {
    fn insert(&self, record: AggregateResult) -> Result<(), StoreError> {
        self.records.write().push(record);
        Ok(())
    }

    fn most_recent(
        &self,
        criteria: &SearchCriteria,
    ) -> Result<Option<AggregateResult>, StoreError> {
        let key = CacheKey::from_criteria(criteria);
        let records = self.records.read();
        Ok(records
            .iter()
            .filter(|r| CacheKey::from_criteria(&r.criteria) == key)
            .max_by_key(|r| r.aggregated_at)
            .cloned())
    }
}
