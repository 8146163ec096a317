use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::SourceError;
use crate::models::{PriceRecord, SearchCriteria, SourceId};
use crate::sources::traits::PriceSource;

/// Source backed by canned records. Used by the demo binary and tests so
/// the rest of the pipeline can run without live sites.
pub struct FixtureSource {
    id: SourceId,
    records: Vec<PriceRecord>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FixtureSource {
    pub fn new(id: SourceId, records: Vec<PriceRecord>) -> Self {
        Self {
            id,
            records,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Simulate network latency before returning
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// How many times search() has been invoked
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Canned records attributed to the given source
    pub fn sample_records(id: &SourceId, count: usize) -> Vec<PriceRecord> {
        (0..count)
            .map(|i| PriceRecord {
                source: id.clone(),
                property_name: format!("Sample Property {}", i + 1),
                price: 89.0 + 10.0 * i as f64,
                currency: "USD".to_string(),
                available: true,
                url: Some(format!("https://{}.example.com/rooms/{}", id, i + 1)),
                rating: Some(7.5 + 0.5 * (i % 4) as f64),
                review_count: Some(40 + 13 * i as u32),
                amenities: Some(vec!["wifi".to_string(), "breakfast".to_string()]),
                image_url: None,
                fetched_at: Utc::now(),
            })
            .collect()
    }
}

#[async_trait]
impl PriceSource for FixtureSource {
    async fn search(&self, _criteria: &SearchCriteria) -> Result<Vec<PriceRecord>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.records.clone())
    }

    fn source_id(&self) -> SourceId {
        self.id.clone()
    }
}

/// Source that always fails after pretending to exhaust its retries
pub struct FailingSource {
    id: SourceId,
}

impl FailingSource {
    pub fn new(id: SourceId) -> Self {
        Self { id }
    }
}

#[async_trait]
impl PriceSource for FailingSource {
    async fn search(&self, _criteria: &SearchCriteria) -> Result<Vec<PriceRecord>, SourceError> {
        Err(SourceError::Exhausted {
            source_id: self.id.clone(),
            attempts: 3,
            last_error: "connection refused".to_string(),
        })
    }

    fn source_id(&self) -> SourceId {
        self.id.clone()
    }
}
