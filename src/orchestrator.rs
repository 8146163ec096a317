use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{error, info, warn};

use crate::error::PriceScoutError;
use crate::models::{PriceRecord, SearchCriteria, SourceId};
use crate::sources::PriceSource;

/// Callback invoked as each source settles (successfully or not)
pub type SourceDoneHook = Arc<dyn Fn(&SourceId) + Send + Sync>;

/// Fans one search out to every registered source concurrently.
///
/// The source set is fixed at construction; a failing source is isolated
/// and contributes zero records instead of aborting its siblings.
pub struct Orchestrator {
    sources: Vec<Arc<dyn PriceSource>>,
}

impl Orchestrator {
    pub fn new(sources: Vec<Arc<dyn PriceSource>>) -> Self {
        Self { sources }
    }

    /// Source ids in dispatch order
    pub fn source_ids(&self) -> Vec<SourceId> {
        self.sources.iter().map(|s| s.source_id()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub async fn fan_out(
        &self,
        criteria: &SearchCriteria,
    ) -> Result<BTreeMap<SourceId, Vec<PriceRecord>>, PriceScoutError> {
        self.fan_out_with(criteria, None).await
    }

    /// Dispatch one task per source and collect results keyed by source
    /// identity, so aggregation is independent of completion order. Returns
    /// only once every dispatched task has settled.
    pub async fn fan_out_with(
        &self,
        criteria: &SearchCriteria,
        on_source_done: Option<SourceDoneHook>,
    ) -> Result<BTreeMap<SourceId, Vec<PriceRecord>>, PriceScoutError> {
        info!("Starting search across {} sources", self.sources.len());

        let handles: Vec<_> = self
            .sources
            .iter()
            .map(|source| {
                let source = Arc::clone(source);
                let criteria = criteria.clone();
                tokio::spawn(async move {
                    let id = source.source_id();
                    let result = source.search(&criteria).await;
                    (id, result)
                })
            })
            .collect();

        let mut by_source = BTreeMap::new();

        for (index, joined) in join_all(handles).await.into_iter().enumerate() {
            match joined {
                Ok((id, Ok(records))) => {
                    info!("Found {} results from {}", records.len(), id);
                    if let Some(hook) = &on_source_done {
                        hook(&id);
                    }
                    if !records.is_empty() {
                        by_source.insert(id, records);
                    }
                }
                Ok((id, Err(e))) => {
                    warn!("Error searching {}: {}", id, e);
                    if let Some(hook) = &on_source_done {
                        hook(&id);
                    }
                }
                Err(join_error) if join_error.is_panic() => {
                    // A panicking source is still an isolated source failure
                    let id = self.sources[index].source_id();
                    error!("Source task for {} panicked", id);
                    if let Some(hook) = &on_source_done {
                        hook(&id);
                    }
                }
                Err(join_error) => {
                    // Cancellation means the fan-out machinery itself faulted
                    return Err(PriceScoutError::OrchestrationFault(
                        join_error.to_string(),
                    ));
                }
            }
        }

        let total: usize = by_source.values().map(Vec::len).sum();
        info!("Total results found: {}", total);

        Ok(by_source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{FailingSource, FixtureSource};
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn criteria() -> SearchCriteria {
        SearchCriteria {
            name: "Grand Hotel".to_string(),
            city: "Paris".to_string(),
            state: None,
            country: "France".to_string(),
            checkin: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            checkout: NaiveDate::from_ymd_opt(2025, 6, 3).unwrap(),
            latitude: None,
            longitude: None,
        }
    }

    fn fixture(name: &str, count: usize) -> Arc<FixtureSource> {
        let id = SourceId::new(name);
        Arc::new(FixtureSource::new(
            id.clone(),
            FixtureSource::sample_records(&id, count),
        ))
    }

    #[tokio::test]
    async fn collects_results_keyed_by_source() {
        let orchestrator = Orchestrator::new(vec![
            fixture("airbnb", 2),
            fixture("booking", 3),
        ]);

        let by_source = orchestrator.fan_out(&criteria()).await.unwrap();
        assert_eq!(by_source.len(), 2);
        assert_eq!(by_source[&SourceId::new("airbnb")].len(), 2);
        assert_eq!(by_source[&SourceId::new("booking")].len(), 3);
    }

    #[tokio::test]
    async fn one_failing_source_does_not_abort_siblings() {
        let orchestrator = Orchestrator::new(vec![
            fixture("airbnb", 2),
            Arc::new(FailingSource::new(SourceId::new("booking"))),
            fixture("vrbo", 1),
        ]);

        let by_source = orchestrator.fan_out(&criteria()).await.unwrap();
        assert_eq!(by_source.len(), 2);
        assert!(!by_source.contains_key(&SourceId::new("booking")));

        let total: usize = by_source.values().map(Vec::len).sum();
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn hook_fires_once_per_source_including_failures() {
        let orchestrator = Orchestrator::new(vec![
            fixture("airbnb", 1),
            Arc::new(FailingSource::new(SourceId::new("booking"))),
            fixture("vrbo", 1),
        ]);

        let fired = Arc::new(AtomicUsize::new(0));
        let hook: SourceDoneHook = {
            let fired = Arc::clone(&fired);
            Arc::new(move |_id| {
                fired.fetch_add(1, Ordering::SeqCst);
            })
        };

        orchestrator
            .fan_out_with(&criteria(), Some(hook))
            .await
            .unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn completion_order_does_not_affect_aggregation() {
        // The slow source is dispatched first but finishes last
        let slow = {
            let id = SourceId::new("airbnb");
            Arc::new(
                FixtureSource::new(id.clone(), FixtureSource::sample_records(&id, 2))
                    .with_delay(Duration::from_millis(50)),
            )
        };
        let orchestrator = Orchestrator::new(vec![slow, fixture("booking", 1)]);

        let by_source = orchestrator.fan_out(&criteria()).await.unwrap();
        let ids: Vec<_> = by_source.keys().map(|id| id.as_str().to_string()).collect();
        assert_eq!(ids, vec!["airbnb", "booking"]);
    }

    #[tokio::test]
    async fn empty_registry_yields_empty_aggregate() {
        let orchestrator = Orchestrator::new(Vec::new());
        let by_source = orchestrator.fan_out(&criteria()).await.unwrap();
        assert!(by_source.is_empty());
    }
}
