use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::broadcast::{Broadcaster, UpdateMessage};
use crate::config::Config;
use crate::error::PriceScoutError;
use crate::jobs::{JobRegistry, JobResult, JobState, JobStatus};
use crate::models::{AggregateResult, PriceRecord, SearchCriteria, SourceId};
use crate::orchestrator::{Orchestrator, SourceDoneHook};
use crate::store::{DocumentStore, StoreGateway};

/// Response to a search submission: either data served straight from the
/// cache/store, or a freshly scheduled job to follow
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SearchOutcome {
    Cached {
        total_results: usize,
        cached_at: DateTime<Utc>,
    },
    Scheduled {
        job_id: Uuid,
    },
}

/// One subscriber's view of a job's update stream. Connect-time messages
/// (the status snapshot and, for finished jobs, the terminal replay) are
/// delivered to this subscriber only, then the shared channel takes over.
pub struct JobUpdates {
    prelude: VecDeque<UpdateMessage>,
    rx: broadcast::Receiver<UpdateMessage>,
}

impl JobUpdates {
    /// Next update, ending with `RecvError::Closed` once the job's channel
    /// is closed and drained
    pub async fn recv(&mut self) -> Result<UpdateMessage, broadcast::error::RecvError> {
        if let Some(message) = self.prelude.pop_front() {
            return Ok(message);
        }
        self.rx.recv().await
    }
}

struct Inner {
    config: Config,
    orchestrator: Orchestrator,
    gateway: StoreGateway,
    registry: JobRegistry,
    broadcaster: Broadcaster,
}

/// Front door of the crawler: validates criteria, serves cache/store hits,
/// schedules jobs for misses, and pushes updates to subscribers as jobs
/// progress. All collaborators are injected at construction.
#[derive(Clone)]
pub struct PriceService {
    inner: Arc<Inner>,
}

impl PriceService {
    pub fn new(config: Config, orchestrator: Orchestrator, store: Arc<dyn DocumentStore>) -> Self {
        let gateway = StoreGateway::new(config.cache_ttl(), store);
        Self::with_gateway(config, orchestrator, gateway)
    }

    pub fn with_gateway(config: Config, orchestrator: Orchestrator, gateway: StoreGateway) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                orchestrator,
                gateway,
                registry: JobRegistry::new(),
                broadcaster: Broadcaster::new(),
            }),
        }
    }

    /// Submit a search. A cache or store hit answers immediately; a miss
    /// creates a pending job and runs the fan-out in the background.
    pub async fn submit(&self, criteria: SearchCriteria) -> Result<SearchOutcome, PriceScoutError> {
        criteria.validate()?;

        if let Some(hit) = self.inner.gateway.lookup(&criteria) {
            info!(
                "Returning cached results for {} in {}",
                criteria.name, criteria.city
            );
            return Ok(SearchOutcome::Cached {
                total_results: hit.total_results,
                cached_at: hit.aggregated_at,
            });
        }

        let job = self
            .inner
            .registry
            .create(criteria.clone(), self.inner.orchestrator.len());
        let job_id = job.id;

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            run_job(inner, job_id, criteria).await;
        });

        Ok(SearchOutcome::Scheduled { job_id })
    }

    pub fn status(&self, job_id: Uuid) -> Result<JobStatus, PriceScoutError> {
        self.inner.registry.status(job_id)
    }

    pub fn result(&self, job_id: Uuid) -> Result<JobResult, PriceScoutError> {
        self.inner.registry.result(job_id)
    }

    /// Most recent stored aggregate for the given criteria, from cache or
    /// the durable store
    pub fn history(&self, criteria: &SearchCriteria) -> Result<AggregateResult, PriceScoutError> {
        criteria.validate()?;
        self.inner
            .gateway
            .lookup(criteria)
            .ok_or(PriceScoutError::HistoryNotFound)
    }

    /// Subscribe to a job's realtime updates. The current status snapshot
    /// is delivered immediately on connect; subscribing to a finished job
    /// replays the terminal message and ends the stream right away.
    pub fn subscribe(&self, job_id: Uuid) -> Result<JobUpdates, PriceScoutError> {
        let status = self.inner.registry.status(job_id)?;
        let mut prelude = VecDeque::new();
        prelude.push_back(UpdateMessage::status(&status));

        if status.state.is_terminal() {
            // Do not reopen a channel for a finished job; hand the
            // subscriber a stream that ends after the replay
            if let Some(terminal) = self.terminal_message(job_id) {
                prelude.push_back(terminal);
            }
            let (_tx, rx) = broadcast::channel(1);
            return Ok(JobUpdates { prelude, rx });
        }

        let rx = self.inner.broadcaster.subscribe(job_id);

        // The job may have finished between the status read and the
        // subscription; the channel it left behind must still end
        if let Some(job) = self.inner.registry.get(job_id) {
            if job.state.is_terminal() {
                if let Some(terminal) = self.terminal_message(job_id) {
                    prelude.push_back(terminal);
                }
                self.inner.broadcaster.close(job_id);
            }
        }

        Ok(JobUpdates { prelude, rx })
    }

    fn terminal_message(&self, job_id: Uuid) -> Option<UpdateMessage> {
        let job = self.inner.registry.get(job_id)?;
        match job.state {
            JobState::Completed => Some(UpdateMessage::Completed {
                job_id,
                total_results: job.records.len(),
            }),
            JobState::Failed => Some(UpdateMessage::Failed {
                job_id,
                error: job
                    .error
                    .unwrap_or_else(|| "unknown failure".to_string()),
            }),
            _ => None,
        }
    }

    pub fn available_sources(&self) -> Vec<SourceId> {
        self.inner.orchestrator.source_ids()
    }

    /// Sweep terminal jobs older than the configured max age
    pub fn evict_stale_jobs(&self) -> usize {
        self.inner
            .registry
            .evict_older_than(self.inner.config.job_max_age())
    }

    pub fn job_count(&self) -> usize {
        self.inner.registry.len()
    }
}

async fn run_job(inner: Arc<Inner>, job_id: Uuid, criteria: SearchCriteria) {
    inner.registry.mark_running(job_id);
    publish_status(&inner, job_id);

    let hook: SourceDoneHook = {
        let inner = Arc::clone(&inner);
        Arc::new(move |_source: &SourceId| {
            inner.registry.source_completed(job_id);
            publish_status(&inner, job_id);
        })
    };

    match inner.orchestrator.fan_out_with(&criteria, Some(hook)).await {
        Ok(by_source) => {
            let aggregate = AggregateResult::new(criteria.clone(), by_source, job_id);
            let summary = inner.gateway.persist(&aggregate);
            if summary.degraded() {
                warn!("Persistence degraded for job {}", job_id);
            }

            let records = flatten_in_dispatch_order(&inner.orchestrator, &aggregate);
            inner.registry.complete(job_id, records.clone());

            for record in &records {
                inner.broadcaster.publish(
                    job_id,
                    UpdateMessage::price_update(job_id, &criteria, record),
                );
            }
            inner.broadcaster.publish(
                job_id,
                UpdateMessage::Completed {
                    job_id,
                    total_results: records.len(),
                },
            );
            inner.broadcaster.close(job_id);
        }
        Err(e) => {
            inner.registry.fail(job_id, e.to_string());
            inner.broadcaster.publish(
                job_id,
                UpdateMessage::Failed {
                    job_id,
                    error: e.to_string(),
                },
            );
            inner.broadcaster.close(job_id);
        }
    }
}

fn publish_status(inner: &Inner, job_id: Uuid) {
    if let Ok(status) = inner.registry.status(job_id) {
        inner
            .broadcaster
            .publish(job_id, UpdateMessage::status(&status));
    }
}

/// Concatenate grouped records following the orchestrator's dispatch order,
/// independent of which source finished first
fn flatten_in_dispatch_order(
    orchestrator: &Orchestrator,
    aggregate: &AggregateResult,
) -> Vec<PriceRecord> {
    let mut records = Vec::new();
    for id in orchestrator.source_ids() {
        records.extend_from_slice(aggregate.records_for(&id));
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::jobs::JobState;
    use crate::sources::{FailingSource, FixtureSource, PriceSource};
    use crate::store::MemoryStore;
    use chrono::NaiveDate;
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
        Arc::new(
            FixtureSource::new(id.clone(), FixtureSource::sample_records(&id, count))
                .with_delay(Duration::from_millis(20)),
        )
    }

    fn service_with(sources: Vec<Arc<dyn PriceSource>>) -> PriceService {
        PriceService::new(
            Config::default(),
            Orchestrator::new(sources),
            Arc::new(MemoryStore::new()),
        )
    }

    async fn wait_until_completed(service: &PriceService, job_id: Uuid) {
        for _ in 0..200 {
            if service.status(job_id).unwrap().state == JobState::Completed {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {} did not complete in time", job_id);
    }

    struct BrokenStore;

    impl DocumentStore for BrokenStore {
        fn insert(&self, _record: AggregateResult) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }

        fn most_recent(
            &self,
            _criteria: &SearchCriteria,
        ) -> Result<Option<AggregateResult>, StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }
    }

    #[tokio::test]
    async fn invalid_criteria_never_reach_job_creation() {
        let service = service_with(vec![fixture("airbnb", 1)]);

        let mut invalid = criteria();
        invalid.checkout = invalid.checkin;
        let outcome = service.submit(invalid).await;

        assert!(matches!(outcome, Err(PriceScoutError::Validation(_))));
        assert_eq!(service.job_count(), 0);
    }

    #[tokio::test]
    async fn one_failing_source_still_completes_the_job() {
        // Three sources, B fails: records come from A and C only
        let a = fixture("airbnb", 2);
        let c = fixture("vrbo", 3);
        let service = service_with(vec![
            a.clone(),
            Arc::new(FailingSource::new(SourceId::new("booking"))),
            c.clone(),
        ]);

        let outcome = service.submit(criteria()).await.unwrap();
        let job_id = match outcome {
            SearchOutcome::Scheduled { job_id } => job_id,
            other => panic!("expected scheduled job, got {:?}", other),
        };

        assert_eq!(service.status(job_id).unwrap().total_sources, 3);
        wait_until_completed(&service, job_id).await;

        let status = service.status(job_id).unwrap();
        assert_eq!(status.progress, 100.0);
        assert_eq!(status.completed_sources, 3);

        let result = service.result(job_id).unwrap();
        assert_eq!(result.total_results, 5);
        assert!(result
            .records
            .iter()
            .all(|r| r.source.as_str() != "booking"));
    }

    #[tokio::test]
    async fn repeat_search_hits_the_cache_without_new_work() {
        let a = fixture("airbnb", 2);
        let service = service_with(vec![a.clone()]);

        let job_id = match service.submit(criteria()).await.unwrap() {
            SearchOutcome::Scheduled { job_id } => job_id,
            other => panic!("expected scheduled job, got {:?}", other),
        };
        wait_until_completed(&service, job_id).await;
        assert_eq!(a.call_count(), 1);

        // Same query with incidental formatting differences
        let mut again = criteria();
        again.name = "  grand   HOTEL ".to_string();
        match service.submit(again).await.unwrap() {
            SearchOutcome::Cached { total_results, .. } => assert_eq!(total_results, 2),
            other => panic!("expected cache hit, got {:?}", other),
        }

        // No new job, no adapter invocation
        assert_eq!(service.job_count(), 1);
        assert_eq!(a.call_count(), 1);
    }

    #[tokio::test]
    async fn expired_cache_falls_back_to_the_store() {
        let a = fixture("airbnb", 2);
        let config = Config::default();
        let gateway = StoreGateway::new(Duration::from_millis(30), Arc::new(MemoryStore::new()));
        let service = PriceService::with_gateway(
            config,
            Orchestrator::new(vec![a.clone()]),
            gateway,
        );

        let job_id = match service.submit(criteria()).await.unwrap() {
            SearchOutcome::Scheduled { job_id } => job_id,
            other => panic!("expected scheduled job, got {:?}", other),
        };
        wait_until_completed(&service, job_id).await;

        tokio::time::sleep(Duration::from_millis(50)).await;

        // Cache expired; the store still answers and no new job is created
        match service.submit(criteria()).await.unwrap() {
            SearchOutcome::Cached { total_results, .. } => assert_eq!(total_results, 2),
            other => panic!("expected store-backed hit, got {:?}", other),
        }
        assert_eq!(a.call_count(), 1);
    }

    #[tokio::test]
    async fn missing_both_tiers_triggers_fresh_orchestration() {
        let a = fixture("airbnb", 2);
        let gateway = StoreGateway::new(Duration::from_millis(30), Arc::new(BrokenStore));
        let service = PriceService::with_gateway(
            Config::default(),
            Orchestrator::new(vec![a.clone()]),
            gateway,
        );

        let first = match service.submit(criteria()).await.unwrap() {
            SearchOutcome::Scheduled { job_id } => job_id,
            other => panic!("expected scheduled job, got {:?}", other),
        };
        wait_until_completed(&service, first).await;

        tokio::time::sleep(Duration::from_millis(50)).await;

        // Cache expired and the store is broken: full re-crawl
        let second = match service.submit(criteria()).await.unwrap() {
            SearchOutcome::Scheduled { job_id } => job_id,
            other => panic!("expected new job, got {:?}", other),
        };
        assert_ne!(second, first);
        wait_until_completed(&service, second).await;

        assert_eq!(service.job_count(), 2);
        assert_eq!(a.call_count(), 2);
    }

    #[tokio::test]
    async fn subscriber_sees_status_prices_and_terminal_message() {
        let service = service_with(vec![fixture("airbnb", 2), fixture("booking", 1)]);

        let job_id = match service.submit(criteria()).await.unwrap() {
            SearchOutcome::Scheduled { job_id } => job_id,
            other => panic!("expected scheduled job, got {:?}", other),
        };

        let mut rx = service.subscribe(job_id).unwrap();
        let mut statuses = 0;
        let mut prices = 0;
        let mut completed = None;

        while let Ok(message) = rx.recv().await {
            match message {
                UpdateMessage::Status { .. } => statuses += 1,
                UpdateMessage::PriceUpdate { city, source, .. } => {
                    assert_eq!(city, "Paris");
                    assert!(source == "airbnb" || source == "booking");
                    prices += 1;
                }
                UpdateMessage::Completed { total_results, .. } => {
                    completed = Some(total_results);
                }
                UpdateMessage::Failed { error, .. } => panic!("job failed: {}", error),
            }
        }

        assert!(statuses >= 1, "connect snapshot missing");
        assert_eq!(prices, 3);
        assert_eq!(completed, Some(3));
    }

    #[tokio::test]
    async fn subscribing_after_completion_replays_terminal_state() {
        let service = service_with(vec![fixture("airbnb", 2)]);

        let job_id = match service.submit(criteria()).await.unwrap() {
            SearchOutcome::Scheduled { job_id } => job_id,
            other => panic!("expected scheduled job, got {:?}", other),
        };
        wait_until_completed(&service, job_id).await;

        // Late subscriber: snapshot, terminal replay, then the stream ends
        let mut rx = service.subscribe(job_id).unwrap();

        match rx.recv().await.unwrap() {
            UpdateMessage::Status { state, progress, .. } => {
                assert_eq!(state, JobState::Completed);
                assert_eq!(progress, 100.0);
            }
            other => panic!("expected status snapshot, got {:?}", other),
        }
        match rx.recv().await.unwrap() {
            UpdateMessage::Completed { total_results, .. } => {
                assert_eq!(total_results, 2)
            }
            other => panic!("expected terminal message, got {:?}", other),
        }
        assert!(rx.recv().await.is_err(), "stream did not end");

        // No channel is left behind for the finished job
        assert_eq!(service.inner.broadcaster.channel_count(), 0);
    }

    #[tokio::test]
    async fn connect_snapshot_is_not_echoed_to_other_subscribers() {
        let service = service_with(vec![fixture("airbnb", 1)]);

        let job_id = match service.submit(criteria()).await.unwrap() {
            SearchOutcome::Scheduled { job_id } => job_id,
            other => panic!("expected scheduled job, got {:?}", other),
        };

        let mut first = service.subscribe(job_id).unwrap();
        let _second = service.subscribe(job_id).unwrap();
        wait_until_completed(&service, job_id).await;

        // The first subscriber sees its own snapshot plus the two shared
        // status updates (running, source settled), nothing from the
        // second subscriber's connect
        let mut statuses = 0;
        while let Ok(message) = first.recv().await {
            if matches!(message, UpdateMessage::Status { .. }) {
                statuses += 1;
            }
        }
        assert_eq!(statuses, 3);
    }

    #[tokio::test]
    async fn history_answers_from_persisted_data() {
        let service = service_with(vec![fixture("airbnb", 2)]);

        assert!(matches!(
            service.history(&criteria()),
            Err(PriceScoutError::HistoryNotFound)
        ));

        let job_id = match service.submit(criteria()).await.unwrap() {
            SearchOutcome::Scheduled { job_id } => job_id,
            other => panic!("expected scheduled job, got {:?}", other),
        };
        wait_until_completed(&service, job_id).await;

        let aggregate = service.history(&criteria()).unwrap();
        assert_eq!(aggregate.total_results, 2);
        assert_eq!(aggregate.job_id, job_id);
    }

    #[tokio::test]
    async fn unknown_job_queries_fail_with_not_found() {
        let service = service_with(vec![fixture("airbnb", 1)]);
        let missing = Uuid::new_v4();

        assert!(matches!(
            service.status(missing),
            Err(PriceScoutError::JobNotFound(_))
        ));
        assert!(matches!(
            service.subscribe(missing),
            Err(PriceScoutError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn result_before_completion_is_rejected() {
        // A slow source keeps the job running long enough to observe it
        let slow = {
            let id = SourceId::new("airbnb");
            Arc::new(
                FixtureSource::new(id.clone(), FixtureSource::sample_records(&id, 1))
                    .with_delay(Duration::from_millis(200)),
            )
        };
        let service = service_with(vec![slow]);

        let job_id = match service.submit(criteria()).await.unwrap() {
            SearchOutcome::Scheduled { job_id } => job_id,
            other => panic!("expected scheduled job, got {:?}", other),
        };

        assert!(matches!(
            service.result(job_id),
            Err(PriceScoutError::InvalidState(_))
        ));
        wait_until_completed(&service, job_id).await;
        assert!(service.result(job_id).is_ok());
    }

    #[tokio::test]
    async fn stale_terminal_jobs_are_evicted() {
        let mut config = Config::default();
        config.job_max_age_secs = 0;
        let service = PriceService::new(
            config,
            Orchestrator::new(vec![fixture("airbnb", 1)]),
            Arc::new(MemoryStore::new()),
        );

        let job_id = match service.submit(criteria()).await.unwrap() {
            SearchOutcome::Scheduled { job_id } => job_id,
            other => panic!("expected scheduled job, got {:?}", other),
        };
        wait_until_completed(&service, job_id).await;

        assert_eq!(service.evict_stale_jobs(), 1);
        assert_eq!(service.job_count(), 0);
    }
}
