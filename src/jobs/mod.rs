use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::PriceScoutError;
use crate::models::{PriceRecord, SearchCriteria};

/// Lifecycle states of an asynchronous search job.
/// Pending -> Running -> {Completed, Failed}; terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// The tracked unit of asynchronous work for one non-cached search
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub criteria: SearchCriteria,
    pub state: JobState,
    pub total_sources: usize,
    pub completed_sources: usize,
    pub records: Vec<PriceRecord>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock execution time, recorded on terminal transition
    pub elapsed_secs: Option<f64>,
    pub error: Option<String>,
}

impl Job {
    fn new(criteria: SearchCriteria, total_sources: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            criteria,
            state: JobState::Pending,
            total_sources,
            completed_sources: 0,
            records: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
            elapsed_secs: None,
            error: None,
        }
    }

    /// Progress in percent. The full 100 is reserved for the completed
    /// state so a status read never observes 100 on a live job.
    pub fn progress(&self) -> f64 {
        match self.state {
            JobState::Completed => 100.0,
            _ if self.total_sources == 0 => 0.0,
            _ => {
                let pct = 100.0 * self.completed_sources as f64 / self.total_sources as f64;
                pct.min(99.0)
            }
        }
    }

    fn elapsed_since_creation(&self) -> f64 {
        (Utc::now() - self.created_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Point-in-time view returned by status queries
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub job_id: Uuid,
    pub state: JobState,
    pub progress: f64,
    pub total_sources: usize,
    pub completed_sources: usize,
    pub created_at: DateTime<Utc>,
}

/// Full outcome of a completed job
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub job_id: Uuid,
    pub criteria: SearchCriteria,
    pub records: Vec<PriceRecord>,
    pub total_results: usize,
    pub completed_at: DateTime<Utc>,
    pub elapsed_secs: f64,
}

/// Registry of in-flight and recently finished jobs.
///
/// Transitions and progress updates are applied under the map's shard lock,
/// so a concurrent status read never observes a half-applied transition.
#[derive(Default)]
pub struct JobRegistry {
    jobs: DashMap<Uuid, Job>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a job in the pending state and return a snapshot of it
    pub fn create(&self, criteria: SearchCriteria, total_sources: usize) -> Job {
        let job = Job::new(criteria, total_sources);
        info!("Created job {} across {} sources", job.id, total_sources);
        self.jobs.insert(job.id, job.clone());
        job
    }

    pub fn mark_running(&self, id: Uuid) -> bool {
        match self.jobs.get_mut(&id) {
            Some(mut job) if job.state == JobState::Pending => {
                job.state = JobState::Running;
                true
            }
            Some(job) => {
                warn!("Ignoring running transition for job {} in {:?}", id, job.state);
                false
            }
            None => false,
        }
    }

    /// Record one more source as settled. Progress only moves forward.
    pub fn source_completed(&self, id: Uuid) {
        if let Some(mut job) = self.jobs.get_mut(&id) {
            if job.state == JobState::Running && job.completed_sources < job.total_sources {
                job.completed_sources += 1;
                debug!(
                    "Job {} progress: {}/{} sources",
                    id, job.completed_sources, job.total_sources
                );
            }
        }
    }

    pub fn complete(&self, id: Uuid, records: Vec<PriceRecord>) -> bool {
        match self.jobs.get_mut(&id) {
            Some(mut job) if job.state == JobState::Running => {
                job.completed_sources = job.total_sources;
                job.records = records;
                job.state = JobState::Completed;
                job.completed_at = Some(Utc::now());
                job.elapsed_secs = Some(job.elapsed_since_creation());
                info!(
                    "Job {} completed with {} results",
                    id,
                    job.records.len()
                );
                true
            }
            Some(job) => {
                warn!("Ignoring complete transition for job {} in {:?}", id, job.state);
                false
            }
            None => false,
        }
    }

    pub fn fail(&self, id: Uuid, error: String) -> bool {
        match self.jobs.get_mut(&id) {
            Some(mut job) if job.state == JobState::Running => {
                job.state = JobState::Failed;
                job.error = Some(error);
                job.completed_at = Some(Utc::now());
                job.elapsed_secs = Some(job.elapsed_since_creation());
                warn!("Job {} failed: {}", id, job.error.as_deref().unwrap_or(""));
                true
            }
            Some(job) => {
                warn!("Ignoring fail transition for job {} in {:?}", id, job.state);
                false
            }
            None => false,
        }
    }

    pub fn status(&self, id: Uuid) -> Result<JobStatus, PriceScoutError> {
        let job = self
            .jobs
            .get(&id)
            .ok_or(PriceScoutError::JobNotFound(id))?;
        Ok(JobStatus {
            job_id: job.id,
            state: job.state,
            progress: job.progress(),
            total_sources: job.total_sources,
            completed_sources: job.completed_sources,
            created_at: job.created_at,
        })
    }

    pub fn result(&self, id: Uuid) -> Result<JobResult, PriceScoutError> {
        let job = self
            .jobs
            .get(&id)
            .ok_or(PriceScoutError::JobNotFound(id))?;
        if job.state != JobState::Completed {
            return Err(PriceScoutError::InvalidState(id));
        }
        Ok(JobResult {
            job_id: job.id,
            criteria: job.criteria.clone(),
            records: job.records.clone(),
            total_results: job.records.len(),
            completed_at: job.completed_at.unwrap_or(job.created_at),
            elapsed_secs: job.elapsed_secs.unwrap_or(0.0),
        })
    }

    pub fn get(&self, id: Uuid) -> Option<Job> {
        self.jobs.get(&id).map(|job| job.clone())
    }

    /// Drop terminal jobs older than the given age so a long-running
    /// process does not accumulate job records without bound
    pub fn evict_older_than(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::hours(1));
        let before = self.jobs.len();
        self.jobs
            .retain(|_, job| !(job.state.is_terminal() && job.created_at < cutoff));
        let evicted = before - self.jobs.len();
        if evicted > 0 {
            info!("Evicted {} finished jobs", evicted);
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
