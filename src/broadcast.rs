use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::jobs::{JobState, JobStatus};
use crate::models::{PriceRecord, SearchCriteria};

/// Normalized realtime update pushed to subscribers of one job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdateMessage {
    Status {
        job_id: Uuid,
        state: JobState,
        progress: f64,
        completed_sources: usize,
        total_sources: usize,
    },
    PriceUpdate {
        job_id: Uuid,
        source: String,
        property_name: String,
        city: String,
        state: Option<String>,
        country: String,
        latitude: Option<f64>,
        longitude: Option<f64>,
        amount: f64,
        currency: String,
        available: bool,
        fetched_at: chrono::DateTime<chrono::Utc>,
    },
    Completed {
        job_id: Uuid,
        total_results: usize,
    },
    Failed {
        job_id: Uuid,
        error: String,
    },
}

impl UpdateMessage {
    pub fn status(status: &JobStatus) -> Self {
        UpdateMessage::Status {
            job_id: status.job_id,
            state: status.state,
            progress: status.progress,
            completed_sources: status.completed_sources,
            total_sources: status.total_sources,
        }
    }

    pub fn price_update(job_id: Uuid, criteria: &SearchCriteria, record: &PriceRecord) -> Self {
        UpdateMessage::PriceUpdate {
            job_id,
            source: record.source.as_str().to_string(),
            property_name: record.property_name.clone(),
            city: criteria.city.clone(),
            state: criteria.state.clone(),
            country: criteria.country.clone(),
            latitude: criteria.latitude,
            longitude: criteria.longitude,
            amount: record.price,
            currency: record.currency.clone(),
            available: record.available,
            fetched_at: record.fetched_at,
        }
    }
}

/// Per-job pub/sub hub for realtime updates.
///
/// No buffering beyond the channel's ring: an update published with no
/// subscribers is dropped for realtime purposes and remains reachable via
/// the terminal job result and the persisted aggregate. A slow or
/// disconnected subscriber never affects delivery to the others.
pub struct Broadcaster {
    channels: RwLock<HashMap<Uuid, broadcast::Sender<UpdateMessage>>>,
    capacity: usize,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Subscribe to a job's updates, creating the channel if needed
    pub fn subscribe(&self, job_id: Uuid) -> broadcast::Receiver<UpdateMessage> {
        let mut channels = self.channels.write();
        channels
            .entry(job_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Deliver a message to every current subscriber of the job. Returns
    /// the number of listeners it reached.
    pub fn publish(&self, job_id: Uuid, message: UpdateMessage) -> usize {
        let channels = self.channels.read();
        match channels.get(&job_id) {
            Some(tx) => match tx.send(message) {
                Ok(receivers) => receivers,
                Err(_) => {
                    // All receivers are gone; drop the update
                    debug!("No live subscribers for job {}", job_id);
                    0
                }
            },
            None => 0,
        }
    }

    /// Close a job's channel after the terminal message. Subscribers see
    /// the stream end once they have drained it.
    pub fn close(&self, job_id: Uuid) {
        self.channels.write().remove(&job_id);
    }

    /// Drop channels nobody listens to anymore
    pub fn cleanup(&self) {
        self.channels
            .write()
            .retain(|_, tx| tx.receiver_count() > 0);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.read().len()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}
