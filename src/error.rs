use thiserror::Error;
use uuid::Uuid;

use crate::models::SourceId;

/// Top-level error taxonomy exposed by the service layer
#[derive(Debug, Error)]
pub enum PriceScoutError {
    /// Malformed search criteria, rejected before any job is created
    #[error("invalid search criteria: {0}")]
    Validation(String),

    #[error("job {0} not found")]
    JobNotFound(Uuid),

    /// No cached or stored aggregate matches the given criteria
    #[error("no stored prices match the given criteria")]
    HistoryNotFound,

    /// Result requested before the job reached the completed state
    #[error("job {0} has not completed")]
    InvalidState(Uuid),

    /// A fault outside any single source's isolation boundary
    #[error("orchestration fault: {0}")]
    OrchestrationFault(String),
}

/// Errors raised by a single source adapter. These never propagate past
/// the orchestrator boundary.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{source_id} rate limited the request")]
    RateLimited { source_id: SourceId },

    #[error("transient failure from {source_id}: {message}")]
    Transient { source_id: SourceId, message: String },

    #[error("{source_id} exhausted {attempts} attempts: {last_error}")]
    Exhausted {
        source_id: SourceId,
        attempts: u32,
        last_error: String,
    },
}

impl SourceError {
    pub fn source_id(&self) -> &SourceId {
        match self {
            SourceError::RateLimited { source_id } => source_id,
            SourceError::Transient { source_id, .. } => source_id,
            SourceError::Exhausted { source_id, .. } => source_id,
        }
    }
}

/// Durable-store failures. Surfaced by the gateway as a degraded-persistence
/// flag, never as a job failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
