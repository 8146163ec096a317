pub mod broadcast;
pub mod config;
pub mod error;
pub mod jobs;
pub mod models;
pub mod orchestrator;
pub mod service;
pub mod sources;
pub mod store;

pub use broadcast::{Broadcaster, UpdateMessage};
pub use config::{Config, SourceConfig};
pub use error::{PriceScoutError, SourceError, StoreError};
pub use jobs::{JobRegistry, JobResult, JobState, JobStatus};
pub use models::{AggregateResult, CacheKey, PriceRecord, SearchCriteria, SourceId};
pub use orchestrator::Orchestrator;
pub use service::{JobUpdates, PriceService, SearchOutcome};
pub use sources::{FixtureSource, HttpSource, PriceSource, SelectorExtractor};
pub use store::{DocumentStore, MemoryStore, PriceCache, StoreGateway};
