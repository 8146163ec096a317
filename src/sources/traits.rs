use async_trait::async_trait;

use crate::error::SourceError;
use crate::models::{PriceRecord, SearchCriteria, SourceId};
use crate::sources::extract::Listing;

/// Common trait for all price sources
/// Every source is interchangeable from the orchestrator's perspective
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetch price records for the given criteria from this source
    async fn search(&self, criteria: &SearchCriteria) -> Result<Vec<PriceRecord>, SourceError>;

    /// Stable identifier of the source
    fn source_id(&self) -> SourceId;
}

/// Extraction of candidate listings from a raw page is source-specific and
/// swappable. Implementations skip malformed items instead of erroring.
pub trait Extractor: Send + Sync {
    fn extract(&self, html: &str, criteria: &SearchCriteria) -> Vec<Listing>;
}
