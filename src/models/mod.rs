use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PriceScoutError;

/// Identifier of a pricing data source (platform)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Search criteria for a price lookup. Immutable once a job is created from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCriteria {
    /// Name of the hotel/property
    pub name: String,
    pub city: String,
    pub state: Option<String>,
    pub country: String,
    pub checkin: NaiveDate,
    pub checkout: NaiveDate,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl SearchCriteria {
    /// Reject malformed criteria before any job is created from them
    pub fn validate(&self) -> Result<(), PriceScoutError> {
        if self.checkout <= self.checkin {
            return Err(PriceScoutError::Validation(
                "checkout date must be after checkin date".to_string(),
            ));
        }
        if let Some(lat) = self.latitude {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(PriceScoutError::Validation(
                    "latitude must be between -90 and 90".to_string(),
                ));
            }
        }
        if let Some(lon) = self.longitude {
            if !(-180.0..=180.0).contains(&lon) {
                return Err(PriceScoutError::Validation(
                    "longitude must be between -180 and 180".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// A single price observation produced by one source. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceRecord {
    pub source: SourceId,
    pub property_name: String,
    pub price: f64,
    pub currency: String,
    pub available: bool,
    pub url: Option<String>,
    /// Rating normalized to 0-10
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub amenities: Option<Vec<String>>,
    pub image_url: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

/// Consolidated outcome of one search across all sources.
/// This is the unit that gets cached and persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateResult {
    pub criteria: SearchCriteria,
    pub prices_by_source: BTreeMap<SourceId, Vec<PriceRecord>>,
    pub total_results: usize,
    pub aggregated_at: DateTime<Utc>,
    pub job_id: Uuid,
}

impl AggregateResult {
    pub fn new(
        criteria: SearchCriteria,
        prices_by_source: BTreeMap<SourceId, Vec<PriceRecord>>,
        job_id: Uuid,
    ) -> Self {
        let total_results = prices_by_source.values().map(Vec::len).sum();
        Self {
            criteria,
            prices_by_source,
            total_results,
            aggregated_at: Utc::now(),
            job_id,
        }
    }

    pub fn records_for(&self, source: &SourceId) -> &[PriceRecord] {
        self.prices_by_source
            .get(source)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Canonical cache/store key derived from normalized search criteria.
///
/// Two criteria that normalize identically produce the same key and are
/// treated as the same query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn from_criteria(criteria: &SearchCriteria) -> Self {
        let mut key = format!(
            "prices:{}:{}:{}:{}:{}",
            normalize(&criteria.name),
            normalize(&criteria.city),
            normalize(&criteria.country),
            criteria.checkin,
            criteria.checkout,
        );
        if let Some(state) = &criteria.state {
            let state = normalize(state);
            if !state.is_empty() {
                key.push(':');
                key.push_str(&state);
            }
        }
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase and collapse whitespace so incidental formatting differences
/// map to the same key
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
