use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::seq::SliceRandom;
use reqwest::{Client, Url};
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::error::SourceError;
use crate::models::{PriceRecord, SearchCriteria, SourceId};
use crate::sources::traits::{Extractor, PriceSource};

const FALLBACK_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// HTTP-backed price source. Retrieval (retry, backoff, user-agent
/// rotation, timeouts) lives here; what the page means is delegated to the
/// injected extractor.
pub struct HttpSource {
    id: SourceId,
    config: SourceConfig,
    request_timeout: Duration,
    user_agents: Vec<String>,
    max_results: usize,
    extractor: Box<dyn Extractor>,
}

impl HttpSource {
    pub fn new(
        id: SourceId,
        config: SourceConfig,
        request_timeout: Duration,
        user_agents: Vec<String>,
        max_results: usize,
        extractor: Box<dyn Extractor>,
    ) -> Self {
        Self {
            id,
            config,
            request_timeout,
            user_agents,
            max_results,
            extractor,
        }
    }

    /// Search URL with the query and stay dates attached
    pub fn search_url(&self, criteria: &SearchCriteria) -> Result<Url, SourceError> {
        let query = format!("{} {}", criteria.name, criteria.city);
        Url::parse_with_params(
            &self.config.search_url,
            &[
                ("q", query.as_str()),
                ("checkin", &criteria.checkin.to_string()),
                ("checkout", &criteria.checkout.to_string()),
            ],
        )
        .map_err(|e| SourceError::Transient {
            source_id: self.id.clone(),
            message: format!("invalid search url: {}", e),
        })
    }

    fn pick_user_agent(&self) -> &str {
        self.user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(FALLBACK_USER_AGENT)
    }

    /// One retrieval attempt. The client is scoped to the attempt so the
    /// connection is released on every exit path.
    async fn fetch_page(&self, url: &Url) -> Result<String, SourceError> {
        let client = Client::builder()
            .timeout(self.request_timeout)
            .user_agent(self.pick_user_agent())
            .build()
            .map_err(|e| SourceError::Transient {
                source_id: self.id.clone(),
                message: format!("failed to create HTTP client: {}", e),
            })?;

        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| SourceError::Transient {
                source_id: self.id.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimited {
                source_id: self.id.clone(),
            });
        }
        if !status.is_success() {
            return Err(SourceError::Transient {
                source_id: self.id.clone(),
                message: format!("unexpected status {}", status),
            });
        }

        response.text().await.map_err(|e| SourceError::Transient {
            source_id: self.id.clone(),
            message: format!("failed to read response body: {}", e),
        })
    }
}

/// Backoff applied after a rate-limit signal on the given attempt
pub(crate) fn rate_limit_backoff(attempt: u32, base_delay: Duration) -> Duration {
    base_delay * (attempt + 1) * 2
}

#[async_trait]
impl PriceSource for HttpSource {
    async fn search(&self, criteria: &SearchCriteria) -> Result<Vec<PriceRecord>, SourceError> {
        let url = self.search_url(criteria)?;
        let max_retries = self.config.max_retries.max(1);
        let base_delay = self.config.base_delay();
        let mut last_error = String::new();

        for attempt in 0..max_retries {
            if attempt > 0 {
                tokio::time::sleep(base_delay).await;
            }

            debug!(
                "Fetching {} from {} (attempt {})",
                url,
                self.id,
                attempt + 1
            );

            match self.fetch_page(&url).await {
                Ok(html) => {
                    let listings = self.extractor.extract(&html, criteria);
                    let fetched_at = Utc::now();

                    let mut records: Vec<PriceRecord> = listings
                        .into_iter()
                        .map(|listing| PriceRecord {
                            source: self.id.clone(),
                            property_name: listing.property_name,
                            price: listing.price,
                            currency: listing.currency,
                            available: listing.available,
                            url: listing.url,
                            rating: listing.rating,
                            review_count: listing.review_count,
                            amenities: listing.amenities,
                            image_url: listing.image_url,
                            fetched_at,
                        })
                        .collect();
                    records.truncate(self.max_results);

                    info!("Found {} results from {}", records.len(), self.id);
                    return Ok(records);
                }
                Err(SourceError::RateLimited { .. }) => {
                    let wait = rate_limit_backoff(attempt, base_delay);
                    warn!("{} rate limited, backing off {:?}", self.id, wait);
                    last_error = "rate limited".to_string();
                    if attempt + 1 < max_retries {
                        tokio::time::sleep(wait).await;
                    }
                }
                Err(e) => {
                    warn!("{} attempt {} failed: {}", self.id, attempt + 1, e);
                    last_error = e.to_string();
                }
            }
        }

        Err(SourceError::Exhausted {
            source_id: self.id.clone(),
            attempts: max_retries,
            last_error,
        })
    }

    fn source_id(&self) -> SourceId {
        self.id.clone()
    }
}
