use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::SourceId;

/// Per-platform crawl settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub enabled: bool,
    pub base_url: String,
    pub search_url: String,
    /// Seconds to wait between request attempts
    pub delay_between_requests: u64,
    pub max_retries: u32,
}

impl SourceConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_secs(self.delay_between_requests)
    }
}

/// Top-level configuration for the crawler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub sources: BTreeMap<SourceId, SourceConfig>,
    /// Cache entry lifetime in seconds
    pub cache_ttl_secs: u64,
    pub request_timeout_secs: u64,
    /// Upper bound on records one source may contribute per search
    pub max_results_per_source: usize,
    pub user_agents: Vec<String>,
    /// Terminal jobs older than this are eligible for eviction
    pub job_max_age_secs: u64,
}

impl Config {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn job_max_age(&self) -> Duration {
        Duration::from_secs(self.job_max_age_secs)
    }

    /// Enabled sources in registration (alphabetical) order. Dispatch order
    /// is derived from this and stays deterministic across runs.
    pub fn enabled_sources(&self) -> Vec<(SourceId, SourceConfig)> {
        self.sources
            .iter()
            .filter(|(_, cfg)| cfg.enabled)
            .map(|(id, cfg)| (id.clone(), cfg.clone()))
            .collect()
    }

    pub fn source_config(&self, id: &SourceId) -> Option<&SourceConfig> {
        self.sources.get(id)
    }
}

fn platform(base_url: &str, search_url: &str, delay: u64) -> SourceConfig {
    SourceConfig {
        enabled: true,
        base_url: base_url.to_string(),
        search_url: search_url.to_string(),
        delay_between_requests: delay,
        max_retries: 3,
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut sources = BTreeMap::new();
        sources.insert(
            SourceId::new("airbnb"),
            platform("https://www.airbnb.com", "https://www.airbnb.com/s/", 2),
        );
        sources.insert(
            SourceId::new("booking"),
            platform(
                "https://www.booking.com",
                "https://www.booking.com/search.html",
                3,
            ),
        );
        sources.insert(
            SourceId::new("expedia"),
            platform(
                "https://www.expedia.com",
                "https://www.expedia.com/Hotel-Search",
                2,
            ),
        );
        sources.insert(
            SourceId::new("hotels"),
            platform(
                "https://www.hotels.com",
                "https://www.hotels.com/search.do",
                2,
            ),
        );
        sources.insert(
            SourceId::new("tripadvisor"),
            platform(
                "https://www.tripadvisor.com",
                "https://www.tripadvisor.com/Hotels",
                3,
            ),
        );
        sources.insert(
            SourceId::new("vrbo"),
            platform("https://www.vrbo.com", "https://www.vrbo.com/search", 2),
        );

        Self {
            sources,
            cache_ttl_secs: 3600,
            request_timeout_secs: 30,
            max_results_per_source: 10,
            user_agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string(),
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string(),
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:89.0) Gecko/20100101 Firefox/89.0".to_string(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:89.0) Gecko/20100101 Firefox/89.0".to_string(),
            ],
            job_max_age_secs: 3600,
        }
    }
}
