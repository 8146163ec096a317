use std::sync::Arc;

use chrono::NaiveDate;
use price_scout::sources::FailingSource;
use price_scout::{
    Config, FixtureSource, MemoryStore, Orchestrator, PriceService, PriceSource, SearchCriteria,
    SearchOutcome, SourceId, UpdateMessage,
};
use tracing::{info, Level};
use tracing_subscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    info!("💰 Price Scout - accommodation price crawler");
    info!("============================================");
    info!("");

    let config = Config::default();

    // Demo registry: fixture data for three platforms, one of them down
    let sources: Vec<Arc<dyn PriceSource>> = vec![
        fixture_source("airbnb", 3),
        Arc::new(FailingSource::new(SourceId::new("booking"))),
        fixture_source("vrbo", 2),
    ];
    let orchestrator = Orchestrator::new(sources);
    info!(
        "Registered sources: {:?}",
        orchestrator
            .source_ids()
            .iter()
            .map(|id| id.as_str().to_string())
            .collect::<Vec<_>>()
    );

    let service = PriceService::new(config, orchestrator, Arc::new(MemoryStore::new()));

    let criteria = SearchCriteria {
        name: "Grand Hotel".to_string(),
        city: "Paris".to_string(),
        state: None,
        country: "France".to_string(),
        checkin: NaiveDate::from_ymd_opt(2025, 6, 1)
            .ok_or_else(|| anyhow::anyhow!("invalid checkin date"))?,
        checkout: NaiveDate::from_ymd_opt(2025, 6, 3)
            .ok_or_else(|| anyhow::anyhow!("invalid checkout date"))?,
        latitude: None,
        longitude: None,
    };

    info!(
        "Searching prices for {} in {}, {}...",
        criteria.name, criteria.city, criteria.country
    );

    let job_id = match service.submit(criteria.clone()).await? {
        SearchOutcome::Scheduled { job_id } => job_id,
        SearchOutcome::Cached { total_results, .. } => {
            info!("Served {} results from cache", total_results);
            return Ok(());
        }
    };
    info!("Job {} scheduled, streaming updates...", job_id);
    info!("");

    // Follow the job until its channel closes
    let mut rx = service.subscribe(job_id)?;
    while let Ok(message) = rx.recv().await {
        match message {
            UpdateMessage::Status {
                state,
                progress,
                completed_sources,
                total_sources,
                ..
            } => {
                info!(
                    "  [{:?}] {:.0}% ({}/{} sources)",
                    state, progress, completed_sources, total_sources
                );
            }
            UpdateMessage::PriceUpdate {
                source,
                property_name,
                amount,
                currency,
                available,
                ..
            } => {
                println!(
                    "  {} | {} {:.2} {} ({})",
                    source,
                    property_name,
                    amount,
                    currency,
                    if available { "available" } else { "sold out" }
                );
            }
            UpdateMessage::Completed { total_results, .. } => {
                info!("");
                info!("✅ Search complete: {} results", total_results);
            }
            UpdateMessage::Failed { error, .. } => {
                info!("❌ Search failed: {}", error);
            }
        }
    }

    let result = service.result(job_id)?;
    println!();
    for (i, record) in result.records.iter().enumerate() {
        println!(
            "{}. {} via {}: {:.2} {}",
            i + 1,
            record.property_name,
            record.source,
            record.price,
            record.currency
        );
    }

    // Save the aggregate for later inspection
    let aggregate = service.history(&criteria)?;
    let json = serde_json::to_string_pretty(&aggregate)?;
    tokio::fs::write("price_results.json", json).await?;
    info!("💾 Saved aggregate to price_results.json");

    Ok(())
}

fn fixture_source(name: &str, count: usize) -> Arc<dyn PriceSource> {
    let id = SourceId::new(name);
    let records = FixtureSource::sample_records(&id, count);
    Arc::new(FixtureSource::new(id, records).with_delay(std::time::Duration::from_millis(300)))
}
