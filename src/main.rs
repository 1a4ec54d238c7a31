mod config;
mod metrics;
mod models;
mod scrapers;
mod snapshot;
mod storage;

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{debug, error, info, Level};

use config::Config;
use metrics::ScraperMetrics;
use models::ValidationStatus;
use scrapers::scheduler::{self, ScrapePolicy};
use scrapers::{discover, BrowserEngine, ChromeEngine};
use storage::Storage;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let cfg = Config::from_env()?;
    let registry = prometheus::Registry::new();
    let metrics = Arc::new(ScraperMetrics::new(&registry)?);

    info!("🏠 Apartment Scout - listing harvester");
    info!(
        entry_url = %cfg.entry_url,
        concurrency = cfg.concurrency,
        page_limit = cfg.page_limit,
        "starting run"
    );

    let started = Instant::now();
    let result = harvest(&cfg, Arc::clone(&metrics)).await;
    metrics.run_duration.observe(started.elapsed().as_secs_f64());

    // Final metric state; the exporter itself is an external collaborator.
    let encoder = prometheus::TextEncoder::new();
    if let Ok(text) = encoder.encode_to_string(&registry.gather()) {
        debug!(metrics = %text, "final metric state");
    }

    match result {
        Ok(()) => {
            info!(elapsed = ?started.elapsed(), "run complete");
            Ok(())
        }
        Err(e) => {
            // A fatal failure still leaves a snapshot artifact behind; if
            // the run died before collecting anything, that artifact is an
            // empty batch.
            error!(error = %e, "fatal error, flushing snapshot");
            let path = Path::new(&cfg.snapshot_path);
            if !path.exists() {
                let _ = snapshot::write_snapshot(path, &[]).await;
            }
            Err(e)
        }
    }
}

async fn harvest(cfg: &Config, metrics: Arc<ScraperMetrics>) -> Result<()> {
    let engine: Arc<dyn BrowserEngine> =
        Arc::new(ChromeEngine::launch().context("failed to launch browser engine")?);

    // Walk the paginated index first; partial discovery still yields a run.
    let doc = engine
        .new_document()
        .await
        .map_err(|e| anyhow::anyhow!("could not open discovery document: {e}"))?;
    let mut urls = discover::discover(doc.as_ref(), &cfg.entry_url).await;
    doc.close().await;

    if urls.len() > cfg.page_limit {
        info!(
            discovered = urls.len(),
            limit = cfg.page_limit,
            "capping detail pages for this run"
        );
        urls.truncate(cfg.page_limit);
    }
    info!(count = urls.len(), "detail pages queued");

    let outcomes = scheduler::run(
        Arc::clone(&engine),
        urls,
        ScrapePolicy::from(cfg),
        Arc::clone(&metrics),
    )
    .await;

    let successes = outcomes.iter().filter(|o| o.is_success()).count();
    let failures = outcomes.len() - successes;
    info!(attempted = outcomes.len(), successes, failures, "scraping finished");

    // Snapshot before persistence so a storage fault cannot lose the run.
    let records = snapshot::snapshot_records(&outcomes);
    snapshot::write_snapshot(Path::new(&cfg.snapshot_path), &records).await?;

    // Only validated records are eligible for the database.
    let validated: Vec<_> = records
        .into_iter()
        .filter(|record| record.validation_status == ValidationStatus::Success)
        .collect();

    let storage = Storage::connect(&cfg.database_url)
        .await
        .context("failed to open database")?;
    storage.init_schema().await?;
    let saved = storage.upsert_batch(&validated).await?;
    let unsaved = validated.len() - saved;
    if unsaved > 0 {
        metrics.db_insert_failures.inc_by(unsaved as f64);
    }

    info!(collected = successes, persisted = saved, "collection summary");
    Ok(())
}
