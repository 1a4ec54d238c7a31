use anyhow::Result;
use prometheus::{Counter, Histogram, Registry};

/// Write-only telemetry for the harvesting pipeline. Injected as a
/// collaborator so orchestration logic stays testable without a live
/// collector; nothing here affects control flow.
pub struct ScraperMetrics {
    pub scrape_success: Counter,
    pub scrape_failures: Counter,
    pub listings_scraped: Counter,
    pub validation_success: Counter,
    pub validation_failures: Counter,
    pub retries_attempted: Counter,
    pub db_insert_failures: Counter,
    pub run_duration: Histogram,
}

impl ScraperMetrics {
    pub fn new(registry: &Registry) -> Result<Self> {
        let scrape_success = Counter::new(
            "scraper_success_total",
            "Total successful detail-page scrapes",
        )?;
        registry.register(Box::new(scrape_success.clone()))?;

        let scrape_failures = Counter::new(
            "scraper_failures_total",
            "Total detail-page scrapes that failed after retries",
        )?;
        registry.register(Box::new(scrape_failures.clone()))?;

        let listings_scraped = Counter::new(
            "listings_scraped_total",
            "Total number of listings scraped",
        )?;
        registry.register(Box::new(listings_scraped.clone()))?;

        let validation_success = Counter::new(
            "validation_success_total",
            "Records that passed validation",
        )?;
        registry.register(Box::new(validation_success.clone()))?;

        let validation_failures = Counter::new(
            "data_validation_failures_total",
            "Records that failed validation (critical field missing)",
        )?;
        registry.register(Box::new(validation_failures.clone()))?;

        let retries_attempted = Counter::new(
            "scraper_retries_total",
            "Total retry attempts made during scraping",
        )?;
        registry.register(Box::new(retries_attempted.clone()))?;

        let db_insert_failures = Counter::new(
            "db_insert_failures_total",
            "Total failed upsert operations",
        )?;
        registry.register(Box::new(db_insert_failures.clone()))?;

        let run_duration = Histogram::with_opts(
            prometheus::HistogramOpts::new(
                "scrape_duration_seconds",
                "Wall-clock duration of a full harvest run",
            )
            .buckets(vec![10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]),
        )?;
        registry.register(Box::new(run_duration.clone()))?;

        // Process memory/CPU stats, gathered whenever the registry is dumped.
        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            scrape_success,
            scrape_failures,
            listings_scraped,
            validation_success,
            validation_failures,
            retries_attempted,
            db_insert_failures,
            run_duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_register_and_increment() {
        let registry = Registry::new();
        let metrics = ScraperMetrics::new(&registry).unwrap();

        metrics.scrape_success.inc();
        metrics.scrape_failures.inc_by(2.0);
        metrics.run_duration.observe(42.0);

        assert_eq!(metrics.scrape_success.get(), 1.0);
        assert_eq!(metrics.scrape_failures.get(), 2.0);
        assert!(!registry.gather().is_empty());
    }

    #[test]
    fn double_registration_is_rejected() {
        let registry = Registry::new();
        let _metrics = ScraperMetrics::new(&registry).unwrap();
        assert!(ScraperMetrics::new(&registry).is_err());
    }
}
