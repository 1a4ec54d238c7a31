use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::metrics::ScraperMetrics;
use crate::models::{ScrapeError, ScrapeOutcome, ValidationStatus};
use crate::scrapers::extract::extract_property;
use crate::scrapers::traits::BrowserEngine;
use crate::scrapers::validate;

/// The slice of configuration the scheduler acts on.
#[derive(Debug, Clone, Copy)]
pub struct ScrapePolicy {
    pub concurrency: usize,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub pacing_min_ms: u64,
    pub pacing_max_ms: u64,
}

impl From<&Config> for ScrapePolicy {
    fn from(cfg: &Config) -> Self {
        Self {
            concurrency: cfg.concurrency,
            retry_attempts: cfg.retry_attempts,
            retry_delay: cfg.retry_delay,
            pacing_min_ms: cfg.pacing_min_ms,
            pacing_max_ms: cfg.pacing_max_ms,
        }
    }
}

/// Retry an operation up to `attempts` times with a fixed delay, replaying
/// only failures the predicate approves. The policy lives here, in plain
/// sight, instead of inside any one call site.
pub async fn with_retry<T, F, Fut>(
    attempts: u32,
    delay: Duration,
    should_retry: impl Fn(&ScrapeError) -> bool,
    mut op: F,
) -> Result<T, ScrapeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ScrapeError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "attempt succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                if attempt >= attempts.max(1) || !should_retry(&err) {
                    return Err(err);
                }
                warn!(attempt, error = %err, "attempt failed, retrying");
                sleep(delay).await;
            }
        }
    }
}

/// Fan the URL batch out over bounded-concurrency extraction tasks and
/// collect every outcome. One URL's failure never aborts its siblings:
/// the returned vector always has one entry per URL attempted.
pub async fn run(
    engine: Arc<dyn BrowserEngine>,
    urls: Vec<String>,
    policy: ScrapePolicy,
    metrics: Arc<ScraperMetrics>,
) -> Vec<ScrapeOutcome> {
    let semaphore = Arc::new(Semaphore::new(policy.concurrency.max(1)));
    let mut handles = Vec::with_capacity(urls.len());

    for url in urls {
        let task_url = url.clone();
        let engine = Arc::clone(&engine);
        let semaphore = Arc::clone(&semaphore);
        let metrics = Arc::clone(&metrics);

        let handle = tokio::spawn(async move {
            let _permit = semaphore
                .acquire()
                .await
                .expect("scheduler semaphore is never closed");
            let outcome = scrape_one(engine.as_ref(), &url, policy, &metrics).await;
            // Pacing runs before the permit drops so a freed slot is not
            // reused immediately.
            pacing_delay(policy.pacing_min_ms, policy.pacing_max_ms).await;
            outcome
        });
        handles.push((task_url, handle));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for (url, handle) in handles {
        match handle.await {
            Ok(outcome) => outcomes.push(outcome),
            Err(join_err) => {
                error!(url, error = %join_err, "scrape task aborted");
                metrics.scrape_failures.inc();
                outcomes.push(ScrapeOutcome::Failed {
                    url,
                    error: ScrapeError::Engine(format!("task aborted: {join_err}")),
                });
            }
        }
    }
    outcomes
}

/// One URL: exclusive document, retry-wrapped navigation + extraction,
/// classification, guaranteed handle release.
async fn scrape_one(
    engine: &dyn BrowserEngine,
    url: &str,
    policy: ScrapePolicy,
    metrics: &ScraperMetrics,
) -> ScrapeOutcome {
    let doc = match engine.new_document().await {
        Ok(doc) => doc,
        Err(error) => {
            metrics.scrape_failures.inc();
            return ScrapeOutcome::Failed {
                url: url.to_string(),
                error,
            };
        }
    };

    let attempts_made = AtomicU32::new(0);
    let result = with_retry(
        policy.retry_attempts,
        policy.retry_delay,
        ScrapeError::is_transient,
        || {
            attempts_made.fetch_add(1, Ordering::Relaxed);
            let doc = doc.as_ref();
            async move {
                doc.navigate(url).await?;
                let html = doc.content().await?;
                Ok(extract_property(&html, url))
            }
        },
    )
    .await;

    // Released whatever happened above.
    doc.close().await;

    let retries = attempts_made.load(Ordering::Relaxed).saturating_sub(1);
    if retries > 0 {
        metrics.retries_attempted.inc_by(retries as f64);
    }

    match result {
        Ok(mut record) => {
            record.validation_status = validate::classify(&record);
            match record.validation_status {
                ValidationStatus::Success => metrics.validation_success.inc(),
                _ => metrics.validation_failures.inc(),
            }
            metrics.scrape_success.inc();
            metrics.listings_scraped.inc();
            ScrapeOutcome::Scraped(record)
        }
        Err(error) => {
            warn!(url, error = %error, "scrape failed after retries");
            metrics.scrape_failures.inc();
            ScrapeOutcome::Failed {
                url: url.to_string(),
                error,
            }
        }
    }
}

async fn pacing_delay(min_ms: u64, max_ms: u64) {
    if max_ms == 0 {
        return;
    }
    let wait = if max_ms > min_ms {
        fastrand::u64(min_ms..=max_ms)
    } else {
        max_ms
    };
    sleep(Duration::from_millis(wait)).await;
}
