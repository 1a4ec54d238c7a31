use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Run configuration, loaded from the environment (a `.env` file is honored
/// by `main`). Everything except the entry URL has a working default.
#[derive(Debug, Clone)]
pub struct Config {
    /// Catalog entry page that pagination starts from.
    pub entry_url: String,
    /// Max in-flight detail scrapes.
    pub concurrency: usize,
    /// Cap on total detail URLs processed per run.
    pub page_limit: usize,
    /// Max attempts per URL, including the first.
    pub retry_attempts: u32,
    /// Fixed wait between attempts.
    pub retry_delay: Duration,
    /// Randomized post-task delay bounds, milliseconds.
    pub pacing_min_ms: u64,
    pub pacing_max_ms: u64,
    pub database_url: String,
    pub snapshot_path: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let entry_url = lookup("ENTRY_URL")
            .context("ENTRY_URL must be set to the catalog entry page")?;

        let cfg = Self {
            entry_url,
            concurrency: parse_or(&lookup, "CONCURRENCY", 3)?,
            page_limit: parse_or(&lookup, "PAGE_LIMIT", 100)?,
            retry_attempts: parse_or(&lookup, "RETRY_ATTEMPTS", 3)?,
            retry_delay: Duration::from_millis(parse_or(&lookup, "RETRY_DELAY_MS", 2000)?),
            pacing_min_ms: parse_or(&lookup, "PACING_MIN_MS", 1000)?,
            pacing_max_ms: parse_or(&lookup, "PACING_MAX_MS", 3000)?,
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "sqlite:apartments.db".to_string()),
            snapshot_path: lookup("SNAPSHOT_PATH")
                .unwrap_or_else(|| "apartments_data.json".to_string()),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            bail!("CONCURRENCY must be at least 1");
        }
        if self.retry_attempts == 0 {
            bail!("RETRY_ATTEMPTS must be at least 1");
        }
        if self.pacing_min_ms > self.pacing_max_ms {
            bail!(
                "PACING_MIN_MS ({}) must not exceed PACING_MAX_MS ({})",
                self.pacing_min_ms,
                self.pacing_max_ms
            );
        }
        Ok(())
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        None => Ok(default),
    }
}
