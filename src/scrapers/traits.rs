use std::time::Duration;

use async_trait::async_trait;

use crate::models::ScrapeError;

/// Narrow handle over one navigable browser document. Navigation, waiting
/// and clicking act on the live page; reads go through `content()`, an HTML
/// snapshot that the extraction layer parses with `scraper`.
///
/// Each handle is exclusive to one task and must be `close()`d when the task
/// is done with it, whatever the outcome.
#[async_trait]
pub trait DocumentHandle: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), ScrapeError>;

    /// Wait until `selector` matches something, up to `timeout`. Absence is
    /// a normal answer (`Ok(false)`), not an error.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<bool, ScrapeError>;

    async fn click(&self, selector: &str) -> Result<(), ScrapeError>;

    /// Full HTML of the current document.
    async fn content(&self) -> Result<String, ScrapeError>;

    async fn current_url(&self) -> String;

    async fn close(&self);
}

/// Factory for per-task document handles. One engine (browsing context) is
/// shared per run; every task gets its own document.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    async fn new_document(&self) -> Result<Box<dyn DocumentHandle>, ScrapeError>;
}
