use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use tokio::task;
use tracing::{debug, info, warn};

use crate::models::ScrapeError;
use crate::scrapers::traits::{BrowserEngine, DocumentHandle};

/// Browser engine backed by headless Chrome. One browsing context is shared
/// per run; every `new_document` call opens a dedicated tab.
pub struct ChromeEngine {
    browser: Arc<Browser>,
}

impl ChromeEngine {
    pub fn launch() -> Result<Self> {
        info!("Launching headless Chrome...");

        let options = LaunchOptions::default_builder()
            .headless(true)
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;

        Ok(Self {
            browser: Arc::new(browser),
        })
    }
}

#[async_trait]
impl BrowserEngine for ChromeEngine {
    async fn new_document(&self) -> Result<Box<dyn DocumentHandle>, ScrapeError> {
        let browser = Arc::clone(&self.browser);
        let tab = task::spawn_blocking(move || browser.new_tab())
            .await
            .map_err(|e| ScrapeError::Engine(e.to_string()))?
            .map_err(|e| ScrapeError::Engine(e.to_string()))?;
        Ok(Box::new(ChromeDocument { tab }))
    }
}

/// One exclusive Chrome tab. The CDP client is synchronous, so calls run on
/// the blocking pool to keep extraction tasks cooperative.
pub struct ChromeDocument {
    tab: Arc<Tab>,
}

#[async_trait]
impl DocumentHandle for ChromeDocument {
    async fn navigate(&self, url: &str) -> Result<(), ScrapeError> {
        let tab = Arc::clone(&self.tab);
        let target = url.to_string();
        debug!(url = %target, "navigating");
        task::spawn_blocking(move || -> Result<()> {
            tab.navigate_to(&target)?;
            tab.wait_until_navigated()?;
            Ok(())
        })
        .await
        .map_err(|e| ScrapeError::Engine(e.to_string()))?
        .map_err(|e| ScrapeError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<bool, ScrapeError> {
        let tab = Arc::clone(&self.tab);
        let sel = selector.to_string();
        // The CDP wait reports absence as an error; here it is just "not there".
        let found = task::spawn_blocking(move || {
            tab.wait_for_element_with_custom_timeout(&sel, timeout)
                .is_ok()
        })
        .await
        .map_err(|e| ScrapeError::Engine(e.to_string()))?;
        Ok(found)
    }

    async fn click(&self, selector: &str) -> Result<(), ScrapeError> {
        let tab = Arc::clone(&self.tab);
        let sel = selector.to_string();
        task::spawn_blocking(move || -> Result<()> {
            tab.find_element(&sel)?.click()?;
            Ok(())
        })
        .await
        .map_err(|e| ScrapeError::Engine(e.to_string()))?
        .map_err(|e| ScrapeError::Structure(format!("failed to click '{selector}': {e}")))
    }

    async fn content(&self) -> Result<String, ScrapeError> {
        let tab = Arc::clone(&self.tab);
        task::spawn_blocking(move || -> Result<String, ScrapeError> {
            let current = tab.get_url();
            let result = tab
                .evaluate("document.documentElement.outerHTML", false)
                .map_err(|e| ScrapeError::Navigation {
                    url: current,
                    message: e.to_string(),
                })?;
            match result.value.as_ref().and_then(|v| v.as_str()) {
                Some(html) => Ok(html.to_string()),
                None => {
                    warn!("Could not get HTML from page");
                    Ok(String::new())
                }
            }
        })
        .await
        .map_err(|e| ScrapeError::Engine(e.to_string()))?
    }

    async fn current_url(&self) -> String {
        let tab = Arc::clone(&self.tab);
        task::spawn_blocking(move || tab.get_url())
            .await
            .unwrap_or_default()
    }

    async fn close(&self) {
        let tab = Arc::clone(&self.tab);
        let _ = task::spawn_blocking(move || tab.close(true)).await;
    }
}
