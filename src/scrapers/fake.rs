//! In-memory stand-in for the browser engine, used by the unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};

use crate::models::ScrapeError;
use crate::scrapers::traits::{BrowserEngine, DocumentHandle};

#[derive(Default)]
struct SiteState {
    pages: HashMap<String, String>,
    clicks: HashMap<(String, String), String>,
    transient_failures: HashMap<String, u32>,
    nav_attempts: HashMap<String, u32>,
    opened: usize,
    closed: usize,
}

/// A scripted site: pages keyed by URL, click transitions, and optional
/// injected navigation failures.
#[derive(Clone, Default)]
pub struct FakeSite {
    state: Arc<Mutex<SiteState>>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_page(&self, url: &str, html: &str) {
        self.state
            .lock()
            .unwrap()
            .pages
            .insert(url.to_string(), html.to_string());
    }

    /// Clicking `selector` while on `from` lands on `to`.
    pub fn on_click(&self, from: &str, selector: &str, to: &str) {
        self.state
            .lock()
            .unwrap()
            .clicks
            .insert((from.to_string(), selector.to_string()), to.to_string());
    }

    /// The next `times` navigations to `url` fail with a transient error.
    pub fn fail_navigation_times(&self, url: &str, times: u32) {
        self.state
            .lock()
            .unwrap()
            .transient_failures
            .insert(url.to_string(), times);
    }

    pub fn nav_attempts(&self, url: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .nav_attempts
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    /// (documents opened, documents closed)
    pub fn open_close_counts(&self) -> (usize, usize) {
        let state = self.state.lock().unwrap();
        (state.opened, state.closed)
    }

    pub fn open(&self) -> FakeDocument {
        self.state.lock().unwrap().opened += 1;
        FakeDocument {
            site: self.clone(),
            current: Mutex::new(None),
        }
    }
}

pub struct FakeDocument {
    site: FakeSite,
    current: Mutex<Option<String>>,
}

impl FakeDocument {
    fn html(&self) -> Result<String, ScrapeError> {
        let current = self
            .current
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ScrapeError::Structure("no page loaded".into()))?;
        self.site
            .state
            .lock()
            .unwrap()
            .pages
            .get(&current)
            .cloned()
            .ok_or_else(|| ScrapeError::Structure("page vanished".into()))
    }
}

fn has_selector(html: &str, selector: &str) -> bool {
    let Ok(sel) = Selector::parse(selector) else {
        return false;
    };
    Html::parse_document(html).select(&sel).next().is_some()
}

#[async_trait]
impl DocumentHandle for FakeDocument {
    async fn navigate(&self, url: &str) -> Result<(), ScrapeError> {
        {
            let mut state = self.site.state.lock().unwrap();
            *state.nav_attempts.entry(url.to_string()).or_default() += 1;
            if let Some(remaining) = state.transient_failures.get_mut(url) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ScrapeError::Navigation {
                        url: url.to_string(),
                        message: "injected transient failure".into(),
                    });
                }
            }
            if !state.pages.contains_key(url) {
                return Err(ScrapeError::Navigation {
                    url: url.to_string(),
                    message: "no such page".into(),
                });
            }
        }
        *self.current.lock().unwrap() = Some(url.to_string());
        Ok(())
    }

    async fn wait_for(&self, selector: &str, _timeout: Duration) -> Result<bool, ScrapeError> {
        let html = self.html()?;
        Ok(has_selector(&html, selector))
    }

    async fn click(&self, selector: &str) -> Result<(), ScrapeError> {
        let current = self
            .current
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ScrapeError::Structure("no page loaded".into()))?;
        let target = self
            .site
            .state
            .lock()
            .unwrap()
            .clicks
            .get(&(current, selector.to_string()))
            .cloned();
        match target {
            Some(to) => {
                *self.current.lock().unwrap() = Some(to);
                Ok(())
            }
            None => Err(ScrapeError::Structure(format!(
                "nothing to click for '{selector}'"
            ))),
        }
    }

    async fn content(&self) -> Result<String, ScrapeError> {
        self.html()
    }

    async fn current_url(&self) -> String {
        self.current.lock().unwrap().clone().unwrap_or_default()
    }

    async fn close(&self) {
        self.site.state.lock().unwrap().closed += 1;
    }
}

pub struct FakeEngine {
    pub site: FakeSite,
}

#[async_trait]
impl BrowserEngine for FakeEngine {
    async fn new_document(&self) -> Result<Box<dyn DocumentHandle>, ScrapeError> {
        Ok(Box::new(self.site.open()))
    }
}
