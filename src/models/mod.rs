use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Derived classification of a harvested record's completeness.
/// Never supplied by the page itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Pending,
    Success,
    Failed,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Pending => "pending",
            ValidationStatus::Success => "success",
            ValidationStatus::Failed => "failed",
        }
    }
}

/// One harvested listing. `property_link` is the natural key; every other
/// page field starts out missing (`None`) and is overwritten as extraction
/// succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub property_link: String,
    pub title: Option<String>,
    pub address: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub property_reviews: Option<f64>,
    pub listing_verification: Option<String>,
    /// `None` means the lease-options container was absent entirely;
    /// `Some(vec![])` means it was present but listed nothing.
    pub lease_options: Option<Vec<String>>,
    pub year_built: Option<i64>,
    pub property_type: String,
    pub validation_status: ValidationStatus,
    pub last_seen: DateTime<Utc>,
    pub pricing_and_floor_plans: Vec<FloorPlanRecord>,
}

impl PropertyRecord {
    /// Fresh record for one scrape attempt, all fields defaulted to missing.
    pub fn new(url: &str) -> Self {
        Self {
            property_link: url.to_string(),
            title: None,
            address: None,
            street: None,
            city: None,
            state: None,
            zip_code: None,
            property_reviews: None,
            listing_verification: None,
            lease_options: None,
            year_built: None,
            property_type: "Apartment".to_string(),
            validation_status: ValidationStatus::Pending,
            last_seen: Utc::now(),
            pricing_and_floor_plans: Vec::new(),
        }
    }
}

/// One unit card under a listing. Rebuilt from scratch on every re-scrape;
/// exists only in the context of a parent `PropertyRecord`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FloorPlanRecord {
    pub apartment_name: Option<String>,
    pub rent_price_range: Option<String>,
    pub bedrooms: Option<i64>,
    pub bathrooms: Option<f64>,
    pub sqft: Option<f64>,
    pub unit: Option<String>,
    pub base_rent: Option<f64>,
    pub availability: Option<String>,
    pub details_link: Option<String>,
}

/// Failure taxonomy for a scrape attempt. Only navigation-class errors are
/// worth replaying; a structural mismatch will not change on retry.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("navigation failed for {url}: {message}")]
    Navigation { url: String, message: String },

    #[error("timed out waiting for {what}")]
    Timeout { what: String },

    #[error("unexpected page structure: {0}")]
    Structure(String),

    #[error("browser engine failure: {0}")]
    Engine(String),
}

impl ScrapeError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ScrapeError::Navigation { .. } | ScrapeError::Timeout { .. }
        )
    }
}

/// Result of one detail-page scrape. Consumed immediately by the snapshot
/// writer and the upserter; never persisted itself.
#[derive(Debug)]
pub enum ScrapeOutcome {
    Scraped(PropertyRecord),
    Failed { url: String, error: ScrapeError },
}

impl ScrapeOutcome {
    pub fn url(&self) -> &str {
        match self {
            ScrapeOutcome::Scraped(record) => &record.property_link,
            ScrapeOutcome::Failed { url, .. } => url,
        }
    }

    /// A scrape counts as collected only when the record also validated.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ScrapeOutcome::Scraped(record)
                if record.validation_status == ValidationStatus::Success
        )
    }
}
