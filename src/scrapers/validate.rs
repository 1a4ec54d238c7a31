use crate::models::{PropertyRecord, ValidationStatus};

/// Classify a harvested record. The address is the one field every listing
/// variant carries; title and pricing are legitimately absent on
/// contact-the-owner listings, so their absence is tolerated.
pub fn classify(record: &PropertyRecord) -> ValidationStatus {
    match record.address.as_deref() {
        Some(address) if !address.trim().is_empty() => ValidationStatus::Success,
        _ => ValidationStatus::Failed,
    }
}
