use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::models::{PropertyRecord, ScrapeOutcome, ValidationStatus};

/// Flatten run outcomes into the snapshot artifact: every URL attempted
/// appears exactly once, failures as defaulted records tagged `failed`.
pub fn snapshot_records(outcomes: &[ScrapeOutcome]) -> Vec<PropertyRecord> {
    outcomes
        .iter()
        .map(|outcome| match outcome {
            ScrapeOutcome::Scraped(record) => record.clone(),
            ScrapeOutcome::Failed { url, .. } => {
                let mut stub = PropertyRecord::new(url);
                stub.validation_status = ValidationStatus::Failed;
                stub
            }
        })
        .collect()
}

/// Write the JSON artifact atomically: a temp file in the same directory is
/// renamed over the destination, so a crash mid-write never leaves a torn
/// snapshot behind.
pub async fn write_snapshot(path: &Path, records: &[PropertyRecord]) -> Result<()> {
    let json = serde_json::to_string_pretty(records)?;

    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, &json)
        .await
        .with_context(|| format!("failed to write snapshot to {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("failed to move snapshot into place at {}", path.display()))?;

    info!(path = %path.display(), records = records.len(), "snapshot written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScrapeError;

    #[tokio::test]
    async fn snapshot_round_trips_and_tags_failures() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");

        let mut scraped = PropertyRecord::new("https://example.com/ok");
        scraped.address = Some("12 Main St".into());
        scraped.validation_status = ValidationStatus::Success;

        let outcomes = vec![
            ScrapeOutcome::Scraped(scraped),
            ScrapeOutcome::Failed {
                url: "https://example.com/broken".into(),
                error: ScrapeError::Timeout {
                    what: "navigation".into(),
                },
            },
        ];

        let records = snapshot_records(&outcomes);
        write_snapshot(&path, &records).await.unwrap();

        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: Vec<PropertyRecord> = serde_json::from_str(&raw).unwrap();

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].property_link, "https://example.com/ok");
        assert_eq!(parsed[0].validation_status, ValidationStatus::Success);
        assert_eq!(parsed[1].property_link, "https://example.com/broken");
        assert_eq!(parsed[1].validation_status, ValidationStatus::Failed);
        assert!(parsed[1].address.is_none());

        // No temp file left behind.
        assert!(!dir.path().join("run.tmp").exists());
    }

    #[tokio::test]
    async fn empty_snapshot_is_valid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");

        write_snapshot(&path, &[]).await.unwrap();
        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(raw.trim(), "[]");
    }
}
