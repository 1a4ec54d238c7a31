use std::str::FromStr;

use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, error, info};

use crate::models::PropertyRecord;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS property (
        id                    INTEGER PRIMARY KEY,
        property_link         TEXT NOT NULL UNIQUE,
        title                 TEXT,
        address               TEXT,
        street                TEXT,
        city                  TEXT,
        state                 TEXT,
        zip_code              TEXT,
        property_reviews      REAL,
        listing_verification  TEXT,
        lease_options         TEXT,
        year_built            INTEGER,
        property_type         TEXT NOT NULL DEFAULT 'Apartment',
        validation_status     TEXT NOT NULL DEFAULT 'pending',
        last_seen             TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS pricing_and_floor_plans (
        id               INTEGER PRIMARY KEY,
        property_id      INTEGER NOT NULL REFERENCES property(id) ON DELETE CASCADE,
        apartment_name   TEXT,
        rent_price_range TEXT,
        bedrooms         INTEGER,
        bathrooms        REAL,
        sqft             REAL,
        unit             TEXT,
        base_rent        REAL,
        availability     TEXT,
        details_link     TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_floor_plans_property
        ON pricing_and_floor_plans(property_id);
";

pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Upsert a batch of validated records. Each record runs in its own
    /// transaction: a storage error rolls back that record alone and the
    /// batch moves on. Returns how many records were durably saved.
    pub async fn upsert_batch(&self, records: &[PropertyRecord]) -> Result<usize> {
        let mut saved = 0usize;
        for record in records {
            match self.upsert_property(record).await {
                Ok(property_id) => {
                    debug!(link = %record.property_link, property_id, "record persisted");
                    saved += 1;
                }
                Err(e) => {
                    error!(link = %record.property_link, error = %e, "failed to persist record");
                }
            }
        }
        info!(saved, total = records.len(), "batch persisted");
        Ok(saved)
    }

    /// Insert-or-update keyed on `property_link`, replacing the full
    /// floor-plan set. Delete and reinsert share one transaction so no
    /// reader ever observes a property without its floor plans.
    async fn upsert_property(&self, record: &PropertyRecord) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM property WHERE property_link = ?1")
                .bind(&record.property_link)
                .fetch_optional(&mut *tx)
                .await?;

        let lease_options = record
            .lease_options
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let last_seen = Utc::now();

        let property_id = match existing {
            Some((id,)) => {
                sqlx::query(
                    "UPDATE property SET
                        title = ?1, address = ?2, street = ?3, city = ?4,
                        state = ?5, zip_code = ?6, property_reviews = ?7,
                        listing_verification = ?8, lease_options = ?9,
                        year_built = ?10, property_type = ?11,
                        validation_status = ?12, last_seen = ?13
                     WHERE id = ?14",
                )
                .bind(&record.title)
                .bind(&record.address)
                .bind(&record.street)
                .bind(&record.city)
                .bind(&record.state)
                .bind(&record.zip_code)
                .bind(record.property_reviews)
                .bind(&record.listing_verification)
                .bind(&lease_options)
                .bind(record.year_built)
                .bind(&record.property_type)
                .bind(record.validation_status.as_str())
                .bind(last_seen)
                .bind(id)
                .execute(&mut *tx)
                .await?;

                sqlx::query("DELETE FROM pricing_and_floor_plans WHERE property_id = ?1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                id
            }
            None => {
                let (id,): (i64,) = sqlx::query_as(
                    "INSERT INTO property (
                        property_link, title, address, street, city, state,
                        zip_code, property_reviews, listing_verification,
                        lease_options, year_built, property_type,
                        validation_status, last_seen
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                     RETURNING id",
                )
                .bind(&record.property_link)
                .bind(&record.title)
                .bind(&record.address)
                .bind(&record.street)
                .bind(&record.city)
                .bind(&record.state)
                .bind(&record.zip_code)
                .bind(record.property_reviews)
                .bind(&record.listing_verification)
                .bind(&lease_options)
                .bind(record.year_built)
                .bind(&record.property_type)
                .bind(record.validation_status.as_str())
                .bind(last_seen)
                .fetch_one(&mut *tx)
                .await?;
                id
            }
        };

        Self::insert_floor_plans(&mut tx, property_id, record).await?;

        tx.commit().await?;
        Ok(property_id)
    }

    async fn insert_floor_plans(
        tx: &mut Transaction<'_, Sqlite>,
        property_id: i64,
        record: &PropertyRecord,
    ) -> Result<()> {
        for plan in &record.pricing_and_floor_plans {
            sqlx::query(
                "INSERT INTO pricing_and_floor_plans (
                    property_id, apartment_name, rent_price_range, bedrooms,
                    bathrooms, sqft, unit, base_rent, availability, details_link
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )
            .bind(property_id)
            .bind(&plan.apartment_name)
            .bind(&plan.rent_price_range)
            .bind(plan.bedrooms)
            .bind(plan.bathrooms)
            .bind(plan.sqft)
            .bind(&plan.unit)
            .bind(plan.base_rent)
            .bind(&plan.availability)
            .bind(&plan.details_link)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FloorPlanRecord, ValidationStatus};
    use tempfile::TempDir;

    async fn test_storage() -> (Storage, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("test.db").display());
        let storage = Storage::connect(&url).await.unwrap();
        storage.init_schema().await.unwrap();
        (storage, dir)
    }

    fn sample_record(link: &str, plans: usize) -> PropertyRecord {
        let mut record = PropertyRecord::new(link);
        record.title = Some("Sample Property".into());
        record.address = Some("12 Main St, Chicago, IL, 60601".into());
        record.street = Some("12 Main St".into());
        record.city = Some("Chicago".into());
        record.validation_status = ValidationStatus::Success;
        for i in 0..plans {
            record.pricing_and_floor_plans.push(FloorPlanRecord {
                apartment_name: Some(format!("Plan {i}")),
                rent_price_range: Some("$1,500 - $1,800".into()),
                bedrooms: Some(i as i64),
                bathrooms: Some(1.0),
                sqft: Some(650.0),
                unit: Some(format!("U{i}")),
                base_rent: Some(1500.0),
                availability: Some("Available Now".into()),
                details_link: Some(format!("key-{i}")),
            });
        }
        record
    }

    async fn property_count(storage: &Storage) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM property")
            .fetch_one(&storage.pool)
            .await
            .unwrap();
        count
    }

    async fn floor_plan_count(storage: &Storage) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pricing_and_floor_plans")
            .fetch_one(&storage.pool)
            .await
            .unwrap();
        count
    }

    #[tokio::test]
    async fn upsert_is_idempotent_for_identical_batches() {
        let (storage, _dir) = test_storage().await;
        let batch = vec![sample_record("https://example.com/p1", 2)];

        assert_eq!(storage.upsert_batch(&batch).await.unwrap(), 1);
        assert_eq!(storage.upsert_batch(&batch).await.unwrap(), 1);

        // One row per link, child count equals the LAST batch's count.
        assert_eq!(property_count(&storage).await, 1);
        assert_eq!(floor_plan_count(&storage).await, 2);
    }

    #[tokio::test]
    async fn rescrape_replaces_the_full_floor_plan_set() {
        let (storage, _dir) = test_storage().await;

        storage
            .upsert_batch(&[sample_record("https://example.com/p1", 3)])
            .await
            .unwrap();
        assert_eq!(floor_plan_count(&storage).await, 3);

        let mut updated = sample_record("https://example.com/p1", 1);
        updated.title = Some("Renamed Property".into());
        storage.upsert_batch(&[updated]).await.unwrap();

        assert_eq!(property_count(&storage).await, 1);
        assert_eq!(floor_plan_count(&storage).await, 1);

        let (title,): (String,) =
            sqlx::query_as("SELECT title FROM property WHERE property_link = ?1")
                .bind("https://example.com/p1")
                .fetch_one(&storage.pool)
                .await
                .unwrap();
        assert_eq!(title, "Renamed Property");
    }

    #[tokio::test]
    async fn one_bad_record_does_not_abort_the_batch() {
        let (storage, _dir) = test_storage().await;

        // Inject an integrity failure for one specific link.
        sqlx::raw_sql(
            "CREATE TRIGGER reject_bad_link BEFORE INSERT ON property
             WHEN NEW.property_link = 'https://example.com/bad'
             BEGIN SELECT RAISE(ABORT, 'injected integrity error'); END;",
        )
        .execute(&storage.pool)
        .await
        .unwrap();

        let batch = vec![
            sample_record("https://example.com/good1", 2),
            sample_record("https://example.com/bad", 2),
            sample_record("https://example.com/good2", 1),
        ];
        let saved = storage.upsert_batch(&batch).await.unwrap();

        assert_eq!(saved, 2);
        assert_eq!(property_count(&storage).await, 2);
        // The failed record rolled back wholesale: no orphaned floor plans.
        assert_eq!(floor_plan_count(&storage).await, 3);

        let (bad_rows,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM property WHERE property_link = ?1")
                .bind("https://example.com/bad")
                .fetch_one(&storage.pool)
                .await
                .unwrap();
        assert_eq!(bad_rows, 0);
    }

    #[tokio::test]
    async fn update_refreshes_last_seen() {
        let (storage, _dir) = test_storage().await;
        let batch = vec![sample_record("https://example.com/p1", 0)];

        storage.upsert_batch(&batch).await.unwrap();
        let (first,): (chrono::DateTime<Utc>,) =
            sqlx::query_as("SELECT last_seen FROM property")
                .fetch_one(&storage.pool)
                .await
                .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        storage.upsert_batch(&batch).await.unwrap();
        let (second,): (chrono::DateTime<Utc>,) =
            sqlx::query_as("SELECT last_seen FROM property")
                .fetch_one(&storage.pool)
                .await
                .unwrap();

        assert!(second > first, "timestamp should move forward on re-persist");
    }
}
