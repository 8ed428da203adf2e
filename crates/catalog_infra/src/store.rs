//! Transactional writer and persisted state.
//!
//! Runtime-selectable backend via `sqlx::Any`, so `database_url` can point
//! at SQLite for local development and PostgreSQL in production without a
//! build-time choice of driver, and `sqlx::query()` with runtime binds
//! rather than the `sqlx::query!` compile-time macro, which would need a
//! live database at build time. The transactional shape — one connection
//! held across a whole batch, rolled back and logged on conflict rather
//! than partially applied — mirrors the account ledger's write path.

use catalog_core::error::IngestError;
use catalog_core::model::HistorySourceTag;
use catalog_core::normalize::{NormalizedGpRecord, NormalizedSatcatRecord};
use catalog_core::model::cospar_id_from_intl_designator;
use chrono::Utc;
use log::{info, warn};
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{Executor, Row};

/// Result of [`CatalogWriter::upsert_gp_batch`]: `(new_count, updated_count)`.
pub type GpUpsertCounts = (u64, u64);

pub struct CatalogWriter {
    pool: sqlx::AnyPool,
    /// `INTEGER PRIMARY KEY` auto-populates via `rowid` on SQLite but is a
    /// plain column on PostgreSQL; schema DDL and the one insert that reads
    /// its own generated id back branch on this.
    is_sqlite: bool,
}

fn conflict(detail: impl Into<String>) -> IngestError {
    IngestError::PersistenceConflict { detail: detail.into() }
}

impl CatalogWriter {
    /// Connect and, for SQLite targets, apply the WAL/synchronous/busy-timeout
    /// pragmas that make a single-writer embedded database behave under the
    /// ingestion workload's concurrent readers.
    pub async fn connect(database_url: &str) -> Result<Self, IngestError> {
        sqlx::any::install_default_drivers();
        let is_sqlite = database_url.starts_with("sqlite");
        let pool = AnyPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await
            .map_err(|e| IngestError::ConfigurationError {
                detail: format!("failed to connect to {database_url}: {e}"),
            })?;

        if is_sqlite {
            for pragma in [
                "PRAGMA journal_mode=WAL",
                "PRAGMA synchronous=NORMAL",
                "PRAGMA busy_timeout=30000",
            ] {
                pool.execute(pragma).await.map_err(|e| IngestError::ConfigurationError {
                    detail: format!("failed to apply '{pragma}': {e}"),
                })?;
            }
        }

        Ok(Self { pool, is_sqlite })
    }

    /// Create the persisted tables if they do not already exist. Column
    /// types are the lowest common denominator `sqlx::Any`'s backends both
    /// accept, except the primary key: SQLite's `INTEGER PRIMARY KEY` aliases
    /// `rowid` and self-populates, but the same declaration on PostgreSQL is
    /// an ordinary non-generated column, so that backend needs an explicit
    /// identity clause instead.
    pub async fn init_schema(&self) -> Result<(), IngestError> {
        let id_column = if self.is_sqlite {
            "id INTEGER PRIMARY KEY"
        } else {
            "id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY"
        };
        let statements = [
            format!(
                "CREATE TABLE IF NOT EXISTS constellations (
                {id_column},
                slug TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL,
                upstream_query_predicate TEXT NOT NULL,
                category TEXT NOT NULL,
                color TEXT NOT NULL,
                cached_satellite_count BIGINT NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            )"
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS satellites (
                {id_column},
                catalog_number INTEGER NOT NULL UNIQUE,
                name TEXT NOT NULL,
                constellation_id BIGINT NOT NULL,
                intl_designator TEXT,
                launch_date TEXT,
                decay_date TEXT,
                country_code TEXT,
                object_type TEXT,
                rcs_size TEXT,
                tle_line1 TEXT,
                tle_line2 TEXT,
                tle_epoch TEXT,
                inclination_deg DOUBLE PRECISION,
                eccentricity DOUBLE PRECISION,
                mean_motion_rev_per_day DOUBLE PRECISION,
                period_min DOUBLE PRECISION,
                semi_major_axis_km DOUBLE PRECISION,
                apogee_km DOUBLE PRECISION,
                perigee_km DOUBLE PRECISION,
                tle_updated_at TEXT,
                created_at TEXT NOT NULL
            )"
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS tle_history (
                {id_column},
                satellite_id BIGINT NOT NULL,
                tle_line1 TEXT NOT NULL,
                tle_line2 TEXT NOT NULL,
                epoch TEXT NOT NULL,
                inclination_deg DOUBLE PRECISION NOT NULL,
                eccentricity DOUBLE PRECISION NOT NULL,
                mean_motion_rev_per_day DOUBLE PRECISION NOT NULL,
                period_min DOUBLE PRECISION NOT NULL,
                semi_major_axis_km DOUBLE PRECISION NOT NULL,
                apogee_km DOUBLE PRECISION NOT NULL,
                perigee_km DOUBLE PRECISION NOT NULL,
                source_tag TEXT NOT NULL,
                recorded_at TEXT NOT NULL,
                UNIQUE(satellite_id, epoch)
            )"
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS launches (
                {id_column},
                cospar_id TEXT NOT NULL UNIQUE,
                mission_name TEXT,
                launch_date TEXT,
                launch_site TEXT,
                rocket_type TEXT
            )"
            ),
        ];
        for statement in statements {
            self.pool.execute(statement.as_str()).await.map_err(|e| IngestError::ConfigurationError {
                detail: format!("schema init failed: {e}"),
            })?;
        }
        Ok(())
    }

    /// Populate the constellation registry (CLI `seed`).
    pub async fn seed_registry(&self) -> Result<u64, IngestError> {
        let mut inserted = 0u64;
        let now = Utc::now().to_rfc3339();
        for entry in catalog_core::registry::CONSTELLATIONS {
            let existing: Option<AnyRow> = sqlx::query("SELECT id FROM constellations WHERE slug = ?")
                .bind(entry.slug)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| conflict(e.to_string()))?;
            if existing.is_some() {
                continue;
            }
            // Stored for operator visibility only; the upstream client reads
            // the registry's `name_patterns` slice directly, not this column.
            let predicate_display = entry.name_patterns.join(",");
            sqlx::query(
                "INSERT INTO constellations (slug, display_name, upstream_query_predicate, category, color, cached_satellite_count, updated_at) VALUES (?, ?, ?, ?, ?, 0, ?)",
            )
            .bind(entry.slug)
            .bind(entry.display_name)
            .bind(&predicate_display)
            .bind(entry.category)
            .bind(entry.color)
            .bind(&now)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict(e.to_string()))?;
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn constellation_id(&self, slug: &str) -> Result<i64, IngestError> {
        let row = sqlx::query("SELECT id FROM constellations WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| conflict(e.to_string()))?
            .ok_or_else(|| IngestError::ConfigurationError {
                detail: format!("unknown constellation slug '{slug}'"),
            })?;
        Ok(row.try_get::<i64, _>("id").unwrap_or_default())
    }

    /// Upsert by `catalog_number`. Returns `(new_count, updated_count)`. A
    /// changed epoch appends a `TleHistoryRecord` tagged `live-refresh`.
    pub async fn upsert_gp_batch(
        &self,
        records: &[NormalizedGpRecord],
        constellation: &str,
    ) -> Result<GpUpsertCounts, IngestError> {
        let constellation_id = self.constellation_id(constellation).await?;
        let mut new_count = 0u64;
        let mut updated_count = 0u64;
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await.map_err(|e| conflict(e.to_string()))?;

        for record in records {
            let existing: Option<AnyRow> = sqlx::query(
                "SELECT id, tle_epoch FROM satellites WHERE catalog_number = ?",
            )
            .bind(record.catalog_number)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| conflict(e.to_string()))?;

            let epoch_str = record.epoch.to_rfc3339();
            let decay_str = record.decay_date.map(|d| d.to_string());

            match existing {
                None => {
                    // RETURNING id rather than a separate max-id query: under
                    // PostgreSQL with concurrent writers, a second
                    // transaction's committed insert could otherwise be read
                    // back in between, attaching this record's history to the
                    // wrong satellite.
                    let inserted: AnyRow = sqlx::query(
                        "INSERT INTO satellites (catalog_number, name, constellation_id, intl_designator, decay_date, tle_line1, tle_line2, tle_epoch, inclination_deg, eccentricity, mean_motion_rev_per_day, period_min, semi_major_axis_km, apogee_km, perigee_km, tle_updated_at, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
                    )
                    .bind(record.catalog_number)
                    .bind(&record.object_name)
                    .bind(constellation_id)
                    .bind(record.intl_designator.as_deref())
                    .bind(decay_str.as_deref())
                    .bind(&record.tle_line1)
                    .bind(&record.tle_line2)
                    .bind(&epoch_str)
                    .bind(record.derived.inclination_deg)
                    .bind(record.derived.eccentricity)
                    .bind(record.derived.mean_motion_rev_per_day)
                    .bind(record.derived.period_min)
                    .bind(record.derived.semi_major_axis_km)
                    .bind(record.derived.apogee_km)
                    .bind(record.derived.perigee_km)
                    .bind(&now)
                    .bind(&now)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(|e| conflict(e.to_string()))?;
                    new_count += 1;

                    let satellite_id: i64 = inserted.try_get("id").unwrap_or_default();
                    self.append_history(&mut tx, satellite_id, record, HistorySourceTag::LiveRefresh, &now).await?;
                }
                Some(row) => {
                    let satellite_id: i64 = row.try_get("id").unwrap_or_default();
                    let prior_epoch: Option<String> = row.try_get("tle_epoch").ok();

                    sqlx::query(
                        "UPDATE satellites SET name = ?, constellation_id = ?, intl_designator = ?, decay_date = ?, tle_line1 = ?, tle_line2 = ?, tle_epoch = ?, inclination_deg = ?, eccentricity = ?, mean_motion_rev_per_day = ?, period_min = ?, semi_major_axis_km = ?, apogee_km = ?, perigee_km = ?, tle_updated_at = ? WHERE id = ?",
                    )
                    .bind(&record.object_name)
                    .bind(constellation_id)
                    .bind(record.intl_designator.as_deref())
                    .bind(decay_str.as_deref())
                    .bind(&record.tle_line1)
                    .bind(&record.tle_line2)
                    .bind(&epoch_str)
                    .bind(record.derived.inclination_deg)
                    .bind(record.derived.eccentricity)
                    .bind(record.derived.mean_motion_rev_per_day)
                    .bind(record.derived.period_min)
                    .bind(record.derived.semi_major_axis_km)
                    .bind(record.derived.apogee_km)
                    .bind(record.derived.perigee_km)
                    .bind(&now)
                    .bind(satellite_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| conflict(e.to_string()))?;
                    updated_count += 1;

                    if prior_epoch.as_deref() != Some(epoch_str.as_str()) {
                        self.append_history(&mut tx, satellite_id, record, HistorySourceTag::LiveRefresh, &now).await?;
                    }
                }
            }
        }

        self.refresh_constellation_count_tx(&mut tx, constellation_id, &now).await?;

        tx.commit().await.map_err(|e| {
            warn!(target: "catalog_infra::store", "gp batch commit failed, rolled back: {e}");
            conflict(e.to_string())
        })?;

        Ok((new_count, updated_count))
    }

    /// Insert a history row unless `(satellite_id, epoch)` already exists.
    /// Returns whether a row was inserted.
    async fn append_history(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Any>,
        satellite_id: i64,
        record: &NormalizedGpRecord,
        source_tag: HistorySourceTag,
        recorded_at: &str,
    ) -> Result<bool, IngestError> {
        let epoch_str = record.epoch.to_rfc3339();
        let existing: Option<AnyRow> = sqlx::query(
            "SELECT id FROM tle_history WHERE satellite_id = ? AND epoch = ?",
        )
        .bind(satellite_id)
        .bind(&epoch_str)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| conflict(e.to_string()))?;
        if existing.is_some() {
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO tle_history (satellite_id, tle_line1, tle_line2, epoch, inclination_deg, eccentricity, mean_motion_rev_per_day, period_min, semi_major_axis_km, apogee_km, perigee_km, source_tag, recorded_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(satellite_id)
        .bind(&record.tle_line1)
        .bind(&record.tle_line2)
        .bind(&epoch_str)
        .bind(record.derived.inclination_deg)
        .bind(record.derived.eccentricity)
        .bind(record.derived.mean_motion_rev_per_day)
        .bind(record.derived.period_min)
        .bind(record.derived.semi_major_axis_km)
        .bind(record.derived.apogee_km)
        .bind(record.derived.perigee_km)
        .bind(source_tag.as_str())
        .bind(recorded_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| conflict(e.to_string()))?;
        Ok(true)
    }

    /// Upsert satellite metadata from a `satcat` batch, opportunistically
    /// creating `Launch` rows by COSPAR prefix.
    pub async fn upsert_satcat_batch(
        &self,
        records: &[NormalizedSatcatRecord],
        constellation: &str,
    ) -> Result<GpUpsertCounts, IngestError> {
        let constellation_id = self.constellation_id(constellation).await?;
        let mut new_count = 0u64;
        let mut updated_count = 0u64;
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await.map_err(|e| conflict(e.to_string()))?;

        for record in records {
            if let Some(intl) = &record.intl_designator {
                if let Some(cospar) = cospar_id_from_intl_designator(intl) {
                    let existing_launch: Option<AnyRow> =
                        sqlx::query("SELECT id FROM launches WHERE cospar_id = ?")
                            .bind(&cospar)
                            .fetch_optional(&mut *tx)
                            .await
                            .map_err(|e| conflict(e.to_string()))?;
                    if existing_launch.is_none() {
                        // Best-effort: a concurrent insert of the same
                        // cospar_id fails this one on the UNIQUE constraint,
                        // which is fine, the other writer's row already
                        // covers this launch.
                        let _ = sqlx::query(
                            "INSERT INTO launches (cospar_id, launch_date) VALUES (?, ?)",
                        )
                        .bind(&cospar)
                        .bind(record.launch_date.map(|d| d.to_string()))
                        .execute(&mut *tx)
                        .await;
                    }
                }
            }

            let existing: Option<AnyRow> =
                sqlx::query("SELECT id FROM satellites WHERE catalog_number = ?")
                    .bind(record.catalog_number)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| conflict(e.to_string()))?;

            let decay_str = record.decay_date.map(|d| d.to_string());
            let launch_str = record.launch_date.map(|d| d.to_string());

            match existing {
                None => {
                    sqlx::query(
                        "INSERT INTO satellites (catalog_number, name, constellation_id, intl_designator, launch_date, decay_date, country_code, object_type, rcs_size, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    )
                    .bind(record.catalog_number)
                    .bind(&record.object_name)
                    .bind(constellation_id)
                    .bind(record.intl_designator.as_deref())
                    .bind(launch_str.as_deref())
                    .bind(decay_str.as_deref())
                    .bind(record.country_code.as_deref())
                    .bind(record.object_type.as_deref())
                    .bind(record.rcs_size.as_deref())
                    .bind(&now)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| conflict(e.to_string()))?;
                    new_count += 1;
                }
                Some(row) => {
                    let satellite_id: i64 = row.try_get("id").unwrap_or_default();
                    sqlx::query(
                        "UPDATE satellites SET name = ?, intl_designator = ?, launch_date = ?, decay_date = ?, country_code = ?, object_type = ?, rcs_size = ? WHERE id = ?",
                    )
                    .bind(&record.object_name)
                    .bind(record.intl_designator.as_deref())
                    .bind(launch_str.as_deref())
                    .bind(decay_str.as_deref())
                    .bind(record.country_code.as_deref())
                    .bind(record.object_type.as_deref())
                    .bind(record.rcs_size.as_deref())
                    .bind(satellite_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| conflict(e.to_string()))?;
                    updated_count += 1;
                }
            }
        }

        self.refresh_constellation_count_tx(&mut tx, constellation_id, &now).await?;
        tx.commit().await.map_err(|e| conflict(e.to_string()))?;
        Ok((new_count, updated_count))
    }

    /// Insert history records, skipping any `(satellite_id, epoch)` already
    /// present. Returns the insertion count.
    pub async fn persist_history_batch(
        &self,
        catalog_number_to_records: &[(i32, NormalizedGpRecord)],
    ) -> Result<u64, IngestError> {
        let now = Utc::now().to_rfc3339();
        let mut inserted = 0u64;
        let mut tx = self.pool.begin().await.map_err(|e| conflict(e.to_string()))?;

        for (catalog_number, record) in catalog_number_to_records {
            let satellite: Option<AnyRow> =
                sqlx::query("SELECT id FROM satellites WHERE catalog_number = ?")
                    .bind(catalog_number)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| conflict(e.to_string()))?;
            let Some(row) = satellite else {
                info!(target: "catalog_infra::store", "skipping history for unknown catalog number {catalog_number}");
                continue;
            };
            let satellite_id: i64 = row.try_get("id").unwrap_or_default();

            if self.append_history(&mut tx, satellite_id, record, HistorySourceTag::Backfill, &now).await? {
                inserted += 1;
            }
        }

        tx.commit().await.map_err(|e| conflict(e.to_string()))?;
        Ok(inserted)
    }

    async fn refresh_constellation_count_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Any>,
        constellation_id: i64,
        now: &str,
    ) -> Result<(), IngestError> {
        let row = sqlx::query("SELECT COUNT(*) AS c FROM satellites WHERE constellation_id = ?")
            .bind(constellation_id)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| conflict(e.to_string()))?;
        let count: i64 = row.try_get("c").unwrap_or_default();
        sqlx::query("UPDATE constellations SET cached_satellite_count = ?, updated_at = ? WHERE id = ?")
            .bind(count)
            .bind(now)
            .bind(constellation_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| conflict(e.to_string()))?;
        Ok(())
    }

    /// Cheapest possible round-trip to prove the pool can actually reach the
    /// database, for the liveness check rather than any real query.
    pub async fn ping(&self) -> Result<(), IngestError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| conflict(e.to_string()))
    }

    pub async fn satellite_count(&self) -> Result<i64, IngestError> {
        let row = sqlx::query("SELECT COUNT(*) AS c FROM satellites")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| conflict(e.to_string()))?;
        Ok(row.try_get("c").unwrap_or_default())
    }

    pub async fn constellation_count(&self) -> Result<i64, IngestError> {
        let row = sqlx::query("SELECT COUNT(*) AS c FROM constellations")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| conflict(e.to_string()))?;
        Ok(row.try_get("c").unwrap_or_default())
    }

    /// Earliest recorded history epoch per catalog number in `constellation`,
    /// feeding the Backfill Engine's coverage scan.
    pub async fn earliest_history_epoch_by_satellite(
        &self,
        constellation: &str,
    ) -> Result<Vec<(i64, i32, Option<chrono::DateTime<Utc>>)>, IngestError> {
        let constellation_id = self.constellation_id(constellation).await?;
        let rows = sqlx::query(
            "SELECT s.id AS id, s.catalog_number AS catalog_number, MIN(h.epoch) AS earliest
             FROM satellites s
             LEFT JOIN tle_history h ON h.satellite_id = s.id
             WHERE s.constellation_id = ?
             GROUP BY s.id, s.catalog_number",
        )
        .bind(constellation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| conflict(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("id").unwrap_or_default();
            let catalog_number: i32 = row.try_get("catalog_number").unwrap_or_default();
            let earliest: Option<String> = row.try_get("earliest").ok();
            let earliest = earliest.and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok()).map(|dt| dt.with_timezone(&Utc));
            out.push((id, catalog_number, earliest));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_and_init_in_memory_sqlite() {
        let writer = CatalogWriter::connect("sqlite::memory:").await.unwrap();
        writer.init_schema().await.unwrap();
        assert_eq!(writer.constellation_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn seed_registry_is_idempotent() {
        let writer = CatalogWriter::connect("sqlite::memory:").await.unwrap();
        writer.init_schema().await.unwrap();
        let first = writer.seed_registry().await.unwrap();
        let second = writer.seed_registry().await.unwrap();
        assert!(first > 0);
        assert_eq!(second, 0);
    }

    #[tokio::test]
    async fn upsert_gp_batch_reports_new_count_and_sets_cached_count() {
        use catalog_core::normalize::normalize_gp_record;
        use catalog_core::normalize::RawRecord;

        let writer = CatalogWriter::connect("sqlite::memory:").await.unwrap();
        writer.init_schema().await.unwrap();
        writer.seed_registry().await.unwrap();

        let raw = RawRecord {
            norad_cat_id: Some("44713".to_string()),
            object_name: Some("STARLINK-1007".to_string()),
            intldes: Some("2019-074A".to_string()),
            epoch: Some("2024-01-15T06:30:00".to_string()),
            tle_line1: Some("1 44713U 19074A   24015.27083333  .00002182  00000-0  16538-3 0  9996".to_string()),
            tle_line2: Some("2 44713  53.0544 157.6345 0001420  90.5711 269.5524 15.06414814237473".to_string()),
            decay_date: None,
            launch: None,
            site: None,
            country: None,
            rcs: None,
            object_type: None,
        };
        let normalized = normalize_gp_record(&raw).unwrap();

        let (new_count, updated_count) = writer.upsert_gp_batch(&[normalized.clone()], "starlink").await.unwrap();
        assert_eq!(new_count, 1);
        assert_eq!(updated_count, 0);
        assert_eq!(writer.satellite_count().await.unwrap(), 1);

        let (new_count2, updated_count2) = writer.upsert_gp_batch(&[normalized], "starlink").await.unwrap();
        assert_eq!(new_count2, 0);
        assert_eq!(updated_count2, 1);
    }

    #[tokio::test]
    async fn decay_date_transition_is_persisted_and_adds_history_only_on_new_epoch() {
        // Scenario S2: an active satellite refreshed with a DECAY_DATE should
        // flip inactive, and a new history row appears only if the epoch moved.
        use catalog_core::normalize::normalize_gp_record;
        use catalog_core::normalize::RawRecord;

        let writer = CatalogWriter::connect("sqlite::memory:").await.unwrap();
        writer.init_schema().await.unwrap();
        writer.seed_registry().await.unwrap();

        let mut raw = RawRecord {
            norad_cat_id: Some("44713".to_string()),
            object_name: Some("STARLINK-1007".to_string()),
            intldes: Some("2019-074A".to_string()),
            epoch: Some("2024-01-15T06:30:00".to_string()),
            tle_line1: Some("1 44713U 19074A   24015.27083333  .00002182  00000-0  16538-3 0  9996".to_string()),
            tle_line2: Some("2 44713  53.0544 157.6345 0001420  90.5711 269.5524 15.06414814237473".to_string()),
            decay_date: None,
            launch: None,
            site: None,
            country: None,
            rcs: None,
            object_type: None,
        };
        let first = normalize_gp_record(&raw).unwrap();
        writer.upsert_gp_batch(&[first], "starlink").await.unwrap();

        raw.decay_date = Some("2025-03-01".to_string());
        let decayed = normalize_gp_record(&raw).unwrap();
        let (new_count, updated_count) = writer.upsert_gp_batch(&[decayed], "starlink").await.unwrap();
        assert_eq!(new_count, 0);
        assert_eq!(updated_count, 1);

        let row: AnyRow = sqlx::query("SELECT decay_date FROM satellites WHERE catalog_number = ?")
            .bind(44713_i32)
            .fetch_one(&writer.pool)
            .await
            .unwrap();
        let decay_date: Option<String> = row.try_get("decay_date").ok();
        assert_eq!(decay_date.as_deref(), Some("2025-03-01"));

        let history_count: AnyRow = sqlx::query("SELECT COUNT(*) AS c FROM tle_history")
            .fetch_one(&writer.pool)
            .await
            .unwrap();
        let count: i64 = history_count.try_get("c").unwrap_or_default();
        // Same epoch as the first insert, so no second history row was added.
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn persist_history_batch_is_idempotent_for_the_same_satellite_and_epoch() {
        // Scenario S5: re-importing the identical (satellite, epoch) record
        // inserts it once; the second attempt inserts zero rows.
        use catalog_core::normalize::normalize_gp_record;
        use catalog_core::normalize::RawRecord;

        let writer = CatalogWriter::connect("sqlite::memory:").await.unwrap();
        writer.init_schema().await.unwrap();
        writer.seed_registry().await.unwrap();

        let raw = RawRecord {
            norad_cat_id: Some("44713".to_string()),
            object_name: Some("STARLINK-1007".to_string()),
            intldes: Some("2019-074A".to_string()),
            epoch: Some("2024-01-15T06:30:00".to_string()),
            tle_line1: Some("1 44713U 19074A   24015.27083333  .00002182  00000-0  16538-3 0  9996".to_string()),
            tle_line2: Some("2 44713  53.0544 157.6345 0001420  90.5711 269.5524 15.06414814237473".to_string()),
            decay_date: None,
            launch: None,
            site: None,
            country: None,
            rcs: None,
            object_type: None,
        };
        let normalized = normalize_gp_record(&raw).unwrap();
        writer.upsert_gp_batch(&[normalized.clone()], "starlink").await.unwrap();

        let batch = [(44713_i32, normalized)];
        let first_run = writer.persist_history_batch(&batch).await.unwrap();
        assert_eq!(first_run, 0, "the live refresh already recorded this epoch");

        // A record with an epoch not yet on file does get imported once, then
        // never again.
        let mut later_raw = raw.clone();
        later_raw.epoch = Some("2024-06-01T00:00:00".to_string());
        let later = normalize_gp_record(&later_raw).unwrap();
        let batch2 = [(44713_i32, later)];

        let imported = writer.persist_history_batch(&batch2).await.unwrap();
        assert_eq!(imported, 1);
        let skipped_on_replay = writer.persist_history_batch(&batch2).await.unwrap();
        assert_eq!(skipped_on_replay, 0);
    }
}
