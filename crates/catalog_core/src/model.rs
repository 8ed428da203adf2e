//! Persisted entities of the satellite catalog.
//!
//! Fields mirror the upstream's `NORAD_CAT_ID` / `gp` / `satcat` schema
//! (see the registry and orbital modules for how they are derived and
//! queried). These are plain data types; persistence lives in
//! `catalog_infra::store`.

use chrono::{DateTime, NaiveDate, Utc};

/// A known constellation: a static slug plus the upstream predicate used to
/// select its members, and bookkeeping maintained by the writer.
#[derive(Debug, Clone, PartialEq)]
pub struct Constellation {
    pub id: i64,
    /// Unique, stable key (e.g. "starlink").
    pub slug: String,
    pub display_name: String,
    pub upstream_query_predicate: String,
    pub category: String,
    pub color: String,
    /// Live count of this constellation's satellites, maintained by the writer.
    pub cached_satellite_count: i64,
    pub updated_at: DateTime<Utc>,
}

/// Orbital parameters derived from a TLE's second line at write time.
///
/// Every field here is a pure function of `tle_line2`, so re-ingesting the
/// same TLE must produce identical values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedOrbitalParams {
    pub inclination_deg: f64,
    pub eccentricity: f64,
    pub mean_motion_rev_per_day: f64,
    pub period_min: f64,
    pub semi_major_axis_km: f64,
    pub apogee_km: f64,
    pub perigee_km: f64,
}

/// A tracked object: created on first observation, never deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct Satellite {
    pub id: i64,
    /// NORAD catalog number; unique across all constellations (invariant 1).
    pub catalog_number: i32,
    pub name: String,
    pub constellation_id: i64,
    pub intl_designator: Option<String>,
    pub launch_date: Option<NaiveDate>,
    pub decay_date: Option<NaiveDate>,
    pub country_code: Option<String>,
    pub object_type: Option<String>,
    pub rcs_size: Option<String>,
    pub tle_line1: Option<String>,
    pub tle_line2: Option<String>,
    pub tle_epoch: Option<DateTime<Utc>>,
    pub derived_orbital_params: Option<DerivedOrbitalParams>,
    pub tle_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Satellite {
    /// Derived: a satellite is active iff it has no recorded decay date
    /// (invariant 3).
    pub fn is_active(&self) -> bool {
        self.decay_date.is_none()
    }
}

/// Tag recording which pipeline wrote a history row, for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistorySourceTag {
    /// Written by a GP refresh when the TLE epoch advanced.
    LiveRefresh,
    /// Written by the backfill engine.
    Backfill,
    /// Written by a bulk archive import (§6.4 `import-history`).
    ArchiveImport,
}

impl HistorySourceTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LiveRefresh => "live-refresh",
            Self::Backfill => "backfill",
            Self::ArchiveImport => "archive-import",
        }
    }
}

/// Append-only historical TLE observation. `(satellite_id, epoch)` is unique
/// (invariant 2); re-ingesting the same epoch is a no-op.
#[derive(Debug, Clone, PartialEq)]
pub struct TleHistoryRecord {
    pub id: i64,
    pub satellite_id: i64,
    pub tle_line1: String,
    pub tle_line2: String,
    pub epoch: DateTime<Utc>,
    pub derived_orbital_params: DerivedOrbitalParams,
    pub source_tag: HistorySourceTag,
    pub recorded_at: DateTime<Utc>,
}

/// Created opportunistically during metadata sync, keyed by the first 8
/// characters of the international designator.
#[derive(Debug, Clone, PartialEq)]
pub struct Launch {
    pub id: i64,
    pub cospar_id: String,
    pub mission_name: Option<String>,
    pub launch_date: Option<NaiveDate>,
    pub launch_site: Option<String>,
    pub rocket_type: Option<String>,
}

/// First 8 characters of an international designator identify its launch
/// (invariant: boundary behavior 12 — shorter designators contribute no
/// Launch row).
pub fn cospar_id_from_intl_designator(intl_designator: &str) -> Option<String> {
    if intl_designator.chars().count() < 8 {
        return None;
    }
    Some(intl_designator.chars().take(8).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn satellite_without_decay_date_is_active() {
        let sat = make_satellite(None);
        assert!(sat.is_active());
    }

    #[test]
    fn satellite_with_decay_date_is_inactive() {
        let sat = make_satellite(NaiveDate::from_ymd_opt(2025, 3, 1));
        assert!(!sat.is_active());
    }

    #[test]
    fn cospar_id_requires_eight_chars() {
        assert_eq!(cospar_id_from_intl_designator("2024-01A"), Some("2024-01A".to_string()));
        assert_eq!(cospar_id_from_intl_designator("2024-1A"), None);
    }

    fn make_satellite(decay_date: Option<NaiveDate>) -> Satellite {
        Satellite {
            id: 1,
            catalog_number: 44713,
            name: "STARLINK-1007".to_string(),
            constellation_id: 1,
            intl_designator: Some("2019-074A".to_string()),
            launch_date: None,
            decay_date,
            country_code: None,
            object_type: None,
            rcs_size: None,
            tle_line1: None,
            tle_line2: None,
            tle_epoch: None,
            derived_orbital_params: None,
            tle_updated_at: None,
            created_at: Utc::now(),
        }
    }
}
