//! Raw upstream record shape and the pure normalization into internal DTOs.
//!
//! Parsing lives here rather than in `catalog_infra::upstream_client` so the
//! epoch/TLE-shape edge cases are unit-testable without an HTTP client.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::error::IngestError;
use crate::model::DerivedOrbitalParams;
use crate::orbital::derive_from_tle_line2;

/// One raw record as the upstream returns it. Every field the upstream sends
/// for `gp`, `gp_history`, and `satcat` queries is represented here; which
/// ones are actually populated depends on the query class.
/// Every field is optional because record shape varies by query class.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "NORAD_CAT_ID")]
    pub norad_cat_id: Option<String>,
    #[serde(rename = "OBJECT_NAME")]
    pub object_name: Option<String>,
    #[serde(rename = "INTLDES")]
    pub intldes: Option<String>,
    #[serde(rename = "EPOCH")]
    pub epoch: Option<String>,
    #[serde(rename = "TLE_LINE1")]
    pub tle_line1: Option<String>,
    #[serde(rename = "TLE_LINE2")]
    pub tle_line2: Option<String>,
    #[serde(rename = "DECAY_DATE")]
    pub decay_date: Option<String>,
    #[serde(rename = "LAUNCH")]
    pub launch: Option<String>,
    #[serde(rename = "SITE")]
    pub site: Option<String>,
    #[serde(rename = "COUNTRY")]
    pub country: Option<String>,
    #[serde(rename = "RCS")]
    pub rcs: Option<String>,
    #[serde(rename = "OBJECT_TYPE")]
    pub object_type: Option<String>,
}

/// Normalized `gp`/`gp_history` record: TLE lines plus derived orbital
/// parameters, ready for the Catalog Writer.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedGpRecord {
    pub catalog_number: i32,
    pub object_name: String,
    pub intl_designator: Option<String>,
    pub epoch: DateTime<Utc>,
    pub tle_line1: String,
    pub tle_line2: String,
    pub decay_date: Option<NaiveDate>,
    pub derived: DerivedOrbitalParams,
}

/// Normalized `satcat` record: metadata only, no TLE lines.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSatcatRecord {
    pub catalog_number: i32,
    pub object_name: String,
    pub intl_designator: Option<String>,
    pub launch_date: Option<NaiveDate>,
    pub decay_date: Option<NaiveDate>,
    pub country_code: Option<String>,
    pub object_type: Option<String>,
    pub rcs_size: Option<String>,
}

fn malformed(detail: impl Into<String>) -> IngestError {
    IngestError::MalformedUpstreamResponse { detail: detail.into() }
}

fn require_field<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, IngestError> {
    value
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| malformed(format!("missing required field {name}")))
}

/// Accept both `YYYY-MM-DDThh:mm:ss` and its sub-second variant; reject
/// anything ambiguous about timezone. The upstream always reports epochs in
/// UTC with no offset suffix, so a bare naive timestamp is treated as UTC.
pub fn parse_epoch(raw: &str) -> Result<DateTime<Utc>, IngestError> {
    let formats = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"];
    for format in formats {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(malformed(format!("unparseable epoch '{raw}'")))
}

fn parse_optional_date(raw: &Option<String>) -> Option<NaiveDate> {
    raw.as_deref()
        .filter(|s| !s.is_empty())
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

fn parse_catalog_number(raw: &Option<String>) -> Result<i32, IngestError> {
    require_field(raw, "NORAD_CAT_ID")?
        .trim()
        .parse::<i32>()
        .map_err(|e| malformed(format!("invalid NORAD_CAT_ID: {e}")))
}

/// Normalize one `gp`/`gp_history` record, deriving orbital parameters from
/// `tle_line2` along the way.
pub fn normalize_gp_record(raw: &RawRecord) -> Result<NormalizedGpRecord, IngestError> {
    let catalog_number = parse_catalog_number(&raw.norad_cat_id)?;
    let object_name = require_field(&raw.object_name, "OBJECT_NAME")?.to_string();
    let epoch = parse_epoch(require_field(&raw.epoch, "EPOCH")?)?;
    let tle_line1 = require_field(&raw.tle_line1, "TLE_LINE1")?.to_string();
    let tle_line2 = require_field(&raw.tle_line2, "TLE_LINE2")?.to_string();
    let derived = derive_from_tle_line2(&tle_line2)
        .map_err(|e| malformed(format!("orbital derivation failed: {e}")))?;

    Ok(NormalizedGpRecord {
        catalog_number,
        object_name,
        intl_designator: raw.intldes.clone().filter(|s| !s.is_empty()),
        epoch,
        tle_line1,
        tle_line2,
        decay_date: parse_optional_date(&raw.decay_date),
        derived,
    })
}

/// Normalize one `satcat` record.
pub fn normalize_satcat_record(raw: &RawRecord) -> Result<NormalizedSatcatRecord, IngestError> {
    let catalog_number = parse_catalog_number(&raw.norad_cat_id)?;
    let object_name = require_field(&raw.object_name, "OBJECT_NAME")?.to_string();

    Ok(NormalizedSatcatRecord {
        catalog_number,
        object_name,
        intl_designator: raw.intldes.clone().filter(|s| !s.is_empty()),
        launch_date: parse_optional_date(&raw.launch),
        decay_date: parse_optional_date(&raw.decay_date),
        country_code: raw.country.clone().filter(|s| !s.is_empty()),
        object_type: raw.object_type.clone().filter(|s| !s.is_empty()),
        rcs_size: raw.rcs.clone().filter(|s| !s.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raw() -> RawRecord {
        RawRecord {
            norad_cat_id: Some("44713".to_string()),
            object_name: Some("STARLINK-1007".to_string()),
            intldes: Some("2019-074A".to_string()),
            epoch: Some("2024-01-15T06:30:00.123456".to_string()),
            tle_line1: Some("1 44713U 19074A   24015.27083333  .00002182  00000-0  16538-3 0  9996".to_string()),
            tle_line2: Some("2 44713  53.0544 157.6345 0001420  90.5711 269.5524 15.06414814237473".to_string()),
            decay_date: None,
            launch: Some("2019-074".to_string()),
            site: None,
            country: Some("US".to_string()),
            rcs: None,
            object_type: Some("PAYLOAD".to_string()),
        }
    }

    #[test]
    fn parses_subsecond_epoch() {
        let epoch = parse_epoch("2024-01-15T06:30:00.123456").unwrap();
        assert_eq!(epoch.to_rfc3339().starts_with("2024-01-15T06:30:00"), true);
    }

    #[test]
    fn parses_whole_second_epoch() {
        assert!(parse_epoch("2024-01-15T06:30:00").is_ok());
    }

    #[test]
    fn rejects_malformed_epoch() {
        assert!(parse_epoch("not-a-date").is_err());
    }

    #[test]
    fn normalizes_a_well_formed_gp_record() {
        let normalized = normalize_gp_record(&sample_raw()).unwrap();
        assert_eq!(normalized.catalog_number, 44713);
        assert_eq!(normalized.object_name, "STARLINK-1007");
        assert!(normalized.decay_date.is_none());
    }

    #[test]
    fn gp_record_missing_tle_line_is_malformed() {
        let mut raw = sample_raw();
        raw.tle_line1 = None;
        assert!(normalize_gp_record(&raw).is_err());
    }

    #[test]
    fn satcat_record_does_not_require_tle_lines() {
        let mut raw = sample_raw();
        raw.tle_line1 = None;
        raw.tle_line2 = None;
        let normalized = normalize_satcat_record(&raw).unwrap();
        assert_eq!(normalized.catalog_number, 44713);
        assert_eq!(normalized.country_code.as_deref(), Some("US"));
    }

    #[test]
    fn decay_date_parses_into_naive_date() {
        let mut raw = sample_raw();
        raw.decay_date = Some("2025-03-01".to_string());
        let normalized = normalize_gp_record(&raw).unwrap();
        assert_eq!(normalized.decay_date, NaiveDate::from_ymd_opt(2025, 3, 1));
    }
}
