//! Derived orbital parameters computed from TLE line 2.
//!
//! These are pure functions of the TLE text: re-ingesting the same TLE must
//! produce identical derived values.

use crate::model::DerivedOrbitalParams;

/// Standard gravitational parameter of Earth, km^3/s^2.
const MU_EARTH: f64 = 398_600.4418;
/// Mean equatorial radius of Earth, km.
const EARTH_RADIUS_KM: f64 = 6_378.137;

/// Error parsing the fixed-width fields of a TLE's second line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TleLine2ParseError {
    pub detail: String,
}

impl std::fmt::Display for TleLine2ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed TLE line 2: {}", self.detail)
    }
}

impl std::error::Error for TleLine2ParseError {}

/// Parse a 69-character TLE line 2 and derive the orbital parameters spec
/// §4.4 lists.
///
/// Column ranges (0-indexed, end-exclusive) follow the public TLE format:
/// inclination `[8:16]`, eccentricity `[26:33]` (implied leading `0.`), mean
/// motion `[52:63]`.
pub fn derive_from_tle_line2(line2: &str) -> Result<DerivedOrbitalParams, TleLine2ParseError> {
    let chars: Vec<char> = line2.chars().collect();
    if chars.len() < 63 {
        return Err(TleLine2ParseError {
            detail: format!("expected at least 63 columns, got {}", chars.len()),
        });
    }

    let inclination_deg = field(&chars, 8, 16)?.trim().parse::<f64>().map_err(|e| {
        parse_err("inclination", e)
    })?;
    let eccentricity_digits = field(&chars, 26, 33)?;
    let eccentricity = format!("0.{}", eccentricity_digits.trim())
        .parse::<f64>()
        .map_err(|e| parse_err("eccentricity", e))?;
    let mean_motion_rev_per_day = field(&chars, 52, 63)?
        .trim()
        .parse::<f64>()
        .map_err(|e| parse_err("mean motion", e))?;

    if mean_motion_rev_per_day <= 0.0 {
        return Err(TleLine2ParseError {
            detail: "mean motion must be positive".to_string(),
        });
    }

    let period_min = 1440.0 / mean_motion_rev_per_day;
    let period_sec = period_min * 60.0;
    let semi_major_axis_km = (MU_EARTH * (period_sec / (2.0 * std::f64::consts::PI)).powi(2)).cbrt();
    let apogee_km = semi_major_axis_km * (1.0 + eccentricity) - EARTH_RADIUS_KM;
    let perigee_km = semi_major_axis_km * (1.0 - eccentricity) - EARTH_RADIUS_KM;

    Ok(DerivedOrbitalParams {
        inclination_deg,
        eccentricity,
        mean_motion_rev_per_day,
        period_min,
        semi_major_axis_km,
        apogee_km,
        perigee_km,
    })
}

fn field(chars: &[char], start: usize, end: usize) -> Result<String, TleLine2ParseError> {
    if end > chars.len() || start > end {
        return Err(TleLine2ParseError {
            detail: format!("column range [{start}:{end}] out of bounds"),
        });
    }
    Ok(chars[start..end].iter().collect())
}

fn parse_err(field_name: &str, e: std::num::ParseFloatError) -> TleLine2ParseError {
    TleLine2ParseError {
        detail: format!("{field_name}: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ISS (ZARYA), a well-known real TLE, line 2.
    const ISS_LINE2: &str = "2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537";

    #[test]
    fn derives_known_iss_parameters() {
        let derived = derive_from_tle_line2(ISS_LINE2).expect("valid TLE line 2");
        assert!((derived.inclination_deg - 51.6416).abs() < 1e-6);
        assert!((derived.eccentricity - 0.0006703).abs() < 1e-9);
        assert!((derived.mean_motion_rev_per_day - 15.72125391).abs() < 1e-6);
    }

    #[test]
    fn period_times_mean_motion_is_1440_within_precision() {
        let derived = derive_from_tle_line2(ISS_LINE2).expect("valid TLE line 2");
        let product = derived.period_min * derived.mean_motion_rev_per_day;
        assert!((product - 1440.0).abs() < 1e-6);
    }

    #[test]
    fn vis_viva_identity_holds() {
        let derived = derive_from_tle_line2(ISS_LINE2).expect("valid TLE line 2");
        let a = derived.semi_major_axis_km;
        let e = derived.eccentricity;
        let lhs = a * (1.0 - e * e);
        let rhs = a - e * (derived.apogee_km - derived.perigee_km) / 2.0;
        assert!((lhs - rhs).abs() < 1e-6);
    }

    #[test]
    fn deterministic_across_repeated_calls() {
        let first = derive_from_tle_line2(ISS_LINE2).unwrap();
        let second = derive_from_tle_line2(ISS_LINE2).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_short_line() {
        assert!(derive_from_tle_line2("2 25544").is_err());
    }
}
