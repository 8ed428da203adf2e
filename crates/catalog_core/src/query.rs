//! Upstream query-predicate encoding.
//!
//! Pure string-building: the Upstream Client (in `catalog_infra`) turns a
//! `Vec<PredicateSegment>` into a full request path. Keeping this here lets
//! the non-trivial escaping/ordering rules be unit tested without an HTTP
//! client.

use std::fmt;

/// The upstream's query classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryType {
    GpRefresh,
    SatcatSync,
    GpHistory,
    Decay,
    Tip,
}

impl QueryType {
    /// Upstream `class` path segment.
    pub fn upstream_class(self) -> &'static str {
        match self {
            Self::GpRefresh => "gp",
            Self::SatcatSync => "satcat",
            Self::GpHistory => "gp_history",
            Self::Decay => "decay",
            Self::Tip => "tip",
        }
    }

    /// Key used by the Rate Governor and Account Pool's query-specific
    /// cooldown maps — distinct from `upstream_class` because `GpHistory`'s
    /// cooldown is per-constellation while history queries for different
    /// constellations use the same upstream class.
    pub fn cooldown_key(self) -> &'static str {
        self.upstream_class()
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.upstream_class())
    }
}

/// A field/operator/value triple the upstream addresses as a path-segment
/// pair.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Contains { field: String, value: String },
    StartsWith { field: String, value: String },
    EndsWith { field: String, value: String },
    NotEqual { field: String, value: String },
    LessThan { field: String, value: String },
    GreaterThan { field: String, value: String },
    /// Inclusive `start--end` range.
    Range { field: String, start: String, end: String },
    IsNull { field: String },
}

impl Predicate {
    /// Render as the two path segments the upstream expects:
    /// `<field>/<operator><value>`.
    pub fn path_segments(&self) -> Vec<String> {
        match self {
            Self::Contains { field, value } => vec![field.clone(), format!("~~{value}")],
            Self::StartsWith { field, value } => vec![field.clone(), format!("^{value}")],
            Self::EndsWith { field, value } => vec![field.clone(), format!("{value}$")],
            Self::NotEqual { field, value } => vec![field.clone(), format!("<>{value}")],
            Self::LessThan { field, value } => vec![field.clone(), format!("<{value}")],
            Self::GreaterThan { field, value } => vec![field.clone(), format!(">{value}")],
            Self::Range { field, start, end } => {
                vec![field.clone(), format!("{start}--{end}")]
            }
            Self::IsNull { field } => vec![field.clone(), "null-val".to_string()],
        }
    }
}

/// Percent-encode the characters the upstream's path segments cannot carry
/// literally: spaces (separating the order-by field from its direction) and
/// `~`/`<`/`>`/`$` (the operator sigils already embedded by
/// [`Predicate::path_segments`]). Kept local rather than pulled from a crate
/// so this crate stays I/O- and dependency-free.
fn percent_encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b' ' => out.push_str("%20"),
            b'~' => out.push_str("%7E"),
            b'<' => out.push_str("%3C"),
            b'>' => out.push_str("%3E"),
            b'$' => out.push_str("%24"),
            _ => out.push(byte as char),
        }
    }
    out
}

/// Build the `basicspacedata/query/...` path for a set of predicates plus an
/// order-by clause, percent-encoding spaces and operator-bearing values.
pub fn build_query_path(
    class: &str,
    predicates: &[Predicate],
    order_by_field: &str,
    order_ascending: bool,
) -> String {
    let mut segments = vec!["basicspacedata".to_string(), "query".to_string(), "class".to_string(), class.to_string()];
    for predicate in predicates {
        segments.extend(predicate.path_segments());
    }
    segments.push("orderby".to_string());
    let direction = if order_ascending { "asc" } else { "desc" };
    segments.push(format!("{order_by_field} {direction}"));
    segments.push("format".to_string());
    segments.push("json".to_string());
    segments
        .iter()
        .map(|s| percent_encode_segment(s))
        .collect::<Vec<_>>()
        .join("/")
}

/// Alternate predicate shapes the history-query client tries in order,
/// because the upstream's `gp_history` endpoint is historically sensitive to
/// syntax. Each entry is a complete predicate list for the same logical
/// query: catalog numbers plus an epoch/date range.
pub fn gp_history_predicate_attempts(
    catalog_numbers_csv: &str,
    start_date: &str,
    end_date: &str,
) -> Vec<Vec<Predicate>> {
    vec![
        vec![
            Predicate::Contains {
                field: "NORAD_CAT_ID".to_string(),
                value: catalog_numbers_csv.to_string(),
            },
            Predicate::Range {
                field: "EPOCH".to_string(),
                start: start_date.to_string(),
                end: end_date.to_string(),
            },
        ],
        vec![
            Predicate::Contains {
                field: "NORAD_CAT_ID".to_string(),
                value: catalog_numbers_csv.to_string(),
            },
            Predicate::GreaterThan {
                field: "EPOCH".to_string(),
                value: start_date.to_string(),
            },
            Predicate::LessThan {
                field: "EPOCH".to_string(),
                value: end_date.to_string(),
            },
        ],
        vec![
            Predicate::Contains {
                field: "NORAD_CAT_ID".to_string(),
                value: catalog_numbers_csv.to_string(),
            },
            Predicate::Range {
                field: "CREATION_DATE".to_string(),
                start: start_date.to_string(),
                end: end_date.to_string(),
            },
        ],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_predicate_uses_double_tilde() {
        let p = Predicate::Contains {
            field: "OBJECT_NAME".to_string(),
            value: "STARLINK".to_string(),
        };
        assert_eq!(p.path_segments(), vec!["OBJECT_NAME", "~~STARLINK"]);
    }

    #[test]
    fn null_predicate_has_fixed_value_segment() {
        let p = Predicate::IsNull {
            field: "DECAY_DATE".to_string(),
        };
        assert_eq!(p.path_segments(), vec!["DECAY_DATE", "null-val"]);
    }

    #[test]
    fn build_query_path_percent_encodes_orderby_space() {
        let path = build_query_path("gp", &[], "EPOCH", false);
        assert!(path.contains("orderby/EPOCH%20desc"));
        assert!(path.ends_with("format/json"));
    }

    #[test]
    fn gp_history_tries_three_predicate_shapes() {
        let attempts = gp_history_predicate_attempts("44713,44714", "2024-01-01", "2024-06-01");
        assert_eq!(attempts.len(), 3);
    }
}
