//! Static table of known constellations.
//!
//! This is data, not logic: several of these predicates are known to over-
//! or under-match on the upstream (`NAVSTAR` for GPS, `COSMOS` for GLONASS),
//! and curating them is explicitly left outside the core.

/// A single entry of the constellation registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstellationDef {
    pub slug: &'static str,
    pub display_name: &'static str,
    /// Values matched against `OBJECT_NAME` with the `contains` operator.
    /// More than one pattern means the upstream is queried once per
    /// pattern and the results are merged and deduplicated by catalog
    /// number, since the upstream has no native "OR" predicate.
    pub name_patterns: &'static [&'static str],
    pub category: &'static str,
    pub color: &'static str,
}

/// The built-in registry, ordered to match the Initial Loader's priority
/// order: Starlink, OneWeb, GPS, stations, Iridium, Globalstar, Galileo,
/// BeiDou, GLONASS, then the remainder.
pub const CONSTELLATIONS: &[ConstellationDef] = &[
    ConstellationDef {
        slug: "starlink",
        display_name: "Starlink",
        name_patterns: &["STARLINK"],
        category: "internet",
        color: "#1DA1F2",
    },
    ConstellationDef {
        slug: "oneweb",
        display_name: "OneWeb",
        name_patterns: &["ONEWEB"],
        category: "internet",
        color: "#00A3E0",
    },
    ConstellationDef {
        slug: "gps",
        display_name: "GPS",
        name_patterns: &["NAVSTAR"],
        category: "navigation",
        color: "#4CAF50",
    },
    ConstellationDef {
        slug: "stations",
        display_name: "Space Stations",
        // ISS, China's Tiangong, and its predecessor Tianhe core module are
        // three distinct upstream names for the same "station" category.
        name_patterns: &["ISS", "TIANGONG", "CSS"],
        category: "station",
        color: "#FFD700",
    },
    ConstellationDef {
        slug: "iridium",
        display_name: "Iridium NEXT",
        name_patterns: &["IRIDIUM"],
        category: "cellular",
        color: "#FF6B35",
    },
    ConstellationDef {
        slug: "globalstar",
        display_name: "Globalstar",
        name_patterns: &["GLOBALSTAR"],
        category: "cellular",
        color: "#FFA726",
    },
    ConstellationDef {
        slug: "galileo",
        display_name: "Galileo",
        name_patterns: &["GALILEO"],
        category: "navigation",
        color: "#003399",
    },
    ConstellationDef {
        slug: "beidou",
        display_name: "BeiDou",
        name_patterns: &["BEIDOU"],
        category: "navigation",
        color: "#DE2910",
    },
    ConstellationDef {
        slug: "glonass",
        display_name: "GLONASS",
        // Known over-matcher: COSMOS is used for many non-GLONASS Russian
        // satellites too.
        name_patterns: &["COSMOS"],
        category: "navigation",
        color: "#0033A0",
    },
];

/// Priority order used by the Initial Loader. Any configured constellation
/// not listed here runs after these, in registry order.
pub fn initial_loader_priority_order() -> Vec<&'static str> {
    CONSTELLATIONS.iter().map(|c| c.slug).collect()
}

/// Look up a registry entry by slug.
pub fn find(slug: &str) -> Option<&'static ConstellationDef> {
    CONSTELLATIONS.iter().find(|c| c.slug == slug)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_order_starts_with_starlink_oneweb_gps() {
        let order = initial_loader_priority_order();
        assert_eq!(&order[0..3], &["starlink", "oneweb", "gps"]);
    }

    #[test]
    fn find_returns_none_for_unknown_slug() {
        assert!(find("kuiper").is_none());
    }

    #[test]
    fn find_returns_registry_entry_for_known_slug() {
        let entry = find("starlink").expect("starlink is registered");
        assert_eq!(entry.name_patterns, &["STARLINK"]);
    }

    #[test]
    fn stations_entry_has_three_name_patterns() {
        let entry = find("stations").expect("stations is registered");
        assert_eq!(entry.name_patterns, &["ISS", "TIANGONG", "CSS"]);
    }
}
