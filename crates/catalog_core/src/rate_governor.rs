//! Per-constellation, per-query-type minimum-interval enforcement,
//! orthogonal to the Account Pool's per-account limits.
//!
//! Like [`crate::account_pool`], this is pure: callers pass `now` and hold
//! whatever lock guards the map in `catalog_infra`.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::query::QueryType;

fn min_interval_secs(query_type: QueryType) -> i64 {
    match query_type {
        QueryType::GpRefresh => 3600,          // 1 hour
        QueryType::SatcatSync => 86_400,       // 24 hours
        QueryType::GpHistory => 604_800,       // 7 days
        QueryType::Decay | QueryType::Tip => 0, // none critical
    }
}

/// Owns the `(constellation, query_type) -> last_call_timestamp` map.
#[derive(Debug, Default, Clone)]
pub struct RateGovernor {
    last_call: HashMap<(String, QueryType), DateTime<Utc>>,
}

impl RateGovernor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a call for `(constellation, query_type)` is permitted at
    /// `now`, i.e. no prior call or at least the minimum interval has
    /// elapsed since the last one.
    pub fn may_call(&self, now: DateTime<Utc>, constellation: &str, query_type: QueryType) -> bool {
        let min_interval = min_interval_secs(query_type);
        if min_interval == 0 {
            return true;
        }
        match self.last_call.get(&(constellation.to_string(), query_type)) {
            Some(last) => now - *last >= Duration::seconds(min_interval),
            None => true,
        }
    }

    pub fn record_call(&mut self, now: DateTime<Utc>, constellation: &str, query_type: QueryType) {
        self.last_call
            .insert((constellation.to_string(), query_type), now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn first_call_is_always_permitted() {
        let gov = RateGovernor::new();
        assert!(gov.may_call(t(0), "starlink", QueryType::GpRefresh));
    }

    #[test]
    fn second_call_blocked_before_minimum_interval() {
        let mut gov = RateGovernor::new();
        gov.record_call(t(0), "starlink", QueryType::GpRefresh);
        assert!(!gov.may_call(t(3599), "starlink", QueryType::GpRefresh));
        assert!(gov.may_call(t(3600), "starlink", QueryType::GpRefresh));
    }

    #[test]
    fn constellations_are_independent() {
        let mut gov = RateGovernor::new();
        gov.record_call(t(0), "starlink", QueryType::GpRefresh);
        assert!(gov.may_call(t(1), "oneweb", QueryType::GpRefresh));
    }

    #[test]
    fn decay_queries_have_no_minimum_interval() {
        let mut gov = RateGovernor::new();
        gov.record_call(t(0), "starlink", QueryType::Decay);
        assert!(gov.may_call(t(1), "starlink", QueryType::Decay));
    }
}
