//! Async wrapper around [`catalog_core::rate_governor`].
//!
//! A thin `tokio::sync::Mutex` guarding only the timestamp map, with no
//! sleeping or retry logic of its own; callers that find `may_call` false
//! simply skip the constellation for this cycle.

use catalog_core::query::QueryType;
use catalog_core::rate_governor::RateGovernor as CoreRateGovernor;
use chrono::Utc;
use tokio::sync::Mutex;

pub struct RateGovernor {
    inner: Mutex<CoreRateGovernor>,
}

impl RateGovernor {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CoreRateGovernor::new()),
        }
    }

    pub async fn may_call(&self, constellation: &str, query_type: QueryType) -> bool {
        self.inner.lock().await.may_call(Utc::now(), constellation, query_type)
    }

    pub async fn record_call(&self, constellation: &str, query_type: QueryType) {
        self.inner
            .lock()
            .await
            .record_call(Utc::now(), constellation, query_type);
    }
}

impl Default for RateGovernor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_call_blocked_until_interval_elapses() {
        let governor = RateGovernor::new();
        assert!(governor.may_call("starlink", QueryType::GpRefresh).await);
        governor.record_call("starlink", QueryType::GpRefresh).await;
        assert!(!governor.may_call("starlink", QueryType::GpRefresh).await);
    }

    #[tokio::test]
    async fn decay_is_always_permitted() {
        let governor = RateGovernor::new();
        governor.record_call("starlink", QueryType::Decay).await;
        assert!(governor.may_call("starlink", QueryType::Decay).await);
    }
}
