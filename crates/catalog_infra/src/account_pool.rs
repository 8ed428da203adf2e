//! Async wrapper around [`catalog_core::account_pool`].
//!
//! The pure state machine lives in `catalog_core`; this module adds the
//! lock, the real clock, and the real sleeps the inter-request and
//! rotation floors call for. `tokio::sync::Mutex` rather than a synchronous
//! lock, since callers hold it across no I/O but the pool itself lives
//! inside an async job.

use std::time::Duration as StdDuration;

use catalog_core::account_pool::{
    AccountSnapshot, AccountState, ACCOUNT_ROTATION_DELAY_SECS, REQUEST_MIN_INTERVAL_SECS,
};
use catalog_core::query::QueryType;
use chrono::Utc;
use log::{debug, warn};
use tokio::sync::Mutex;
use tokio::time::sleep;

/// A usable account handle returned by [`AccountPool::acquire`]. Carries the
/// username so the caller can report the outcome back via [`AccountPool::record`]
/// without holding the pool lock across the HTTP call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountHandle {
    pub username: String,
}

struct Inner {
    accounts: Vec<AccountState>,
    /// Rolling round-robin cursor: each acquire scan starts where the last
    /// one left off rather than always from index 0.
    next_index: usize,
}

/// Owns every [`AccountState`] and the rotation index behind one lock.
pub struct AccountPool {
    inner: Mutex<Inner>,
}

impl AccountPool {
    pub fn new(usernames: impl IntoIterator<Item = String>) -> Self {
        let accounts = usernames.into_iter().map(AccountState::new).collect();
        Self {
            inner: Mutex::new(Inner {
                accounts,
                next_index: 0,
            }),
        }
    }

    /// Find a usable account for `(query_type, constellation)`, advance the
    /// rotation cursor, and sleep the inter-request/rotation floor before
    /// returning it. Returns `None` if no account is eligible right now.
    pub async fn acquire(&self, query_type: QueryType, constellation: &str) -> Option<AccountHandle> {
        let username = {
            let mut guard = self.inner.lock().await;
            let len = guard.accounts.len();
            if len == 0 {
                return None;
            }
            let now = Utc::now();
            let start = guard.next_index % len;
            let mut found = None;
            for offset in 0..len {
                let idx = (start + offset) % len;
                if guard.accounts[idx].is_available_for(now, query_type, constellation) {
                    found = Some(idx);
                    break;
                }
            }
            let idx = found?;
            guard.next_index = (idx + 1) % len;
            guard.accounts[idx].username.clone()
        };

        let floor = StdDuration::from_secs(
            REQUEST_MIN_INTERVAL_SECS.max(ACCOUNT_ROTATION_DELAY_SECS) as u64,
        );
        sleep(floor).await;
        debug!(target: "catalog_infra::account_pool", "acquired account {username} for {query_type}/{constellation}");
        Some(AccountHandle { username })
    }

    /// Poll [`Self::acquire`] until an account is available or `max_wait`
    /// elapses.
    pub async fn wait_until_available(
        &self,
        query_type: QueryType,
        constellation: &str,
        max_wait: StdDuration,
    ) -> Option<AccountHandle> {
        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            if let Some(handle) = self.acquire(query_type, constellation).await {
                return Some(handle);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            sleep(StdDuration::from_secs(1)).await;
        }
    }

    pub async fn record(&self, username: &str, query_type: QueryType, constellation: &str, success: bool) {
        let mut guard = self.inner.lock().await;
        let now = Utc::now();
        if let Some(account) = guard.accounts.iter_mut().find(|a| a.username == username) {
            account.record(now, query_type, constellation, success);
        }
    }

    pub async fn mark_rate_limited(&self, username: &str) {
        let mut guard = self.inner.lock().await;
        let now = Utc::now();
        if let Some(account) = guard.accounts.iter_mut().find(|a| a.username == username) {
            account.mark_rate_limited(now);
            warn!(target: "catalog_infra::account_pool", "{username} rate limited, cooling down");
        }
    }

    pub async fn mark_auth_failed(&self, username: &str, reason: impl Into<String>) {
        let mut guard = self.inner.lock().await;
        let now = Utc::now();
        if let Some(account) = guard.accounts.iter_mut().find(|a| a.username == username) {
            account.mark_auth_failed(now, reason);
            warn!(target: "catalog_infra::account_pool", "{username} auth failed");
        }
    }

    pub async fn mark_transient_error(&self, username: &str, reason: impl Into<String>) {
        let mut guard = self.inner.lock().await;
        if let Some(account) = guard.accounts.iter_mut().find(|a| a.username == username) {
            account.mark_transient_error(reason);
        }
    }

    /// Per-account health for the admin status surface.
    pub async fn status_snapshot(&self) -> Vec<AccountSnapshot> {
        let guard = self.inner.lock().await;
        guard.accounts.iter().map(AccountState::snapshot).collect()
    }

    pub async fn account_count(&self) -> usize {
        self.inner.lock().await.accounts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn acquire_returns_none_with_zero_accounts() {
        let pool = AccountPool::new(Vec::<String>::new());
        assert!(pool
            .acquire(QueryType::GpRefresh, "starlink")
            .await
            .is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_returns_a_registered_account() {
        let pool = AccountPool::new(vec!["alice".to_string(), "bob".to_string()]);
        let handle = pool.acquire(QueryType::GpRefresh, "starlink").await.unwrap();
        assert!(handle.username == "alice" || handle.username == "bob");
    }

    #[tokio::test(start_paused = true)]
    async fn record_and_snapshot_round_trip() {
        let pool = AccountPool::new(vec!["alice".to_string()]);
        let handle = pool.acquire(QueryType::GpRefresh, "starlink").await.unwrap();
        pool.record(&handle.username, QueryType::GpRefresh, "starlink", true)
            .await;
        let snapshot = pool.status_snapshot().await;
        assert_eq!(snapshot[0].total_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_account_is_unavailable_until_recovered() {
        let pool = AccountPool::new(vec!["alice".to_string(), "bob".to_string()]);
        pool.mark_rate_limited("alice").await;
        for _ in 0..2 {
            let handle = pool.acquire(QueryType::GpRefresh, "starlink").await.unwrap();
            assert_eq!(handle.username, "bob");
        }
    }
}
