//! Pure account-pool state machine.
//!
//! This module holds no lock, no clock, and no sleep: every method takes
//! `now: DateTime<Utc>` explicitly so the rotation/cooldown rules are
//! deterministic and unit-testable. `catalog_infra::account_pool` wraps a
//! `Vec<AccountState>` behind a `tokio::sync::Mutex`, calls `Utc::now()` at
//! the call site, and performs the actual inter-request sleep.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::query::QueryType;

/// Requests allowed per rolling minute window.
pub const MAX_REQUESTS_PER_MINUTE: u32 = 25;
/// Requests allowed per rolling hour window.
pub const MAX_REQUESTS_PER_HOUR: u32 = 280;
/// Minimum seconds between requests across the whole pool.
pub const REQUEST_MIN_INTERVAL_SECS: i64 = 2;
/// Delay enforced after handing an account out, before it is handed out
/// again.
pub const ACCOUNT_ROTATION_DELAY_SECS: i64 = 2;
/// Cooldown applied after a rate-limit signal.
pub const RATE_LIMIT_COOLDOWN_SECS: i64 = 1800;
/// Cooldown applied after an auth-failure signal.
pub const AUTH_FAILURE_COOLDOWN_SECS: i64 = 3600;
/// Consecutive errors after which an account is permanently suspended.
pub const MAX_CONSECUTIVE_ERRORS: u32 = 5;
/// Minimum interval between identical GP queries on the same account.
pub const GP_QUERY_COOLDOWN_SECS: i64 = 3600;
/// Minimum interval between SATCAT queries on the same account.
pub const SATCAT_QUERY_COOLDOWN_SECS: i64 = 86_400;
/// Minimum interval between identical history queries on the same account.
pub const GP_HISTORY_COOLDOWN_SECS: i64 = 604_800;

/// Lifecycle status of a single account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    Active,
    RateLimited,
    Suspended,
    AuthFailed,
    Cooldown,
}

/// In-memory state for a single upstream credential.
#[derive(Debug, Clone)]
pub struct AccountState {
    pub username: String,
    status: AccountStatus,
    requests_this_minute: u32,
    requests_this_hour: u32,
    total_requests: u64,
    minute_window_start: Option<DateTime<Utc>>,
    hour_window_start: Option<DateTime<Utc>>,
    cooldown_until: Option<DateTime<Utc>>,
    /// Last successful call per `(query_type, constellation)`.
    last_query_time: HashMap<(QueryType, String), DateTime<Utc>>,
    consecutive_errors: u32,
    last_error: Option<String>,
}

impl AccountState {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            status: AccountStatus::Active,
            requests_this_minute: 0,
            requests_this_hour: 0,
            total_requests: 0,
            minute_window_start: None,
            hour_window_start: None,
            cooldown_until: None,
            last_query_time: HashMap::new(),
            consecutive_errors: 0,
            last_error: None,
        }
    }

    pub fn status(&self) -> AccountStatus {
        self.status
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    fn reset_minute_window_if_elapsed(&mut self, now: DateTime<Utc>) {
        let expired = self
            .minute_window_start
            .map(|start| now - start >= Duration::seconds(60))
            .unwrap_or(true);
        if expired {
            self.requests_this_minute = 0;
            self.minute_window_start = Some(now);
        }
    }

    fn reset_hour_window_if_elapsed(&mut self, now: DateTime<Utc>) {
        let expired = self
            .hour_window_start
            .map(|start| now - start >= Duration::seconds(3600))
            .unwrap_or(true);
        if expired {
            self.requests_this_hour = 0;
            self.hour_window_start = Some(now);
        }
    }

    /// Lazily clear an elapsed cooldown, transitioning back to `Active` on
    /// read rather than on a timer.
    fn clear_elapsed_cooldown(&mut self, now: DateTime<Utc>) {
        if matches!(
            self.status,
            AccountStatus::RateLimited | AccountStatus::AuthFailed | AccountStatus::Cooldown
        ) {
            if let Some(until) = self.cooldown_until {
                if now >= until {
                    self.status = AccountStatus::Active;
                    self.cooldown_until = None;
                    self.consecutive_errors = 0;
                }
            }
        }
    }

    /// Whether this account's per-account, per-query cooldown allows
    /// `query_type` against `constellation` right now.
    fn query_specific_cooldown_ok(
        &self,
        now: DateTime<Utc>,
        query_type: QueryType,
        constellation: &str,
    ) -> bool {
        let min_interval = match query_type {
            QueryType::GpRefresh => GP_QUERY_COOLDOWN_SECS,
            QueryType::SatcatSync => SATCAT_QUERY_COOLDOWN_SECS,
            QueryType::GpHistory => GP_HISTORY_COOLDOWN_SECS,
            QueryType::Decay | QueryType::Tip => 0,
        };
        if min_interval == 0 {
            return true;
        }
        match self
            .last_query_time
            .get(&(query_type, constellation.to_string()))
        {
            Some(last) => now - *last >= Duration::seconds(min_interval),
            None => true,
        }
    }

    /// Evaluate and lazily update availability, then report whether this
    /// account may serve `query_type` for `constellation` right now.
    pub fn is_available_for(
        &mut self,
        now: DateTime<Utc>,
        query_type: QueryType,
        constellation: &str,
    ) -> bool {
        self.clear_elapsed_cooldown(now);
        if self.status == AccountStatus::Suspended {
            return false;
        }
        if matches!(
            self.status,
            AccountStatus::RateLimited | AccountStatus::AuthFailed | AccountStatus::Cooldown
        ) {
            return false;
        }
        self.reset_minute_window_if_elapsed(now);
        self.reset_hour_window_if_elapsed(now);
        if self.requests_this_minute >= MAX_REQUESTS_PER_MINUTE {
            return false;
        }
        if self.requests_this_hour >= MAX_REQUESTS_PER_HOUR {
            return false;
        }
        self.query_specific_cooldown_ok(now, query_type, constellation)
    }

    /// Record the outcome of a call made on this account.
    pub fn record(
        &mut self,
        now: DateTime<Utc>,
        query_type: QueryType,
        constellation: &str,
        success: bool,
    ) {
        self.requests_this_minute += 1;
        self.requests_this_hour += 1;
        self.total_requests += 1;
        if success {
            self.consecutive_errors = 0;
            self.last_query_time
                .insert((query_type, constellation.to_string()), now);
        }
    }

    pub fn mark_rate_limited(&mut self, now: DateTime<Utc>) {
        self.status = AccountStatus::RateLimited;
        self.cooldown_until = Some(now + Duration::seconds(RATE_LIMIT_COOLDOWN_SECS));
    }

    pub fn mark_auth_failed(&mut self, now: DateTime<Utc>, reason: impl Into<String>) {
        self.status = AccountStatus::AuthFailed;
        self.cooldown_until = Some(now + Duration::seconds(AUTH_FAILURE_COOLDOWN_SECS));
        self.bump_consecutive_error(reason);
    }

    pub fn mark_transient_error(&mut self, reason: impl Into<String>) {
        self.bump_consecutive_error(reason);
    }

    fn bump_consecutive_error(&mut self, reason: impl Into<String>) {
        self.consecutive_errors += 1;
        self.last_error = Some(reason.into());
        if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
            self.status = AccountStatus::Suspended;
        }
    }

    /// Masked view for `status_snapshot()`: never expose the credential,
    /// only the username with its local-part truncated.
    pub fn masked_username(&self) -> String {
        if let Some((local, domain)) = self.username.split_once('@') {
            if local.len() > 3 {
                return format!("{}***@{}", &local[..3], domain);
            }
        }
        let cut = self.username.len().min(3);
        format!("{}***", &self.username[..cut])
    }
}

/// Read-only snapshot of one account's health, for the admin status
/// surface.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSnapshot {
    pub masked_username: String,
    pub status: AccountStatusLabel,
    pub requests_this_minute: u32,
    pub requests_this_hour: u32,
    pub total_requests: u64,
    pub consecutive_errors: u32,
    pub last_error: Option<String>,
}

/// `Display`-friendly mirror of [`AccountStatus`] for serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatusLabel {
    Active,
    RateLimited,
    Suspended,
    AuthFailed,
    Cooldown,
}

impl From<AccountStatus> for AccountStatusLabel {
    fn from(status: AccountStatus) -> Self {
        match status {
            AccountStatus::Active => Self::Active,
            AccountStatus::RateLimited => Self::RateLimited,
            AccountStatus::Suspended => Self::Suspended,
            AccountStatus::AuthFailed => Self::AuthFailed,
            AccountStatus::Cooldown => Self::Cooldown,
        }
    }
}

impl AccountState {
    pub fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            masked_username: self.masked_username(),
            status: self.status.into(),
            requests_this_minute: self.requests_this_minute,
            requests_this_hour: self.requests_this_hour,
            total_requests: self.total_requests,
            consecutive_errors: self.consecutive_errors,
            last_error: self.last_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn fresh_account_is_available() {
        let mut acc = AccountState::new("a@example.com");
        assert!(acc.is_available_for(t(0), QueryType::GpRefresh, "starlink"));
    }

    #[test]
    fn account_unavailable_after_hitting_minute_cap() {
        let mut acc = AccountState::new("a@example.com");
        for _ in 0..MAX_REQUESTS_PER_MINUTE {
            assert!(acc.is_available_for(t(0), QueryType::Decay, "starlink"));
            acc.record(t(0), QueryType::Decay, "starlink", true);
        }
        assert!(!acc.is_available_for(t(0), QueryType::Decay, "starlink"));
    }

    #[test]
    fn minute_counter_resets_after_60_seconds() {
        let mut acc = AccountState::new("a@example.com");
        for _ in 0..MAX_REQUESTS_PER_MINUTE {
            acc.is_available_for(t(0), QueryType::Decay, "starlink");
            acc.record(t(0), QueryType::Decay, "starlink", true);
        }
        assert!(!acc.is_available_for(t(59), QueryType::Decay, "starlink"));
        assert!(acc.is_available_for(t(60), QueryType::Decay, "starlink"));
    }

    #[test]
    fn rate_limited_account_recovers_after_cooldown() {
        let mut acc = AccountState::new("a@example.com");
        acc.mark_rate_limited(t(0));
        assert!(!acc.is_available_for(t(100), QueryType::GpRefresh, "starlink"));
        assert!(acc.is_available_for(t(RATE_LIMIT_COOLDOWN_SECS), QueryType::GpRefresh, "starlink"));
        assert_eq!(acc.status(), AccountStatus::Active);
    }

    #[test]
    fn five_consecutive_errors_suspend_permanently() {
        let mut acc = AccountState::new("a@example.com");
        for _ in 0..MAX_CONSECUTIVE_ERRORS {
            acc.mark_transient_error("timeout");
        }
        assert_eq!(acc.status(), AccountStatus::Suspended);
        // Suspension is terminal: time passing does not clear it.
        assert!(!acc.is_available_for(t(10_000_000), QueryType::GpRefresh, "starlink"));
    }

    #[test]
    fn gp_query_cooldown_blocks_repeat_within_an_hour() {
        let mut acc = AccountState::new("a@example.com");
        acc.record(t(0), QueryType::GpRefresh, "starlink", true);
        assert!(!acc.is_available_for(t(3599), QueryType::GpRefresh, "starlink"));
        assert!(acc.is_available_for(t(3600), QueryType::GpRefresh, "starlink"));
    }

    #[test]
    fn query_cooldown_is_per_constellation() {
        let mut acc = AccountState::new("a@example.com");
        acc.record(t(0), QueryType::GpRefresh, "starlink", true);
        assert!(acc.is_available_for(t(1), QueryType::GpRefresh, "oneweb"));
    }

    #[test]
    fn masked_username_hides_most_of_local_part() {
        let acc = AccountState::new("alice@example.com");
        assert_eq!(acc.masked_username(), "ali***@example.com");
    }
}
