//! Resilient Space-Track client.
//!
//! Executes one logical query through the [`AccountPool`] with
//! retry-and-rotate: on any recoverable failure the account is marked and
//! the next attempt draws a different one. Session handles are cached per
//! account behind a mutex, held only across the login call itself, so
//! concurrent callers for the same account never double-authenticate.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use catalog_core::error::IngestError;
use catalog_core::normalize::RawRecord;
use catalog_core::query::{build_query_path, gp_history_predicate_attempts, Predicate, QueryType};
use chrono::{DateTime, Utc};
use log::info;
use tokio::sync::Mutex;

use crate::account_pool::AccountPool;
use crate::rate_governor::RateGovernor;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
/// Timeout for bulk history queries.
pub const BULK_HISTORY_TIMEOUT: Duration = Duration::from_secs(300);
/// Timeout for the login call.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(30);
/// A session older than this is discarded and re-authenticated.
const SESSION_MAX_AGE_SECS: i64 = 3600;
/// Starting point for the rate-limit exponential backoff, doubling each
/// attempt.
const RATE_LIMIT_BACKOFF_BASE_SECS: u64 = 2;

struct Session {
    client: reqwest::Client,
    authenticated_at: DateTime<Utc>,
}

pub struct UpstreamClient {
    base_url: String,
    credentials: HashMap<String, String>,
    sessions: Mutex<HashMap<String, Session>>,
    rate_governor: RateGovernor,
}

impl UpstreamClient {
    pub fn new(base_url: impl Into<String>, credentials: HashMap<String, String>) -> Self {
        Self {
            base_url: base_url.into(),
            credentials,
            sessions: Mutex::new(HashMap::new()),
            rate_governor: RateGovernor::new(),
        }
    }

    /// Authenticate `username` on first use or after its session exceeds
    /// [`SESSION_MAX_AGE_SECS`].
    async fn ensure_session(&self, username: &str) -> Result<reqwest::Client, IngestError> {
        let mut sessions = self.sessions.lock().await;
        let now = Utc::now();
        if let Some(session) = sessions.get(username) {
            if now - session.authenticated_at < chrono::Duration::seconds(SESSION_MAX_AGE_SECS) {
                return Ok(session.client.clone());
            }
        }

        let password = self
            .credentials
            .get(username)
            .ok_or_else(|| IngestError::ConfigurationError {
                detail: format!("no credential configured for account {username}"),
            })?;

        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(AUTH_TIMEOUT)
            .build()
            .map_err(|e| IngestError::TransientUpstream {
                detail: format!("failed to build http client: {e}"),
            })?;

        let login_url = format!("{}/ajaxauth/login", self.base_url);
        let response = client
            .post(&login_url)
            .form(&[("identity", username), ("password", password.as_str())])
            .send()
            .await
            .map_err(|e| IngestError::TransientUpstream {
                detail: format!("login request failed: {e}"),
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() || body.contains("error") {
            return Err(IngestError::AuthFailed {
                detail: format!("login rejected for {username}: status {status}"),
            });
        }

        sessions.insert(
            username.to_string(),
            Session {
                client: client.clone(),
                authenticated_at: now,
            },
        );
        Ok(client)
    }

    async fn clear_session(&self, username: &str) {
        self.sessions.lock().await.remove(username);
    }

    /// Execute one logical query with retry-and-rotate.
    pub async fn execute_query(
        &self,
        pool: &AccountPool,
        query_type: QueryType,
        constellation: &str,
        predicates: &[Predicate],
        order_by_field: &str,
        order_ascending: bool,
        timeout: Duration,
    ) -> Result<Vec<RawRecord>, IngestError> {
        let account_count = pool.account_count().await;
        let attempts = account_count.min(5).max(1);
        let path = build_query_path(query_type.upstream_class(), predicates, order_by_field, order_ascending);
        let url = format!("{}/{}", self.base_url, path);

        let mut ever_acquired = false;
        let mut backoff_secs = RATE_LIMIT_BACKOFF_BASE_SECS;

        for _attempt in 0..attempts {
            let handle = match pool.wait_until_available(query_type, constellation, Duration::from_secs(30)).await {
                Some(handle) => handle,
                None => continue,
            };
            ever_acquired = true;

            let client = match self.ensure_session(&handle.username).await {
                Ok(client) => client,
                Err(err) => {
                    pool.mark_auth_failed(&handle.username, err.to_string()).await;
                    continue;
                }
            };

            let result = client.get(&url).timeout(timeout).send().await;
            match result {
                Err(err) => {
                    pool.mark_transient_error(&handle.username, err.to_string()).await;
                    pool.record(&handle.username, query_type, constellation, false).await;
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    if status.is_success() {
                        match parse_json_body(&body) {
                            Some(records) => {
                                pool.record(&handle.username, query_type, constellation, true).await;
                                return Ok(records);
                            }
                            None => {
                                // 200 + HTML sentinel or malformed JSON: treat
                                // as a server-side failure and rotate.
                                pool.mark_transient_error(&handle.username, "malformed or html response body").await;
                                pool.record(&handle.username, query_type, constellation, false).await;
                            }
                        }
                    } else if status.as_u16() == 429 || is_rate_limit_body(&body) {
                        pool.mark_rate_limited(&handle.username).await;
                        pool.record(&handle.username, query_type, constellation, false).await;
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                        backoff_secs *= 2;
                    } else if status.as_u16() == 401 || status.as_u16() == 403 {
                        pool.mark_auth_failed(&handle.username, format!("status {status}")).await;
                        pool.record(&handle.username, query_type, constellation, false).await;
                        self.clear_session(&handle.username).await;
                    } else if status.is_server_error() {
                        pool.mark_transient_error(&handle.username, format!("status {status}")).await;
                        pool.record(&handle.username, query_type, constellation, false).await;
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    } else {
                        pool.mark_transient_error(&handle.username, format!("unexpected status {status}")).await;
                        pool.record(&handle.username, query_type, constellation, false).await;
                    }
                }
            }
        }

        if !ever_acquired {
            return Err(IngestError::NoAvailableAccount {
                query_type: query_type.to_string(),
            });
        }
        Err(IngestError::TransientUpstream {
            detail: format!("exhausted {attempts} attempts for {query_type}/{constellation}"),
        })
    }

    /// Merge results from one `execute_query` call per name pattern,
    /// deduplicating by `NORAD_CAT_ID` — the upstream has no native "OR"
    /// predicate, so a multi-pattern constellation (e.g. stations matching
    /// ISS, TIANGONG, or CSS) is issued as that many separate queries.
    async fn fetch_by_patterns(
        &self,
        pool: &AccountPool,
        query_type: QueryType,
        constellation: &str,
        name_patterns: &[&str],
        extra_predicate: Option<Predicate>,
        timeout: Duration,
    ) -> Result<Vec<RawRecord>, IngestError> {
        if !self.rate_governor.may_call(constellation, query_type).await {
            return Err(IngestError::RateGoverned {
                query_type: query_type.to_string(),
                constellation: constellation.to_string(),
            });
        }

        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        for pattern in name_patterns {
            let mut predicates = vec![Predicate::Contains {
                field: "OBJECT_NAME".to_string(),
                value: pattern.to_string(),
            }];
            if let Some(extra) = &extra_predicate {
                predicates.push(extra.clone());
            }
            let records = self
                .execute_query(pool, query_type, constellation, &predicates, "NORAD_CAT_ID", true, timeout)
                .await?;
            for record in records {
                if let Some(id) = &record.norad_cat_id {
                    if !seen.insert(id.clone()) {
                        continue;
                    }
                }
                merged.push(record);
            }
        }

        self.rate_governor.record_call(constellation, query_type).await;
        Ok(merged)
    }

    /// Latest active TLEs for a constellation: "latest TLE for active
    /// objects", i.e. `decay_date = null`, across every one of its name
    /// patterns, merged and deduplicated by catalog number.
    pub async fn fetch_gp_refresh(
        &self,
        pool: &AccountPool,
        constellation: &str,
        name_patterns: &[&str],
    ) -> Result<Vec<RawRecord>, IngestError> {
        self.fetch_by_patterns(
            pool,
            QueryType::GpRefresh,
            constellation,
            name_patterns,
            Some(Predicate::IsNull { field: "DECAY_DATE".to_string() }),
            DEFAULT_TIMEOUT,
        )
        .await
    }

    /// Full metadata, including decayed objects, across every one of a
    /// constellation's name patterns, merged and deduplicated by catalog
    /// number.
    pub async fn fetch_satcat_sync(
        &self,
        pool: &AccountPool,
        constellation: &str,
        name_patterns: &[&str],
    ) -> Result<Vec<RawRecord>, IngestError> {
        self.fetch_by_patterns(pool, QueryType::SatcatSync, constellation, name_patterns, None, DEFAULT_TIMEOUT)
            .await
    }

    /// Try the GP-history predicate shapes in order, reusing
    /// [`Self::execute_query`] for each shape's retry-and-rotate loop. A
    /// single backfill run issues many of these calls (one per sub-batch per
    /// chunk), so the minimum-interval gate for `GpHistory` is checked once
    /// by the caller via [`Self::gate_history_backfill`]/[`Self::record_history_backfill`]
    /// around the whole run, not per call here.
    pub async fn execute_gp_history_query(
        &self,
        pool: &AccountPool,
        constellation: &str,
        catalog_numbers_csv: &str,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<RawRecord>, IngestError> {
        let attempts = gp_history_predicate_attempts(catalog_numbers_csv, start_date, end_date);
        let mut last_err = IngestError::ConfigurationError {
            detail: "no predicate shapes configured for gp_history".to_string(),
        };
        for predicates in attempts {
            match self
                .execute_query(
                    pool,
                    QueryType::GpHistory,
                    constellation,
                    &predicates,
                    "EPOCH",
                    true,
                    BULK_HISTORY_TIMEOUT,
                )
                .await
            {
                Ok(records) => return Ok(records),
                Err(err) => {
                    info!(target: "catalog_infra::upstream_client", "gp_history predicate shape failed: {err}");
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }

    /// Whether a history backfill run for `constellation` may start now.
    /// Checked once at the top of a whole backfill run, not per sub-batch.
    pub async fn gate_history_backfill(&self, constellation: &str) -> bool {
        self.rate_governor.may_call(constellation, QueryType::GpHistory).await
    }

    /// Mark a history backfill run for `constellation` as having started,
    /// so a second run within the minimum interval is gated.
    pub async fn record_history_backfill(&self, constellation: &str) {
        self.rate_governor.record_call(constellation, QueryType::GpHistory).await;
    }
}

fn parse_json_body(body: &str) -> Option<Vec<RawRecord>> {
    let trimmed = body.trim_start();
    if !(trimmed.starts_with('[') || trimmed.starts_with('{')) {
        return None;
    }
    serde_json::from_str(body).ok()
}

/// Some failures arrive as HTTP 500 with a rate-limit sentinel in the body
/// rather than a literal 429.
fn is_rate_limit_body(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains("violated your query") || lower.contains("rate limit")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_json_body_rejects_html_sentinel() {
        assert!(parse_json_body("<html><body>error</body></html>").is_none());
    }

    #[test]
    fn parse_json_body_accepts_array() {
        let body = r#"[{"NORAD_CAT_ID":"44713"}]"#;
        let records = parse_json_body(body).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].norad_cat_id.as_deref(), Some("44713"));
    }

    #[test]
    fn parse_json_body_rejects_truncated_json() {
        assert!(parse_json_body("[{\"NORAD_CAT_ID\":").is_none());
    }

    #[test]
    fn rate_limit_sentinel_detected_case_insensitively() {
        assert!(is_rate_limit_body("You have violated your query rate limit"));
        assert!(!is_rate_limit_body("internal server error"));
    }
}
