//! Runtime configuration.
//!
//! Loaded from environment variables with typed defaults. Fails closed
//! (`ConfigurationError`) when a safety-critical value is absent and has no
//! default: every parameter either has a documented default or the loader
//! refuses to start.

use std::env;
use std::time::Duration;

use catalog_core::error::IngestError;

/// One configured upstream credential.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountCredential {
    pub username: String,
    pub password: String,
}

/// Default target history window: 1095 days (3 years).
pub const DEFAULT_HISTORY_DAYS: i64 = catalog_core::backfill::DEFAULT_HISTORY_DAYS;
/// Default satellites per backfill sub-batch.
pub const DEFAULT_HISTORY_BATCH_SIZE: usize = catalog_core::backfill::BATCH_SIZE;
/// Default staleness threshold for cached refresh data.
pub const DEFAULT_TLE_CACHE_EXPIRY: Duration = Duration::from_secs(3600);

/// The full configuration surface the rest of the crate reads from.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_url: String,
    pub history_days_default: i64,
    pub history_batch_size: usize,
    pub tle_cache_expiry: Duration,
    pub accounts: Vec<AccountCredential>,
    /// Override for the GP-refresh cron slot's minute field (`:17` by
    /// default).
    pub tle_update_hour: Option<u32>,
    pub tle_update_minute: Option<u32>,
}

impl AppConfig {
    /// Load from environment variables, failing closed on missing
    /// safety-critical values (empty account list, unset `DATABASE_URL`).
    ///
    /// - `DATABASE_URL` (required)
    /// - `CATALOG_ACCOUNTS` (required): `user1:pass1,user2:pass2`
    /// - `CATALOG_HISTORY_DAYS` (optional, default 1095)
    /// - `CATALOG_HISTORY_BATCH_SIZE` (optional, default 50)
    /// - `CATALOG_TLE_CACHE_EXPIRY_SECS` (optional, default 3600)
    /// - `CATALOG_TLE_UPDATE_HOUR` / `CATALOG_TLE_UPDATE_MINUTE` (optional)
    pub fn from_env() -> Result<Self, IngestError> {
        let database_url = env::var("DATABASE_URL").map_err(|_| IngestError::ConfigurationError {
            detail: "DATABASE_URL is unset; fail-closed, no default for a connection string"
                .to_string(),
        })?;

        let accounts_raw =
            env::var("CATALOG_ACCOUNTS").map_err(|_| IngestError::ConfigurationError {
                detail: "CATALOG_ACCOUNTS is unset; fail-closed, the pool cannot start with zero accounts"
                    .to_string(),
            })?;
        let accounts = parse_accounts(&accounts_raw)?;
        if accounts.is_empty() {
            return Err(IngestError::ConfigurationError {
                detail: "CATALOG_ACCOUNTS parsed to zero accounts".to_string(),
            });
        }

        let history_days_default = parse_optional_i64("CATALOG_HISTORY_DAYS", DEFAULT_HISTORY_DAYS)?;
        let history_batch_size =
            parse_optional_usize("CATALOG_HISTORY_BATCH_SIZE", DEFAULT_HISTORY_BATCH_SIZE)?;
        let tle_cache_expiry_secs = parse_optional_u64(
            "CATALOG_TLE_CACHE_EXPIRY_SECS",
            DEFAULT_TLE_CACHE_EXPIRY.as_secs(),
        )?;
        let tle_update_hour = parse_optional_u32_field("CATALOG_TLE_UPDATE_HOUR")?;
        let tle_update_minute = parse_optional_u32_field("CATALOG_TLE_UPDATE_MINUTE")?;

        Ok(Self {
            database_url,
            history_days_default,
            history_batch_size,
            tle_cache_expiry: Duration::from_secs(tle_cache_expiry_secs),
            accounts,
            tle_update_hour,
            tle_update_minute,
        })
    }
}

fn parse_accounts(raw: &str) -> Result<Vec<AccountCredential>, IngestError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .split_once(':')
                .map(|(username, password)| AccountCredential {
                    username: username.to_string(),
                    password: password.to_string(),
                })
                .ok_or_else(|| IngestError::ConfigurationError {
                    detail: format!("malformed account entry '{entry}', expected user:pass"),
                })
        })
        .collect()
}

fn parse_optional_i64(key: &str, default: i64) -> Result<i64, IngestError> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw.parse().map_err(|_| IngestError::ConfigurationError {
            detail: format!("{key} is not a valid integer: '{raw}'"),
        }),
    }
}

fn parse_optional_usize(key: &str, default: usize) -> Result<usize, IngestError> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw.parse().map_err(|_| IngestError::ConfigurationError {
            detail: format!("{key} is not a valid integer: '{raw}'"),
        }),
    }
}

fn parse_optional_u64(key: &str, default: u64) -> Result<u64, IngestError> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw.parse().map_err(|_| IngestError::ConfigurationError {
            detail: format!("{key} is not a valid integer: '{raw}'"),
        }),
    }
}

fn parse_optional_u32_field(key: &str) -> Result<Option<u32>, IngestError> {
    match env::var(key) {
        Err(_) => Ok(None),
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| IngestError::ConfigurationError {
                detail: format!("{key} is not a valid integer: '{raw}'"),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_account_list() {
        let accounts = parse_accounts("alice:secret1, bob:secret2").unwrap();
        assert_eq!(
            accounts,
            vec![
                AccountCredential {
                    username: "alice".to_string(),
                    password: "secret1".to_string()
                },
                AccountCredential {
                    username: "bob".to_string(),
                    password: "secret2".to_string()
                },
            ]
        );
    }

    #[test]
    fn rejects_entry_without_colon() {
        assert!(parse_accounts("alice-secret1").is_err());
    }

    #[test]
    fn empty_account_list_string_yields_zero_accounts() {
        assert_eq!(parse_accounts("").unwrap().len(), 0);
    }
}
