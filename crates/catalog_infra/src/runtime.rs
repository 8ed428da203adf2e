//! Composition root: owns every long-lived collaborator as an explicit
//! field, wired once at construction — no global singletons.

use std::collections::HashMap;

use catalog_core::error::JobOutcome;
use chrono::Utc;
use log::info;

use crate::account_pool::AccountPool;
use crate::backfill::{run_backfill, ShutdownFlag};
use crate::config::AppConfig;
use crate::initial_loader::{needs_initial_load, run_initial_load};
use crate::scheduler::Scheduler;
use crate::store::CatalogWriter;
use crate::upstream_client::UpstreamClient;

/// Every long-lived collaborator the running process needs, wired from a
/// single [`AppConfig`]. The per-(constellation, query type) rate governor
/// lives inside `upstream` rather than as a field here, since it guards
/// upstream calls specifically and every call site already goes through
/// [`UpstreamClient`].
pub struct Runtime {
    pub pool: AccountPool,
    pub upstream: UpstreamClient,
    pub writer: CatalogWriter,
    pub scheduler: Scheduler,
    config: AppConfig,
    shutdown: ShutdownFlag,
}

impl Runtime {
    /// Build and connect every collaborator. Does not run migrations or seed
    /// data — callers invoke `init-db`/`seed` explicitly.
    pub async fn bootstrap(config: AppConfig, base_url: impl Into<String>) -> Result<Self, catalog_core::error::IngestError> {
        let credentials: HashMap<String, String> = config
            .accounts
            .iter()
            .map(|a| (a.username.clone(), a.password.clone()))
            .collect();
        let usernames = config.accounts.iter().map(|a| a.username.clone());

        let writer = CatalogWriter::connect(&config.database_url).await?;
        let upstream = UpstreamClient::new(base_url, credentials);
        let pool = AccountPool::new(usernames);

        Ok(Self {
            pool,
            upstream,
            writer,
            scheduler: Scheduler::new(),
            config,
            shutdown: ShutdownFlag::new(),
        })
    }

    /// Run the Initial Loader if the store looks young, then enter the
    /// minute-resolution scheduler loop until a shutdown signal arrives.
    /// Returns once every in-flight job has had a chance to finish: the
    /// scheduler refuses new runs and waits up to 5s for currently-executing
    /// jobs.
    pub async fn run(&self, configured_slugs: &[String]) {
        if needs_initial_load(&self.writer).await.unwrap_or(false) {
            info!(target: "catalog_infra::runtime", "store looks young, running initial load");
            let reports = run_initial_load(
                &self.writer,
                &self.upstream,
                &self.pool,
                self.config.history_days_default,
                configured_slugs,
            )
            .await;
            info!(target: "catalog_infra::runtime", "initial load finished for {} constellations", reports.len());
        }

        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Utc::now();
                    self.scheduler.tick(now, |job_id| self.run_job(job_id)).await;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!(target: "catalog_infra::runtime", "shutdown signal received");
                    self.scheduler.request_shutdown();
                    self.shutdown.request_shutdown();
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    break;
                }
            }
        }
    }

    /// Dispatch one scheduler job id to its implementation.
    async fn run_job(&self, job_id: &'static str) -> JobOutcome {
        match job_id {
            "history_backfill" => {
                let mut total_added = 0u64;
                for slug in catalog_core::registry::initial_loader_priority_order() {
                    let result = run_backfill(
                        &self.writer,
                        &self.upstream,
                        &self.pool,
                        slug,
                        self.config.history_days_default,
                        3,
                        &self.shutdown,
                    )
                    .await;
                    total_added += result.records_added;
                }
                JobOutcome::complete(total_added, "history backfill pass complete")
            }
            "gp_refresh" => self.run_gp_refresh_all().await,
            "satcat_sync" => self.run_satcat_sync_all().await,
            "pool_health_log" => {
                let snapshot = self.pool.status_snapshot().await;
                info!(target: "catalog_infra::runtime", "pool health: {} accounts", snapshot.len());
                JobOutcome::complete(snapshot.len() as u64, "pool health logged")
            }
            "launch_enrichment" => JobOutcome::skipped("launch enrichment covered opportunistically by satcat sync"),
            other => JobOutcome::error(catalog_core::error::IngestError::ConfigurationError {
                detail: format!("unknown job id {other}"),
            }),
        }
    }

    async fn run_gp_refresh_all(&self) -> JobOutcome {
        let mut touched = 0u64;
        for entry in catalog_core::registry::CONSTELLATIONS {
            match self.upstream.fetch_gp_refresh(&self.pool, entry.slug, entry.name_patterns).await {
                Ok(raw) => {
                    let normalized: Vec<_> = raw
                        .iter()
                        .filter_map(|r| catalog_core::normalize::normalize_gp_record(r).ok())
                        .collect();
                    if let Ok((new_count, updated_count)) = self.writer.upsert_gp_batch(&normalized, entry.slug).await {
                        touched += new_count + updated_count;
                    }
                }
                Err(catalog_core::error::IngestError::RateGoverned { constellation, .. }) => {
                    info!(target: "catalog_infra::runtime", "gp_refresh skipped for {constellation}: minimum interval not yet elapsed");
                }
                Err(err) => {
                    log::warn!(target: "catalog_infra::runtime", "gp_refresh failed for {}: {err}", entry.slug);
                }
            }
        }
        JobOutcome::complete(touched, "gp refresh pass complete")
    }

    async fn run_satcat_sync_all(&self) -> JobOutcome {
        let mut touched = 0u64;
        for entry in catalog_core::registry::CONSTELLATIONS {
            match self.upstream.fetch_satcat_sync(&self.pool, entry.slug, entry.name_patterns).await {
                Ok(raw) => {
                    let normalized: Vec<_> = raw
                        .iter()
                        .filter_map(|r| catalog_core::normalize::normalize_satcat_record(r).ok())
                        .collect();
                    if let Ok((new_count, updated_count)) = self.writer.upsert_satcat_batch(&normalized, entry.slug).await {
                        touched += new_count + updated_count;
                    }
                }
                Err(catalog_core::error::IngestError::RateGoverned { constellation, .. }) => {
                    info!(target: "catalog_infra::runtime", "satcat_sync skipped for {constellation}: minimum interval not yet elapsed");
                }
                Err(err) => {
                    log::warn!(target: "catalog_infra::runtime", "satcat_sync failed for {}: {err}", entry.slug);
                }
            }
        }
        JobOutcome::complete(touched, "satcat sync pass complete")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".to_string(),
            history_days_default: 365,
            history_batch_size: 50,
            tle_cache_expiry: std::time::Duration::from_secs(3600),
            accounts: vec![crate::config::AccountCredential {
                username: "alice".to_string(),
                password: "secret".to_string(),
            }],
            tle_update_hour: None,
            tle_update_minute: None,
        }
    }

    #[tokio::test]
    async fn bootstrap_connects_and_wires_one_account() {
        let runtime = Runtime::bootstrap(test_config(), "https://example.invalid").await.unwrap();
        assert_eq!(runtime.pool.account_count().await, 1);
    }

    #[tokio::test]
    async fn unknown_job_id_reports_configuration_error() {
        let runtime = Runtime::bootstrap(test_config(), "https://example.invalid").await.unwrap();
        let outcome = runtime.run_job("not_a_real_job").await;
        assert_eq!(outcome.status, catalog_core::error::JobStatus::Error);
    }

    #[tokio::test]
    async fn second_gp_refresh_pass_within_the_interval_makes_no_upstream_calls() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("login ok"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(catalog_core::registry::CONSTELLATIONS.len() as u64)
            .mount(&server)
            .await;

        let runtime = Runtime::bootstrap(test_config(), server.uri()).await.unwrap();

        let first = runtime.run_gp_refresh_all().await;
        assert_eq!(first.status, catalog_core::error::JobStatus::Complete);

        // The second pass must not reach the mock server at all: wiremock's
        // `expect(N)` above fails the test on drop if a GET lands more than
        // once per constellation.
        let second = runtime.run_gp_refresh_all().await;
        assert_eq!(second.status, catalog_core::error::JobStatus::Complete);
        assert_eq!(second.records_touched, 0);
    }
}
