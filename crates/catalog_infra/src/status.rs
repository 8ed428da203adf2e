//! Admin status surface.
//!
//! A plain data-producing aggregation, not an HTTP handler: wires together
//! the three health views an operator needs (accounts, scheduled jobs,
//! catalog size) into one snapshot for whatever the caller wants to do with
//! it — render to stdout, serve over a status endpoint, whatever.

use catalog_core::account_pool::AccountSnapshot;

use crate::account_pool::AccountPool;
use crate::scheduler::{JobStatusSnapshot, Scheduler};
use crate::store::CatalogWriter;

#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub accounts: Vec<AccountSnapshot>,
    pub jobs: Vec<JobStatusSnapshot>,
    pub satellite_count: i64,
    pub constellation_count: i64,
}

/// Build the snapshot. Catalog counts fall back to `-1` if the store is
/// unreachable, so a transient connection hiccup never masks account or job
/// health from the rest of the report.
pub async fn build_status_snapshot(pool: &AccountPool, scheduler: &Scheduler, writer: &CatalogWriter) -> StatusSnapshot {
    let accounts = pool.status_snapshot().await;
    let jobs = scheduler.job_statuses().await;
    let satellite_count = writer.satellite_count().await.unwrap_or(-1);
    let constellation_count = writer.constellation_count().await.unwrap_or(-1);

    StatusSnapshot {
        accounts,
        jobs,
        satellite_count,
        constellation_count,
    }
}

impl StatusSnapshot {
    /// Human-readable single-line-per-section report for the CLI.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "catalog: {} satellites across {} constellations\n",
            self.satellite_count, self.constellation_count
        ));
        out.push_str("accounts:\n");
        for account in &self.accounts {
            out.push_str(&format!(
                "  {} status={:?} total_requests={} consecutive_errors={}\n",
                account.masked_username, account.status, account.total_requests, account.consecutive_errors
            ));
        }
        out.push_str("jobs:\n");
        for job in &self.jobs {
            out.push_str(&format!(
                "  {} last_run={:?} last_error={:?}\n",
                job.job_id, job.last_run, job.last_error
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_reports_accounts_and_jobs_for_a_fresh_system() {
        let pool = AccountPool::new(vec!["alice".to_string()]);
        let scheduler = Scheduler::new();
        let writer = CatalogWriter::connect("sqlite::memory:").await.unwrap();
        writer.init_schema().await.unwrap();

        let snapshot = build_status_snapshot(&pool, &scheduler, &writer).await;
        assert_eq!(snapshot.accounts.len(), 1);
        assert_eq!(snapshot.jobs.len(), crate::scheduler::JOBS.len());
        assert_eq!(snapshot.satellite_count, 0);
    }

    #[tokio::test]
    async fn render_text_includes_catalog_header() {
        let pool = AccountPool::new(vec!["alice".to_string()]);
        let scheduler = Scheduler::new();
        let writer = CatalogWriter::connect("sqlite::memory:").await.unwrap();
        writer.init_schema().await.unwrap();

        let snapshot = build_status_snapshot(&pool, &scheduler, &writer).await;
        assert!(snapshot.render_text().starts_with("catalog:"));
    }
}
