//! Backfill execution loop: drives the pure planning/chunking logic in
//! [`catalog_core::backfill`] against the real Upstream Client, Writer, and
//! clock, with the actual sleeps the plan calls for.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use catalog_core::backfill::{
    chunk_window, plan_backfill, sub_batches, take_batches, BackfillResult, BackfillStatus,
    SatelliteCoverage, BATCH_SLEEP_SECS, CHUNK_SLEEP_SECS, SUB_BATCH_SLEEP_SECS,
};
use catalog_core::normalize::normalize_gp_record;
use chrono::Utc;
use log::{info, warn};

use crate::account_pool::AccountPool;
use crate::store::CatalogWriter;
use crate::upstream_client::UpstreamClient;

/// Checked between batches so a shutdown request lets the current batch
/// finish and exits cleanly with `status = Partial` rather than killing an
/// in-flight write.
#[derive(Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn request_shutdown(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Run one invocation of the backfill plan for `constellation`, bounded by
/// `max_batches` and `target_history_days`.
pub async fn run_backfill(
    writer: &CatalogWriter,
    upstream: &UpstreamClient,
    pool: &AccountPool,
    constellation: &str,
    target_history_days: i64,
    max_batches: u32,
    shutdown: &ShutdownFlag,
) -> BackfillResult {
    if !upstream.gate_history_backfill(constellation).await {
        return BackfillResult {
            status: BackfillStatus::Skipped,
            records_added: 0,
            satellites_processed: 0,
            satellites_remaining: 0,
            satellites_already_covered: 0,
            message: format!("{constellation}: history backfill minimum interval not yet elapsed"),
        };
    }

    let now = Utc::now();

    let coverage_rows = match writer.earliest_history_epoch_by_satellite(constellation).await {
        Ok(rows) => rows,
        Err(err) => {
            return BackfillResult {
                status: BackfillStatus::Error,
                records_added: 0,
                satellites_processed: 0,
                satellites_remaining: 0,
                satellites_already_covered: 0,
                message: err.to_string(),
            }
        }
    };

    let total_population = coverage_rows.len();
    let coverage: Vec<SatelliteCoverage> = coverage_rows
        .into_iter()
        .map(|(satellite_id, catalog_number, earliest)| SatelliteCoverage {
            satellite_id,
            catalog_number,
            earliest_existing_epoch: earliest,
        })
        .collect();

    let plan = plan_backfill(now, target_history_days, &coverage);
    let satellites_already_covered = total_population - plan.len();
    if plan.is_empty() {
        return BackfillResult {
            status: BackfillStatus::Complete,
            records_added: 0,
            satellites_processed: 0,
            satellites_remaining: 0,
            satellites_already_covered,
            message: "no satellites require backfill".to_string(),
        };
    }

    upstream.record_history_backfill(constellation).await;

    let (take, drained) = take_batches(plan.len(), max_batches);
    let mut records_added = 0u64;
    let mut satellites_processed = 0usize;

    for batch in plan[..take].chunks(catalog_core::backfill::BATCH_SIZE) {
        if shutdown.is_set() {
            return BackfillResult {
                status: BackfillStatus::Partial,
                records_added,
                satellites_processed,
                satellites_remaining: plan.len() - satellites_processed,
                satellites_already_covered,
                message: "shutdown requested between batches".to_string(),
            };
        }

        let window_start = batch.iter().map(|i| i.fetch_start).min().unwrap();
        let window_end = batch.iter().map(|i| i.fetch_end).max().unwrap();
        let chunks = chunk_window(window_start, window_end);

        for (chunk_start, chunk_end) in chunks {
            let catalog_numbers: Vec<i32> = batch.iter().map(|i| i.catalog_number).collect();
            for sub in sub_batches(&catalog_numbers) {
                let csv = sub.iter().map(i32::to_string).collect::<Vec<_>>().join(",");
                let start_str = chunk_start.format("%Y-%m-%d").to_string();
                let end_str = chunk_end.format("%Y-%m-%d").to_string();

                match upstream
                    .execute_gp_history_query(pool, constellation, &csv, &start_str, &end_str)
                    .await
                {
                    Ok(raw_records) => {
                        let mut keyed = Vec::with_capacity(raw_records.len());
                        for raw in &raw_records {
                            match normalize_gp_record(raw) {
                                Ok(normalized) => keyed.push((normalized.catalog_number, normalized)),
                                Err(err) => warn!(target: "catalog_infra::backfill", "dropping malformed history record: {err}"),
                            }
                        }
                        match writer.persist_history_batch(&keyed).await {
                            Ok(count) => records_added += count,
                            Err(err) => warn!(target: "catalog_infra::backfill", "history persistence failed for a chunk, continuing: {err}"),
                        }
                    }
                    Err(err) => {
                        warn!(target: "catalog_infra::backfill", "history fetch failed for a sub-batch, continuing: {err}");
                    }
                }

                tokio::time::sleep(std::time::Duration::from_secs(SUB_BATCH_SLEEP_SECS)).await;
            }
            tokio::time::sleep(std::time::Duration::from_secs(CHUNK_SLEEP_SECS)).await;
        }

        satellites_processed += batch.len();
        tokio::time::sleep(std::time::Duration::from_secs(BATCH_SLEEP_SECS)).await;
    }

    let satellites_remaining = plan.len() - satellites_processed;
    let status = if drained {
        BackfillStatus::Complete
    } else {
        BackfillStatus::InProgress
    };
    info!(target: "catalog_infra::backfill", "{constellation}: processed {satellites_processed}, remaining {satellites_remaining}, added {records_added}");

    BackfillResult {
        status,
        records_added,
        satellites_processed,
        satellites_remaining,
        satellites_already_covered,
        message: format!("processed {satellites_processed} of {}", plan.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_flag_starts_clear() {
        let flag = ShutdownFlag::new();
        assert!(!flag.is_set());
        flag.request_shutdown();
        assert!(flag.is_set());
    }

    #[test]
    fn shutdown_flag_clones_share_state() {
        let flag = ShutdownFlag::new();
        let clone = flag.clone();
        clone.request_shutdown();
        assert!(flag.is_set());
    }
}
