//! Backfill planning and chunking.
//!
//! Planning and chunk-size math are pure and unit-tested here;
//! `catalog_infra::backfill` drives the actual HTTP/DB loop, sleeping
//! between chunks and persisting each one.

use chrono::{DateTime, Duration, Utc};

/// Satellites per backfill batch.
pub const BATCH_SIZE: usize = 50;
/// Catalog numbers per sub-batch, bounded by URL-length budget.
pub const SUB_BATCH_SIZE: usize = 20;
/// A fetch window longer than this is split into annual chunks.
pub const MAX_CHUNK_DAYS: i64 = 365;
/// Default target history window.
pub const DEFAULT_HISTORY_DAYS: i64 = 1095;
/// A satellite's earliest record must be within this many days of
/// `target_start` to be considered fully covered.
pub const COVERAGE_TOLERANCE_DAYS: i64 = 7;

/// Sleep between sub-batches of ≤ [`SUB_BATCH_SIZE`] catalog numbers.
pub const SUB_BATCH_SLEEP_SECS: u64 = 10;
/// Sleep between annual chunks within one batch's window.
pub const CHUNK_SLEEP_SECS: u64 = 5;
/// Sleep between satellite batches of [`BATCH_SIZE`].
pub const BATCH_SLEEP_SECS: u64 = 60;

/// One satellite's outstanding backfill work.
#[derive(Debug, Clone, PartialEq)]
pub struct BackfillPlanItem {
    pub satellite_id: i64,
    pub catalog_number: i32,
    pub fetch_start: DateTime<Utc>,
    pub fetch_end: DateTime<Utc>,
    pub has_partial_history: bool,
}

/// Per-satellite input to planning: its identity and the earliest epoch
/// already on file, if any.
#[derive(Debug, Clone, Copy)]
pub struct SatelliteCoverage {
    pub satellite_id: i64,
    pub catalog_number: i32,
    pub earliest_existing_epoch: Option<DateTime<Utc>>,
}

/// Plan the backfill queue for one constellation.
///
/// A satellite needs work unless its earliest existing record is older than
/// `target_start + COVERAGE_TOLERANCE_DAYS` — a fully-covered window is never
/// re-requested.
pub fn plan_backfill(
    now: DateTime<Utc>,
    target_history_days: i64,
    satellites: &[SatelliteCoverage],
) -> Vec<BackfillPlanItem> {
    let target_start = now - Duration::days(target_history_days);
    let coverage_cutoff = target_start + Duration::days(COVERAGE_TOLERANCE_DAYS);

    satellites
        .iter()
        .filter_map(|sat| match sat.earliest_existing_epoch {
            None => Some(BackfillPlanItem {
                satellite_id: sat.satellite_id,
                catalog_number: sat.catalog_number,
                fetch_start: target_start,
                fetch_end: now,
                has_partial_history: false,
            }),
            Some(earliest) if earliest >= coverage_cutoff => Some(BackfillPlanItem {
                satellite_id: sat.satellite_id,
                catalog_number: sat.catalog_number,
                fetch_start: target_start,
                fetch_end: earliest - Duration::days(1),
                has_partial_history: true,
            }),
            Some(_) => None,
        })
        .collect()
}

/// Split a satellite-batch's union window `[min(fetch_start),
/// max(fetch_end)]` into consecutive chunks no longer than
/// [`MAX_CHUNK_DAYS`].
pub fn chunk_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    if end <= start {
        return vec![];
    }
    let total_days = (end - start).num_days();
    if total_days <= MAX_CHUNK_DAYS {
        return vec![(start, end)];
    }

    let mut chunks = Vec::new();
    let mut chunk_start = start;
    while chunk_start < end {
        let chunk_end = std::cmp::min(chunk_start + Duration::days(MAX_CHUNK_DAYS), end);
        chunks.push((chunk_start, chunk_end));
        chunk_start = chunk_end;
    }
    chunks
}

/// Split a slice of catalog numbers into sub-batches of at most
/// [`SUB_BATCH_SIZE`].
pub fn sub_batches(catalog_numbers: &[i32]) -> Vec<&[i32]> {
    catalog_numbers.chunks(SUB_BATCH_SIZE).collect()
}

/// Status of a backfill invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillStatus {
    Complete,
    InProgress,
    Partial,
    Error,
    /// The minimum-interval gate blocked this invocation before any work
    /// was attempted.
    Skipped,
}

/// Result of one backfill invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct BackfillResult {
    pub status: BackfillStatus,
    pub records_added: u64,
    pub satellites_processed: usize,
    pub satellites_remaining: usize,
    /// Satellites in the constellation that needed no work at all, because
    /// `plan_backfill` found them already within tolerance. Counted toward
    /// the denominator of [`Self::progress_percent`] but never toward
    /// `satellites_processed`.
    pub satellites_already_covered: usize,
    pub message: String,
}

impl BackfillResult {
    /// Percentage of the constellation's full population — covered
    /// satellites plus the needs-work queue — that is now up to date.
    /// Already-covered satellites count toward both the numerator and the
    /// denominator, since they are current without this invocation having
    /// to touch them.
    pub fn progress_percent(&self) -> f64 {
        let total = self.satellites_processed + self.satellites_remaining + self.satellites_already_covered;
        if total == 0 {
            return 100.0;
        }
        ((self.satellites_processed + self.satellites_already_covered) as f64 / total as f64) * 100.0
    }
}

/// Work a plan queue in batches of [`BATCH_SIZE`], bounded by `max_batches`.
/// Returns how many satellites were consumed from the front of `plan` and
/// whether the whole queue was drained.
pub fn take_batches(plan_len: usize, max_batches: u32) -> (usize, bool) {
    let max_satellites = (max_batches as usize).saturating_mul(BATCH_SIZE);
    let processed = plan_len.min(max_satellites);
    let drained = processed >= plan_len;
    (processed, drained)
}
