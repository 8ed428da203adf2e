//! Single in-process cron coordinator.
//!
//! A minute-resolution tick loop rather than a general cron expression
//! parser: the five jobs below are a fixed, small set, so a plain cadence
//! enum is cheaper to get right than pulling in an external cron crate the
//! rest of the pack does not use.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use catalog_core::error::{JobOutcome, JobStatus};
use chrono::{DateTime, Timelike, Utc};
use log::{info, warn};
use tokio::sync::Mutex;

/// When a job is due to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Fires every `step_hours` hours, at `minute` past the hour.
    EveryHours { step_hours: u32, minute: u32 },
    /// Fires once a day at `hour:minute`.
    DailyAt { hour: u32, minute: u32 },
    /// Fires every hour at `minute` past.
    Hourly { minute: u32 },
}

impl Cadence {
    fn matches(self, now: DateTime<Utc>) -> bool {
        match self {
            Self::EveryHours { step_hours, minute } => {
                now.minute() == minute && step_hours > 0 && now.hour() % step_hours == 0
            }
            Self::DailyAt { hour, minute } => now.hour() == hour && now.minute() == minute,
            Self::Hourly { minute } => now.minute() == minute,
        }
    }
}

/// One scheduled job definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobDef {
    pub id: &'static str,
    pub cadence: Cadence,
}

/// The five built-in jobs, each offset off the `:00`/`:30` marks so they
/// never collide with another process's round-number cron slot.
pub const JOBS: &[JobDef] = &[
    JobDef { id: "gp_refresh", cadence: Cadence::EveryHours { step_hours: 6, minute: 17 } },
    JobDef { id: "satcat_sync", cadence: Cadence::DailyAt { hour: 17, minute: 27 } },
    JobDef { id: "history_backfill", cadence: Cadence::DailyAt { hour: 3, minute: 47 } },
    JobDef { id: "launch_enrichment", cadence: Cadence::EveryHours { step_hours: 12, minute: 17 } },
    JobDef { id: "pool_health_log", cadence: Cadence::Hourly { minute: 47 } },
];

struct JobRecord {
    last_run: Option<DateTime<Utc>>,
    last_error: Option<String>,
    last_duration: Option<StdDuration>,
    guard: Arc<Mutex<()>>,
}

/// Tracks per-job single-flight guards and last-run bookkeeping for the
/// admin status surface. Does not itself own a background task; `tick` is
/// driven by the caller's loop so tests can drive it directly.
pub struct Scheduler {
    records: Mutex<HashMap<&'static str, JobRecord>>,
    accepting_new_runs: std::sync::atomic::AtomicBool,
}

impl Scheduler {
    pub fn new() -> Self {
        let mut records = HashMap::new();
        for job in JOBS {
            records.insert(
                job.id,
                JobRecord {
                    last_run: None,
                    last_error: None,
                    last_duration: None,
                    guard: Arc::new(Mutex::new(())),
                },
            );
        }
        Self {
            records: Mutex::new(records),
            accepting_new_runs: std::sync::atomic::AtomicBool::new(true),
        }
    }

    /// Stop accepting new job fires. Existing in-flight jobs are
    /// unaffected; the caller awaits them separately.
    pub fn request_shutdown(&self) {
        self.accepting_new_runs.store(false, std::sync::atomic::Ordering::SeqCst);
    }

    /// Evaluate every job's cadence against `now` and, for each due job,
    /// call `run` if its single-flight guard is free. A guard already held
    /// (prior run still executing) causes that fire to be skipped rather
    /// than queued.
    pub async fn tick<F, Fut>(&self, now: DateTime<Utc>, run: F)
    where
        F: Fn(&'static str) -> Fut,
        Fut: std::future::Future<Output = JobOutcome>,
    {
        if !self.accepting_new_runs.load(std::sync::atomic::Ordering::SeqCst) {
            return;
        }
        for job in JOBS {
            if !job.cadence.matches(now) {
                continue;
            }
            self.fire(job.id, &run).await;
        }
    }

    /// Manual trigger: runs `job_id` immediately regardless of cadence,
    /// through the same single-flight guard a cron fire would use, so a
    /// manual run and a due cron fire for the same job never overlap.
    pub async fn trigger_now<F, Fut>(&self, job_id: &'static str, run: F)
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = JobOutcome>,
    {
        let guard = {
            let records = self.records.lock().await;
            match records.get(job_id) {
                Some(record) => record.guard.clone(),
                None => return,
            }
        };
        let _permit = guard.lock().await;
        let start = Utc::now();
        let outcome = run().await;
        self.record_outcome(job_id, start, outcome).await;
    }

    async fn fire<F, Fut>(&self, job_id: &'static str, run: &F)
    where
        F: Fn(&'static str) -> Fut,
        Fut: std::future::Future<Output = JobOutcome>,
    {
        let guard = {
            let records = self.records.lock().await;
            records.get(job_id).unwrap().guard.clone()
        };
        let Ok(_permit) = guard.try_lock() else {
            info!(target: "catalog_infra::scheduler", "{job_id} skipped: prior run still in flight");
            return;
        };
        let start = Utc::now();
        let outcome = run(job_id).await;
        self.record_outcome(job_id, start, outcome).await;
    }

    async fn record_outcome(&self, job_id: &'static str, start: DateTime<Utc>, outcome: JobOutcome) {
        let duration = (Utc::now() - start).to_std().unwrap_or_default();
        let mut records = self.records.lock().await;
        if let Some(record) = records.get_mut(job_id) {
            record.last_run = Some(start);
            record.last_duration = Some(duration);
            record.last_error = match outcome.status {
                JobStatus::Error => outcome.error.map(|e| e.to_string()),
                _ => None,
            };
        }
        if outcome.status == JobStatus::Error {
            warn!(target: "catalog_infra::scheduler", "{job_id} failed: {}", outcome.message);
        } else {
            info!(target: "catalog_infra::scheduler", "{job_id} {:?}: {}", outcome.status, outcome.message);
        }
    }

    /// Snapshot for the admin status surface.
    pub async fn job_statuses(&self) -> Vec<JobStatusSnapshot> {
        let records = self.records.lock().await;
        JOBS.iter()
            .map(|job| {
                let record = records.get(job.id).unwrap();
                JobStatusSnapshot {
                    job_id: job.id,
                    last_run: record.last_run,
                    last_error: record.last_error.clone(),
                    last_duration: record.last_duration,
                }
            })
            .collect()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only per-job health, fed into [`crate::status::StatusSnapshot`].
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatusSnapshot {
    pub job_id: &'static str,
    pub last_run: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_duration: Option<StdDuration>,
}
