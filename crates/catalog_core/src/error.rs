//! Error taxonomy for the ingestion pipeline.
//!
//! Errors are never unwound across a job boundary: every job function
//! returns a [`JobOutcome`] instead of propagating via `?`, so the
//! scheduler and the CLI always have a concrete status and message to show
//! regardless of how a job ended.

use std::fmt;

/// The abstract error kinds a job can end in.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestError {
    /// Timeout, 5xx without a rate-limit sentinel, or network error.
    /// Recovered locally by rotation and retry.
    TransientUpstream { detail: String },
    /// 429, or a rate-limit-tagged 500. Recovered by account cooldown and
    /// rotation.
    RateLimited { detail: String },
    /// 401/403 or login rejection. Account cooldown; escalates to
    /// `Suspended` after the consecutive-error threshold.
    AuthFailed { detail: String },
    /// The pool is exhausted for the requested query type. Surfaced to the
    /// job as a skip reason, not a failure.
    NoAvailableAccount { query_type: String },
    /// JSON parse failure or HTML sentinel body. Treated as
    /// `TransientUpstream` by callers.
    MalformedUpstreamResponse { detail: String },
    /// Uniqueness violation on concurrent insert. Recovered with
    /// sub-transaction rollback and re-read.
    PersistenceConflict { detail: String },
    /// Unknown constellation slug or absent upstream predicate. Fatal for
    /// the job that hit it, not for the process.
    ConfigurationError { detail: String },
    /// The minimum-interval gate for this (constellation, query type) pair
    /// has not yet elapsed. Surfaced to the job as a skip reason, not a
    /// failure.
    RateGoverned { query_type: String, constellation: String },
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransientUpstream { detail } => write!(f, "transient upstream error: {detail}"),
            Self::RateLimited { detail } => write!(f, "rate limited: {detail}"),
            Self::AuthFailed { detail } => write!(f, "auth failed: {detail}"),
            Self::NoAvailableAccount { query_type } => {
                write!(f, "no account available for query type {query_type}")
            }
            Self::MalformedUpstreamResponse { detail } => {
                write!(f, "malformed upstream response: {detail}")
            }
            Self::PersistenceConflict { detail } => write!(f, "persistence conflict: {detail}"),
            Self::ConfigurationError { detail } => write!(f, "configuration error: {detail}"),
            Self::RateGoverned { query_type, constellation } => {
                write!(f, "rate governor blocked {query_type} for {constellation}: minimum interval not yet elapsed")
            }
        }
    }
}

impl std::error::Error for IngestError {}

impl IngestError {
    /// A malformed response is treated as transient upstream trouble, since
    /// both are recovered the same way: rotate accounts and retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TransientUpstream { .. } | Self::MalformedUpstreamResponse { .. }
        )
    }
}

/// Status a completed or partially-completed job reports to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Complete,
    InProgress,
    Partial,
    Error,
    /// The job's single-flight guard found a prior run still executing.
    Skipped,
}

/// Structured result every job returns instead of raising.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub status: JobStatus,
    pub records_touched: u64,
    pub error: Option<IngestError>,
    pub message: String,
}

impl JobOutcome {
    pub fn complete(records_touched: u64, message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Complete,
            records_touched,
            error: None,
            message: message.into(),
        }
    }

    pub fn error(err: IngestError) -> Self {
        Self {
            status: JobStatus::Error,
            records_touched: 0,
            message: err.to_string(),
            error: Some(err),
        }
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Skipped,
            records_touched: 0,
            error: None,
            message: message.into(),
        }
    }
}
