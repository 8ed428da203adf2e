//! Process liveness check, read by the admin status surface.
//!
//! Distinct from [`crate::status`], which aggregates per-account and
//! per-job history: this answers only "can the process reach its
//! database right now", the one dependency whose loss should flip a
//! load balancer's liveness probe.

use crate::store::CatalogWriter;

/// Schema version this binary expects. Bumped by hand whenever
/// [`crate::store::CatalogWriter::init_schema`]'s DDL changes shape, so an
/// operator running a mismatched binary against an old database sees it in
/// the health response rather than discovering it from a query error.
pub const SCHEMA_VERSION: &str = "1";

/// Liveness response: whether the database round-trip succeeded, a build
/// identifier, and the schema version the running binary expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthResponse {
    pub ok: bool,
    pub build_id: String,
    pub schema_version: String,
    /// Set when `ok` is false: the error the database round-trip returned.
    pub detail: Option<String>,
}

impl HealthResponse {
    fn healthy(build_id: impl Into<String>) -> Self {
        Self {
            ok: true,
            build_id: build_id.into(),
            schema_version: SCHEMA_VERSION.to_string(),
            detail: None,
        }
    }

    fn unhealthy(build_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            build_id: build_id.into(),
            schema_version: SCHEMA_VERSION.to_string(),
            detail: Some(detail.into()),
        }
    }
}

/// Ping `writer`'s pool and report the outcome as a [`HealthResponse`].
pub async fn check_health(build_id: &str, writer: &CatalogWriter) -> HealthResponse {
    match writer.ping().await {
        Ok(()) => HealthResponse::healthy(build_id),
        Err(err) => HealthResponse::unhealthy(build_id, err.to_string()),
    }
}

pub const EXIT_HEALTHY: i32 = 0;
pub const EXIT_UNHEALTHY: i32 = 1;

pub fn exit_code(response: &HealthResponse) -> i32 {
    if response.ok {
        EXIT_HEALTHY
    } else {
        EXIT_UNHEALTHY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn healthy_response_reports_ok_for_a_reachable_database() {
        let writer = CatalogWriter::connect("sqlite::memory:").await.unwrap();
        let resp = check_health("abc123", &writer).await;
        assert!(resp.ok);
        assert_eq!(resp.schema_version, SCHEMA_VERSION);
        assert!(resp.detail.is_none());
    }

    #[test]
    fn unhealthy_response_maps_to_nonzero_exit_code() {
        let resp = HealthResponse::unhealthy("abc123", "connection refused");
        assert_eq!(exit_code(&resp), EXIT_UNHEALTHY);
        assert_eq!(resp.detail.as_deref(), Some("connection refused"));
    }
}
