//! Metrics endpoint handler for Prometheus scraping.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, error, instrument};

use crate::state::SharedState;

/// Error type for metrics endpoint failures.
#[derive(Debug)]
pub enum MetricsError {
    Disabled,
    EncodingFailed,
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> axum::response::Response {
        match self {
            MetricsError::Disabled => (StatusCode::NOT_FOUND, "Telemetry is disabled").into_response(),
            MetricsError::EncodingFailed => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics",
            )
                .into_response(),
        }
    }
}

/// Handler for the /metrics endpoint.
#[instrument(skip(state))]
pub async fn metrics_handler(State(state): State<SharedState>) -> Result<String, MetricsError> {
    debug!("Processing /metrics request");
    let telemetry = state.telemetry.as_ref().ok_or(MetricsError::Disabled)?;
    telemetry.record_request("/metrics");

    let stats = state.engine.stats();
    telemetry.set_tracked(stats.rate_streams, stats.tracked_pids);

    telemetry.encode().map_err(|e| {
        error!("Failed to encode Prometheus metrics: {}", e);
        MetricsError::EncodingFailed
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::state_with_proc_root;
    use monix::Domain;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_metrics_exposes_domain_errors() {
        let dir = tempdir().expect("Failed to create temp dir");
        let state = state_with_proc_root(dir.path(), false);
        // No meminfo in the fake root
        assert!(state.engine.snapshot(Domain::Memory).is_err());

        let body = metrics_handler(State(state)).await.unwrap();
        assert!(body.contains("monix_domain_errors_total{domain=\"memory\"} 1"));
        assert!(body.contains("monix_http_requests_total{path=\"/metrics\"} 1"));
    }
}
