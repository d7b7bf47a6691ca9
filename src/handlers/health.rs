//! Health check endpoint handler.
//!
//! This module provides the `/health` endpoint handler that reports server
//! uptime and how much state the engine currently holds.

use axum::{extract::State, Json};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::state::SharedState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_seconds: u64,
    pub cached_domains: usize,
    pub tracked_streams: usize,
    pub tracked_pids: usize,
}

/// Handler for the /health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    debug!("Processing /health request");
    state.record_request("/health");

    let stats = state.engine.stats();
    Json(HealthResponse {
        status: "ok",
        uptime_seconds: state.start_time.elapsed().as_secs(),
        cached_domains: stats.cached_domains,
        tracked_streams: stats.rate_streams,
        tracked_pids: stats.tracked_pids,
    })
}
