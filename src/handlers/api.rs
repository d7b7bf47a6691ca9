//! JSON API handlers.
//!
//! Every domain is computed on the blocking pool and bounded by the
//! configured domain timeout. Failures become `{"error": "<message>"}`
//! instead of tearing down the connection.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use monix::engine::{snapshot_with_timeout, Domain, EngineError, Snapshot};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

use crate::state::SharedState;

/// Error type for domain endpoint failures.
#[derive(Debug)]
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            EngineError::UnknownDomain(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Handler for `/api`.
#[instrument(skip(state))]
pub async fn api_info_handler(State(state): State<SharedState>) -> Json<Value> {
    state.record_request("/api");
    Json(json!({
        "message": "Monix API is running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Handler for `/api/{domain}`.
#[instrument(skip(state))]
pub async fn domain_handler(
    State(state): State<SharedState>,
    Path(domain): Path<String>,
) -> Result<Json<Snapshot>, ApiError> {
    let domain: Domain = match domain.parse() {
        Ok(domain) => domain,
        Err(e) => {
            debug!("Rejecting request for unknown domain '{}'", domain);
            return Err(ApiError(e));
        }
    };
    state.record_request(&format!("/api/{}", domain));

    let start = Instant::now();
    let result = snapshot_with_timeout(Arc::clone(&state.engine), domain).await;
    debug!("/api/{} answered in {:?}", domain, start.elapsed());

    match result {
        Ok(snapshot) => Ok(Json(snapshot)),
        Err(e) => {
            warn!("Serving error for /api/{}: {}", domain, e);
            Err(ApiError(e))
        }
    }
}
