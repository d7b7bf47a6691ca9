//! Root endpoint handler.
//!
//! Redirects to the web UI when it is mounted; otherwise answers with a
//! short liveness message so API-only deployments still respond on `/`.

use axum::{
    extract::State,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde_json::json;
use tracing::{debug, instrument};

use crate::state::SharedState;

/// Path the web UI is mounted under.
pub const UI_PATH: &str = "/ui";

/// Handler for the root `/` endpoint.
#[instrument(skip(state))]
pub async fn root_handler(State(state): State<SharedState>) -> Response {
    debug!("Processing / request");
    state.record_request("/");

    if state.frontend_mounted {
        Redirect::temporary(&format!("{}/", UI_PATH)).into_response()
    } else {
        Json(json!({ "message": "Monix Backend API is running" })).into_response()
    }
}
