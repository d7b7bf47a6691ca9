//! Application state management for the server.
//!
//! This module defines the shared application state that is passed
//! to HTTP handlers.

use monix::{Engine, Telemetry};
use std::sync::Arc;
use std::time::Instant;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Global application state shared across requests.
pub struct AppState {
    /// Owns every rate baseline, cached snapshot and per-pid I/O baseline.
    pub engine: Arc<Engine>,
    /// Self-telemetry; `None` when `/metrics` is disabled.
    pub telemetry: Option<Arc<Telemetry>>,
    /// Whether the web UI is served under /ui.
    pub frontend_mounted: bool,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn record_request(&self, path: &str) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.record_request(path);
        }
    }
}
