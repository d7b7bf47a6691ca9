//! HTTP endpoint handlers for the server.
//!
//! This module provides handlers for all HTTP endpoints:
//! - `/`: Redirect to the web UI, or a liveness message without one
//! - `/api`: API name and version
//! - `/api/{domain}`: Domain snapshots (cpu, memory, disk, network, ip,
//!   connections, uptime, iops, processes)
//! - `/health`: Server health and engine state sizes
//! - `/metrics`: Prometheus self-telemetry

pub mod api;
pub mod health;
pub mod metrics;
pub mod root;

// Re-export handlers
pub use api::{api_info_handler, domain_handler};
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use root::root_handler;
