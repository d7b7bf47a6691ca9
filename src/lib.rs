//! Monix system monitor library
//!
//! Samples operating-system counters and turns them into the per-domain
//! records served by the `monix` binary. The interesting parts are stateful:
//! rates are derived from successive counter readings, per-process network
//! and I/O activity is estimated from connection ownership and CPU share, and
//! every domain sits behind a short time-windowed cache.
//!
//! # Modules
//!
//! - **source**: raw counters from /proc and /sys behind the `CounterSource` trait
//! - **engine**: rate tracking, TTL cache, attribution and the `Engine` orchestrator
//! - **telemetry**: Prometheus metrics about the engine itself
//!
//! # Usage
//!
//! ```no_run
//! use monix::engine::{Domain, Engine, EngineConfig};
//! use monix::source::ProcfsSource;
//! use std::sync::Arc;
//!
//! let engine = Engine::new(Arc::new(ProcfsSource::new()), EngineConfig::default());
//! let memory = engine.snapshot(Domain::Memory).expect("memory snapshot");
//! println!("{}", serde_json::to_string(&memory).unwrap());
//! ```

pub mod engine;
pub mod source;
pub mod telemetry;

// Re-export main types for convenience
pub use engine::{Domain, Engine, EngineConfig, EngineError, Snapshot};
pub use source::{CounterSource, ProcfsSource, SourceError};
pub use telemetry::Telemetry;
