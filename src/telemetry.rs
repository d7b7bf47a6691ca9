//! Prometheus self-telemetry for the engine and the HTTP layer.
//!
//! Counts cache hits and misses per domain, domain failures, the duration of
//! the last computation, how many rate streams and per-pid baselines are
//! held, and requests per path.

use prometheus::{Encoder, GaugeVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::time::Duration;

/// Buffer capacity for metrics encoding.
const BUFFER_CAP: usize = 16 * 1024;

#[derive(Clone)]
pub struct Telemetry {
    registry: Registry,
    cache_hits: IntCounterVec,
    cache_misses: IntCounterVec,
    domain_errors: IntCounterVec,
    compute_seconds: GaugeVec,
    rate_streams: IntGauge,
    tracked_pids: IntGauge,
    http_requests: IntCounterVec,
}

impl Telemetry {
    /// Creates and registers all metrics with a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let cache_hits = IntCounterVec::new(
            Opts::new(
                "monix_cache_hits_total",
                "Domain requests served from the cache",
            ),
            &["domain"],
        )?;
        let cache_misses = IntCounterVec::new(
            Opts::new(
                "monix_cache_misses_total",
                "Domain requests that recomputed the snapshot",
            ),
            &["domain"],
        )?;
        let domain_errors = IntCounterVec::new(
            Opts::new(
                "monix_domain_errors_total",
                "Domain snapshots that failed or timed out",
            ),
            &["domain"],
        )?;
        let compute_seconds = GaugeVec::new(
            Opts::new(
                "monix_domain_compute_seconds",
                "Duration of the last snapshot computation",
            ),
            &["domain"],
        )?;
        let rate_streams = IntGauge::new(
            "monix_rate_streams",
            "System counter streams with a rate baseline",
        )?;
        let tracked_pids = IntGauge::new(
            "monix_tracked_pids",
            "Processes with a per-pid I/O baseline",
        )?;
        let http_requests = IntCounterVec::new(
            Opts::new("monix_http_requests_total", "HTTP requests by path"),
            &["path"],
        )?;

        registry.register(Box::new(cache_hits.clone()))?;
        registry.register(Box::new(cache_misses.clone()))?;
        registry.register(Box::new(domain_errors.clone()))?;
        registry.register(Box::new(compute_seconds.clone()))?;
        registry.register(Box::new(rate_streams.clone()))?;
        registry.register(Box::new(tracked_pids.clone()))?;
        registry.register(Box::new(http_requests.clone()))?;

        Ok(Self {
            registry,
            cache_hits,
            cache_misses,
            domain_errors,
            compute_seconds,
            rate_streams,
            tracked_pids,
            http_requests,
        })
    }

    pub fn record_hit(&self, domain: &str) {
        self.cache_hits.with_label_values(&[domain]).inc();
    }

    pub fn record_miss(&self, domain: &str, took: Duration) {
        self.cache_misses.with_label_values(&[domain]).inc();
        self.compute_seconds
            .with_label_values(&[domain])
            .set(took.as_secs_f64());
    }

    pub fn record_error(&self, domain: &str) {
        self.domain_errors.with_label_values(&[domain]).inc();
    }

    pub fn set_tracked(&self, rate_streams: usize, tracked_pids: usize) {
        self.rate_streams.set(rate_streams as i64);
        self.tracked_pids.set(tracked_pids as i64);
    }

    pub fn record_request(&self, path: &str) {
        self.http_requests.with_label_values(&[path]).inc();
    }

    /// Renders every registered metric in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let families = self.registry.gather();
        let mut buffer = Vec::with_capacity(BUFFER_CAP);
        TextEncoder::new().encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
