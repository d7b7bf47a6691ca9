//! Sampling, rate derivation and attribution.
//!
//! [`Engine`] owns every piece of state that survives between requests:
//!
//! - `rate`: per-stream counter baselines ([`RateTracker`])
//! - `ttl_cache`: one time-windowed slot per domain ([`TtlCache`])
//! - `attributor`: per-process network and IOPS estimates ([`ProcessAttributor`])
//! - `snapshot`: the serializable domain records
//! - `format`: unit conversions and human-readable strings
//!
//! Each domain is computed independently; a failing domain never affects
//! another one.

pub mod attributor;
pub mod format;
pub mod rate;
pub mod snapshot;
pub mod ttl_cache;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error};

use crate::source::{CounterSource, Protocol, SourceError};
use crate::telemetry::Telemetry;

pub use attributor::{ConnectionCensus, ProcessAttributor, SystemThroughput};
pub use rate::{Observation, RateTracker};
pub use snapshot::*;
pub use ttl_cache::{Fetch, TtlCache};

/// Stream ids of the system-wide counters.
pub const NET_BYTES_SENT: &str = "net_bytes_sent";
pub const NET_BYTES_RECV: &str = "net_bytes_recv";
pub const DISK_READ_OPS: &str = "disk_read_ops";
pub const DISK_WRITE_OPS: &str = "disk_write_ops";
pub const PROC_NET_BYTES_SENT: &str = "processes.net_bytes_sent";
pub const PROC_NET_BYTES_RECV: &str = "processes.net_bytes_recv";

/// A public metric domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Cpu,
    Memory,
    Disk,
    Network,
    Ip,
    Connections,
    Uptime,
    Iops,
    Processes,
}

impl Domain {
    pub const ALL: [Domain; 9] = [
        Domain::Cpu,
        Domain::Memory,
        Domain::Disk,
        Domain::Network,
        Domain::Ip,
        Domain::Connections,
        Domain::Uptime,
        Domain::Iops,
        Domain::Processes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Cpu => "cpu",
            Domain::Memory => "memory",
            Domain::Disk => "disk",
            Domain::Network => "network",
            Domain::Ip => "ip",
            Domain::Connections => "connections",
            Domain::Uptime => "uptime",
            Domain::Iops => "iops",
            Domain::Processes => "processes",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| EngineError::UnknownDomain(s.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("{domain} snapshot timed out after {after:?}")]
    Timeout { domain: Domain, after: Duration },

    #[error("Snapshot task failed: {0}")]
    Join(String),

    #[error("Unknown domain: {0}")]
    UnknownDomain(String),
}

/// Tuning knobs for an [`Engine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub cache_ttl: Duration,
    pub cpu_sample_interval: Duration,
    pub process_sample_interval: Duration,
    pub domain_timeout: Duration,
    /// Cap on the process table, applied after sorting.
    pub max_processes: Option<usize>,
    pub pid_eviction_sweeps: u32,
    pub disk_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_millis(1000),
            cpu_sample_interval: Duration::from_millis(500),
            process_sample_interval: Duration::from_millis(100),
            domain_timeout: Duration::from_millis(10_000),
            max_processes: None,
            pid_eviction_sweeps: 2,
            disk_path: PathBuf::from("/"),
        }
    }
}

/// Counts of engine-held state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub cached_domains: usize,
    pub rate_streams: usize,
    pub tracked_pids: usize,
}

pub struct Engine {
    source: Arc<dyn CounterSource>,
    config: EngineConfig,
    rates: RateTracker<&'static str>,
    cache: TtlCache<Snapshot>,
    attributor: ProcessAttributor,
    telemetry: Option<Arc<Telemetry>>,
}

impl Engine {
    pub fn new(source: Arc<dyn CounterSource>, config: EngineConfig) -> Self {
        let attributor = ProcessAttributor::new(config.pid_eviction_sweeps);
        Self {
            source,
            config,
            rates: RateTracker::new(),
            cache: TtlCache::new(),
            attributor,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            cached_domains: self.cache.fresh_count(self.config.cache_ttl, Instant::now()),
            rate_streams: self.rates.len(),
            tracked_pids: self.attributor.tracked_pids(),
        }
    }

    /// Returns the domain record, recomputing it when the cached one has
    /// expired. Blocks for the CPU sampling window on `cpu` and `processes`
    /// misses.
    pub fn snapshot(&self, domain: Domain) -> Result<Snapshot, EngineError> {
        let started = Instant::now();
        let result = self
            .cache
            .try_get_or_compute(domain.as_str(), self.config.cache_ttl, || {
                self.compute(domain)
            });

        match result {
            Ok(fetch) => {
                if let Some(telemetry) = &self.telemetry {
                    if fetch.is_hit() {
                        telemetry.record_hit(domain.as_str());
                    } else {
                        telemetry.record_miss(domain.as_str(), started.elapsed());
                        telemetry.set_tracked(self.rates.len(), self.attributor.tracked_pids());
                    }
                }
                Ok(fetch.into_value())
            }
            Err(e) => self.fallback(domain, e),
        }
    }

    /// Contains a domain failure: IOPS degrades to zeros, every other domain
    /// reports the error.
    fn fallback(&self, domain: Domain, err: EngineError) -> Result<Snapshot, EngineError> {
        error!("Failed to compute {} snapshot: {}", domain, err);
        if let Some(telemetry) = &self.telemetry {
            telemetry.record_error(domain.as_str());
        }
        match domain {
            Domain::Iops => Ok(Snapshot::Iops(IopsSnapshot::default())),
            _ => Err(err),
        }
    }

    /// Computes a domain record, bypassing the cache.
    pub fn compute(&self, domain: Domain) -> Result<Snapshot, EngineError> {
        debug!("Computing {} snapshot", domain);
        let snapshot = match domain {
            Domain::Cpu => Snapshot::Cpu(self.cpu()?),
            Domain::Memory => Snapshot::Memory(self.memory()?),
            Domain::Disk => Snapshot::Disk(self.disk()?),
            Domain::Network => Snapshot::Network(self.network()?),
            Domain::Ip => Snapshot::Ip(self.ip()),
            Domain::Connections => Snapshot::Connections(self.connections()?),
            Domain::Uptime => Snapshot::Uptime(self.uptime()?),
            Domain::Iops => Snapshot::Iops(self.iops()?),
            Domain::Processes => Snapshot::Processes(self.processes()?),
        };
        Ok(snapshot)
    }

    fn cpu(&self) -> Result<CpuSnapshot, SourceError> {
        let usage = self.source.cpu_usage(self.config.cpu_sample_interval)?;
        Ok(CpuSnapshot {
            cpu_percent: usage.overall_percent,
            cpu_percent_per_cpu: usage.per_core_percent,
            cpu_freq: usage
                .frequency_mhz
                .map(|mhz| format!("{:.2} MHz", mhz))
                .unwrap_or_else(|| "N/A".to_string()),
            cpu_cores: usage.physical_cores,
            cpu_threads: usage.logical_cores,
        })
    }

    fn memory(&self) -> Result<MemorySnapshot, SourceError> {
        let usage = self.source.memory_usage()?;
        Ok(MemorySnapshot {
            memory_percent: usage.percent,
            total_memory_gb: format::gib(usage.total_bytes),
            used_memory_gb: format::gib(usage.used_bytes),
            available_memory_gb: format::gib(usage.available_bytes),
            total_memory_mb: format::mib(usage.total_bytes as f64),
            used_memory_mb: format::mib(usage.used_bytes as f64),
            available_memory_mb: format::mib(usage.available_bytes as f64),
        })
    }

    fn disk(&self) -> Result<DiskSnapshot, SourceError> {
        let usage = self.source.disk_usage(&self.config.disk_path)?;
        Ok(DiskSnapshot {
            disk_percent: usage.percent,
            total_disk: usage.total_bytes,
            used_disk: usage.used_bytes,
            free_disk: usage.free_bytes,
            total_disk_formatted: format::format_gb(usage.total_bytes),
            used_disk_formatted: format::format_gb(usage.used_bytes),
            free_disk_formatted: format::format_gb(usage.free_bytes),
        })
    }

    fn network(&self) -> Result<NetworkSnapshot, SourceError> {
        let counters = self.source.network_counters()?;
        let at = Instant::now();
        let upload = self.rates.observe_at(NET_BYTES_SENT, counters.bytes_sent, at).rate();
        let download = self.rates.observe_at(NET_BYTES_RECV, counters.bytes_recv, at).rate();

        Ok(NetworkSnapshot {
            upload_speed: upload,
            download_speed: download,
            upload_speed_mb: format::mib(upload),
            download_speed_mb: format::mib(download),
            upload_speed_formatted: format::format_speed(upload),
            download_speed_formatted: format::format_speed(download),
            total_sent: counters.bytes_sent,
            total_recv: counters.bytes_recv,
            total_sent_formatted: format::format_bytes(counters.bytes_sent),
            total_recv_formatted: format::format_bytes(counters.bytes_recv),
        })
    }

    fn ip(&self) -> IpSnapshot {
        let host = self.source.host_addresses();
        IpSnapshot {
            hostname: host.hostname,
            ipv4: host.ipv4.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            ipv6: host.ipv6.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        }
    }

    fn connections(&self) -> Result<ConnectionsSnapshot, SourceError> {
        let connections = self.source.connections()?;
        let tcp = connections
            .iter()
            .filter(|c| c.protocol == Protocol::Tcp)
            .count();
        Ok(ConnectionsSnapshot {
            total_connections: connections.len(),
            tcp_connections: tcp,
            udp_connections: connections.len() - tcp,
        })
    }

    fn uptime(&self) -> Result<UptimeSnapshot, SourceError> {
        let boot_time = self.source.boot_time()?;
        let seconds = (chrono::Utc::now().timestamp() - boot_time).max(0) as u64;
        let (days, hours, minutes) = format::split_uptime(seconds);
        Ok(UptimeSnapshot {
            uptime_seconds: seconds,
            uptime_formatted: format::format_uptime(seconds),
            uptime_days: days,
            uptime_hours: hours,
            uptime_minutes: minutes,
        })
    }

    fn iops(&self) -> Result<IopsSnapshot, SourceError> {
        let counters = self.source.physical_disk_io_counters()?;
        let at = Instant::now();
        let read = self.rates.observe_at(DISK_READ_OPS, counters.read_ops, at).rate();
        let write = self.rates.observe_at(DISK_WRITE_OPS, counters.write_ops, at).rate();
        let read_iops = read.floor() as u64;
        let write_iops = write.floor() as u64;
        Ok(IopsSnapshot {
            read_iops,
            write_iops,
            total_iops: read_iops + write_iops,
        })
    }

    fn processes(&self) -> Result<ProcessesSnapshot, SourceError> {
        let throughput = match self.source.network_counters() {
            Ok(counters) => {
                let at = Instant::now();
                let up = self.rates.observe_at(PROC_NET_BYTES_SENT, counters.bytes_sent, at);
                let down = self.rates.observe_at(PROC_NET_BYTES_RECV, counters.bytes_recv, at);
                SystemThroughput::from_bytes_per_sec(up.rate(), down.rate())
            }
            Err(e) => {
                debug!("Network counters unavailable for attribution: {}", e);
                SystemThroughput::default()
            }
        };

        let census = match self.source.connections() {
            Ok(connections) => ConnectionCensus::from_connections(&connections),
            Err(e) => {
                debug!("Connections unavailable for attribution: {}", e);
                ConnectionCensus::unavailable()
            }
        };

        let samples = self.source.process_list(self.config.process_sample_interval)?;
        let processes = self.attributor.attribute(
            samples,
            &census,
            throughput,
            self.source.logical_cores(),
            self.config.max_processes,
        );
        Ok(ProcessesSnapshot { processes })
    }
}

/// Runs [`Engine::snapshot`] on the blocking pool, giving up after the
/// configured domain timeout. The computation is not cancelled on timeout,
/// so rate baselines are always updated as a whole.
pub async fn snapshot_with_timeout(
    engine: Arc<Engine>,
    domain: Domain,
) -> Result<Snapshot, EngineError> {
    let after = engine.config.domain_timeout;
    let worker = Arc::clone(&engine);
    let task = tokio::task::spawn_blocking(move || worker.snapshot(domain));

    match tokio::time::timeout(after, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => engine.fallback(domain, EngineError::Join(join_error.to_string())),
        Err(_) => engine.fallback(domain, EngineError::Timeout { domain, after }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_round_trip_names() {
        for domain in Domain::ALL {
            assert_eq!(domain.as_str().parse::<Domain>().unwrap(), domain);
        }
        assert!(matches!(
            "gpu".parse::<Domain>(),
            Err(EngineError::UnknownDomain(name)) if name == "gpu"
        ));
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.cache_ttl, Duration::from_secs(1));
        assert_eq!(config.pid_eviction_sweeps, 2);
        assert!(config.max_processes.is_none());
    }
}
