//! Per-process attribution of system network throughput and I/O rates.
//!
//! The kernel does not report per-process network traffic, so each process
//! receives an estimated share of the system-wide rate. The share is weighted
//! by the process's fraction of established connections and by its CPU use.
//! Processes without connections but with noticeable CPU get a small trickle;
//! everything else gets zero. Per-process IOPS come from the syscall counters
//! where readable, and from a CPU/memory estimate otherwise.
//!
//! Estimates are bounded by the system figure: after the per-process formula,
//! a direction whose estimates sum above the system rate is scaled down
//! proportionally, and every estimate is rounded down to whole hundredths.

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use std::time::Instant;
use tracing::debug;

use super::rate::RateTracker;
use super::snapshot::ProcessSnapshot;
use crate::source::{Connection, ConnectionStatus, ProcessSample};

/// Below this in both directions the system counts as idle.
pub const ACTIVITY_FLOOR_KB_S: f64 = 1.0;
pub const CONNECTION_WEIGHT: f64 = 0.7;
pub const CPU_WEIGHT: f64 = 0.3;
/// Share of system throughput given to connectionless processes, per unit CPU.
pub const TRICKLE_FACTOR: f64 = 0.01;
/// Connectionless processes at or below this CPU percent get no traffic.
pub const TRICKLE_CPU_THRESHOLD: f64 = 2.0;
/// Scale of the synthetic IOPS estimate.
pub const SYNTHETIC_IOPS_SCALE: f64 = 10.0;

/// System-wide network rates in KB/s after the idle floor is applied.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SystemThroughput {
    pub upload_kb_s: f64,
    pub download_kb_s: f64,
}

impl SystemThroughput {
    pub fn from_kb_per_sec(upload_kb_s: f64, download_kb_s: f64) -> Self {
        let upload_kb_s = upload_kb_s.max(0.0);
        let download_kb_s = download_kb_s.max(0.0);
        if upload_kb_s < ACTIVITY_FLOOR_KB_S && download_kb_s < ACTIVITY_FLOOR_KB_S {
            return Self::default();
        }
        Self {
            upload_kb_s,
            download_kb_s,
        }
    }

    pub fn from_bytes_per_sec(upload: f64, download: f64) -> Self {
        Self::from_kb_per_sec(upload / 1024.0, download / 1024.0)
    }

    pub fn is_active(&self) -> bool {
        self.upload_kb_s > 0.0 || self.download_kb_s > 0.0
    }
}

/// Established connections per owning process.
#[derive(Debug, Clone, Default)]
pub struct ConnectionCensus {
    per_pid: HashMap<u32, usize>,
    total_established: usize,
}

impl ConnectionCensus {
    pub fn from_connections(connections: &[Connection]) -> Self {
        let mut per_pid = HashMap::new();
        let mut total_established = 0;
        for conn in connections
            .iter()
            .filter(|c| c.status == ConnectionStatus::Established)
        {
            total_established += 1;
            if let Some(pid) = conn.pid {
                *per_pid.entry(pid).or_insert(0) += 1;
            }
        }
        Self {
            per_pid,
            total_established,
        }
    }

    /// Used when the socket table cannot be read: no process has connections.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn count(&self, pid: u32) -> usize {
        self.per_pid.get(&pid).copied().unwrap_or(0)
    }

    /// Never below 1, so it is always a safe divisor.
    pub fn total_established(&self) -> usize {
        self.total_established.max(1)
    }
}

/// Converts a per-core CPU figure into a share of the whole machine.
pub fn normalize_cpu(raw_percent: f64, logical_cores: usize) -> f64 {
    let cores = logical_cores.max(1) as f64;
    (raw_percent / cores).clamp(0.0, 100.0)
}

/// Estimated (upload, download) in KB/s for one process.
pub fn estimate_network(
    throughput: SystemThroughput,
    connections: usize,
    total_established: usize,
    cpu_percent: f64,
) -> (f64, f64) {
    if !throughput.is_active() {
        return (0.0, 0.0);
    }

    if connections > 0 {
        let conn_ratio = connections as f64 / total_established.max(1) as f64;
        let weight = CONNECTION_WEIGHT * conn_ratio + CPU_WEIGHT * (cpu_percent / 100.0);
        let upload = (throughput.upload_kb_s * weight).clamp(0.0, throughput.upload_kb_s);
        let download = (throughput.download_kb_s * weight).clamp(0.0, throughput.download_kb_s);
        (upload, download)
    } else if cpu_percent > TRICKLE_CPU_THRESHOLD {
        let share = TRICKLE_FACTOR * (cpu_percent / 100.0);
        (throughput.upload_kb_s * share, throughput.download_kb_s * share)
    } else {
        (0.0, 0.0)
    }
}

/// IOPS guess for processes without a measured rate.
pub fn synthetic_iops(cpu_percent: f64, memory_percent: f64) -> u64 {
    let factor = (cpu_percent / 100.0 + memory_percent / 100.0) / 2.0;
    (SYNTHETIC_IOPS_SCALE * factor).floor().max(0.0) as u64
}

/// Scales `values` down so their sum does not exceed `budget`, then rounds
/// each one down to 2 decimals. Whole cents are summed as integers so the
/// rounded values stay within the budget.
fn fit_to_budget(values: &[f64], budget: f64) -> Vec<f64> {
    let budget = budget.max(0.0);
    let sum: f64 = values.iter().sum();
    let scale = if sum > budget && sum > 0.0 { budget / sum } else { 1.0 };

    let budget_cents = (budget * 100.0).floor() as u64;
    let mut cents: Vec<u64> = values
        .iter()
        .map(|v| (v.max(0.0) * scale * 100.0).floor() as u64)
        .collect();

    // Scaling can land a hair above the budget; take the excess off the largest rows
    let mut total: u64 = cents.iter().sum();
    while total > budget_cents {
        let Some(largest) = cents.iter_mut().max() else {
            break;
        };
        if *largest == 0 {
            break;
        }
        *largest -= 1;
        total -= 1;
    }

    cents.into_iter().map(|c| c as f64 / 100.0).collect()
}

/// Builds the ranked process table and owns the per-pid I/O baselines.
#[derive(Debug)]
pub struct ProcessAttributor {
    io_rates: RateTracker<u32>,
    eviction_sweeps: u32,
}

impl ProcessAttributor {
    /// `eviction_sweeps` is how many consecutive enumerations a pid may be
    /// absent from before its I/O baseline is dropped.
    pub fn new(eviction_sweeps: u32) -> Self {
        Self {
            io_rates: RateTracker::new(),
            eviction_sweeps: eviction_sweeps.max(1),
        }
    }

    pub fn tracked_pids(&self) -> usize {
        self.io_rates.len()
    }

    pub fn attribute(
        &self,
        samples: Vec<ProcessSample>,
        census: &ConnectionCensus,
        throughput: SystemThroughput,
        logical_cores: usize,
        limit: Option<usize>,
    ) -> Vec<ProcessSnapshot> {
        self.attribute_at(samples, census, throughput, logical_cores, limit, Instant::now())
    }

    /// Produces the process table for one enumeration taken at `at`.
    ///
    /// Rows are sorted by CPU descending, ties keeping enumeration order, and
    /// cut to `limit` after sorting.
    pub fn attribute_at(
        &self,
        samples: Vec<ProcessSample>,
        census: &ConnectionCensus,
        throughput: SystemThroughput,
        logical_cores: usize,
        limit: Option<usize>,
        at: Instant,
    ) -> Vec<ProcessSnapshot> {
        let total_established = census.total_established();
        let live: HashSet<u32> = samples.iter().map(|s| s.pid).collect();

        let mut rows: Vec<ProcessSnapshot> = samples
            .into_iter()
            .map(|sample| {
                let cpu_percent = normalize_cpu(sample.raw_cpu_percent, logical_cores);
                let (upload, download) = estimate_network(
                    throughput,
                    census.count(sample.pid),
                    total_established,
                    cpu_percent,
                );

                let measured = sample.io.and_then(|io| {
                    let obs = self.io_rates.observe_at(sample.pid, io.total(), at);
                    obs.is_measured().then(|| obs.rate().floor() as u64)
                });
                let iops = measured
                    .unwrap_or_else(|| synthetic_iops(cpu_percent, sample.memory_percent));

                ProcessSnapshot {
                    pid: sample.pid,
                    name: sample.name,
                    cpu_percent,
                    memory_percent: sample.memory_percent,
                    memory_mb: sample.rss_bytes as f64 / (1024.0 * 1024.0),
                    network_upload: upload,
                    network_download: download,
                    iops,
                }
            })
            .collect();

        let uploads: Vec<f64> = rows.iter().map(|r| r.network_upload).collect();
        let downloads: Vec<f64> = rows.iter().map(|r| r.network_download).collect();
        let uploads = fit_to_budget(&uploads, throughput.upload_kb_s);
        let downloads = fit_to_budget(&downloads, throughput.download_kb_s);
        for ((row, up), down) in rows.iter_mut().zip(uploads).zip(downloads) {
            row.network_upload = up;
            row.network_download = down;
        }

        rows.sort_by(|a, b| b.cpu_percent.total_cmp(&a.cpu_percent));
        if let Some(limit) = limit {
            rows.truncate(limit);
        }

        let evicted = self
            .io_rates
            .sweep(|pid| live.contains(pid), self.eviction_sweeps);
        if evicted > 0 {
            debug!("Evicted I/O baselines for {} exited processes", evicted);
        }

        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{IoCounters, Protocol};
    use std::time::Duration;

    fn sample(pid: u32, raw_cpu: f64, io: Option<u64>) -> ProcessSample {
        ProcessSample {
            pid,
            name: format!("proc{}", pid),
            raw_cpu_percent: raw_cpu,
            memory_percent: 10.0,
            rss_bytes: 64 * 1024 * 1024,
            io: io.map(|total| IoCounters {
                read_count: total,
                write_count: 0,
            }),
        }
    }

    fn established(pid: Option<u32>) -> Connection {
        Connection {
            protocol: Protocol::Tcp,
            status: ConnectionStatus::Established,
            pid,
        }
    }

    #[test]
    fn test_idle_floor() {
        assert!(!SystemThroughput::from_kb_per_sec(0.9, 0.5).is_active());
        let active = SystemThroughput::from_kb_per_sec(0.5, 2.0);
        assert_eq!(active.upload_kb_s, 0.5);
        assert_eq!(active.download_kb_s, 2.0);
        assert!(SystemThroughput::from_bytes_per_sec(2048.0, 0.0).is_active());
    }

    #[test]
    fn test_census_counts_established_only() {
        let mut connections = vec![established(Some(1)), established(Some(1)), established(None)];
        connections.push(Connection {
            protocol: Protocol::Tcp,
            status: ConnectionStatus::Listen,
            pid: Some(2),
        });
        let census = ConnectionCensus::from_connections(&connections);
        assert_eq!(census.count(1), 2);
        assert_eq!(census.count(2), 0);
        assert_eq!(census.total_established(), 3);
        assert_eq!(ConnectionCensus::unavailable().total_established(), 1);
    }

    #[test]
    fn test_normalize_cpu() {
        assert_eq!(normalize_cpu(400.0, 8), 50.0);
        assert_eq!(normalize_cpu(900.0, 4), 100.0);
        assert_eq!(normalize_cpu(50.0, 0), 50.0);
    }

    #[test]
    fn test_connection_weighted_estimate() {
        let throughput = SystemThroughput::from_kb_per_sec(100.0, 50.0);
        let (up, down) = estimate_network(throughput, 3, 10, 20.0);
        assert!((up - 27.0).abs() < 1e-9);
        assert!((down - 13.5).abs() < 1e-9);
    }

    #[test]
    fn test_trickle_requires_cpu() {
        let throughput = SystemThroughput::from_kb_per_sec(100.0, 100.0);
        let (up, _) = estimate_network(throughput, 0, 1, 50.0);
        assert!((up - 0.5).abs() < 1e-9);
        assert_eq!(estimate_network(throughput, 0, 1, 2.0), (0.0, 0.0));
    }

    #[test]
    fn test_synthetic_iops() {
        assert_eq!(synthetic_iops(50.0, 30.0), 4);
        assert_eq!(synthetic_iops(0.0, 0.0), 0);
        assert_eq!(synthetic_iops(100.0, 100.0), 10);
    }

    #[test]
    fn test_io_rate_after_first_enumeration() {
        let attributor = ProcessAttributor::new(2);
        let census = ConnectionCensus::unavailable();
        let t0 = Instant::now();

        let first = attributor.attribute_at(
            vec![sample(7, 0.0, Some(100))],
            &census,
            SystemThroughput::default(),
            1,
            None,
            t0,
        );
        assert_eq!(first[0].iops, synthetic_iops(0.0, 10.0));

        let second = attributor.attribute_at(
            vec![sample(7, 0.0, Some(350))],
            &census,
            SystemThroughput::default(),
            1,
            None,
            t0 + Duration::from_secs(2),
        );
        assert_eq!(second[0].iops, 125);
    }

    #[test]
    fn test_exited_pids_are_evicted() {
        let attributor = ProcessAttributor::new(2);
        let census = ConnectionCensus::unavailable();
        let t0 = Instant::now();
        let idle = SystemThroughput::default();

        attributor.attribute_at(vec![sample(1, 0.0, Some(1)), sample(2, 0.0, Some(1))], &census, idle, 1, None, t0);
        assert_eq!(attributor.tracked_pids(), 2);

        attributor.attribute_at(vec![sample(1, 0.0, Some(1))], &census, idle, 1, None, t0);
        assert_eq!(attributor.tracked_pids(), 2);
        attributor.attribute_at(vec![sample(1, 0.0, Some(1))], &census, idle, 1, None, t0);
        assert_eq!(attributor.tracked_pids(), 1);
    }

    #[test]
    fn test_sort_and_limit() {
        let attributor = ProcessAttributor::new(2);
        let rows = attributor.attribute(
            vec![
                sample(1, 10.0, None),
                sample(2, 80.0, None),
                sample(3, 10.0, None),
                sample(4, 40.0, None),
            ],
            &ConnectionCensus::unavailable(),
            SystemThroughput::default(),
            1,
            Some(3),
        );
        let pids: Vec<u32> = rows.iter().map(|r| r.pid).collect();
        assert_eq!(pids, vec![2, 4, 1]);
    }

    #[test]
    fn test_estimates_fit_system_budget() {
        let attributor = ProcessAttributor::new(2);
        let connections: Vec<Connection> = (1..=4).map(|pid| established(Some(pid))).collect();
        let census = ConnectionCensus::from_connections(&connections);
        let samples = (1..=4).map(|pid| sample(pid, 100.0, None)).collect();

        let rows = attributor.attribute(
            samples,
            &census,
            SystemThroughput::from_kb_per_sec(40.0, 40.0),
            1,
            None,
        );
        let total: f64 = rows.iter().map(|r| r.network_upload).sum();
        assert!(total <= 40.0, "total {} exceeds system upload", total);
    }

    #[test]
    fn test_rounding_never_pushes_total_over_budget() {
        let attributor = ProcessAttributor::new(2);
        let connections: Vec<Connection> = (1..=8).map(|pid| established(Some(pid))).collect();
        let census = ConnectionCensus::from_connections(&connections);
        let samples = (1..=8).map(|pid| sample(pid, 100.0, None)).collect();

        let rows = attributor.attribute(
            samples,
            &census,
            SystemThroughput::from_kb_per_sec(1.0, 1.0),
            1,
            None,
        );
        let upload: f64 = rows.iter().map(|r| r.network_upload).sum();
        let download: f64 = rows.iter().map(|r| r.network_download).sum();
        assert!(upload <= 1.0, "upload total {} exceeds 1.0", upload);
        assert!(download <= 1.0, "download total {} exceeds 1.0", download);
        assert!(rows.iter().all(|r| r.network_upload == 0.12));
    }

    #[test]
    fn test_fit_to_budget_rounds_down_within_budget() {
        assert_eq!(fit_to_budget(&[27.000000000000004, 49.0], 100.0), vec![27.0, 49.0]);
        assert_eq!(fit_to_budget(&[0.5, 0.5, 0.5], 1.0), vec![0.33, 0.33, 0.33]);
        assert_eq!(fit_to_budget(&[0.0, 0.0], 0.0), vec![0.0, 0.0]);
        let fitted = fit_to_budget(&[0.019, 0.019, 0.019], 0.05);
        assert!(fitted.iter().sum::<f64>() <= 0.05);
    }
}
