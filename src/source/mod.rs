//! Raw operating-system counters read from /proc and /sys.
//!
//! This module is the boundary between the engine and the kernel. Every read
//! is a pure function of the current OS state: nothing here caches or keeps
//! history. The engine talks to it through the [`CounterSource`] trait so the
//! rate and attribution logic can be exercised against synthetic counters.
//!
//! - `cpu`: /proc/stat CPU times, /proc/cpuinfo topology and frequency
//! - `memory`: /proc/meminfo
//! - `filesystem`: statvfs usage for a mount point
//! - `netdev`: /proc/net/dev interface byte counters
//! - `diskstats`: /proc/diskstats completed read/write operations
//! - `connections`: /proc/net/{tcp,tcp6,udp,udp6} with socket owner lookup
//! - `host`: hostname and resolved addresses
//! - `process`: per-process CPU, memory and I/O counters

pub mod connections;
pub mod cpu;
pub mod diskstats;
pub mod filesystem;
pub mod host;
pub mod memory;
pub mod netdev;
pub mod process;

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Failure to read or interpret an OS counter.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("Counter not available: {0}")]
    Unsupported(&'static str),
}

impl SourceError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        SourceError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub(crate) fn parse(path: &Path, reason: impl Into<String>) -> Self {
        SourceError::Parse {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }
}

/// Overall and per-core CPU utilisation over one measurement window.
#[derive(Debug, Clone, PartialEq)]
pub struct CpuUsage {
    pub overall_percent: f64,
    pub per_core_percent: Vec<f64>,
    pub frequency_mhz: Option<f64>,
    pub physical_cores: Option<usize>,
    pub logical_cores: usize,
}

/// Virtual memory usage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryUsage {
    pub percent: f64,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
}

/// Space usage of the filesystem backing a path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskUsage {
    pub percent: f64,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}

/// Cumulative bytes across all network interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetworkCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
}

/// Cumulative completed disk operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiskIoCounters {
    pub read_ops: u64,
    pub write_ops: u64,
}

/// Host name with the first resolved IPv4 and IPv6 address, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAddresses {
    pub hostname: String,
    pub ipv4: Option<String>,
    pub ipv6: Option<String>,
}

pub use connections::{Connection, ConnectionStatus, Protocol};

/// Cumulative per-process I/O syscall counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IoCounters {
    pub read_count: u64,
    pub write_count: u64,
}

impl IoCounters {
    pub fn total(&self) -> u64 {
        self.read_count.saturating_add(self.write_count)
    }
}

/// One live process as seen during an enumeration.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSample {
    pub pid: u32,
    pub name: String,
    /// CPU usage over the sampling window, in percent of one core (may exceed 100).
    pub raw_cpu_percent: f64,
    pub memory_percent: f64,
    pub rss_bytes: u64,
    /// `None` when the kernel denies access to the process I/O counters.
    pub io: Option<IoCounters>,
}

/// Read-only access to OS counters.
///
/// Implementations must be stateless and callable from many threads at once.
pub trait CounterSource: Send + Sync {
    /// Measures CPU utilisation over `interval`, blocking for that long.
    fn cpu_usage(&self, interval: Duration) -> Result<CpuUsage, SourceError>;

    fn memory_usage(&self) -> Result<MemoryUsage, SourceError>;

    fn disk_usage(&self, path: &Path) -> Result<DiskUsage, SourceError>;

    fn network_counters(&self) -> Result<NetworkCounters, SourceError>;

    /// Aggregate operations across whole disks.
    fn disk_io_counters(&self) -> Result<DiskIoCounters, SourceError>;

    /// Counters of the first physical disk, falling back to the aggregate
    /// when only virtual devices are present.
    fn physical_disk_io_counters(&self) -> Result<DiskIoCounters, SourceError>;

    /// Never fails: unresolvable fields are `None`.
    fn host_addresses(&self) -> HostAddresses;

    fn connections(&self) -> Result<Vec<Connection>, SourceError>;

    /// Boot time as seconds since the Unix epoch.
    fn boot_time(&self) -> Result<i64, SourceError>;

    fn logical_cores(&self) -> usize;

    /// Enumerates processes, measuring per-process CPU over `interval`.
    /// Processes that vanish, deny access or are zombies are left out.
    fn process_list(&self, interval: Duration) -> Result<Vec<ProcessSample>, SourceError>;
}

/// [`CounterSource`] backed by the Linux procfs and sysfs.
#[derive(Debug, Clone)]
pub struct ProcfsSource {
    proc_root: PathBuf,
    sys_root: PathBuf,
}

impl Default for ProcfsSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcfsSource {
    pub fn new() -> Self {
        Self::with_roots("/proc", "/sys")
    }

    /// Reads from alternative procfs/sysfs roots (used by tests).
    pub fn with_roots(proc_root: impl Into<PathBuf>, sys_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            sys_root: sys_root.into(),
        }
    }
}

impl CounterSource for ProcfsSource {
    fn cpu_usage(&self, interval: Duration) -> Result<CpuUsage, SourceError> {
        cpu::measure_cpu_usage(&self.proc_root, &self.sys_root, interval)
    }

    fn memory_usage(&self) -> Result<MemoryUsage, SourceError> {
        memory::read_meminfo(&self.proc_root).map(|info| info.usage())
    }

    fn disk_usage(&self, path: &Path) -> Result<DiskUsage, SourceError> {
        filesystem::read_disk_usage(path)
    }

    fn network_counters(&self) -> Result<NetworkCounters, SourceError> {
        netdev::read_netdev_stats(&self.proc_root).map(|stats| netdev::total_counters(&stats))
    }

    fn disk_io_counters(&self) -> Result<DiskIoCounters, SourceError> {
        let stats = diskstats::read_diskstats(&self.proc_root)?;
        Ok(diskstats::aggregate_counters(&stats, &self.sys_root))
    }

    fn physical_disk_io_counters(&self) -> Result<DiskIoCounters, SourceError> {
        let stats = diskstats::read_diskstats(&self.proc_root)?;
        match diskstats::first_physical(&stats) {
            Some(disk) => Ok(disk.counters()),
            None => Ok(diskstats::aggregate_counters(&stats, &self.sys_root)),
        }
    }

    fn host_addresses(&self) -> HostAddresses {
        host::read_host_addresses()
    }

    fn connections(&self) -> Result<Vec<Connection>, SourceError> {
        connections::read_connections(&self.proc_root)
    }

    fn boot_time(&self) -> Result<i64, SourceError> {
        cpu::read_boot_time(&self.proc_root)
    }

    fn logical_cores(&self) -> usize {
        cpu::online_cpus()
    }

    fn process_list(&self, interval: Duration) -> Result<Vec<ProcessSample>, SourceError> {
        process::sample_processes(&self.proc_root, interval)
    }
}
