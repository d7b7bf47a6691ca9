//! Domain records returned by the engine.
//!
//! Field names serialize exactly as consumers of the JSON API expect them,
//! including the mixed-case unit suffixes (`_GB`, `_MB`).

use serde::Serialize;

/// Rendered in place of an address that could not be resolved.
pub const NOT_AVAILABLE: &str = "Not available";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuSnapshot {
    pub cpu_percent: f64,
    pub cpu_percent_per_cpu: Vec<f64>,
    /// "2400.00 MHz" or "N/A".
    pub cpu_freq: String,
    pub cpu_cores: Option<usize>,
    pub cpu_threads: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemorySnapshot {
    pub memory_percent: f64,
    #[serde(rename = "total_memory_GB")]
    pub total_memory_gb: f64,
    #[serde(rename = "used_memory_GB")]
    pub used_memory_gb: f64,
    #[serde(rename = "available_memory_GB")]
    pub available_memory_gb: f64,
    #[serde(rename = "total_memory_MB")]
    pub total_memory_mb: f64,
    #[serde(rename = "used_memory_MB")]
    pub used_memory_mb: f64,
    #[serde(rename = "available_memory_MB")]
    pub available_memory_mb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskSnapshot {
    pub disk_percent: f64,
    pub total_disk: u64,
    pub used_disk: u64,
    pub free_disk: u64,
    pub total_disk_formatted: String,
    pub used_disk_formatted: String,
    pub free_disk_formatted: String,
}

/// Speeds are bytes per second, totals are cumulative bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkSnapshot {
    pub upload_speed: f64,
    pub download_speed: f64,
    #[serde(rename = "upload_speed_MB")]
    pub upload_speed_mb: f64,
    #[serde(rename = "download_speed_MB")]
    pub download_speed_mb: f64,
    pub upload_speed_formatted: String,
    pub download_speed_formatted: String,
    pub total_sent: u64,
    pub total_recv: u64,
    pub total_sent_formatted: String,
    pub total_recv_formatted: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IpSnapshot {
    pub hostname: String,
    pub ipv4: String,
    pub ipv6: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionsSnapshot {
    pub total_connections: usize,
    pub tcp_connections: usize,
    pub udp_connections: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UptimeSnapshot {
    pub uptime_seconds: u64,
    pub uptime_formatted: String,
    pub uptime_days: u64,
    pub uptime_hours: u64,
    pub uptime_minutes: u64,
}

/// Whole operations per second. `Default` is the zeroed payload served when
/// disk counters cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct IopsSnapshot {
    pub read_iops: u64,
    pub write_iops: u64,
    pub total_iops: u64,
}

/// One row of the process table. Network estimates are KB/s.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessSnapshot {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_mb: f64,
    pub network_upload: f64,
    pub network_download: f64,
    pub iops: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessesSnapshot {
    pub processes: Vec<ProcessSnapshot>,
}

/// Any domain record; serializes as the inner record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Snapshot {
    Cpu(CpuSnapshot),
    Memory(MemorySnapshot),
    Disk(DiskSnapshot),
    Network(NetworkSnapshot),
    Ip(IpSnapshot),
    Connections(ConnectionsSnapshot),
    Uptime(UptimeSnapshot),
    Iops(IopsSnapshot),
    Processes(ProcessesSnapshot),
}
