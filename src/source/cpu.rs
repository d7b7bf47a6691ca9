//! CPU time accounting from /proc/stat and topology from /proc/cpuinfo.
//!
//! Utilisation is never instantaneous: it is the busy share of the jiffies
//! that elapsed between two reads of /proc/stat, so [`measure_cpu_usage`]
//! blocks for the requested window.

use ahash::AHashSet as HashSet;
use once_cell::sync::Lazy;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use super::{CpuUsage, SourceError};

/// Get system clock ticks per second (usually 100, but can vary).
fn get_clk_tck() -> f64 {
    // SAFETY: sysconf is safe to call with _SC_CLK_TCK
    // Returns -1 on error, 0 if undefined - both are handled by the > 0 check
    unsafe {
        let tck = libc::sysconf(libc::_SC_CLK_TCK);
        if tck > 0 {
            return tck as f64;
        }
    }
    100.0
}

/// System clock ticks per second (for CPU time calculation).
pub static CLK_TCK: Lazy<f64> = Lazy::new(get_clk_tck);

/// Number of online logical CPUs.
pub fn online_cpus() -> usize {
    // SAFETY: sysconf has no memory-safety preconditions
    let online = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    if online > 0 {
        return online as usize;
    }
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Cumulative jiffies for one CPU line of /proc/stat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTimes {
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    /// Non-active time (idle + iowait).
    pub fn idle_total(&self) -> u64 {
        self.idle + self.iowait
    }
}

/// Aggregate `cpu` line plus the `cpuN` lines in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuTimesSnapshot {
    pub total: CpuTimes,
    pub cores: Vec<CpuTimes>,
}

/// Parses the CPU lines of /proc/stat.
pub fn parse_cpu_times(content: &str) -> Result<CpuTimesSnapshot, String> {
    let mut total = None;
    let mut cores = Vec::new();

    for line in content.lines() {
        if !line.starts_with("cpu") {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 8 {
            continue;
        }

        let field = |i: usize| parts.get(i).and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
        let times = CpuTimes {
            user: field(1),
            nice: field(2),
            system: field(3),
            idle: field(4),
            iowait: field(5),
            irq: field(6),
            softirq: field(7),
            steal: field(8),
        };

        if parts[0] == "cpu" {
            total = Some(times);
        } else {
            cores.push(times);
        }
    }

    match total {
        Some(total) => Ok(CpuTimesSnapshot { total, cores }),
        None => Err("No aggregate cpu line found".to_string()),
    }
}

pub fn read_cpu_times(proc_root: &Path) -> Result<CpuTimesSnapshot, SourceError> {
    let path = proc_root.join("stat");
    let content = fs::read_to_string(&path).map_err(|e| SourceError::io(&path, e))?;
    parse_cpu_times(&content).map_err(|reason| SourceError::parse(&path, reason))
}

/// Busy share of the jiffies elapsed between two samples, in percent
/// rounded to one decimal.
pub fn busy_percent(previous: &CpuTimes, current: &CpuTimes) -> f64 {
    let delta_total = current.total().saturating_sub(previous.total());
    if delta_total == 0 {
        return 0.0;
    }
    let delta_idle = current.idle_total().saturating_sub(previous.idle_total());
    let busy = delta_total.saturating_sub(delta_idle) as f64 / delta_total as f64 * 100.0;
    (busy.clamp(0.0, 100.0) * 10.0).round() / 10.0
}

/// Static topology facts from /proc/cpuinfo.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpuInfo {
    pub frequency_mhz: Option<f64>,
    pub physical_cores: Option<usize>,
}

/// Parses /proc/cpuinfo. Physical cores are distinct (physical id, core id)
/// pairs; frequency is the mean of the per-processor `cpu MHz` values.
pub fn parse_cpuinfo(content: &str) -> CpuInfo {
    let mut cores: HashSet<(String, String)> = HashSet::new();
    let mut physical_id: Option<String> = None;
    let mut core_id: Option<String> = None;
    let mut mhz_sum = 0.0;
    let mut mhz_count = 0usize;

    let mut flush = |physical_id: &mut Option<String>, core_id: &mut Option<String>| {
        if let (Some(p), Some(c)) = (physical_id.take(), core_id.take()) {
            cores.insert((p, c));
        }
    };

    for line in content.lines() {
        if line.trim().is_empty() {
            flush(&mut physical_id, &mut core_id);
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "physical id" => physical_id = Some(value.to_string()),
            "core id" => core_id = Some(value.to_string()),
            "cpu MHz" => {
                if let Ok(mhz) = value.parse::<f64>() {
                    mhz_sum += mhz;
                    mhz_count += 1;
                }
            }
            _ => {}
        }
    }
    flush(&mut physical_id, &mut core_id);

    CpuInfo {
        frequency_mhz: (mhz_count > 0).then(|| mhz_sum / mhz_count as f64),
        physical_cores: (!cores.is_empty()).then_some(cores.len()),
    }
}

/// Mean `scaling_cur_freq` across CPUs in MHz, if cpufreq is exposed.
fn read_scaling_frequency(sys_root: &Path) -> Option<f64> {
    let cpu_dir = sys_root.join("devices/system/cpu");
    let entries = fs::read_dir(cpu_dir).ok()?;

    let mut sum_khz = 0.0;
    let mut count = 0usize;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let is_cpu = name
            .strip_prefix("cpu")
            .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()));
        if !is_cpu {
            continue;
        }
        if let Ok(raw) = fs::read_to_string(entry.path().join("cpufreq/scaling_cur_freq")) {
            if let Ok(khz) = raw.trim().parse::<f64>() {
                sum_khz += khz;
                count += 1;
            }
        }
    }

    (count > 0).then(|| sum_khz / count as f64 / 1000.0)
}

/// Samples /proc/stat twice, `interval` apart, and derives utilisation.
pub fn measure_cpu_usage(
    proc_root: &Path,
    sys_root: &Path,
    interval: Duration,
) -> Result<CpuUsage, SourceError> {
    let before = read_cpu_times(proc_root)?;
    thread::sleep(interval);
    let after = read_cpu_times(proc_root)?;

    let overall_percent = busy_percent(&before.total, &after.total);
    let per_core_percent = before
        .cores
        .iter()
        .zip(after.cores.iter())
        .map(|(prev, curr)| busy_percent(prev, curr))
        .collect();

    let info = fs::read_to_string(proc_root.join("cpuinfo"))
        .map(|content| parse_cpuinfo(&content))
        .unwrap_or_default();

    let logical_cores = if after.cores.is_empty() {
        online_cpus()
    } else {
        after.cores.len()
    };

    Ok(CpuUsage {
        overall_percent,
        per_core_percent,
        frequency_mhz: read_scaling_frequency(sys_root).or(info.frequency_mhz),
        physical_cores: info.physical_cores,
        logical_cores,
    })
}

/// Reads the `btime` line of /proc/stat (seconds since the epoch).
pub fn read_boot_time(proc_root: &Path) -> Result<i64, SourceError> {
    let path = proc_root.join("stat");
    let content = fs::read_to_string(&path).map_err(|e| SourceError::io(&path, e))?;

    content
        .lines()
        .find_map(|line| line.strip_prefix("btime "))
        .and_then(|value| value.trim().parse::<i64>().ok())
        .ok_or_else(|| SourceError::parse(&path, "btime line not found"))
}
