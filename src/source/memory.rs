//! System memory from /proc/meminfo.

use std::fs;
use std::path::Path;

use super::{MemoryUsage, SourceError};

/// The /proc/meminfo fields needed to derive usage, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemInfo {
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub available_bytes: u64,
    pub buffers_bytes: u64,
    pub cached_bytes: u64,
    pub reclaimable_bytes: u64,
}

impl MemInfo {
    /// Used memory excludes buffers and page cache; when that goes negative
    /// (containers, odd kernels) it falls back to total minus free.
    pub fn used_bytes(&self) -> u64 {
        let cached = self.cached_bytes + self.reclaimable_bytes;
        let reserved = self.free_bytes + self.buffers_bytes + cached;
        if reserved > self.total_bytes {
            self.total_bytes.saturating_sub(self.free_bytes)
        } else {
            self.total_bytes - reserved
        }
    }

    /// Percentage of memory not available to new allocations, one decimal.
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        let unavailable = self.total_bytes.saturating_sub(self.available_bytes) as f64;
        (unavailable / self.total_bytes as f64 * 1000.0).round() / 10.0
    }

    pub fn usage(&self) -> MemoryUsage {
        MemoryUsage {
            percent: self.percent(),
            total_bytes: self.total_bytes,
            used_bytes: self.used_bytes(),
            available_bytes: self.available_bytes,
        }
    }
}

fn parse_kb(value: &str) -> Option<u64> {
    value
        .split_whitespace()
        .next()
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}

/// Parses /proc/meminfo. `MemTotal` and `MemFree` are required; a missing
/// `MemAvailable` (pre-3.14 kernels) is estimated as free + buffers + cached.
pub fn parse_meminfo(content: &str) -> Result<MemInfo, String> {
    let mut total = None;
    let mut free = None;
    let mut available = None;
    let mut info = MemInfo::default();

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key {
            "MemTotal" => total = parse_kb(value),
            "MemFree" => free = parse_kb(value),
            "MemAvailable" => available = parse_kb(value),
            "Buffers" => info.buffers_bytes = parse_kb(value).unwrap_or(0),
            "Cached" => info.cached_bytes = parse_kb(value).unwrap_or(0),
            "SReclaimable" => info.reclaimable_bytes = parse_kb(value).unwrap_or(0),
            _ => {}
        }
    }

    match (total, free) {
        (Some(total), Some(free)) => {
            info.total_bytes = total;
            info.free_bytes = free;
            info.available_bytes = available
                .unwrap_or(free + info.buffers_bytes + info.cached_bytes)
                .min(total);
            Ok(info)
        }
        _ => Err("MemTotal or MemFree missing".to_string()),
    }
}

pub fn read_meminfo(proc_root: &Path) -> Result<MemInfo, SourceError> {
    let path = proc_root.join("meminfo");
    let content = fs::read_to_string(&path).map_err(|e| SourceError::io(&path, e))?;
    parse_meminfo(&content).map_err(|reason| SourceError::parse(&path, reason))
}
