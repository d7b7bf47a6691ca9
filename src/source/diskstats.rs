//! Completed disk operations from /proc/diskstats.

use std::fs;
use std::path::Path;

use super::{DiskIoCounters, SourceError};

/// Device name prefixes that never correspond to a physical disk.
const VIRTUAL_PREFIXES: [&str; 3] = ["loop", "ram", "dm-"];

/// Operation counters for a single device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskStats {
    pub device: String,
    pub reads_completed: u64,
    pub writes_completed: u64,
}

impl DiskStats {
    pub fn is_virtual(&self) -> bool {
        VIRTUAL_PREFIXES.iter().any(|p| self.device.starts_with(p))
    }

    pub fn counters(&self) -> DiskIoCounters {
        DiskIoCounters {
            read_ops: self.reads_completed,
            write_ops: self.writes_completed,
        }
    }
}

/// Parses /proc/diskstats in file order.
/// Format: major minor name read_ios read_merges read_sectors read_ticks write_ios ...
pub fn parse_diskstats(content: &str) -> Vec<DiskStats> {
    content
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 14 {
                return None; // Skip malformed lines
            }
            Some(DiskStats {
                device: parts[2].to_string(),
                reads_completed: parts[3].parse().unwrap_or(0),
                writes_completed: parts[7].parse().unwrap_or(0),
            })
        })
        .collect()
}

pub fn read_diskstats(proc_root: &Path) -> Result<Vec<DiskStats>, SourceError> {
    let path = proc_root.join("diskstats");
    let content = fs::read_to_string(&path).map_err(|e| SourceError::io(&path, e))?;
    Ok(parse_diskstats(&content))
}

/// First device in file order that is not a loop, ramdisk or device-mapper alias.
pub fn first_physical(stats: &[DiskStats]) -> Option<&DiskStats> {
    stats.iter().find(|s| !s.is_virtual())
}

/// Sums whole disks (devices listed under /sys/block) so partitions are not
/// counted twice. Falls back to every device when sysfs is unavailable.
pub fn aggregate_counters(stats: &[DiskStats], sys_root: &Path) -> DiskIoCounters {
    let block = sys_root.join("block");
    let whole_disks: Vec<&DiskStats> = stats
        .iter()
        .filter(|s| block.join(&s.device).exists())
        .collect();

    let selected: Vec<&DiskStats> = if whole_disks.is_empty() {
        stats.iter().collect()
    } else {
        whole_disks
    };

    selected.iter().fold(DiskIoCounters::default(), |acc, s| DiskIoCounters {
        read_ops: acc.read_ops.saturating_add(s.reads_completed),
        write_ops: acc.write_ops.saturating_add(s.writes_completed),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const DISKSTATS: &str = "   7       0 loop0 100 0 200 10 0 0 0 0 0 10 10 0 0 0 0
 252       0 dm-0 500 0 1000 20 600 0 1200 30 0 40 50 0 0 0 0
   8       0 sda 1000 10 20000 300 2000 20 40000 500 0 600 800 0 0 0 0
   8       1 sda1 900 10 18000 280 1900 20 38000 480 0 560 760 0 0 0 0
 259       0 nvme0n1 3000 0 60000 100 4000 0 80000 200 0 300 300 0 0 0 0
";

    #[test]
    fn test_parse_diskstats() {
        let stats = parse_diskstats(DISKSTATS);
        assert_eq!(stats.len(), 5);
        assert_eq!(stats[2].device, "sda");
        assert_eq!(stats[2].reads_completed, 1000);
        assert_eq!(stats[2].writes_completed, 2000);
    }

    #[test]
    fn test_first_physical_skips_virtual_devices() {
        let stats = parse_diskstats(DISKSTATS);
        assert_eq!(first_physical(&stats).unwrap().device, "sda");
    }

    #[test]
    fn test_first_physical_none_when_only_virtual() {
        let stats = parse_diskstats(
            "7 0 loop0 1 0 0 0 1 0 0 0 0 0 0\n1 0 ram0 1 0 0 0 1 0 0 0 0 0 0\n",
        );
        assert!(first_physical(&stats).is_none());
    }

    #[test]
    fn test_aggregate_uses_whole_disks() {
        let sys = tempdir().expect("Failed to create temp dir");
        std::fs::create_dir_all(sys.path().join("block/sda")).unwrap();
        std::fs::create_dir_all(sys.path().join("block/nvme0n1")).unwrap();

        let stats = parse_diskstats(DISKSTATS);
        let totals = aggregate_counters(&stats, sys.path());
        assert_eq!(totals.read_ops, 4000);
        assert_eq!(totals.write_ops, 6000);
    }

    #[test]
    fn test_aggregate_without_sysfs_sums_everything() {
        let sys = tempdir().expect("Failed to create temp dir");
        let stats = parse_diskstats(DISKSTATS);
        let totals = aggregate_counters(&stats, sys.path());
        assert_eq!(totals.read_ops, 100 + 500 + 1000 + 900 + 3000);
    }
}
