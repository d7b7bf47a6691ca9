//! Network interface byte counters from /proc/net/dev.

use std::fs;
use std::path::Path;

use super::{NetworkCounters, SourceError};

/// Byte counters for one interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetDevStats {
    pub interface: String,
    pub receive_bytes: u64,
    pub transmit_bytes: u64,
}

/// Parses /proc/net/dev, keeping interface order.
pub fn parse_netdev(content: &str) -> Vec<NetDevStats> {
    let mut stats = Vec::new();

    // Skip the first two header lines
    for line in content.lines().skip(2) {
        let Some((interface, rest)) = line.split_once(':') else {
            continue;
        };

        let values: Vec<&str> = rest.split_whitespace().collect();
        if values.len() < 16 {
            continue; // Skip malformed lines
        }

        stats.push(NetDevStats {
            interface: interface.trim().to_string(),
            receive_bytes: values[0].parse().unwrap_or(0),
            transmit_bytes: values[8].parse().unwrap_or(0),
        });
    }

    stats
}

pub fn read_netdev_stats(proc_root: &Path) -> Result<Vec<NetDevStats>, SourceError> {
    let path = proc_root.join("net/dev");
    let content = fs::read_to_string(&path).map_err(|e| SourceError::io(&path, e))?;
    Ok(parse_netdev(&content))
}

/// Sums every interface, loopback included.
pub fn total_counters(stats: &[NetDevStats]) -> NetworkCounters {
    stats.iter().fold(NetworkCounters::default(), |acc, s| NetworkCounters {
        bytes_sent: acc.bytes_sent.saturating_add(s.transmit_bytes),
        bytes_recv: acc.bytes_recv.saturating_add(s.receive_bytes),
    })
}
