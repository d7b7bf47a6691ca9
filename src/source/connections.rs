//! Socket table from /proc/net/{tcp,tcp6,udp,udp6}.
//!
//! Ownership is recovered by matching each socket inode against the
//! `socket:[inode]` links under /proc/<pid>/fd. Processes whose fd table
//! cannot be read leave their sockets without an owner.

use ahash::AHashMap as HashMap;
use rayon::prelude::*;
use std::fs;
use std::path::Path;
use tracing::debug;

use super::SourceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

/// Kernel socket state. UDP sockets are always `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    Established,
    SynSent,
    SynRecv,
    FinWait1,
    FinWait2,
    TimeWait,
    Close,
    CloseWait,
    LastAck,
    Listen,
    Closing,
    None,
}

impl ConnectionStatus {
    /// Maps the hex `st` column of /proc/net/tcp.
    pub fn from_tcp_state(hex: &str) -> Option<Self> {
        let code = u8::from_str_radix(hex, 16).ok()?;
        let status = match code {
            0x01 => ConnectionStatus::Established,
            0x02 => ConnectionStatus::SynSent,
            0x03 => ConnectionStatus::SynRecv,
            0x04 => ConnectionStatus::FinWait1,
            0x05 => ConnectionStatus::FinWait2,
            0x06 => ConnectionStatus::TimeWait,
            0x07 => ConnectionStatus::Close,
            0x08 => ConnectionStatus::CloseWait,
            0x09 => ConnectionStatus::LastAck,
            0x0A => ConnectionStatus::Listen,
            0x0B => ConnectionStatus::Closing,
            _ => return None,
        };
        Some(status)
    }
}

/// One socket and, when known, the process holding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub protocol: Protocol,
    pub status: ConnectionStatus,
    pub pid: Option<u32>,
}

/// A socket row before owner resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketEntry {
    pub protocol: Protocol,
    pub status: ConnectionStatus,
    pub inode: u64,
}

/// Parses one /proc/net socket table (header line first).
pub fn parse_socket_table(content: &str, protocol: Protocol) -> Vec<SocketEntry> {
    let mut entries = Vec::new();

    for line in content.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 {
            continue;
        }

        let status = match protocol {
            Protocol::Tcp => match ConnectionStatus::from_tcp_state(fields[3]) {
                Some(status) => status,
                None => continue,
            },
            Protocol::Udp => ConnectionStatus::None,
        };

        entries.push(SocketEntry {
            protocol,
            status,
            inode: fields[9].parse().unwrap_or(0),
        });
    }

    entries
}

fn is_pid_dir(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_digit())
}

/// Builds an inode → pid index from every readable fd table.
pub fn socket_owners(proc_root: &Path) -> HashMap<u64, u32> {
    let pids: Vec<u32> = match fs::read_dir(proc_root) {
        Ok(entries) => entries
            .flatten()
            .filter_map(|e| {
                let name = e.file_name();
                let name = name.to_str()?;
                if is_pid_dir(name) {
                    name.parse().ok()
                } else {
                    None
                }
            })
            .collect(),
        Err(e) => {
            debug!("Failed to list {}: {}", proc_root.display(), e);
            return HashMap::new();
        }
    };

    pids.par_iter()
        .flat_map_iter(|&pid| {
            let fd_dir = proc_root.join(pid.to_string()).join("fd");
            let inodes: Vec<(u64, u32)> = match fs::read_dir(&fd_dir) {
                Ok(entries) => entries
                    .flatten()
                    .filter_map(|entry| {
                        let link = fs::read_link(entry.path()).ok()?;
                        let link = link.to_str()?;
                        let inode = link.strip_prefix("socket:[")?.strip_suffix(']')?;
                        inode.parse::<u64>().ok().map(|inode| (inode, pid))
                    })
                    .collect(),
                Err(_) => Vec::new(),
            };
            inodes
        })
        .collect::<Vec<_>>()
        .into_iter()
        .collect()
}

const SOCKET_TABLES: [(&str, Protocol); 4] = [
    ("net/tcp", Protocol::Tcp),
    ("net/tcp6", Protocol::Tcp),
    ("net/udp", Protocol::Udp),
    ("net/udp6", Protocol::Udp),
];

/// Reads all inet sockets. A missing IPv6 table is skipped; failing to read
/// every table is an error.
pub fn read_connections(proc_root: &Path) -> Result<Vec<Connection>, SourceError> {
    let mut sockets = Vec::new();
    let mut last_error = None;
    let mut tables_read = 0;

    for (table, protocol) in SOCKET_TABLES {
        let path = proc_root.join(table);
        match fs::read_to_string(&path) {
            Ok(content) => {
                tables_read += 1;
                sockets.extend(parse_socket_table(&content, protocol));
            }
            Err(e) => {
                debug!("Skipping {}: {}", path.display(), e);
                last_error = Some(SourceError::io(&path, e));
            }
        }
    }

    if tables_read == 0 {
        return Err(last_error.unwrap_or(SourceError::Unsupported("socket tables")));
    }

    let owners = socket_owners(proc_root);
    Ok(sockets
        .into_iter()
        .map(|s| Connection {
            protocol: s.protocol,
            status: s.status,
            pid: owners.get(&s.inode).copied(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TCP: &str = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100007F:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 11111 1 0000000000000000 100 0 0 10 0
   1: 0100007F:1F90 0100007F:C350 01 00000000:00000000 00:00000000 00000000  1000        0 22222 1 0000000000000000 20 4 30 10 -1
   2: 0100007F:C350 0100007F:1F90 06 00000000:00000000 03:00000000 00000000     0        0 0 3 0000000000000000
";

    const UDP: &str = "   sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode ref pointer drops
  100: 00000000:0044 00000000:0000 07 00000000:00000000 00:00000000 00000000     0        0 33333 2 0000000000000000 0
";

    #[test]
    fn test_parse_tcp_table() {
        let entries = parse_socket_table(TCP, Protocol::Tcp);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].status, ConnectionStatus::Listen);
        assert_eq!(entries[1].status, ConnectionStatus::Established);
        assert_eq!(entries[1].inode, 22222);
        assert_eq!(entries[2].status, ConnectionStatus::TimeWait);
    }

    #[test]
    fn test_parse_udp_table_has_no_state() {
        let entries = parse_socket_table(UDP, Protocol::Udp);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, ConnectionStatus::None);
        assert_eq!(entries[0].inode, 33333);
    }

    #[test]
    fn test_unknown_tcp_state_is_skipped() {
        let content = "header\n 0: 0100007F:1F90 00000000:0000 FF 0:0 0:0 0 0 0 44444 1\n";
        assert!(parse_socket_table(content, Protocol::Tcp).is_empty());
    }

    #[test]
    fn test_read_connections_resolves_owners() {
        let dir = tempdir().expect("Failed to create temp dir");
        let root = dir.path();
        std::fs::create_dir_all(root.join("net")).unwrap();
        std::fs::write(root.join("net/tcp"), TCP).unwrap();
        std::fs::write(root.join("net/udp"), UDP).unwrap();

        let fd_dir = root.join("4242/fd");
        std::fs::create_dir_all(&fd_dir).unwrap();
        std::os::unix::fs::symlink("socket:[22222]", fd_dir.join("3")).unwrap();
        std::os::unix::fs::symlink("/dev/null", fd_dir.join("0")).unwrap();

        let connections = read_connections(root).unwrap();
        assert_eq!(connections.len(), 4);

        let established: Vec<_> = connections
            .iter()
            .filter(|c| c.status == ConnectionStatus::Established)
            .collect();
        assert_eq!(established.len(), 1);
        assert_eq!(established[0].pid, Some(4242));

        let udp = connections.iter().filter(|c| c.protocol == Protocol::Udp).count();
        assert_eq!(udp, 1);
        assert!(connections
            .iter()
            .filter(|c| c.status != ConnectionStatus::Established)
            .all(|c| c.pid.is_none()));
    }

    #[test]
    fn test_read_connections_without_tables() {
        let dir = tempdir().expect("Failed to create temp dir");
        assert!(read_connections(dir.path()).is_err());
    }
}
