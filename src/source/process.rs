//! Per-process counters from /proc/<pid>.
//!
//! CPU percentages need a window: every process is read once, the thread
//! sleeps for the sampling interval, then every process is read again.
//! A process that disappears between the two passes, or turns into a zombie,
//! is dropped from the result rather than failing the enumeration.

use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

use super::cpu::CLK_TCK;
use super::memory::read_meminfo;
use super::{IoCounters, ProcessSample, SourceError};

/// Process entry representing a directory in /proc filesystem.
#[derive(Debug, Clone)]
pub struct ProcEntry {
    pub pid: u32,
    pub proc_path: PathBuf,
}

/// Scans /proc directory for process entries with numeric PIDs.
pub fn collect_proc_entries(root: &Path) -> Result<Vec<ProcEntry>, SourceError> {
    let entries = fs::read_dir(root).map_err(|e| SourceError::io(root, e))?;

    let mut out = Vec::new();
    for entry in entries.flatten() {
        let p = entry.path();
        let name = match p.file_name().and_then(|s| s.to_str()) {
            Some(v) => v,
            None => continue,
        };
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let pid: u32 = match name.parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        out.push(ProcEntry { pid, proc_path: p });
    }
    out.sort_by_key(|e| e.pid);
    Ok(out)
}

/// Reads process name from comm file or extracts from cmdline.
pub fn read_process_name(proc_path: &Path) -> Option<String> {
    if let Ok(s) = fs::read_to_string(proc_path.join("comm")) {
        let t = s.trim();
        if !t.is_empty() {
            return Some(t.into());
        }
    }

    let content = fs::read(proc_path.join("cmdline")).ok()?;
    let first = content.split(|&b| b == 0u8).next()?;
    let first = std::str::from_utf8(first).ok()?;
    Path::new(first)
        .file_name()
        .and_then(|name| name.to_str())
        .map(|s| s.to_string())
}

/// The fields of /proc/<pid>/stat the sampler needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidStat {
    pub comm: String,
    pub state: char,
    /// utime + stime in clock ticks.
    pub cpu_ticks: u64,
}

/// Parses /proc/<pid>/stat. The command name is delimited by the outermost
/// parentheses because it may itself contain spaces or ')'.
pub fn parse_pid_stat(content: &str) -> Result<PidStat, String> {
    let open = content.find('(').ok_or("Missing '(' in stat")?;
    let close = content.rfind(')').ok_or("Missing ')' in stat")?;
    if close < open {
        return Err("Malformed comm field".to_string());
    }

    let comm = content[open + 1..close].to_string();
    let rest: Vec<&str> = content[close + 1..].split_whitespace().collect();
    // rest[0] is field 3 (state); utime and stime are fields 14 and 15
    if rest.len() < 13 {
        return Err("Invalid stat format".to_string());
    }

    let state = rest[0].chars().next().unwrap_or('?');
    let utime: u64 = rest[11].parse().unwrap_or(0);
    let stime: u64 = rest[12].parse().unwrap_or(0);

    Ok(PidStat {
        comm,
        state,
        cpu_ticks: utime + stime,
    })
}

/// Resident set size from /proc/<pid>/status, in bytes. Kernel threads have
/// no `VmRSS` line and report zero.
pub fn parse_status_rss(content: &str) -> u64 {
    content
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|value| value.split_whitespace().next())
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
        .unwrap_or(0)
}

/// Read/write syscall counts from /proc/<pid>/io.
pub fn parse_pid_io(content: &str) -> Option<IoCounters> {
    let mut read_count = None;
    let mut write_count = None;
    for line in content.lines() {
        if let Some(v) = line.strip_prefix("syscr:") {
            read_count = v.trim().parse::<u64>().ok();
        } else if let Some(v) = line.strip_prefix("syscw:") {
            write_count = v.trim().parse::<u64>().ok();
        }
    }
    Some(IoCounters {
        read_count: read_count?,
        write_count: write_count?,
    })
}

fn read_pid_stat(proc_path: &Path) -> Result<PidStat, String> {
    let content = fs::read_to_string(proc_path.join("stat")).map_err(|e| e.to_string())?;
    parse_pid_stat(&content)
}

fn sample_one(
    entry: &ProcEntry,
    ticks_before: Option<u64>,
    elapsed_seconds: f64,
    mem_total: u64,
) -> Option<ProcessSample> {
    let stat = match read_pid_stat(&entry.proc_path) {
        Ok(stat) => stat,
        Err(e) => {
            debug!("Skipping pid {}: {}", entry.pid, e);
            return None;
        }
    };
    if stat.state == 'Z' {
        debug!("Skipping zombie pid {}", entry.pid);
        return None;
    }

    let raw_cpu_percent = match ticks_before {
        Some(before) if elapsed_seconds > 0.0 => {
            let delta = stat.cpu_ticks.saturating_sub(before) as f64 / *CLK_TCK;
            delta / elapsed_seconds * 100.0
        }
        _ => 0.0,
    };

    let rss_bytes = fs::read_to_string(entry.proc_path.join("status"))
        .map(|content| parse_status_rss(&content))
        .unwrap_or(0);
    let memory_percent = if mem_total > 0 {
        rss_bytes as f64 / mem_total as f64 * 100.0
    } else {
        0.0
    };

    let io = fs::read_to_string(entry.proc_path.join("io"))
        .ok()
        .and_then(|content| parse_pid_io(&content));

    Some(ProcessSample {
        pid: entry.pid,
        name: read_process_name(&entry.proc_path).unwrap_or(stat.comm),
        raw_cpu_percent,
        memory_percent,
        rss_bytes,
        io,
    })
}

/// Enumerates all processes, measuring CPU over `interval`. Results are in
/// ascending pid order.
pub fn sample_processes(
    proc_root: &Path,
    interval: Duration,
) -> Result<Vec<ProcessSample>, SourceError> {
    let mem_total = match read_meminfo(proc_root) {
        Ok(info) => info.total_bytes,
        Err(e) => {
            debug!("Memory percentages unavailable: {}", e);
            0
        }
    };

    let entries = collect_proc_entries(proc_root)?;

    let ticks_before: Vec<Option<u64>> = entries
        .par_iter()
        .map(|entry| read_pid_stat(&entry.proc_path).ok().map(|s| s.cpu_ticks))
        .collect();

    let started = Instant::now();
    thread::sleep(interval);
    let elapsed_seconds = started.elapsed().as_secs_f64();

    let samples: Vec<ProcessSample> = entries
        .par_iter()
        .zip(ticks_before.par_iter())
        .filter_map(|(entry, before)| sample_one(entry, *before, elapsed_seconds, mem_total))
        .collect();

    debug!(
        "Sampled {} of {} processes over {:?}",
        samples.len(),
        entries.len(),
        interval
    );
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn stat_line(pid: u32, comm: &str, state: char, utime: u64, stime: u64) -> String {
        format!(
            "{pid} ({comm}) {state} 1 {pid} {pid} 0 -1 4194304 100 0 0 0 {utime} {stime} 0 0 20 0 1 0 12345 12345678 1234"
        )
    }

    fn write_process(root: &Path, pid: u32, comm: &str, state: char, rss_kb: u64, io: Option<(u64, u64)>) {
        let dir = root.join(pid.to_string());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("stat"), stat_line(pid, comm, state, 100, 50)).unwrap();
        fs::write(dir.join("comm"), format!("{comm}\n")).unwrap();
        fs::write(dir.join("status"), format!("Name:\t{comm}\nVmRSS:\t{rss_kb} kB\n")).unwrap();
        if let Some((r, w)) = io {
            fs::write(
                dir.join("io"),
                format!("rchar: 1\nwchar: 2\nsyscr: {r}\nsyscw: {w}\nread_bytes: 0\n"),
            )
            .unwrap();
        }
    }

    #[test]
    fn test_parse_pid_stat() {
        let stat = parse_pid_stat(&stat_line(42, "nginx", 'S', 1000, 500)).unwrap();
        assert_eq!(stat.comm, "nginx");
        assert_eq!(stat.state, 'S');
        assert_eq!(stat.cpu_ticks, 1500);
    }

    #[test]
    fn test_parse_pid_stat_comm_with_spaces_and_parens() {
        let stat = parse_pid_stat(&stat_line(7, "Web Content (x)", 'R', 3, 4)).unwrap();
        assert_eq!(stat.comm, "Web Content (x)");
        assert_eq!(stat.state, 'R');
        assert_eq!(stat.cpu_ticks, 7);
    }

    #[test]
    fn test_parse_pid_stat_invalid() {
        assert!(parse_pid_stat("1234 (test) S 1 2 3").is_err());
        assert!(parse_pid_stat("garbage").is_err());
    }

    #[test]
    fn test_parse_status_rss() {
        assert_eq!(parse_status_rss("Name:\tbash\nVmRSS:\t  2048 kB\n"), 2048 * 1024);
        assert_eq!(parse_status_rss("Name:\tkthreadd\n"), 0);
    }

    #[test]
    fn test_parse_pid_io() {
        let io = parse_pid_io("syscr: 10\nsyscw: 5\n").unwrap();
        assert_eq!(io.total(), 15);
        assert!(parse_pid_io("rchar: 1\n").is_none());
    }

    #[test]
    fn test_sample_processes_skips_zombies_and_keeps_pid_order() {
        let dir = tempdir().expect("Failed to create temp dir");
        let root = dir.path();
        fs::write(root.join("meminfo"), "MemTotal: 1000 kB\nMemFree: 500 kB\n").unwrap();
        fs::create_dir_all(root.join("self")).unwrap();

        write_process(root, 300, "worker", 'S', 100, None);
        write_process(root, 12, "init", 'S', 250, Some((40, 2)));
        write_process(root, 99, "defunct", 'Z', 0, None);

        let samples = sample_processes(root, Duration::from_millis(1)).unwrap();
        let pids: Vec<u32> = samples.iter().map(|s| s.pid).collect();
        assert_eq!(pids, vec![12, 300]);

        let init = &samples[0];
        assert_eq!(init.name, "init");
        assert_eq!(init.rss_bytes, 250 * 1024);
        assert!((init.memory_percent - 25.0).abs() < 1e-9);
        assert_eq!(init.io.map(|io| io.total()), Some(42));
        // Static counters mean no CPU time elapsed
        assert_eq!(init.raw_cpu_percent, 0.0);

        assert!(samples[1].io.is_none());
    }

    #[test]
    fn test_sample_processes_missing_root() {
        let result = sample_processes(Path::new("/definitely/not/proc"), Duration::ZERO);
        assert!(result.is_err());
    }
}
