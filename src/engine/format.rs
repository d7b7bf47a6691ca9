//! Human-readable renderings used in the domain records.

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Bytes to GiB.
pub fn gib(bytes: u64) -> f64 {
    bytes as f64 / GIB
}

/// Bytes to MiB.
pub fn mib(bytes: f64) -> f64 {
    bytes / MIB
}

/// "12.345 GB" with three decimals, as shown for disk capacity.
pub fn format_gb(bytes: u64) -> String {
    format!("{:.3} GB", gib(bytes))
}

/// Cumulative byte totals: plain bytes below 1 KiB, otherwise two decimals.
pub fn format_bytes(bytes: u64) -> String {
    let b = bytes as f64;
    if b < KIB {
        format!("{} B", bytes)
    } else if b < MIB {
        format!("{:.2} KB", b / KIB)
    } else if b < GIB {
        format!("{:.2} MB", b / MIB)
    } else {
        format!("{:.2} GB", b / GIB)
    }
}

/// Throughput in bytes per second.
pub fn format_speed(bytes_per_sec: f64) -> String {
    if bytes_per_sec < KIB {
        format!("{:.2} B/s", bytes_per_sec)
    } else if bytes_per_sec < MIB {
        format!("{:.2} KB/s", bytes_per_sec / KIB)
    } else if bytes_per_sec < GIB {
        format!("{:.2} MB/s", bytes_per_sec / MIB)
    } else {
        format!("{:.2} GB/s", bytes_per_sec / GIB)
    }
}

/// Splits seconds into whole days, hours and minutes.
pub fn split_uptime(seconds: u64) -> (u64, u64, u64) {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    (days, hours, minutes)
}

pub fn format_uptime(seconds: u64) -> String {
    let (days, hours, minutes) = split_uptime(seconds);
    format!("{}d {}h {}m", days, hours, minutes)
}

/// Rounds half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
