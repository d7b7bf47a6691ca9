//! Config command implementation.
//!
//! Generates configuration files in various formats.

use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::{render_config, Config};

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let output = match output {
        Some(path) => path,
        None => PathBuf::from("monix.yaml"),
    };

    let commented = commented && matches!(format, ConfigFormat::Yaml);
    let mut content = render_config(&config, format)?;
    if commented {
        content = add_config_comments(content);
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML configuration.
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# Monix System Monitor Configuration
# ==================================
#
# Server Configuration
# --------------------
# bind: "127.0.0.1"            # Bind IP (0.0.0.0 = all interfaces)
# port: 7678                   # HTTP port (invalid values fall back to 7678)
# interactive: true            # Ask for host/port on a terminal at startup
#
# Sampling and Caching
# --------------------
# cache_ttl_ms: 1000           # Reuse a domain snapshot for N milliseconds
# cpu_sample_ms: 500           # CPU measurement window for /api/cpu
# process_sample_ms: 100       # CPU measurement window for /api/processes
# domain_timeout_ms: 10000     # Give up waiting for one domain after N ms
#
# Process Table
# -------------
# max_processes: null          # Cap on /api/processes rows (null = all)
# pid_eviction_sweeps: 2       # Drop a pid's I/O baseline after N absent scans
#
# Sources and Assets
# ------------------
# disk_path: "/"               # Mount point reported by /api/disk
# frontend_dir: null           # Web UI bundle (null = ./webui if present)
#
# Feature Flags
# -------------
# enable_telemetry: true       # Expose /metrics
"#;

    format!("{comments}\n{yaml}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_generated_config_loads_back() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("monix.yaml");
        command_config(Some(path.clone()), ConfigFormat::Yaml, true).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# Monix System Monitor Configuration"));

        let loaded = crate::config::load_config(Some(&path)).unwrap();
        assert_eq!(loaded.port(), 7678);
        assert_eq!(loaded.bind(), "127.0.0.1");
    }
}
