//! Configuration management for monix.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat};
use monix::engine::EngineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 7678;
pub const DEFAULT_CACHE_TTL_MS: u64 = 1000;
pub const DEFAULT_CPU_SAMPLE_MS: u64 = 500;
pub const DEFAULT_PROCESS_SAMPLE_MS: u64 = 100;
pub const DEFAULT_DOMAIN_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_PID_EVICTION_SWEEPS: u32 = 2;
pub const DEFAULT_DISK_PATH: &str = "/";
pub const DEFAULT_FRONTEND_DIR: &str = "./webui";

/// Upper bound accepted for `cache_ttl_ms`.
const MAX_CACHE_TTL_MS: u64 = 60_000;

/// Enhanced configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub interactive: Option<bool>,

    // Sampling and caching
    #[serde(alias = "cache-ttl-ms")]
    pub cache_ttl_ms: Option<u64>,
    #[serde(alias = "cpu-sample-ms")]
    pub cpu_sample_ms: Option<u64>,
    #[serde(alias = "process-sample-ms")]
    pub process_sample_ms: Option<u64>,
    #[serde(alias = "domain-timeout-ms")]
    pub domain_timeout_ms: Option<u64>,

    // Process table
    #[serde(alias = "max-processes")]
    pub max_processes: Option<usize>,
    #[serde(alias = "pid-eviction-sweeps")]
    pub pid_eviction_sweeps: Option<u32>,

    // Sources and assets
    #[serde(alias = "disk-path")]
    pub disk_path: Option<PathBuf>,
    #[serde(alias = "frontend-dir")]
    pub frontend_dir: Option<PathBuf>,

    // Feature flags
    #[serde(alias = "enable-telemetry")]
    pub enable_telemetry: Option<bool>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            port: Some(DEFAULT_PORT),
            interactive: Some(true),
            cache_ttl_ms: Some(DEFAULT_CACHE_TTL_MS),
            cpu_sample_ms: Some(DEFAULT_CPU_SAMPLE_MS),
            process_sample_ms: Some(DEFAULT_PROCESS_SAMPLE_MS),
            domain_timeout_ms: Some(DEFAULT_DOMAIN_TIMEOUT_MS),
            max_processes: None,
            pid_eviction_sweeps: Some(DEFAULT_PID_EVICTION_SWEEPS),
            disk_path: Some(PathBuf::from(DEFAULT_DISK_PATH)),
            frontend_dir: None,
            enable_telemetry: Some(true),
        }
    }
}

impl Config {
    pub fn bind(&self) -> String {
        self.bind
            .clone()
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// Engine settings with defaults filled in for unset keys.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            cache_ttl: Duration::from_millis(self.cache_ttl_ms.unwrap_or(DEFAULT_CACHE_TTL_MS)),
            cpu_sample_interval: Duration::from_millis(
                self.cpu_sample_ms.unwrap_or(DEFAULT_CPU_SAMPLE_MS),
            ),
            process_sample_interval: Duration::from_millis(
                self.process_sample_ms.unwrap_or(DEFAULT_PROCESS_SAMPLE_MS),
            ),
            domain_timeout: Duration::from_millis(
                self.domain_timeout_ms.unwrap_or(DEFAULT_DOMAIN_TIMEOUT_MS),
            ),
            max_processes: self.max_processes,
            pid_eviction_sweeps: self
                .pid_eviction_sweeps
                .unwrap_or(DEFAULT_PID_EVICTION_SWEEPS),
            disk_path: self
                .disk_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DISK_PATH)),
        }
    }

    /// The configured frontend directory, or `./webui` when it exists.
    pub fn resolve_frontend_dir(&self) -> Option<PathBuf> {
        match &self.frontend_dir {
            Some(dir) => Some(dir.clone()),
            None => {
                let fallback = PathBuf::from(DEFAULT_FRONTEND_DIR);
                fallback.is_dir().then_some(fallback)
            }
        }
    }
}

/// A port in 0..=65535, or `None`.
pub fn try_parse_port(input: &str) -> Option<u16> {
    input.trim().parse::<u16>().ok()
}

/// Parses a port string, falling back to 7678 when it is not an integer in
/// 0..=65535.
pub fn parse_port(input: &str) -> u16 {
    match try_parse_port(input) {
        Some(port) => port,
        None => {
            warn!(
                "Invalid port number '{}'! Using default port {}.",
                input, DEFAULT_PORT
            );
            DEFAULT_PORT
        }
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let positive = [
        ("cpu_sample_ms", cfg.cpu_sample_ms),
        ("process_sample_ms", cfg.process_sample_ms),
        ("domain_timeout_ms", cfg.domain_timeout_ms),
    ];
    for (name, value) in positive {
        if value == Some(0) {
            return Err(format!("{} must be greater than 0", name).into());
        }
    }

    if let Some(ttl) = cfg.cache_ttl_ms {
        if ttl > MAX_CACHE_TTL_MS {
            return Err(format!(
                "cache_ttl_ms must not exceed {} (got {})",
                MAX_CACHE_TTL_MS, ttl
            )
            .into());
        }
    }

    if cfg.pid_eviction_sweeps == Some(0) {
        return Err("pid_eviction_sweeps must be at least 1".into());
    }

    if let Some(dir) = &cfg.frontend_dir {
        if !dir.is_dir() {
            return Err(format!("frontend_dir not found: {}", dir.display()).into());
        }
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    // Override with CLI args
    if let Some(bind) = &args.bind {
        config.bind = Some(bind.clone());
    }

    // Only override port if the user supplied it on the CLI.
    if let Some(port) = &args.port {
        config.port = Some(parse_port(port));
    }

    if let Some(ms) = args.cache_ttl_ms {
        config.cache_ttl_ms = Some(ms);
    }
    if let Some(ms) = args.cpu_sample_ms {
        config.cpu_sample_ms = Some(ms);
    }
    if let Some(ms) = args.process_sample_ms {
        config.process_sample_ms = Some(ms);
    }
    if let Some(ms) = args.domain_timeout_ms {
        config.domain_timeout_ms = Some(ms);
    }
    if args.max_processes.is_some() {
        config.max_processes = args.max_processes;
    }
    if let Some(path) = &args.disk_path {
        config.disk_path = Some(path.clone());
    }
    if let Some(dir) = &args.frontend_dir {
        config.frontend_dir = Some(dir.clone());
    }

    // Feature flags
    if args.disable_telemetry {
        config.enable_telemetry = Some(false);
    }
    if args.no_prompt {
        config.interactive = Some(false);
    }

    Ok(config)
}

/// Enhanced configuration loading with multiple format support
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            // Try default locations
            let defaults = [
                "/etc/monix/monix.yaml",
                "./monix.yaml",
                "./monix.yml",
                "./monix.json",
                "./monix.toml",
            ];

            match defaults.iter().find(|p| Path::new(p).exists()) {
                Some(p) => PathBuf::from(p),
                None => return Ok(Config::default()),
            }
        }
    };

    if !path.exists() {
        return Err(format!("Config file not found: {}", path.display()).into());
    }

    let content = fs::read_to_string(&path)?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Renders configuration in the requested format.
pub fn render_config(
    config: &Config,
    format: ConfigFormat,
) -> Result<String, Box<dyn std::error::Error>> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };
    Ok(output)
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", render_config(config, format)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::tempdir;

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port("8080"), 8080);
        assert_eq!(parse_port(" 0 "), 0);
        assert_eq!(parse_port("65535"), 65535);
        assert_eq!(parse_port("65536"), DEFAULT_PORT);
        assert_eq!(parse_port("-1"), DEFAULT_PORT);
        assert_eq!(parse_port("http"), DEFAULT_PORT);
        assert_eq!(parse_port(""), DEFAULT_PORT);
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.bind(), "127.0.0.1");
        assert_eq!(config.port(), 7678);
        let engine = config.engine_config();
        assert_eq!(engine.cache_ttl, Duration::from_secs(1));
        assert_eq!(engine.cpu_sample_interval, Duration::from_millis(500));
        assert!(engine.max_processes.is_none());
        assert!(validate_effective_config(&config).is_ok());
    }

    #[test]
    fn test_load_yaml_with_kebab_aliases() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("monix.yaml");
        fs::write(&path, "port: 9000\ncache-ttl-ms: 2500\nmax-processes: 25\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.port(), 9000);
        assert_eq!(config.cache_ttl_ms, Some(2500));
        assert_eq!(config.max_processes, Some(25));
        // Keys missing from the file fall back to defaults at use
        assert_eq!(config.bind(), DEFAULT_BIND_ADDR);
        assert_eq!(config.engine_config().pid_eviction_sweeps, 2);
    }

    #[test]
    fn test_load_json_and_toml() {
        let dir = tempdir().expect("Failed to create temp dir");
        let json = dir.path().join("monix.json");
        fs::write(&json, r#"{"bind": "0.0.0.0", "enable_telemetry": false}"#).unwrap();
        let config = load_config(Some(&json)).unwrap();
        assert_eq!(config.bind(), "0.0.0.0");
        assert_eq!(config.enable_telemetry, Some(false));

        let toml_path = dir.path().join("monix.toml");
        fs::write(&toml_path, "port = 1234\ndisk_path = \"/home\"\n").unwrap();
        let config = load_config(Some(&toml_path)).unwrap();
        assert_eq!(config.port(), 1234);
        assert_eq!(config.engine_config().disk_path, PathBuf::from("/home"));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/monix.yaml"))).is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("monix.yaml");
        fs::write(&path, "port: 9000\nbind: 10.0.0.1\n").unwrap();

        let args = Args::parse_from([
            "monix",
            "--config",
            path.to_str().unwrap(),
            "--port",
            "not-a-port",
            "--no-prompt",
        ]);
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.port(), DEFAULT_PORT);
        assert_eq!(config.bind(), "10.0.0.1");
        assert_eq!(config.interactive, Some(false));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let config = Config {
            cpu_sample_ms: Some(0),
            ..Config::default()
        };
        assert!(validate_effective_config(&config).is_err());

        let config = Config {
            cache_ttl_ms: Some(120_000),
            ..Config::default()
        };
        assert!(validate_effective_config(&config).is_err());

        let config = Config {
            pid_eviction_sweeps: Some(0),
            ..Config::default()
        };
        assert!(validate_effective_config(&config).is_err());

        let config = Config {
            frontend_dir: Some(PathBuf::from("/nonexistent/webui")),
            ..Config::default()
        };
        assert!(validate_effective_config(&config).is_err());
    }

    #[test]
    fn test_render_all_formats() {
        let config = Config::default();
        for format in [ConfigFormat::Yaml, ConfigFormat::Json, ConfigFormat::Toml] {
            let rendered = render_config(&config, format).unwrap();
            assert!(rendered.contains("7678"));
        }
    }
}
