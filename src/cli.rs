//! CLI arguments and subcommands for monix.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "monix",
    about = "Fast and beautiful system monitoring",
    long_about = "Fast and beautiful system monitoring.\n\n\
                  Serves CPU, memory, disk, network, connection, uptime, IOPS and per-process \
                  metrics as JSON, with throughput and IOPS derived from successive counter \
                  samples and per-process network use estimated from connection ownership.",
    version,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port (invalid values fall back to 7678)
    #[arg(short = 'p', long)]
    pub port: Option<String>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<String>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Do not ask for host and port on startup
    #[arg(long)]
    pub no_prompt: bool,

    /// Cache domain snapshots for N milliseconds
    #[arg(long)]
    pub cache_ttl_ms: Option<u64>,

    /// CPU measurement window for /api/cpu in milliseconds
    #[arg(long)]
    pub cpu_sample_ms: Option<u64>,

    /// CPU measurement window for /api/processes in milliseconds
    #[arg(long)]
    pub process_sample_ms: Option<u64>,

    /// Give up waiting for a single domain after N milliseconds
    #[arg(long)]
    pub domain_timeout_ms: Option<u64>,

    /// Maximum number of processes returned by /api/processes
    #[arg(long)]
    pub max_processes: Option<usize>,

    /// Mount point reported by /api/disk
    #[arg(long)]
    pub disk_path: Option<PathBuf>,

    /// Directory with the web UI bundle, served under /ui
    #[arg(long)]
    pub frontend_dir: Option<PathBuf>,

    /// Disable the /metrics endpoint
    #[arg(long)]
    pub disable_telemetry: bool,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate configuration files
    Config {
        /// Output file path
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Sample domains from the command line without starting the server
    Sample {
        /// Domains to sample (default: all)
        #[arg(short = 'd', long, value_delimiter = ',')]
        domains: Vec<String>,

        /// Number of sampling rounds
        #[arg(short = 'n', long, default_value_t = 2)]
        iterations: usize,

        /// Pause between rounds in milliseconds
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
}
