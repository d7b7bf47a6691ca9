//! CLI command implementations for monix.
//!
//! This module provides implementations for all CLI subcommands:
//! - `config`: Configuration file generation
//! - `sample`: Domain sampling from the terminal

pub mod config;
pub mod sample;

// Re-export command functions
pub use config::command_config;
pub use sample::command_sample;
