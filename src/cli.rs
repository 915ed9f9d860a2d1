// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::config::parse_duration;

/// Command-line arguments for `converge`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "converge",
    version,
    about = "Converge this machine toward a declared set of tools and settings.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the task catalog (TOML).
    #[arg(long, value_name = "PATH", default_value = "Converge.toml")]
    pub config: String,

    /// Probe every task and report what would change, without applying.
    #[arg(long)]
    pub dry_run: bool,

    /// Run only these tasks (comma separated) plus their dependencies.
    #[arg(long, value_name = "TASK,...", value_delimiter = ',')]
    pub only: Vec<String>,

    /// Treat every task as `degraded` for this run: keep going after failures.
    #[arg(long)]
    pub continue_on_error: bool,

    /// Append the run log to this file (overrides `[config].log_path`).
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CONVERGE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Answer yes to every confirmation prompt.
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Apply timeout for tasks without their own (e.g. `90s`, `10m`).
    #[arg(long, value_name = "DURATION", value_parser = parse_duration_arg)]
    pub task_timeout: Option<Duration>,
}

fn parse_duration_arg(s: &str) -> Result<Duration, String> {
    parse_duration(s)
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
