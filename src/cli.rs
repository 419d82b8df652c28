// src/cli.rs

//! CLI argument parsing using `clap`.

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::duration::parse_duration;

/// Command-line arguments for `goforge`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "goforge",
    version,
    about = "Developer workflow commands for Go backend projects.",
    long_about = None
)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `--verbose`, `GOFORGE_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Run a script and restart it whenever watched files change.
    Watch(WatchArgs),
    /// Run a script from goforge.yml once.
    Run(RunArgs),
}

#[derive(Debug, Clone, Args)]
pub struct WatchArgs {
    /// Script from goforge.yml to supervise.
    #[arg(default_value = "dev")]
    pub script: String,

    /// Pass the child's output through untouched and log at debug level.
    #[arg(short, long)]
    pub verbose: bool,

    /// Port to reclaim between restarts (overrides goforge.yml).
    #[arg(long, value_name = "PORT", conflicts_with = "no_port")]
    pub port: Option<u16>,

    /// Never reclaim a port between restarts.
    #[arg(long)]
    pub no_port: bool,

    /// Quiet period before a burst of changes triggers a restart (e.g. "500ms").
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub debounce: Option<Duration>,

    /// Print the effective watch configuration and watched directories, then exit.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Script from goforge.yml to run.
    pub script: String,
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
