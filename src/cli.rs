// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{ArgGroup, Parser, ValueEnum};

/// Command-line arguments for `flowtrigger`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "flowtrigger",
    version,
    about = "Launch remote pipelines when new run directories finish copying in.",
    long_about = None,
    group(ArgGroup::new("target").required(true).args(["watchdir", "rundir"]))
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Flowtrigger.toml")]
    pub config: String,

    /// Watch this directory and launch the pipeline for every new run.
    #[arg(long, value_name = "DIR")]
    pub watchdir: Option<PathBuf>,

    /// Run the pipeline once for this existing run directory.
    #[arg(long, value_name = "DIR")]
    pub rundir: Option<PathBuf>,

    /// Seconds a new directory must stay unchanged before it is processed.
    ///
    /// Overrides `watch.settle_delay`.
    #[arg(long, value_name = "SECS")]
    pub trigger_delay: Option<u64>,

    /// Seconds between listings of the watch directory.
    ///
    /// Overrides `watch.poll_interval`; 0 is ignored.
    #[arg(long, value_name = "SECS")]
    pub poll_interval: Option<u64>,

    /// Log what each stage would submit instead of submitting it.
    #[arg(long)]
    pub dry_run: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `FLOWTRIGGER_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
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

pub fn parse() -> CliArgs {
    CliArgs::parse()
}
