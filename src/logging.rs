// src/logging.rs

//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `FLOWTRIGGER_LOG` environment variable, either a bare level ("debug")
//!    or full directives ("flowtrigger::watch=debug,info")
//! 3. default to `info`
//!
//! Logs go to STDERR. The watcher is long-running and usually supervised, so
//! the supervisor's log capture is the audit trail for every trigger.

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "FLOWTRIGGER_LOG";

/// Initialise the global subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = match cli_level {
        Some(lvl) => EnvFilter::new(level_str(lvl)),
        None => match std::env::var(LOG_ENV_VAR) {
            Ok(s) if !s.trim().is_empty() => EnvFilter::try_new(s.trim())
                .with_context(|| format!("invalid {LOG_ENV_VAR} value '{s}'"))?,
            _ => EnvFilter::new("info"),
        },
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))?;

    Ok(())
}

fn level_str(lvl: LogLevel) -> &'static str {
    match lvl {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}
