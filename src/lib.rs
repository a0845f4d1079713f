// src/lib.rs

pub mod batch;
pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod pipeline;
pub mod types;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::batch::BatchTracker;
use crate::cli::CliArgs;
use crate::config::{load_and_validate, ConfigFile};
use crate::exec::{ComputeClient, ProcessClient};
use crate::fs::{FileSystem, RealFileSystem, SystemClock};
use crate::pipeline::PipelineRunner;
use crate::watch::DirectoryTrigger;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and CLI overrides
/// - the compute client and batch tracker
/// - the pipeline runner
/// - either the directory trigger (`--watchdir`) or a single run (`--rundir`)
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let mut cfg = load_and_validate(&config_path)?;
    apply_overrides(&mut cfg, &args);
    let cfg = Arc::new(cfg);

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let client: Arc<dyn ComputeClient> = Arc::new(ProcessClient::from_config(&cfg));
    let tracker = BatchTracker::new(client, cfg.batch.poll_interval);
    let runner = Arc::new(PipelineRunner::new(
        Arc::clone(&cfg),
        tracker,
        Arc::clone(&fs),
        args.dry_run,
    ));

    if let Some(dir) = args.rundir {
        let dir = fs.canonicalize(&dir)?;
        info!(path = ?dir, dry_run = args.dry_run, "running pipeline for a single run directory");
        let report = runner.run(&dir).await?;
        info!(run_dir = %report.run_dir, stages = report.stages.len(), "done");
        return Ok(());
    }

    let Some(root) = args.watchdir else {
        anyhow::bail!("either --watchdir or --rundir is required");
    };

    let trigger = DirectoryTrigger::start(
        root,
        cfg.watch.clone(),
        fs,
        Arc::new(SystemClock),
        runner,
    )?;

    tokio::select! {
        res = trigger.run() => res.map_err(Into::into),
        sig = tokio::signal::ctrl_c() => {
            if let Err(e) = sig {
                warn!(error = %e, "failed to listen for Ctrl+C");
            }
            info!("shutdown requested; stopping watcher");
            Ok(())
        }
    }
}

/// Apply `--trigger-delay` and `--poll-interval` on top of the file config.
pub fn apply_overrides(cfg: &mut ConfigFile, args: &CliArgs) {
    if let Some(secs) = args.trigger_delay {
        cfg.watch.settle_delay = Duration::from_secs(secs);
    }
    if let Some(secs) = args.poll_interval.filter(|s| *s > 0) {
        cfg.watch.poll_interval = Duration::from_secs(secs);
    }
}
