// src/pipeline/runner.rs

//! Runs the configured stages for one settled run directory.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::batch::{discover_units, BatchTracker, Task};
use crate::config::{ConfigFile, StageConfig};
use crate::errors::{FlowtriggerError, Result};
use crate::fs::FileSystem;
use crate::pipeline::template::render;
use crate::types::StatusSnapshot;
use crate::watch::SettledHandler;

/// Identity of one pipeline run, derived from the settled directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    /// Final path component, e.g. `run0042`.
    pub run_dir: String,
    /// `run_dir` without the watch prefix, e.g. `0042`.
    pub run: String,
    pub settled_path: PathBuf,
}

impl RunContext {
    pub fn from_path(path: &Path, prefix: &str) -> Result<Self> {
        let run_dir = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                FlowtriggerError::ConfigError(format!("cannot derive a run name from {:?}", path))
            })?
            .to_string();
        let run = run_dir
            .strip_prefix(prefix)
            .unwrap_or(&run_dir)
            .to_string();
        Ok(Self {
            run_dir,
            run,
            settled_path: path.to_path_buf(),
        })
    }

    fn vars(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("run_dir", self.run_dir.clone()),
            ("run", self.run.clone()),
            ("settled_path", self.settled_path.to_string_lossy().into_owned()),
        ])
    }
}

/// Everything needed to submit one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    pub stage: String,
    pub endpoint: String,
    pub input_dir: PathBuf,
    pub output_dir: Option<PathBuf>,
    pub tasks: Vec<Task>,
}

/// Results of a completed run, stage by stage.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub run_dir: String,
    pub stages: Vec<(String, StatusSnapshot)>,
}

/// Composes the configured stages for each settled directory.
pub struct PipelineRunner {
    config: Arc<ConfigFile>,
    tracker: BatchTracker,
    fs: Arc<dyn FileSystem>,
    dry_run: bool,
}

impl fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("stages", &self.config.stage_order())
            .field("tracker", &self.tracker)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

impl PipelineRunner {
    pub fn new(
        config: Arc<ConfigFile>,
        tracker: BatchTracker,
        fs: Arc<dyn FileSystem>,
        dry_run: bool,
    ) -> Self {
        Self {
            config,
            tracker,
            fs,
            dry_run,
        }
    }

    /// Fail unless every endpoint used by a stage reports online.
    pub async fn check_endpoints(&self) -> Result<()> {
        for endpoint in self.config.endpoints_in_use() {
            if !self.tracker.client().endpoint_online(endpoint).await? {
                return Err(FlowtriggerError::EndpointOffline(endpoint.to_string()));
            }
        }
        Ok(())
    }

    /// Render paths and build the task list for `stage_name`.
    ///
    /// Stages with `units` get one task per discovered unit; finding no
    /// units fails here, before anything is submitted.
    pub fn plan_stage(&self, stage_name: &str, ctx: &RunContext) -> Result<StagePlan> {
        let stage = self.stage(stage_name)?;
        let render_err = |e: String| FlowtriggerError::ConfigError(format!("stage '{stage_name}': {e}"));

        let mut vars = ctx.vars();
        let input_dir = render(&stage.input_dir, &vars).map_err(render_err)?;
        let output_dir = stage
            .output_dir
            .as_deref()
            .map(|t| render(t, &vars))
            .transpose()
            .map_err(render_err)?;

        vars.insert("input_dir", input_dir.clone());
        if let Some(out) = &output_dir {
            vars.insert("output_dir", out.clone());
        }

        let render_args = |vars: &BTreeMap<&str, String>| -> Result<Vec<String>> {
            stage
                .args
                .iter()
                .map(|a| render(a, vars).map_err(render_err))
                .collect()
        };

        let tasks = match &stage.units {
            Some(pattern) => {
                let units = discover_units(self.fs.as_ref(), Path::new(&input_dir), pattern)?;
                units
                    .into_iter()
                    .map(|unit| {
                        let mut unit_vars = vars.clone();
                        unit_vars.insert("unit", unit.path.to_string_lossy().into_owned());
                        unit_vars.insert("unit_name", unit.name.clone());
                        unit_vars.insert("index", unit.index.to_string());
                        let args = render_args(&unit_vars)?;
                        Ok(Task::new(
                            format!("{stage_name}-{:04}", unit.index),
                            stage.function.clone(),
                            args,
                        ))
                    })
                    .collect::<Result<Vec<_>>>()?
            }
            None => vec![Task::new(
                stage_name,
                stage.function.clone(),
                render_args(&vars)?,
            )],
        };

        Ok(StagePlan {
            stage: stage_name.to_string(),
            endpoint: stage.endpoint.clone(),
            input_dir: PathBuf::from(input_dir),
            output_dir: output_dir.map(PathBuf::from),
            tasks,
        })
    }

    fn stage(&self, name: &str) -> Result<&StageConfig> {
        self.config
            .stage
            .get(name)
            .ok_or_else(|| FlowtriggerError::ConfigError(format!("unknown stage '{name}'")))
    }

    /// Run every stage in order for the directory at `settled`.
    ///
    /// The first failing stage aborts the rest. In dry-run mode the plan is
    /// logged and nothing is submitted.
    pub async fn run(&self, settled: &Path) -> Result<PipelineReport> {
        let ctx = RunContext::from_path(settled, &self.config.watch.prefix)?;
        info!(
            run_dir = %ctx.run_dir,
            run = %ctx.run,
            path = ?ctx.settled_path,
            stages = ?self.config.stage_order(),
            "starting pipeline"
        );

        let mut report = PipelineReport {
            run_dir: ctx.run_dir.clone(),
            stages: Vec::new(),
        };

        if self.dry_run {
            self.log_dry_run(&ctx);
            return Ok(report);
        }

        self.check_endpoints().await?;

        for stage_name in self.config.stage_order() {
            let results = match self.run_stage(stage_name, &ctx).await {
                Ok(results) => results,
                Err(err) => {
                    error!(
                        run_dir = %ctx.run_dir,
                        stage = %stage_name,
                        error = %err,
                        "stage failed; aborting pipeline"
                    );
                    return Err(err);
                }
            };
            report.stages.push((stage_name.clone(), results));
        }

        info!(run_dir = %ctx.run_dir, "pipeline finished");
        Ok(report)
    }

    async fn run_stage(&self, stage_name: &str, ctx: &RunContext) -> Result<StatusSnapshot> {
        let plan = self.plan_stage(stage_name, ctx)?;
        info!(
            stage = %plan.stage,
            endpoint = %plan.endpoint,
            input = ?plan.input_dir,
            output = ?plan.output_dir,
            tasks = plan.tasks.len(),
            "running stage"
        );
        self.tracker.run_batch(&plan.endpoint, plan.tasks).await
    }

    fn log_dry_run(&self, ctx: &RunContext) {
        for stage_name in self.config.stage_order() {
            match self.plan_stage(stage_name, ctx) {
                Ok(plan) => {
                    info!(
                        stage = %plan.stage,
                        endpoint = %plan.endpoint,
                        input = ?plan.input_dir,
                        output = ?plan.output_dir,
                        tasks = plan.tasks.len(),
                        "dry-run: stage plan"
                    );
                    for task in plan.tasks.iter() {
                        info!(task = %task.id, function = %task.function, args = ?task.args, "dry-run: task");
                    }
                }
                // Later stages read what earlier stages write.
                Err(err) => warn!(stage = %stage_name, error = %err, "dry-run: stage cannot be planned yet"),
            }
        }
    }
}

impl SettledHandler for PipelineRunner {
    fn on_settled(&self, path: PathBuf) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move { self.run(&path).await.map(|_| ()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_context_strips_prefix() {
        let ctx = RunContext::from_path(Path::new("/mnt/rawdata/run0042/"), "run").unwrap();
        assert_eq!(ctx.run_dir, "run0042");
        assert_eq!(ctx.run, "0042");
    }

    #[test]
    fn run_context_keeps_unprefixed_names() {
        let ctx = RunContext::from_path(Path::new("/mnt/rawdata/calib7"), "run").unwrap();
        assert_eq!(ctx.run, "calib7");
    }

    #[test]
    fn run_context_requires_a_name() {
        assert!(RunContext::from_path(Path::new("/"), "run").is_err());
    }
}
