// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [watch]
/// prefix = "run"
/// poll_interval = "300s"
/// settle_delay = "30s"
///
/// [batch]
/// poll_interval = "30s"
///
/// [endpoint.perlmutter]
/// launcher = "srun -N 1 -c 128"
/// max_parallel = 16
///
/// [function.fit]
/// cmd = "/opt/pipeline/run_fit.sh"
///
/// [stage.fit]
/// endpoint = "perlmutter"
/// function = "fit"
/// input_dir = "/data/rawdata/{run_dir}"
/// output_dir = "/data/fitted/{run_dir}"
/// units = "*.evt"
/// args = ["{run}", "{index}"]
/// ```
///
/// This is the unchecked form; use `ConfigFile::try_from` (or
/// [`crate::config::load_and_validate`]) to get a validated [`ConfigFile`].
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub watch: WatchSection,

    #[serde(default)]
    pub batch: BatchSection,

    /// Compute endpoints from `[endpoint.<name>]`.
    #[serde(default)]
    pub endpoint: BTreeMap<String, EndpointConfig>,

    /// Registered functions from `[function.<name>]`.
    #[serde(default)]
    pub function: BTreeMap<String, FunctionConfig>,

    /// Pipeline stages from `[stage.<name>]`.
    #[serde(default)]
    pub stage: BTreeMap<String, StageConfig>,
}

/// `[watch]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchSection {
    /// Only child directories whose name starts with this are considered.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    #[serde(default = "default_watch_poll_interval")]
    pub poll_interval: String,

    /// Quiescence required before a new directory counts as settled.
    #[serde(default = "default_settle_delay")]
    pub settle_delay: String,

    #[serde(default = "default_settle_check_interval")]
    pub settle_check_interval: String,

    /// Cap on concurrently waiting settle-watchers; 0 means unbounded.
    #[serde(default)]
    pub max_concurrent_settles: usize,

    /// Trigger again when a previously triggered name disappears and is
    /// later re-created.
    #[serde(default)]
    pub retrigger_recreated: bool,
}

fn default_prefix() -> String {
    "run".to_string()
}

fn default_watch_poll_interval() -> String {
    "300s".to_string()
}

fn default_settle_delay() -> String {
    "30s".to_string()
}

fn default_settle_check_interval() -> String {
    "5s".to_string()
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            poll_interval: default_watch_poll_interval(),
            settle_delay: default_settle_delay(),
            settle_check_interval: default_settle_check_interval(),
            max_concurrent_settles: 0,
            retrigger_recreated: false,
        }
    }
}

/// `[batch]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchSection {
    #[serde(default = "default_batch_poll_interval")]
    pub poll_interval: String,
}

fn default_batch_poll_interval() -> String {
    "30s".to_string()
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            poll_interval: default_batch_poll_interval(),
        }
    }
}

/// `[endpoint.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Command prefix placed in front of every task, e.g. `srun -N 1 -c 4`.
    #[serde(default)]
    pub launcher: Option<String>,

    /// Maximum number of tasks running at once on this endpoint.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

fn default_max_parallel() -> usize {
    1
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            launcher: None,
            max_parallel: default_max_parallel(),
        }
    }
}

/// `[function.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionConfig {
    pub cmd: String,
}

/// `[stage.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StageConfig {
    pub endpoint: String,
    pub function: String,

    /// Template for the directory the stage reads.
    pub input_dir: String,

    #[serde(default)]
    pub output_dir: Option<String>,

    /// Glob selecting the input units inside `input_dir`. When set, one task
    /// is submitted per matching file; when absent the stage is one task.
    #[serde(default)]
    pub units: Option<String>,

    /// Argument templates passed to the function.
    #[serde(default)]
    pub args: Vec<String>,

    /// Stages that must finish before this one starts.
    #[serde(default)]
    pub after: Vec<String>,
}

/// Parsed `[watch]` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSettings {
    pub prefix: String,
    pub poll_interval: Duration,
    pub settle_delay: Duration,
    pub settle_check_interval: Duration,
    pub max_concurrent_settles: usize,
    pub retrigger_recreated: bool,
}

/// Parsed `[batch]` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSettings {
    pub poll_interval: Duration,
}

/// Validated configuration.
///
/// Constructed through `TryFrom<RawConfigFile>`; `stage_order` lists every
/// stage in an order that respects `after`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub watch: WatchSettings,
    pub batch: BatchSettings,
    pub endpoint: BTreeMap<String, EndpointConfig>,
    pub function: BTreeMap<String, FunctionConfig>,
    pub stage: BTreeMap<String, StageConfig>,
    stage_order: Vec<String>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        watch: WatchSettings,
        batch: BatchSettings,
        raw: RawConfigFile,
        stage_order: Vec<String>,
    ) -> Self {
        Self {
            watch,
            batch,
            endpoint: raw.endpoint,
            function: raw.function,
            stage: raw.stage,
            stage_order,
        }
    }

    /// Stage names in execution order.
    pub fn stage_order(&self) -> &[String] {
        &self.stage_order
    }

    /// Endpoints referenced by at least one stage.
    pub fn endpoints_in_use(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.stage.values().map(|s| s.endpoint.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}
