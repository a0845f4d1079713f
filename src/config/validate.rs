// src/config/validate.rs

use std::time::Duration;

use globset::Glob;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{BatchSettings, ConfigFile, RawConfigFile, WatchSettings};
use crate::errors::{FlowtriggerError, Result};
use crate::pipeline::template::{
    unknown_placeholder, ARG_PLACEHOLDERS, DIR_PLACEHOLDERS, UNIT_PLACEHOLDERS,
};
use crate::types::parse_duration;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::FlowtriggerError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let watch = validate_watch(&raw)?;
        let batch = validate_batch(&raw)?;
        ensure_has_stages(&raw)?;
        validate_endpoints(&raw)?;
        validate_stage_references(&raw)?;
        validate_stage_templates(&raw)?;
        let order = stage_order(&raw)?;
        Ok(ConfigFile::new_unchecked(watch, batch, raw, order))
    }
}

fn config_err(msg: impl Into<String>) -> FlowtriggerError {
    FlowtriggerError::ConfigError(msg.into())
}

fn nonzero_duration(field: &str, value: &str) -> Result<Duration> {
    let d = parse_duration(value).map_err(|e| config_err(format!("{field}: {e}")))?;
    if d.is_zero() {
        return Err(config_err(format!("{field} must be greater than zero")));
    }
    Ok(d)
}

fn validate_watch(cfg: &RawConfigFile) -> Result<WatchSettings> {
    let w = &cfg.watch;
    if w.prefix.is_empty() {
        return Err(config_err("[watch].prefix must not be empty"));
    }
    Ok(WatchSettings {
        prefix: w.prefix.clone(),
        poll_interval: nonzero_duration("[watch].poll_interval", &w.poll_interval)?,
        // A zero settle delay is allowed: trigger as soon as a directory is seen.
        settle_delay: parse_duration(&w.settle_delay)
            .map_err(|e| config_err(format!("[watch].settle_delay: {e}")))?,
        settle_check_interval: nonzero_duration(
            "[watch].settle_check_interval",
            &w.settle_check_interval,
        )?,
        max_concurrent_settles: w.max_concurrent_settles,
        retrigger_recreated: w.retrigger_recreated,
    })
}

fn validate_batch(cfg: &RawConfigFile) -> Result<BatchSettings> {
    Ok(BatchSettings {
        poll_interval: nonzero_duration("[batch].poll_interval", &cfg.batch.poll_interval)?,
    })
}

fn ensure_has_stages(cfg: &RawConfigFile) -> Result<()> {
    if cfg.stage.is_empty() {
        return Err(config_err(
            "config must contain at least one [stage.<name>] section",
        ));
    }
    Ok(())
}

fn validate_endpoints(cfg: &RawConfigFile) -> Result<()> {
    for (name, ep) in cfg.endpoint.iter() {
        if ep.max_parallel == 0 {
            return Err(config_err(format!(
                "[endpoint.{name}].max_parallel must be >= 1 (got 0)"
            )));
        }
    }
    for (name, func) in cfg.function.iter() {
        if func.cmd.trim().is_empty() {
            return Err(config_err(format!("[function.{name}].cmd must not be empty")));
        }
    }
    Ok(())
}

fn validate_stage_references(cfg: &RawConfigFile) -> Result<()> {
    for (name, stage) in cfg.stage.iter() {
        if !cfg.endpoint.contains_key(&stage.endpoint) {
            return Err(config_err(format!(
                "stage '{}' uses unknown endpoint '{}'",
                name, stage.endpoint
            )));
        }
        if !cfg.function.contains_key(&stage.function) {
            return Err(config_err(format!(
                "stage '{}' uses unknown function '{}'",
                name, stage.function
            )));
        }
        for dep in stage.after.iter() {
            if dep == name {
                return Err(config_err(format!(
                    "stage '{}' cannot depend on itself in `after`",
                    name
                )));
            }
            if !cfg.stage.contains_key(dep) {
                return Err(config_err(format!(
                    "stage '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
        }
    }
    Ok(())
}

fn validate_stage_templates(cfg: &RawConfigFile) -> Result<()> {
    for (name, stage) in cfg.stage.iter() {
        let dirs = std::iter::once(&stage.input_dir).chain(stage.output_dir.iter());
        for template in dirs {
            if let Some(bad) = unknown_placeholder(template, DIR_PLACEHOLDERS) {
                return Err(config_err(format!(
                    "stage '{name}': unknown placeholder '{{{bad}}}' in '{template}'"
                )));
            }
        }

        if let Some(pattern) = &stage.units {
            Glob::new(pattern).map_err(|e| {
                config_err(format!("stage '{name}': invalid units glob '{pattern}': {e}"))
            })?;
        }

        let allowed: Vec<&str> = if stage.units.is_some() {
            ARG_PLACEHOLDERS.iter().chain(UNIT_PLACEHOLDERS).copied().collect()
        } else {
            ARG_PLACEHOLDERS.to_vec()
        };
        for arg in stage.args.iter() {
            if let Some(bad) = unknown_placeholder(arg, &allowed) {
                return Err(config_err(format!(
                    "stage '{name}': unknown placeholder '{{{bad}}}' in argument '{arg}'"
                )));
            }
        }
        if stage.output_dir.is_none()
            && stage.args.iter().any(|a| a.contains("{output_dir}"))
        {
            return Err(config_err(format!(
                "stage '{name}' uses {{output_dir}} but has no output_dir"
            )));
        }
    }
    Ok(())
}

fn stage_order(cfg: &RawConfigFile) -> Result<Vec<String>> {
    // Edge direction: dep -> stage
    // For:
    //   [stage.convert]
    //   after = ["fit"]
    // we add edge fit -> convert.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.stage.keys() {
        graph.add_node(name.as_str());
    }

    for (name, stage) in cfg.stage.iter() {
        for dep in stage.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    // A topological sort will fail if there is a cycle.
    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
        Err(cycle) => Err(config_err(format!(
            "cycle detected in stage graph involving stage '{}'",
            cycle.node_id()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::config::model::{
        BatchSection, EndpointConfig, FunctionConfig, StageConfig, WatchSection,
    };

    fn stage(after: &[&str]) -> StageConfig {
        StageConfig {
            endpoint: "local".to_string(),
            function: "noop".to_string(),
            input_dir: "/data/{run_dir}".to_string(),
            output_dir: None,
            units: None,
            args: vec![],
            after: after.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn raw(stages: Vec<(&str, StageConfig)>) -> RawConfigFile {
        RawConfigFile {
            watch: WatchSection::default(),
            batch: BatchSection::default(),
            endpoint: BTreeMap::from([("local".to_string(), EndpointConfig::default())]),
            function: BTreeMap::from([(
                "noop".to_string(),
                FunctionConfig {
                    cmd: "true".to_string(),
                },
            )]),
            stage: stages
                .into_iter()
                .map(|(n, s)| (n.to_string(), s))
                .collect(),
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = ConfigFile::try_from(raw(vec![("fit", stage(&[]))])).unwrap();
        assert_eq!(cfg.watch.prefix, "run");
        assert_eq!(cfg.watch.poll_interval, Duration::from_secs(300));
        assert_eq!(cfg.watch.settle_check_interval, Duration::from_secs(5));
        assert_eq!(cfg.batch.poll_interval, Duration::from_secs(30));
        assert_eq!(cfg.watch.max_concurrent_settles, 0);
        assert!(!cfg.watch.retrigger_recreated);
    }

    #[test]
    fn stage_order_respects_after() {
        let cfg = ConfigFile::try_from(raw(vec![
            ("analyze", stage(&["convert"])),
            ("convert", stage(&["fit"])),
            ("fit", stage(&[])),
            ("transfer", stage(&["analyze"])),
        ]))
        .unwrap();
        assert_eq!(cfg.stage_order(), ["fit", "convert", "analyze", "transfer"]);
    }

    #[test]
    fn cycle_is_rejected() {
        let err = ConfigFile::try_from(raw(vec![("a", stage(&["b"])), ("b", stage(&["a"]))]))
            .unwrap_err();
        assert!(matches!(err, FlowtriggerError::ConfigError(ref m) if m.contains("cycle")));
    }

    #[test]
    fn unit_placeholders_require_units() {
        let mut s = stage(&[]);
        s.args = vec!["{index}".to_string()];
        assert!(ConfigFile::try_from(raw(vec![("fit", s.clone())])).is_err());

        s.units = Some("*.evt".to_string());
        assert!(ConfigFile::try_from(raw(vec![("fit", s)])).is_ok());
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let mut r = raw(vec![("fit", stage(&[]))]);
        r.batch.poll_interval = "0s".to_string();
        assert!(ConfigFile::try_from(r).is_err());
    }
}
