#![allow(dead_code)]

use std::collections::BTreeMap;

use flowtrigger::config::{
    BatchSection, ConfigFile, EndpointConfig, FunctionConfig, RawConfigFile, StageConfig,
    WatchSection,
};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                watch: WatchSection::default(),
                batch: BatchSection::default(),
                endpoint: BTreeMap::new(),
                function: BTreeMap::new(),
                stage: BTreeMap::new(),
            },
        }
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.config.watch.prefix = prefix.to_string();
        self
    }

    pub fn with_settle_delay(mut self, delay: &str) -> Self {
        self.config.watch.settle_delay = delay.to_string();
        self
    }

    pub fn with_batch_poll_interval(mut self, interval: &str) -> Self {
        self.config.batch.poll_interval = interval.to_string();
        self
    }

    /// Endpoint without a launcher and a single slot.
    pub fn with_endpoint(self, name: &str) -> Self {
        self.with_endpoint_config(name, EndpointConfig::default())
    }

    pub fn with_endpoint_config(mut self, name: &str, endpoint: EndpointConfig) -> Self {
        self.config.endpoint.insert(name.to_string(), endpoint);
        self
    }

    pub fn with_function(mut self, name: &str, cmd: &str) -> Self {
        self.config
            .function
            .insert(name.to_string(), FunctionConfig { cmd: cmd.to_string() });
        self
    }

    /// Add a stage. Its endpoint and function are registered too if missing.
    pub fn with_stage(mut self, name: &str, stage: StageConfig) -> Self {
        self.config
            .endpoint
            .entry(stage.endpoint.clone())
            .or_default();
        self.config
            .function
            .entry(stage.function.clone())
            .or_insert_with(|| FunctionConfig {
                cmd: format!("/bin/echo {}", stage.function),
            });
        self.config.stage.insert(name.to_string(), stage);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `StageConfig`.
pub struct StageConfigBuilder {
    stage: StageConfig,
}

impl StageConfigBuilder {
    pub fn new(endpoint: &str, function: &str, input_dir: &str) -> Self {
        Self {
            stage: StageConfig {
                endpoint: endpoint.to_string(),
                function: function.to_string(),
                input_dir: input_dir.to_string(),
                output_dir: None,
                units: None,
                args: vec![],
                after: vec![],
            },
        }
    }

    pub fn output_dir(mut self, template: &str) -> Self {
        self.stage.output_dir = Some(template.to_string());
        self
    }

    pub fn units(mut self, glob: &str) -> Self {
        self.stage.units = Some(glob.to_string());
        self
    }

    pub fn arg(mut self, template: &str) -> Self {
        self.stage.args.push(template.to_string());
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.stage.after.push(dep.to_string());
        self
    }

    pub fn build(self) -> StageConfig {
        self.stage
    }
}
