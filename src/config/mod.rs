// src/config/mod.rs

//! Configuration loading and validation for flowtrigger.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate references, the stage graph and templates (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{
    BatchSection, BatchSettings, ConfigFile, EndpointConfig, FunctionConfig, RawConfigFile,
    StageConfig, WatchSection, WatchSettings,
};
