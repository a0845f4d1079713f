// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowtriggerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Watch directory does not exist: {0:?}")]
    WatchRootMissing(PathBuf),

    #[error("No input units matching '{pattern}' in {dir:?}")]
    NoInputUnits { dir: PathBuf, pattern: String },

    #[error("Batch {batch} returned an empty result set")]
    EmptyResults { batch: String },

    #[error("Task '{task}' in batch {batch} has not reached a terminal state")]
    NotTerminal { batch: String, task: String },

    #[error(
        "Task '{task}' in batch {batch} failed with status {status_code} \
         ({others} other task(s) also failed)\nstdout: {stdout}\nstderr: {stderr}"
    )]
    TaskFailed {
        batch: String,
        task: String,
        status_code: i32,
        stdout: String,
        stderr: String,
        others: usize,
    },

    #[error("Compute endpoint '{0}' is not online")]
    EndpointOffline(String),

    #[error("Submission error: {0}")]
    Submission(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, FlowtriggerError>;
