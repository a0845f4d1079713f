// src/exec/mod.rs

//! Task execution layer.
//!
//! - [`backend`] provides the `ComputeClient` trait the batch tracker talks
//!   to, and the concrete `ProcessClient` used in production, which tests
//!   can replace with a scripted implementation.
//! - [`task_runner`] runs one task as a process via `tokio::process::Command`
//!   and captures its status code, stdout and stderr.

pub mod backend;
pub mod task_runner;

pub use backend::{BoxFuture, ComputeClient, ProcessClient};
pub use task_runner::run_task;
