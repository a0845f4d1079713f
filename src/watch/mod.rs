// src/watch/mod.rs

//! Polling directory watcher.
//!
//! The watched root lives on a network-replicated mount where change
//! notifications are unreliable, so this module polls instead:
//! - [`trigger`] lists the root at a fixed cadence and spots new run
//!   directories.
//! - [`settle`] waits until a new directory and its files have been quiet
//!   for long enough, then hands the path to a [`SettledHandler`].
//! - [`registry`] supervises the per-directory settle-watchers.
//!
//! It does **not** know what a pipeline is; it only turns "a directory
//! finished copying in" into one `on_settled` call.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use crate::errors::Result;

pub mod registry;
pub mod settle;
pub mod trigger;

pub use registry::SettleRegistry;
pub use settle::{quiescent_age, SettleWatcher};
pub use trigger::{new_entries, DirectoryTrigger};

/// Receiver of settled directories.
///
/// Called exactly once per triggered directory, with its absolute path,
/// from that directory's settle-watcher task.
pub trait SettledHandler: Send + Sync {
    fn on_settled(&self, path: PathBuf) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}
