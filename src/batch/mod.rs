// src/batch/mod.rs

//! Remote batch submission and completion tracking.
//!
//! A [`Batch`] is a set of independent [`Task`]s sent to one endpoint. The
//! [`tracker`] submits it through a [`crate::exec::ComputeClient`], polls
//! status snapshots until every task carries its terminal marker, and then
//! validates the aggregate: one non-zero status fails the whole batch.
//!
//! - [`tracker`] owns the submit/poll/validate state machine.
//! - [`units`] discovers the input units a stage fans out over.

use std::collections::BTreeMap;

use crate::types::{EndpointId, TaskId};

pub mod tracker;
pub mod units;

pub use tracker::{is_complete, validate, BatchTracker};
pub use units::{discover_units, InputUnit};

/// One unit of remote work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    /// Reference to a registered function (`[function.<name>]`).
    pub function: String,
    pub args: Vec<String>,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, function: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            id: id.into(),
            function: function.into(),
            args,
        }
    }
}

/// A set of tasks bound for one endpoint.
#[derive(Debug, Clone)]
pub struct Batch {
    pub endpoint: EndpointId,
    pub tasks: Vec<Task>,
}

/// Returned by submission; the only thing needed to poll a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchHandle {
    pub batch_id: String,
    pub endpoint: EndpointId,
    /// Logical task id -> remote handle.
    pub tasks: BTreeMap<TaskId, String>,
}

impl BatchHandle {
    pub fn task_ids(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
