// src/batch/tracker.rs

//! Submit/poll/validate state machine for a batch of remote tasks.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::batch::{Batch, BatchHandle, Task};
use crate::errors::{FlowtriggerError, Result};
use crate::exec::ComputeClient;
use crate::types::{StatusSnapshot, TaskResult, SUCCESS_STATUS};

/// Drives batches through a [`ComputeClient`].
///
/// Polling has no timeout: a task that never becomes terminal blocks the
/// caller until the process is stopped.
#[derive(Clone)]
pub struct BatchTracker {
    client: Arc<dyn ComputeClient>,
    poll_interval: Duration,
}

impl fmt::Debug for BatchTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchTracker")
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl BatchTracker {
    pub fn new(client: Arc<dyn ComputeClient>, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
        }
    }

    pub fn client(&self) -> &Arc<dyn ComputeClient> {
        &self.client
    }

    /// Submit `tasks` to `endpoint` and return the handle.
    ///
    /// An empty task list or duplicate task ids are rejected before anything
    /// reaches the client.
    pub async fn submit_batch(&self, endpoint: &str, tasks: Vec<Task>) -> Result<BatchHandle> {
        if tasks.is_empty() {
            return Err(FlowtriggerError::Submission(format!(
                "refusing to submit an empty batch to endpoint '{endpoint}'"
            )));
        }
        {
            let mut ids = BTreeSet::new();
            if let Some(dup) = tasks.iter().find(|t| !ids.insert(t.id.as_str())) {
                return Err(FlowtriggerError::Submission(format!(
                    "duplicate task id '{}' in batch for endpoint '{endpoint}'",
                    dup.id
                )));
            }
        }

        let count = tasks.len();
        let handle = self
            .client
            .submit_batch(Batch {
                endpoint: endpoint.to_string(),
                tasks,
            })
            .await?;

        info!(
            batch = %handle.batch_id,
            endpoint,
            tasks = count,
            "submitted batch"
        );
        Ok(handle)
    }

    /// Poll until every task in the batch is terminal and return the final
    /// snapshot, then release the batch on the client. The result is not
    /// validated; see [`validate`].
    pub async fn poll_until_complete(&self, handle: &BatchHandle) -> Result<StatusSnapshot> {
        let mut snapshot = self.client.get_status(handle).await?;
        let mut polls = 1usize;

        while !is_complete(handle, &snapshot) {
            let done = snapshot.values().filter(|r| r.terminal).count();
            debug!(
                batch = %handle.batch_id,
                done,
                total = handle.len(),
                polls,
                "batch still running"
            );
            tokio::time::sleep(self.poll_interval).await;
            snapshot = self.client.get_status(handle).await?;
            polls += 1;
        }

        info!(batch = %handle.batch_id, polls, "batch reached terminal state");
        self.client.release(handle);
        Ok(snapshot)
    }

    /// Submit, wait for completion and validate. Returns every task's result.
    pub async fn run_batch(&self, endpoint: &str, tasks: Vec<Task>) -> Result<StatusSnapshot> {
        let handle = self.submit_batch(endpoint, tasks).await?;
        let results = self.poll_until_complete(&handle).await?;
        validate(&handle.batch_id, &results)?;
        Ok(results)
    }

    /// Single-task form of [`BatchTracker::run_batch`].
    pub async fn run_single(&self, endpoint: &str, task: Task) -> Result<TaskResult> {
        let id = task.id.clone();
        let mut results = self.run_batch(endpoint, vec![task]).await?;
        results.remove(&id).ok_or_else(|| {
            FlowtriggerError::Submission(format!("result for task '{id}' missing from batch"))
        })
    }
}

/// True once nothing in the batch is still running.
///
/// Every task of the handle must be present and terminal. An empty snapshot
/// also ends polling so that the empty-result failure surfaces instead of
/// waiting forever.
pub fn is_complete(handle: &BatchHandle, snapshot: &StatusSnapshot) -> bool {
    if snapshot.is_empty() {
        return true;
    }
    snapshot.values().all(|r| r.terminal)
        && handle
            .task_ids()
            .all(|id| snapshot.get(id).is_some_and(|r| r.terminal))
}

/// Check a completed batch: all-or-nothing.
///
/// Fails when the result set is empty, when any entry lacks its terminal
/// marker, or when any status code is non-zero. Failures are reported for
/// the first failing task in id order, with the count of other failures.
pub fn validate(batch_id: &str, results: &StatusSnapshot) -> Result<()> {
    if results.is_empty() {
        return Err(FlowtriggerError::EmptyResults {
            batch: batch_id.to_string(),
        });
    }

    if let Some((task, _)) = results.iter().find(|(_, r)| !r.terminal) {
        return Err(FlowtriggerError::NotTerminal {
            batch: batch_id.to_string(),
            task: task.clone(),
        });
    }

    let mut failed = results.iter().filter(|(_, r)| r.status_code != SUCCESS_STATUS);
    if let Some((task, result)) = failed.next() {
        let others = failed.count();
        warn!(
            batch = batch_id,
            task = %task,
            status = result.status_code,
            others,
            "batch failed"
        );
        return Err(FlowtriggerError::TaskFailed {
            batch: batch_id.to_string(),
            task: task.clone(),
            status_code: result.status_code,
            stdout: result.stdout.clone(),
            stderr: result.stderr.clone(),
            others,
        });
    }

    Ok(())
}
