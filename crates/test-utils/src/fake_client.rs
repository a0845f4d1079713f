use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Mutex;

use flowtrigger::batch::{Batch, BatchHandle};
use flowtrigger::errors::{FlowtriggerError, Result};
use flowtrigger::exec::{BoxFuture, ComputeClient};
use flowtrigger::types::{StatusSnapshot, TaskResult};

/// A scripted compute client that:
/// - records every submitted batch
/// - answers `get_status` from a queue of scripted snapshots, and once the
///   queue is empty, reports every task of the handle as finished
/// - lets tests mark endpoints offline and tasks as failing.
#[derive(Default)]
pub struct FakeComputeClient {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    scripted: VecDeque<StatusSnapshot>,
    failures: BTreeMap<String, TaskResult>,
    offline: BTreeSet<String>,
    reject_submit: bool,
    submissions: Vec<Batch>,
    status_calls: usize,
    released: Vec<String>,
    next_batch: u64,
}

impl FakeComputeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a snapshot for the next `get_status` call.
    pub fn push_status(&self, snapshot: StatusSnapshot) {
        self.state.lock().unwrap().scripted.push_back(snapshot);
    }

    /// Automatic completion reports this result for `task_id`.
    pub fn fail_task(&self, task_id: &str, status_code: i32, stdout: &str, stderr: &str) {
        self.state.lock().unwrap().failures.insert(
            task_id.to_string(),
            TaskResult::completed(status_code, stdout, stderr),
        );
    }

    pub fn set_offline(&self, endpoint: &str) {
        self.state.lock().unwrap().offline.insert(endpoint.to_string());
    }

    /// Make every following submission fail.
    pub fn reject_submissions(&self) {
        self.state.lock().unwrap().reject_submit = true;
    }

    pub fn submissions(&self) -> Vec<Batch> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn status_calls(&self) -> usize {
        self.state.lock().unwrap().status_calls
    }

    /// Batch ids passed to `release`, in call order.
    pub fn released(&self) -> Vec<String> {
        self.state.lock().unwrap().released.clone()
    }
}

impl ComputeClient for FakeComputeClient {
    fn submit_batch(&self, batch: Batch) -> BoxFuture<'_, Result<BatchHandle>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if state.reject_submit {
                return Err(FlowtriggerError::Submission(format!(
                    "endpoint '{}' rejected the batch",
                    batch.endpoint
                )));
            }

            state.next_batch += 1;
            let batch_id = format!("fake-{}", state.next_batch);
            let tasks = batch
                .tasks
                .iter()
                .map(|t| (t.id.clone(), format!("{batch_id}/{}", t.id)))
                .collect();
            let handle = BatchHandle {
                batch_id,
                endpoint: batch.endpoint.clone(),
                tasks,
            };
            state.submissions.push(batch);
            Ok(handle)
        })
    }

    fn get_status<'a>(&'a self, handle: &'a BatchHandle) -> BoxFuture<'a, Result<StatusSnapshot>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.status_calls += 1;
            if let Some(snapshot) = state.scripted.pop_front() {
                return Ok(snapshot);
            }
            let snapshot: StatusSnapshot = handle
                .task_ids()
                .map(|id| {
                    let result = state
                        .failures
                        .get(id)
                        .cloned()
                        .unwrap_or_else(|| TaskResult::completed(0, format!("{id} ok"), ""));
                    (id.to_string(), result)
                })
                .collect();
            Ok(snapshot)
        })
    }

    fn release(&self, handle: &BatchHandle) {
        self.state.lock().unwrap().released.push(handle.batch_id.clone());
    }

    fn endpoint_online<'a>(&'a self, endpoint: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(!self.state.lock().unwrap().offline.contains(endpoint)) })
    }
}
