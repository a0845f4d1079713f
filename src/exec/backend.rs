// src/exec/backend.rs

//! Pluggable compute backend abstraction.
//!
//! The batch tracker talks to a `ComputeClient` instead of a concrete
//! remote service. This makes it easy to swap in a scripted client in tests
//! while keeping the production implementation here.
//!
//! - `ProcessClient` is the implementation used by `flowtrigger`. It runs
//!   every task as a shell process behind the endpoint's launcher prefix
//!   (`srun ...`, `ssh host ...`) and keeps results in memory until polled.
//! - Tests can provide their own `ComputeClient` that, for example, returns
//!   a scripted sequence of status snapshots.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::batch::{Batch, BatchHandle, Task};
use crate::config::ConfigFile;
use crate::errors::{FlowtriggerError, Result};
use crate::types::{StatusSnapshot, TaskResult};

use super::task_runner::{run_task, shell_quote};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait abstracting the remote submission service.
///
/// Submission must return as soon as the work is accepted; `get_status`
/// must be cheap and idempotent.
pub trait ComputeClient: Send + Sync {
    /// Accept every task of `batch` and return a handle to poll.
    fn submit_batch(&self, batch: Batch) -> BoxFuture<'_, Result<BatchHandle>>;

    /// Latest known state of every task in the batch.
    fn get_status<'a>(&'a self, handle: &'a BatchHandle) -> BoxFuture<'a, Result<StatusSnapshot>>;

    /// Whether `endpoint` is currently able to accept work.
    fn endpoint_online<'a>(&'a self, endpoint: &'a str) -> BoxFuture<'a, Result<bool>>;

    /// Drop whatever the client still holds for a finished batch.
    fn release(&self, _handle: &BatchHandle) {}

    /// Submit a single task; a batch of one.
    fn submit<'a>(&'a self, endpoint: &'a str, task: Task) -> BoxFuture<'a, Result<BatchHandle>> {
        self.submit_batch(Batch {
            endpoint: endpoint.to_string(),
            tasks: vec![task],
        })
    }
}

struct EndpointSlot {
    launcher: Option<String>,
    slots: Arc<Semaphore>,
}

/// Compute backend that runs tasks as local shell processes.
pub struct ProcessClient {
    endpoints: BTreeMap<String, EndpointSlot>,
    functions: BTreeMap<String, String>,
    batches: Arc<Mutex<HashMap<String, StatusSnapshot>>>,
    next_batch: AtomicU64,
}

impl fmt::Debug for ProcessClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessClient")
            .field("endpoints", &self.endpoints.keys().collect::<Vec<_>>())
            .field("functions", &self.functions)
            .finish_non_exhaustive()
    }
}

impl ProcessClient {
    pub fn from_config(cfg: &ConfigFile) -> Self {
        let endpoints = cfg
            .endpoint
            .iter()
            .map(|(name, ep)| {
                (
                    name.clone(),
                    EndpointSlot {
                        launcher: ep.launcher.clone().filter(|l| !l.trim().is_empty()),
                        slots: Arc::new(Semaphore::new(ep.max_parallel.max(1))),
                    },
                )
            })
            .collect();
        let functions = cfg
            .function
            .iter()
            .map(|(name, f)| (name.clone(), f.cmd.clone()))
            .collect();

        Self {
            endpoints,
            functions,
            batches: Arc::new(Mutex::new(HashMap::new())),
            next_batch: AtomicU64::new(1),
        }
    }

    /// Batches whose results are still held in memory.
    pub fn retained_batches(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    /// Full shell command line for `task` on an endpoint with `launcher`.
    fn command_line(&self, launcher: Option<&str>, task: &Task) -> Result<String> {
        let program = self.functions.get(&task.function).ok_or_else(|| {
            FlowtriggerError::Submission(format!(
                "task '{}' references unknown function '{}'",
                task.id, task.function
            ))
        })?;

        let mut parts: Vec<String> = Vec::with_capacity(task.args.len() + 2);
        if let Some(l) = launcher {
            parts.push(l.to_string());
        }
        parts.push(program.clone());
        parts.extend(task.args.iter().map(|a| shell_quote(a)));
        Ok(parts.join(" "))
    }

    fn submit_now(&self, batch: Batch) -> Result<BatchHandle> {
        let endpoint = self.endpoints.get(&batch.endpoint).ok_or_else(|| {
            FlowtriggerError::Submission(format!("unknown endpoint '{}'", batch.endpoint))
        })?;

        // Resolve every command before spawning anything so a bad task
        // rejects the whole batch.
        let commands = batch
            .tasks
            .iter()
            .map(|t| Ok((t.id.clone(), self.command_line(endpoint.launcher.as_deref(), t)?)))
            .collect::<Result<Vec<_>>>()?;

        let seq = self.next_batch.fetch_add(1, Ordering::Relaxed);
        let batch_id = format!("{}-{:06}", batch.endpoint, seq);

        {
            let mut batches = self.batches.lock().unwrap();
            let pending: StatusSnapshot = commands
                .iter()
                .map(|(id, _)| (id.clone(), TaskResult::pending()))
                .collect();
            batches.insert(batch_id.clone(), pending);
        }

        let mut tasks = BTreeMap::new();
        for (task_id, command_line) in commands {
            tasks.insert(task_id.clone(), format!("{batch_id}/{task_id}"));

            let slots = Arc::clone(&endpoint.slots);
            let batches = Arc::clone(&self.batches);
            let batch_key = batch_id.clone();
            tokio::spawn(async move {
                let result = match slots.acquire_owned().await {
                    Ok(_permit) => run_task(&task_id, &command_line).await,
                    Err(e) => TaskResult::completed(-1, String::new(), e.to_string()),
                };
                debug!(batch = %batch_key, task = %task_id, status = result.status_code, "task recorded");
                if let Some(snapshot) = batches.lock().unwrap().get_mut(&batch_key) {
                    snapshot.insert(task_id, result);
                }
            });
        }

        Ok(BatchHandle {
            batch_id,
            endpoint: batch.endpoint,
            tasks,
        })
    }
}

impl ComputeClient for ProcessClient {
    fn submit_batch(&self, batch: Batch) -> BoxFuture<'_, Result<BatchHandle>> {
        Box::pin(async move { self.submit_now(batch) })
    }

    fn get_status<'a>(&'a self, handle: &'a BatchHandle) -> BoxFuture<'a, Result<StatusSnapshot>> {
        Box::pin(async move {
            let batches = self.batches.lock().unwrap();
            batches.get(&handle.batch_id).cloned().ok_or_else(|| {
                FlowtriggerError::Submission(format!("unknown batch '{}'", handle.batch_id))
            })
        })
    }

    fn release(&self, handle: &BatchHandle) {
        if self.batches.lock().unwrap().remove(&handle.batch_id).is_some() {
            debug!(batch = %handle.batch_id, "released batch results");
        }
    }

    fn endpoint_online<'a>(&'a self, endpoint: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let Some(ep) = self.endpoints.get(endpoint) else {
                warn!(endpoint, "endpoint is not configured");
                return Ok(false);
            };
            let program = ep
                .launcher
                .as_deref()
                .and_then(|l| l.split_whitespace().next());
            let online = match program {
                Some(p) => which::which(p).is_ok(),
                None => true,
            };
            info!(endpoint, ?program, online, "endpoint status");
            Ok(online)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        BatchSection, EndpointConfig, FunctionConfig, RawConfigFile, StageConfig, WatchSection,
    };

    fn config(launcher: Option<&str>) -> ConfigFile {
        let raw = RawConfigFile {
            watch: WatchSection::default(),
            batch: BatchSection::default(),
            endpoint: BTreeMap::from([(
                "local".to_string(),
                EndpointConfig {
                    launcher: launcher.map(str::to_string),
                    max_parallel: 2,
                },
            )]),
            function: BTreeMap::from([(
                "echo".to_string(),
                FunctionConfig {
                    cmd: "echo".to_string(),
                },
            )]),
            stage: BTreeMap::from([(
                "only".to_string(),
                StageConfig {
                    endpoint: "local".to_string(),
                    function: "echo".to_string(),
                    input_dir: "{settled_path}".to_string(),
                    output_dir: None,
                    units: None,
                    args: vec![],
                    after: vec![],
                },
            )]),
        };
        ConfigFile::try_from(raw).unwrap()
    }

    #[test]
    fn command_line_prefixes_launcher_and_quotes_args() {
        let client = ProcessClient::from_config(&config(Some("srun -N 1")));
        let task = Task::new("t0", "echo", vec!["run 7".to_string(), "3".to_string()]);
        let line = client.command_line(Some("srun -N 1"), &task).unwrap();
        assert_eq!(line, "srun -N 1 echo 'run 7' 3");
    }

    #[tokio::test]
    async fn unknown_function_rejects_batch() {
        let client = ProcessClient::from_config(&config(None));
        let err = client
            .submit("local", Task::new("t0", "missing", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowtriggerError::Submission(_)));
    }

    #[tokio::test]
    async fn endpoint_without_launcher_is_online_and_unknown_is_not() {
        let client = ProcessClient::from_config(&config(None));
        assert!(client.endpoint_online("local").await.unwrap());
        assert!(!client.endpoint_online("elsewhere").await.unwrap());
    }

    #[tokio::test]
    async fn missing_launcher_program_is_offline() {
        let client = ProcessClient::from_config(&config(Some("no-such-launcher-xyz -n 4")));
        assert!(!client.endpoint_online("local").await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn submitted_tasks_become_terminal() {
        let client = ProcessClient::from_config(&config(None));
        let handle = client
            .submit_batch(Batch {
                endpoint: "local".to_string(),
                tasks: vec![
                    Task::new("a", "echo", vec!["hello".to_string()]),
                    Task::new("b", "echo", vec!["world".to_string()]),
                ],
            })
            .await
            .unwrap();

        let snapshot = loop {
            let s = client.get_status(&handle).await.unwrap();
            if s.values().all(|r| r.terminal) {
                break s;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        };
        assert_eq!(snapshot["a"].stdout, "hello\n");
        assert_eq!(snapshot["b"].status_code, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn finished_batches_are_evicted_after_run_batch() {
        let client = Arc::new(ProcessClient::from_config(&config(None)));
        let tracker = crate::batch::BatchTracker::new(
            client.clone(),
            std::time::Duration::from_millis(10),
        );

        for round in 0..3 {
            let results = tracker
                .run_batch("local", vec![Task::new(format!("t{round}"), "echo", vec![])])
                .await
                .unwrap();
            assert_eq!(results.len(), 1);
            assert_eq!(client.retained_batches(), 0);
        }
    }

    #[test]
    fn releasing_an_unknown_batch_is_harmless() {
        let client = ProcessClient::from_config(&config(None));
        client.release(&BatchHandle {
            batch_id: "nope".to_string(),
            endpoint: "local".to_string(),
            tasks: BTreeMap::new(),
        });
        assert_eq!(client.retained_batches(), 0);
    }
}
