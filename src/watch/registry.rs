// src/watch/registry.rs

//! Supervised set of running settle-watchers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::watch::settle::SettleWatcher;
use crate::watch::SettledHandler;

/// Settle-watchers keyed by the directory they watch.
///
/// Owned by the poll loop. Each watcher runs in its own Tokio task; the
/// registry never blocks on them. Finished workers are collected by
/// [`SettleRegistry::reap`], which is where failures and panics become
/// visible. With a limit set, at most that many watchers wait or run at
/// once and the rest queue for a slot.
#[derive(Debug, Default)]
pub struct SettleRegistry {
    active: HashMap<PathBuf, JoinHandle<()>>,
    limit: Option<Arc<Semaphore>>,
}

impl SettleRegistry {
    /// `max_concurrent = 0` means unbounded.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            active: HashMap::new(),
            limit: (max_concurrent > 0).then(|| Arc::new(Semaphore::new(max_concurrent))),
        }
    }

    /// Start a worker for `watcher`. Returns `false` if a worker for the
    /// same path is still registered.
    pub fn spawn(&mut self, watcher: SettleWatcher, handler: Arc<dyn SettledHandler>) -> bool {
        let path = watcher.path().to_path_buf();
        if let Some(existing) = self.active.get(&path) {
            if !existing.is_finished() {
                debug!(path = ?path, "settle-watcher already active; not spawning another");
                return false;
            }
        }

        let limit = self.limit.clone();
        let worker_path = path.clone();
        let handle = tokio::spawn(async move {
            let _permit = match limit {
                Some(sem) => match sem.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        warn!(path = ?worker_path, "settle limiter closed; dropping watcher");
                        return;
                    }
                },
                None => None,
            };

            if let Err(err) = watcher.run(handler).await {
                error!(path = ?worker_path, error = %err, "settle-watcher failed");
            }
        });

        self.active.insert(path, handle);
        true
    }

    /// Remove finished workers, logging any that panicked. Returns the paths
    /// that were collected.
    pub async fn reap(&mut self) -> Vec<PathBuf> {
        let finished: Vec<PathBuf> = self
            .active
            .iter()
            .filter(|(_, h)| h.is_finished())
            .map(|(p, _)| p.clone())
            .collect();

        for path in finished.iter() {
            let Some(handle) = self.active.remove(path) else {
                continue;
            };
            match handle.await {
                Ok(()) => debug!(path = ?path, "settle-watcher finished"),
                Err(e) if e.is_panic() => error!(path = ?path, "settle-watcher panicked"),
                Err(e) => warn!(path = ?path, error = %e, "settle-watcher cancelled"),
            }
        }
        finished
    }

    /// Paths with a registered worker, sorted.
    pub fn active_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.active.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}
