// src/watch/trigger.rs

//! The directory poll loop.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::WatchSettings;
use crate::errors::{FlowtriggerError, Result};
use crate::fs::{Clock, FileSystem};
use crate::watch::registry::SettleRegistry;
use crate::watch::settle::SettleWatcher;
use crate::watch::SettledHandler;

/// Names in `current` that were not in `seen`.
///
/// This is `seen XOR current` restricted to names still present: a name
/// that disappeared is not a new directory and is never triggered.
pub fn new_entries(seen: &BTreeSet<String>, current: &BTreeSet<String>) -> BTreeSet<String> {
    current
        .iter()
        .filter(|name| !name.is_empty() && !seen.contains(*name))
        .cloned()
        .collect()
}

/// Watches one root directory for new run directories.
///
/// The `seen` and `triggered` sets are owned by this value and only touched
/// from the poll loop; settle-watchers never see them.
pub struct DirectoryTrigger {
    root: PathBuf,
    settings: WatchSettings,
    fs: Arc<dyn FileSystem>,
    clock: Arc<dyn Clock>,
    handler: Arc<dyn SettledHandler>,
    /// Matching names present at the last poll.
    seen: BTreeSet<String>,
    /// Names handed to a settle-watcher at any point in this process.
    triggered: BTreeSet<String>,
    registry: SettleRegistry,
}

impl fmt::Debug for DirectoryTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryTrigger")
            .field("root", &self.root)
            .field("settings", &self.settings)
            .field("seen", &self.seen)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl DirectoryTrigger {
    /// Check the root and record the baseline listing.
    ///
    /// Directories already present here are never triggered. Fails with
    /// [`FlowtriggerError::WatchRootMissing`] if `root` is not a directory.
    pub fn start(
        root: impl Into<PathBuf>,
        settings: WatchSettings,
        fs: Arc<dyn FileSystem>,
        clock: Arc<dyn Clock>,
        handler: Arc<dyn SettledHandler>,
    ) -> Result<Self> {
        let root = root.into();
        if !fs.is_dir(&root) {
            error!(root = ?root, "watch directory does not exist");
            return Err(FlowtriggerError::WatchRootMissing(root));
        }
        // Canonicalize once so settled paths are absolute.
        let root = match fs.canonicalize(&root) {
            Ok(abs) => abs,
            Err(err) => {
                warn!(root = ?root, error = %err, "cannot canonicalize watch directory; using it as given");
                root
            }
        };

        let registry = SettleRegistry::new(settings.max_concurrent_settles);
        let mut trigger = Self {
            root,
            settings,
            fs,
            clock,
            handler,
            seen: BTreeSet::new(),
            triggered: BTreeSet::new(),
            registry,
        };
        trigger.seen = trigger.list_matching()?;

        info!(
            root = ?trigger.root,
            prefix = %trigger.settings.prefix,
            poll_secs = trigger.settings.poll_interval.as_secs(),
            delay_secs = trigger.settings.settle_delay.as_secs(),
            baseline = trigger.seen.len(),
            "watcher started"
        );
        Ok(trigger)
    }

    /// Matching names present at the last poll.
    pub fn seen(&self) -> &BTreeSet<String> {
        &self.seen
    }

    /// Directories whose settle-watcher has not been reaped yet.
    pub fn active_settles(&self) -> Vec<PathBuf> {
        self.registry.active_paths()
    }

    fn list_matching(&self) -> Result<BTreeSet<String>> {
        let names = self
            .fs
            .read_dir(&self.root)?
            .into_iter()
            .filter(|p| self.fs.is_dir(p))
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .filter(|name| name.starts_with(&self.settings.prefix))
            .collect();
        Ok(names)
    }

    /// One poll cycle: reap finished watchers, list the root and start a
    /// settle-watcher for every new directory. Returns the paths handed to
    /// new watchers.
    pub async fn poll_once(&mut self) -> Result<Vec<PathBuf>> {
        self.registry.reap().await;

        let mut current = self.list_matching()?;
        debug!(seen = ?self.seen, current = ?current, "poll");

        for gone in self.seen.difference(&current) {
            info!(name = %gone, "run directory disappeared; not triggering");
        }

        let mut spawned = Vec::new();
        let mut deferred = Vec::new();
        for name in new_entries(&self.seen, &current) {
            if self.triggered.contains(&name) && !self.settings.retrigger_recreated {
                info!(name = %name, "run directory re-created; already triggered once, ignoring");
                continue;
            }

            let path = self.root.join(&name);
            let watcher = SettleWatcher::new(
                path.clone(),
                self.settings.settle_delay,
                self.settings.settle_check_interval,
                Arc::clone(&self.fs),
                Arc::clone(&self.clock),
            );
            if self.registry.spawn(watcher, Arc::clone(&self.handler)) {
                self.triggered.insert(name);
                spawned.push(path);
            } else {
                warn!(path = ?path, "previous settle-watcher still running; retrying next poll");
                deferred.push(name);
            }
        }

        // Left out of `seen` so the next poll sees them as new again.
        for name in deferred.iter() {
            current.remove(name);
        }
        self.seen = current;
        if !self.registry.is_empty() {
            debug!(active = ?self.registry.active_paths(), "settle-watchers in flight");
        }
        Ok(spawned)
    }

    /// Poll forever at the configured interval.
    ///
    /// Only returns on error; the error is logged here and the loop is not
    /// restarted. Running settle-watchers are left to finish on their own.
    pub async fn run(mut self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(err) = self.poll_once().await {
                error!(root = ?self.root, error = %err, "watch loop failed; stopping");
                return Err(err);
            }
        }
    }
}
