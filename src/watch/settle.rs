// src/watch/settle.rs

//! Settle detection for a newly discovered directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::fs::{Clock, FileSystem};
use crate::watch::SettledHandler;

/// Time since anything in `dir` last changed.
///
/// This is the smaller of the directory's own age and the age of the most
/// recently modified file directly inside it. A directory with no files is
/// judged on its own mtime alone. Files that disappear between listing and
/// stat (e.g. renamed sync temporaries) are skipped for this round.
pub fn quiescent_age(fs: &dyn FileSystem, clock: &dyn Clock, dir: &Path) -> Result<Duration> {
    let now = clock.now();
    let dir_age = age_at(now, fs.modified(dir)?);

    let mut newest_file: Option<Duration> = None;
    for entry in fs.read_dir(dir)? {
        if !fs.is_file(&entry) {
            continue;
        }
        match fs.modified(&entry) {
            Ok(mtime) => {
                let age = age_at(now, mtime);
                newest_file = Some(newest_file.map_or(age, |a| a.min(age)));
            }
            Err(err) => {
                warn!(path = ?entry, error = %err, "file vanished during settle scan; skipping");
            }
        }
    }

    Ok(newest_file.map_or(dir_age, |f| dir_age.min(f)))
}

/// mtimes in the future count as "just modified".
fn age_at(now: SystemTime, mtime: SystemTime) -> Duration {
    now.duration_since(mtime).unwrap_or(Duration::ZERO)
}

/// Waits for one directory to settle and then runs the handler once.
#[derive(Debug, Clone)]
pub struct SettleWatcher {
    path: PathBuf,
    settle_delay: Duration,
    check_interval: Duration,
    fs: Arc<dyn FileSystem>,
    clock: Arc<dyn Clock>,
}

impl SettleWatcher {
    pub fn new(
        path: PathBuf,
        settle_delay: Duration,
        check_interval: Duration,
        fs: Arc<dyn FileSystem>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            path,
            settle_delay,
            check_interval,
            fs,
            clock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sleep in `check_interval` steps until the directory has been quiet
    /// for at least `settle_delay`. Returns the age observed at that point.
    pub async fn wait_until_settled(&self) -> Result<Duration> {
        let mut age = quiescent_age(self.fs.as_ref(), self.clock.as_ref(), &self.path)?;
        info!(
            path = ?self.path,
            age_secs = age.as_secs(),
            delay_secs = self.settle_delay.as_secs(),
            "new run directory; waiting for copy-in to finish"
        );

        while age < self.settle_delay {
            debug!(
                path = ?self.path,
                age_secs = age.as_secs(),
                "directory still changing; waiting"
            );
            tokio::time::sleep(self.check_interval).await;
            age = quiescent_age(self.fs.as_ref(), self.clock.as_ref(), &self.path)?;
        }
        Ok(age)
    }

    /// Wait for the directory to settle, then invoke `handler` exactly once.
    pub async fn run(self, handler: Arc<dyn SettledHandler>) -> crate::errors::Result<()> {
        self.wait_until_settled().await?;
        info!(path = ?self.path, "triggered");
        handler.on_settled(self.path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::{MockClock, MockFileSystem};

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[tokio::test(start_paused = true)]
    async fn age_is_min_of_dir_and_newest_file() {
        let fs = MockFileSystem::new();
        fs.add_dir("/w/run1", at(900));
        fs.add_file("/w/run1/a.evt", at(950));
        fs.add_file("/w/run1/b.evt", at(980));
        let clock = MockClock::starting_at(at(1000));

        let age = quiescent_age(&fs, &clock, Path::new("/w/run1")).unwrap();
        assert_eq!(age, Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_directory_uses_directory_mtime_only() {
        let fs = MockFileSystem::new();
        fs.add_dir("/w/run1", at(400));
        let clock = MockClock::starting_at(at(1000));

        let age = quiescent_age(&fs, &clock, Path::new("/w/run1")).unwrap();
        assert_eq!(age, Duration::from_secs(600));
    }

    #[tokio::test(start_paused = true)]
    async fn vanished_file_is_ignored() {
        let fs = MockFileSystem::new();
        fs.add_dir("/w/run1", at(100));
        fs.add_file("/w/run1/a.evt", at(200));
        fs.add_vanishing_file("/w/run1/.b.evt.XYZ");
        let clock = MockClock::starting_at(at(1000));

        let age = quiescent_age(&fs, &clock, Path::new("/w/run1")).unwrap();
        assert_eq!(age, Duration::from_secs(800));
    }

    #[tokio::test(start_paused = true)]
    async fn subdirectories_do_not_count_as_files() {
        let fs = MockFileSystem::new();
        fs.add_dir("/w/run1", at(100));
        fs.add_dir("/w/run1/logs", at(999));
        let clock = MockClock::starting_at(at(1000));

        let age = quiescent_age(&fs, &clock, Path::new("/w/run1")).unwrap();
        assert_eq!(age, Duration::from_secs(900));
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let fs = MockFileSystem::new();
        let clock = MockClock::starting_at(at(1000));
        assert!(quiescent_age(&fs, &clock, Path::new("/w/gone")).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn waits_in_check_interval_steps() {
        let fs = Arc::new(MockFileSystem::new());
        fs.add_dir("/w/run1", at(1000));
        fs.add_file("/w/run1/a.evt", at(1000));
        let clock = Arc::new(MockClock::starting_at(at(1000)));

        let watcher = SettleWatcher::new(
            PathBuf::from("/w/run1"),
            Duration::from_secs(12),
            Duration::from_secs(5),
            fs,
            clock.clone(),
        );
        let age = watcher.wait_until_settled().await.unwrap();

        // Checks at 0s, 5s, 10s, 15s: the first at or past 12s is 15s.
        assert_eq!(age, Duration::from_secs(15));
        assert_eq!(clock.now(), at(1015));
    }
}
