// src/fs/mock.rs

use super::{Clock, FileSystem};
use anyhow::{anyhow, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

#[derive(Debug, Clone)]
pub enum MockEntry {
    File { mtime: SystemTime },
    Dir { children: Vec<String>, mtime: SystemTime },
}

/// In-memory filesystem for tests.
///
/// Paths are used verbatim (no normalisation). Parent directories are
/// created implicitly with an mtime of `UNIX_EPOCH` unless added explicitly.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
    /// Paths that are listed by `read_dir` but fail on `modified`.
    vanishing: Arc<Mutex<HashSet<PathBuf>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dir(&self, path: impl AsRef<Path>, mtime: SystemTime) {
        let path = path.as_ref().to_path_buf();
        let mut files = self.files.lock().unwrap();
        let children = match files.remove(&path) {
            Some(MockEntry::Dir { children, .. }) => children,
            _ => Vec::new(),
        };
        files.insert(path.clone(), MockEntry::Dir { children, mtime });
        Self::link_to_parent(&mut files, &path);
    }

    pub fn add_file(&self, path: impl AsRef<Path>, mtime: SystemTime) {
        let path = path.as_ref().to_path_buf();
        let mut files = self.files.lock().unwrap();
        files.insert(path.clone(), MockEntry::File { mtime });
        Self::link_to_parent(&mut files, &path);
    }

    /// Add a file that shows up in listings but disappears before it can be
    /// stat'ed, like an rsync temporary being renamed.
    pub fn add_vanishing_file(&self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.add_file(&path, SystemTime::UNIX_EPOCH);
        self.vanishing.lock().unwrap().insert(path);
    }

    pub fn set_mtime(&self, path: impl AsRef<Path>, new_mtime: SystemTime) {
        let mut files = self.files.lock().unwrap();
        match files.get_mut(path.as_ref()) {
            Some(MockEntry::File { mtime }) | Some(MockEntry::Dir { mtime, .. }) => {
                *mtime = new_mtime;
            }
            None => {}
        }
    }

    /// Remove an entry (and, for directories, everything below it).
    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut files = self.files.lock().unwrap();
        files.retain(|p, _| !p.starts_with(path));
        if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
            if let Some(MockEntry::Dir { children, .. }) = files.get_mut(parent) {
                children.retain(|c| c.as_str() != name.to_string_lossy());
            }
        }
    }

    fn link_to_parent(files: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
        let Some(parent) = path.parent() else {
            return;
        };
        if parent.as_os_str().is_empty() || parent == path {
            return;
        }
        if !files.contains_key(parent) {
            files.insert(
                parent.to_path_buf(),
                MockEntry::Dir {
                    children: Vec::new(),
                    mtime: SystemTime::UNIX_EPOCH,
                },
            );
            Self::link_to_parent(files, parent);
        }
        if let Some(MockEntry::Dir { children, .. }) = files.get_mut(parent) {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if !children.iter().any(|c| c == name) {
                    children.push(name.to_string());
                }
            }
        }
    }
}

impl FileSystem for MockFileSystem {
    fn is_file(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap();
        matches!(files.get(path), Some(MockEntry::File { .. }))
    }

    fn is_dir(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap();
        matches!(files.get(path), Some(MockEntry::Dir { .. }))
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        // Paths in tests are already absolute.
        if self.files.lock().unwrap().contains_key(path) {
            Ok(path.to_path_buf())
        } else {
            Err(anyhow!("File not found: {:?}", path))
        }
    }

    fn modified(&self, path: &Path) -> Result<SystemTime> {
        if self.vanishing.lock().unwrap().contains(path) {
            return Err(anyhow!("File not found: {:?}", path));
        }
        let files = self.files.lock().unwrap();
        match files.get(path) {
            Some(MockEntry::File { mtime }) | Some(MockEntry::Dir { mtime, .. }) => Ok(*mtime),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let files = self.files.lock().unwrap();
        match files.get(path) {
            Some(MockEntry::Dir { children, .. }) => {
                Ok(children.iter().map(|name| path.join(name)).collect())
            }
            _ => Err(anyhow!("Not a directory or not found: {:?}", path)),
        }
    }
}

/// Clock pinned to a base wall-clock time that advances with Tokio's clock.
///
/// Under `#[tokio::test(start_paused = true)]` the reported time moves only
/// as far as the test's (auto-advanced) sleeps, so settle timing is exact.
#[derive(Debug, Clone)]
pub struct MockClock {
    base: SystemTime,
    start: tokio::time::Instant,
}

impl MockClock {
    pub fn starting_at(base: SystemTime) -> Self {
        Self {
            base,
            start: tokio::time::Instant::now(),
        }
    }
}

impl Clock for MockClock {
    fn now(&self) -> SystemTime {
        self.base + self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn implicit_parents_are_listed() {
        let fs = MockFileSystem::new();
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(10);
        fs.add_file("/data/run1/a.evt", t);

        assert!(fs.is_dir(Path::new("/data")));
        assert!(fs.is_dir(Path::new("/data/run1")));
        assert_eq!(
            fs.read_dir(Path::new("/data")).unwrap(),
            vec![PathBuf::from("/data/run1")]
        );
        assert_eq!(fs.modified(Path::new("/data/run1/a.evt")).unwrap(), t);
    }

    #[test]
    fn vanishing_file_is_listed_but_not_statable() {
        let fs = MockFileSystem::new();
        fs.add_vanishing_file("/data/run1/.a.evt.tmp");

        let listed = fs.read_dir(Path::new("/data/run1")).unwrap();
        assert_eq!(listed.len(), 1);
        assert!(fs.modified(&listed[0]).is_err());
    }

    #[test]
    fn remove_unlinks_from_parent() {
        let fs = MockFileSystem::new();
        fs.add_dir("/data/run1", SystemTime::UNIX_EPOCH);
        fs.add_file("/data/run1/a.evt", SystemTime::UNIX_EPOCH);
        fs.remove("/data/run1");

        assert!(!fs.is_file(Path::new("/data/run1/a.evt")));
        assert!(fs.read_dir(Path::new("/data")).unwrap().is_empty());
    }
}
