// src/batch/units.rs

//! Input-unit discovery for stages that fan out over files.

use std::path::{Path, PathBuf};

use globset::Glob;
use tracing::debug;

use crate::errors::{FlowtriggerError, Result};
use crate::fs::FileSystem;

/// One input file of a stage, e.g. a single `*.evt` segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputUnit {
    /// Position in name order, starting at 0.
    pub index: usize,
    pub path: PathBuf,
    pub name: String,
}

/// Find the files directly inside `dir` whose name matches `pattern`.
///
/// Units are returned sorted by name. Finding none is an error: a stage
/// must never silently submit "no work".
pub fn discover_units(fs: &dyn FileSystem, dir: &Path, pattern: &str) -> Result<Vec<InputUnit>> {
    let matcher = Glob::new(pattern)
        .map_err(|e| FlowtriggerError::ConfigError(format!("invalid units glob '{pattern}': {e}")))?
        .compile_matcher();

    let mut names: Vec<(String, PathBuf)> = fs
        .read_dir(dir)?
        .into_iter()
        .filter(|p| fs.is_file(p))
        .filter_map(|p| {
            let name = p.file_name()?.to_str()?.to_string();
            matcher.is_match(&name).then_some((name, p))
        })
        .collect();
    names.sort();

    if names.is_empty() {
        return Err(FlowtriggerError::NoInputUnits {
            dir: dir.to_path_buf(),
            pattern: pattern.to_string(),
        });
    }

    debug!(dir = ?dir, pattern, count = names.len(), "discovered input units");

    Ok(names
        .into_iter()
        .enumerate()
        .map(|(index, (name, path))| InputUnit { index, path, name })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;
    use std::time::SystemTime;

    #[test]
    fn matches_files_in_name_order() {
        let fs = MockFileSystem::new();
        let t = SystemTime::UNIX_EPOCH;
        fs.add_file("/raw/run7/run-0007-01.evt", t);
        fs.add_file("/raw/run7/run-0007-00.evt", t);
        fs.add_file("/raw/run7/notes.txt", t);
        fs.add_dir("/raw/run7/sub.evt", t);

        let units = discover_units(&fs, Path::new("/raw/run7"), "*.evt").unwrap();
        let names: Vec<_> = units.iter().map(|u| (u.index, u.name.as_str())).collect();
        assert_eq!(names, vec![(0, "run-0007-00.evt"), (1, "run-0007-01.evt")]);
    }

    #[test]
    fn no_matching_units_is_an_error() {
        let fs = MockFileSystem::new();
        fs.add_file("/raw/run7/notes.txt", SystemTime::UNIX_EPOCH);

        let err = discover_units(&fs, Path::new("/raw/run7"), "*.evt").unwrap_err();
        assert!(matches!(err, FlowtriggerError::NoInputUnits { .. }));
    }
}
