// src/watch/snapshot.rs

//! Directory snapshots and the file events derived from them.
//!
//! Native watch APIs differ in granularity, so the watcher only relies on
//! "this directory changed" and diffs two snapshots to learn what happened.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::fs::FileSystem;

/// The files directly inside a directory at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorySnapshot {
    dir: PathBuf,
    files: BTreeSet<PathBuf>,
}

impl DirectorySnapshot {
    /// Scan `dir` (non-recursively). A missing directory yields an empty
    /// snapshot.
    pub fn scan(fs: &dyn FileSystem, dir: &Path) -> Result<Self> {
        Ok(Self {
            dir: dir.to_path_buf(),
            files: fs.list_files(dir)?.into_iter().collect(),
        })
    }

    pub fn from_files(dir: impl Into<PathBuf>, files: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: files.into_iter().collect(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn files(&self) -> &BTreeSet<PathBuf> {
        &self.files
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains(path)
    }

    pub fn insert(&mut self, path: PathBuf) {
        self.files.insert(path);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// A file level change inside one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    Renamed { old: PathBuf, new: PathBuf },
    Removed(PathBuf),
    Added(PathBuf),
}

/// Events turning `old` into `new`.
///
/// Removed and added files are paired up in path order and reported as
/// renames; whatever is left over is reported as removed or added. A single
/// rename between two scans is therefore always detected exactly.
pub fn diff_snapshots(old: &DirectorySnapshot, new: &DirectorySnapshot) -> Vec<FileEvent> {
    let removed: Vec<&PathBuf> = old.files.difference(&new.files).collect();
    let added: Vec<&PathBuf> = new.files.difference(&old.files).collect();
    let paired = removed.len().min(added.len());

    let mut events = Vec::with_capacity(removed.len().max(added.len()));
    for (old_path, new_path) in removed.iter().zip(added.iter()).take(paired) {
        events.push(FileEvent::Renamed {
            old: (*old_path).clone(),
            new: (*new_path).clone(),
        });
    }
    events.extend(
        removed[paired..]
            .iter()
            .map(|p| FileEvent::Removed((*p).clone())),
    );
    events.extend(added[paired..].iter().map(|p| FileEvent::Added((*p).clone())));
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(names: &[&str]) -> DirectorySnapshot {
        DirectorySnapshot::from_files("/d", names.iter().map(|n| Path::new("/d").join(n)))
    }

    #[test]
    fn single_rename_is_exact() {
        let events = diff_snapshots(&snap(&["a.txt", "b.txt"]), &snap(&["a.txt", "c.txt"]));
        assert_eq!(
            events,
            vec![FileEvent::Renamed {
                old: PathBuf::from("/d/b.txt"),
                new: PathBuf::from("/d/c.txt"),
            }]
        );
    }

    #[test]
    fn leftovers_are_removed_or_added() {
        let events = diff_snapshots(&snap(&["a", "b", "c"]), &snap(&["x"]));
        assert_eq!(
            events,
            vec![
                FileEvent::Renamed {
                    old: PathBuf::from("/d/a"),
                    new: PathBuf::from("/d/x"),
                },
                FileEvent::Removed(PathBuf::from("/d/b")),
                FileEvent::Removed(PathBuf::from("/d/c")),
            ]
        );
        assert!(diff_snapshots(&snap(&["a"]), &snap(&["a"])).is_empty());
    }
}
