// src/watch/references.rs

//! Reference bookkeeping of a Data Connection.
//!
//! The watcher keeps one snapshot per directory it cares about: the parent
//! of every file reference and every explicitly watched directory (the DC's
//! data directory). Coarse "directory changed" notifications are turned
//! into reference events by diffing snapshots.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::fs::FileSystem;
use crate::watch::snapshot::{diff_snapshots, DirectorySnapshot, FileEvent};

/// What happened to a watched file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceEvent {
    /// A reference (or a file of a watched directory) was renamed.
    Renamed { old: PathBuf, new: PathBuf },
    /// A reference disappeared; it stays in the list marked missing.
    Missing(PathBuf),
    /// A missing reference is back.
    Found(PathBuf),
    /// A new file appeared in a watched directory.
    Added(PathBuf),
    /// A file of a watched directory that is not a reference was removed.
    Removed(PathBuf),
}

impl ReferenceEvent {
    pub fn path(&self) -> &Path {
        match self {
            ReferenceEvent::Renamed { new, .. } => new,
            ReferenceEvent::Missing(p)
            | ReferenceEvent::Found(p)
            | ReferenceEvent::Added(p)
            | ReferenceEvent::Removed(p) => p,
        }
    }
}

#[derive(Debug)]
pub struct ReferenceWatcher {
    fs: Arc<dyn FileSystem>,
    references: BTreeSet<PathBuf>,
    missing: BTreeSet<PathBuf>,
    /// Database files: references that never follow a rename.
    pinned: BTreeSet<PathBuf>,
    watched_dirs: BTreeSet<PathBuf>,
    snapshots: BTreeMap<PathBuf, DirectorySnapshot>,
}

impl ReferenceWatcher {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            references: BTreeSet::new(),
            missing: BTreeSet::new(),
            pinned: BTreeSet::new(),
            watched_dirs: BTreeSet::new(),
            snapshots: BTreeMap::new(),
        }
    }

    pub fn references(&self) -> &BTreeSet<PathBuf> {
        &self.references
    }

    pub fn missing(&self) -> &BTreeSet<PathBuf> {
        &self.missing
    }

    pub fn is_missing(&self, path: &Path) -> bool {
        self.missing.contains(path)
    }

    /// Directories that currently need OS-level watching.
    pub fn directories(&self) -> Vec<PathBuf> {
        self.snapshots.keys().cloned().collect()
    }

    pub fn snapshot(&self, dir: &Path) -> Option<&DirectorySnapshot> {
        self.snapshots.get(dir)
    }

    /// Start tracking a file. Returns `Missing` if it does not exist.
    pub fn add_file_reference(&mut self, path: impl Into<PathBuf>) -> Option<ReferenceEvent> {
        let path = path.into();
        if !self.references.insert(path.clone()) {
            return None;
        }
        if let Some(dir) = path.parent() {
            self.ensure_snapshot(dir);
        }
        if self.fs.is_file(&path) {
            None
        } else {
            self.missing.insert(path.clone());
            Some(ReferenceEvent::Missing(path))
        }
    }

    /// Track the file of a SQLite database reference.
    ///
    /// The database URL names this exact path, so a rename makes the
    /// reference `Missing` instead of moving it; it is `Found` again once a
    /// file reappears under the old name.
    pub fn add_database_file(&mut self, path: impl Into<PathBuf>) -> Option<ReferenceEvent> {
        let path = path.into();
        self.pinned.insert(path.clone());
        self.add_file_reference(path)
    }

    pub fn remove_file_reference(&mut self, path: &Path) -> bool {
        if !self.references.remove(path) {
            return false;
        }
        self.missing.remove(path);
        self.pinned.remove(path);
        if let Some(dir) = path.parent() {
            self.release_snapshot(dir);
        }
        true
    }

    /// Watch every file of `dir`, e.g. a data directory.
    pub fn watch_directory(&mut self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        self.ensure_snapshot(&dir);
        self.watched_dirs.insert(dir);
    }

    pub fn unwatch_directory(&mut self, dir: &Path) {
        if self.watched_dirs.remove(dir) {
            self.release_snapshot(dir);
        }
    }

    /// Re-scan `dir` and report what changed for references and watched
    /// directories.
    pub fn handle_directory_changed(&mut self, dir: &Path) -> Vec<ReferenceEvent> {
        let Some(old) = self.snapshots.get(dir) else {
            debug!(?dir, "change in unwatched directory ignored");
            return Vec::new();
        };
        let new = match DirectorySnapshot::scan(self.fs.as_ref(), dir) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(?dir, error = %err, "failed to scan directory");
                return Vec::new();
            }
        };
        let file_events = diff_snapshots(old, &new);
        self.snapshots.insert(dir.to_path_buf(), new);

        let watched = self.watched_dirs.contains(dir);
        let mut events = Vec::new();
        for event in file_events {
            match event {
                FileEvent::Renamed { old, new } => {
                    if self.pinned.contains(&old) {
                        self.missing.insert(old.clone());
                        events.push(ReferenceEvent::Missing(old));
                        if self.missing.remove(&new) {
                            events.push(ReferenceEvent::Found(new));
                        } else if watched {
                            events.push(ReferenceEvent::Added(new));
                        }
                    } else if self.references.remove(&old) {
                        self.missing.remove(&old);
                        self.references.insert(new.clone());
                        self.missing.remove(&new);
                        events.push(ReferenceEvent::Renamed { old, new });
                    } else if self.missing.contains(&new) {
                        self.missing.remove(&new);
                        events.push(ReferenceEvent::Found(new));
                    } else if watched {
                        events.push(ReferenceEvent::Renamed { old, new });
                    }
                }
                FileEvent::Removed(path) => {
                    if self.references.contains(&path) {
                        self.missing.insert(path.clone());
                        events.push(ReferenceEvent::Missing(path));
                    } else if watched {
                        events.push(ReferenceEvent::Removed(path));
                    }
                }
                FileEvent::Added(path) => {
                    if self.missing.remove(&path) {
                        events.push(ReferenceEvent::Found(path));
                    } else if watched {
                        events.push(ReferenceEvent::Added(path));
                    }
                }
            }
        }
        debug!(?dir, events = events.len(), "directory change handled");
        events
    }

    /// Check a missing reference again; `Found` if it is back.
    pub fn recheck_missing(&mut self, path: &Path) -> Option<ReferenceEvent> {
        if !self.missing.contains(path) || !self.fs.is_file(path) {
            return None;
        }
        self.missing.remove(path);
        if let Some(dir) = path.parent() {
            if let Some(snapshot) = self.snapshots.get_mut(dir) {
                snapshot.insert(path.to_path_buf());
            }
        }
        Some(ReferenceEvent::Found(path.to_path_buf()))
    }

    fn ensure_snapshot(&mut self, dir: &Path) {
        if self.snapshots.contains_key(dir) {
            return;
        }
        let snapshot = DirectorySnapshot::scan(self.fs.as_ref(), dir).unwrap_or_else(|err| {
            warn!(?dir, error = %err, "failed to scan directory; starting empty");
            DirectorySnapshot::from_files(dir, Vec::new())
        });
        self.snapshots.insert(dir.to_path_buf(), snapshot);
    }

    fn release_snapshot(&mut self, dir: &Path) {
        let still_needed = self.watched_dirs.contains(dir)
            || self.references.iter().any(|r| r.parent() == Some(dir));
        if !still_needed {
            self.snapshots.remove(dir);
        }
    }
}
