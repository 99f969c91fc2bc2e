// src/watch/path_utils.rs

//! Utility functions for path handling in the watcher.

use std::path::{Path, PathBuf};

/// The watched directory an event path belongs to.
///
/// Event paths are either a file directly inside a watched directory or the
/// directory itself. A plain comparison is tried first; if that fails (e.g.
/// symlinks or `/private/var` on macOS) both sides are canonicalized.
pub fn watched_dir_of(path: &Path, dirs: &[PathBuf]) -> Option<PathBuf> {
    let parent = path.parent();
    if let Some(dir) = dirs
        .iter()
        .find(|d| d.as_path() == path || Some(d.as_path()) == parent)
    {
        return Some(dir.clone());
    }

    let path_canon = canonical_or_parent(path)?;
    let parent_canon = path_canon.parent().map(Path::to_path_buf);
    dirs.iter()
        .find(|d| match d.canonicalize() {
            Ok(canon) => canon == path_canon || Some(&canon) == parent_canon.as_ref(),
            Err(_) => false,
        })
        .cloned()
}

/// Canonical form of `path`; a removed file is canonicalized through its
/// parent.
fn canonical_or_parent(path: &Path) -> Option<PathBuf> {
    if let Ok(canon) = path.canonicalize() {
        return Some(canon);
    }
    let parent = path.parent()?.canonicalize().ok()?;
    Some(parent.join(path.file_name()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_files_and_directories_to_watched_dir() {
        let dirs = vec![PathBuf::from("/w/a"), PathBuf::from("/w/b")];
        assert_eq!(
            watched_dir_of(Path::new("/w/b/x.csv"), &dirs),
            Some(PathBuf::from("/w/b"))
        );
        assert_eq!(watched_dir_of(Path::new("/w/a"), &dirs), Some(PathBuf::from("/w/a")));
        assert_eq!(watched_dir_of(Path::new("/nowhere/x.csv"), &dirs), None);
    }

    #[cfg(unix)]
    #[test]
    fn canonical_fallback_handles_symlinked_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("data");
        std::fs::create_dir(&dir).unwrap();
        let link = tmp.path().join("link");
        std::os::unix::fs::symlink(&dir, &link).unwrap();
        let dirs = vec![link.clone()];
        assert_eq!(watched_dir_of(&dir.join("gone.csv"), &dirs), Some(link));
    }
}
