// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File(Vec<u8>),
    Dir(Vec<String>), // child names
}

/// In-memory filesystem for watcher and item tests.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
}

fn parent_of(path: &Path) -> Option<&Path> {
    path.parent().map(|p| if p.as_os_str().is_empty() { Path::new(".") } else { p })
}

fn child_name(path: &Path) -> Option<String> {
    path.file_name().and_then(|n| n.to_str()).map(str::to_string)
}

impl MockFileSystem {
    pub fn new() -> Self {
        let mut files = HashMap::new();
        files.insert(PathBuf::from("."), MockEntry::Dir(Vec::new()));
        Self {
            files: Arc::new(Mutex::new(files)),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<PathBuf, MockEntry>> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a file, creating parent directories implicitly.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref().to_path_buf();
        let mut files = self.entries();
        files.insert(path.clone(), MockEntry::File(content.into()));
        if let Some(parent) = parent_of(&path) {
            Self::ensure_dir_entry(&mut files, parent);
            Self::link_child(&mut files, parent, &path);
        }
    }

    /// Add an empty directory.
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut files = self.entries();
        Self::ensure_dir_entry(&mut files, path.as_ref());
    }

    /// Remove a file. Returns false if there was none.
    pub fn remove_file(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let mut files = self.entries();
        if !matches!(files.get(path), Some(MockEntry::File(_))) {
            return false;
        }
        files.remove(path);
        if let (Some(parent), Some(name)) = (parent_of(path), child_name(path)) {
            if let Some(MockEntry::Dir(children)) = files.get_mut(parent) {
                children.retain(|c| *c != name);
            }
        }
        true
    }

    /// Move a file, keeping its contents.
    pub fn rename(&self, from: impl AsRef<Path>, to: impl AsRef<Path>) -> Result<()> {
        let content = match self.entries().get(from.as_ref()) {
            Some(MockEntry::File(content)) => content.clone(),
            _ => return Err(anyhow!("File not found: {:?}", from.as_ref())),
        };
        self.remove_file(from);
        self.add_file(to, content);
        Ok(())
    }

    fn ensure_dir_entry(files: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
        if files.contains_key(path) {
            return;
        }
        files.insert(path.to_path_buf(), MockEntry::Dir(Vec::new()));
        if let Some(parent) = parent_of(path) {
            if parent != path {
                Self::ensure_dir_entry(files, parent);
                Self::link_child(files, parent, path);
            }
        }
    }

    fn link_child(files: &mut HashMap<PathBuf, MockEntry>, parent: &Path, path: &Path) {
        let entry = files.get_mut(parent);
        if let (Some(MockEntry::Dir(children)), Some(name)) = (entry, child_name(path)) {
            if !children.contains(&name) {
                children.push(name);
            }
        }
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        match self.entries().get(path) {
            Some(MockEntry::File(content)) => {
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            Some(MockEntry::Dir(_)) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if matches!(self.entries().get(path), Some(MockEntry::Dir(_))) {
            return Err(anyhow!("Is a directory: {:?}", path));
        }
        self.add_file(path, contents);
        Ok(())
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.entries().get(path), Some(MockEntry::File(_)))
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let files = self.entries();
        match files.get(dir) {
            Some(MockEntry::Dir(children)) => Ok(children
                .iter()
                .map(|name| dir.join(name))
                .filter(|path| matches!(files.get(path), Some(MockEntry::File(_))))
                .collect()),
            Some(MockEntry::File(_)) => Err(anyhow!("Not a directory: {:?}", dir)),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rename_moves_file_between_listings() {
        let fs = MockFileSystem::new();
        fs.add_file("/p/a.csv", "1");
        fs.rename("/p/a.csv", "/p/b.csv").unwrap();
        assert!(!fs.is_file(Path::new("/p/a.csv")));
        assert_eq!(fs.read_to_string(Path::new("/p/b.csv")).unwrap(), "1");
        assert_eq!(fs.list_files(Path::new("/p")).unwrap(), vec![PathBuf::from("/p/b.csv")]);
        fs.add_dir("/p/sub");
        assert_eq!(fs.list_files(Path::new("/p")).unwrap().len(), 1);
        assert!(!fs.remove_file("/p/a.csv"));
    }
}
