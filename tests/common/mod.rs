#![allow(dead_code)]

use std::path::{Path, PathBuf};

use spine_items::config::AppSettings;
use spine_items::exec::ExecContext;

pub use spine_items_test_utils::builders;
pub use spine_items_test_utils::{init_tracing, RecordingSink};

/// Run a future with a 20-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(20), f)
        .await
        .expect("Test timed out after 20 seconds")
}

/// True if a `python3` interpreter can be found; interpreter tests return
/// early otherwise.
pub fn python3_available() -> bool {
    which::which("python3").is_ok()
}

/// Scratch project with a `work` directory for execute-in-work runs.
pub struct TestProject {
    pub dir: tempfile::TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("work")).expect("work dir");
        std::fs::create_dir_all(dir.path().join("tool")).expect("tool dir");
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Directory holding the specification and the program files.
    pub fn tool_dir(&self) -> PathBuf {
        self.path().join("tool")
    }

    pub fn work_dir(&self) -> PathBuf {
        self.path().join("work")
    }

    pub fn context(&self) -> ExecContext {
        ExecContext::new(AppSettings::default().with_work_dir(self.work_dir()))
    }

    /// Write a program file into the tool directory.
    pub fn write_program(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.tool_dir().join(name);
        std::fs::write(&path, contents).expect("write program");
        path
    }

    /// Write an upstream data file outside the tool directory.
    pub fn write_data(&self, rel: &str, contents: &[u8]) -> PathBuf {
        let path = self.path().join("data").join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("data dir");
        }
        std::fs::write(&path, contents).expect("write data");
        path
    }

    /// Entries of the work directory (one per execute-in-work run).
    pub fn work_entries(&self) -> Vec<PathBuf> {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(self.work_dir())
            .expect("read work dir")
            .map(|e| e.expect("entry").path())
            .collect();
        entries.sort();
        entries
    }
}

/// Timestamped directories directly inside `dir`.
pub fn timestamp_dirs(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_dir()
                && p.file_name()
                    .map(|n| spine_items::tool::archive::is_timestamp_dir_name(&n.to_string_lossy()))
                    .unwrap_or(false)
        })
        .collect();
    dirs.sort();
    dirs
}
