// src/output_log.rs

//! Per-filter rolling log files for tool process output.
//!
//! Every `stdin`/`stdout`/`stderr` message of a tool run is appended to the
//! current log file of its filter. A new part is started when the current
//! file's body has reached the size cap; part numbers only ever grow.
//!
//! Files are named `<timestamp>_execution_<part>.log` and start with a
//! four-line `### ` header.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::Local;
use regex::Regex;
use tracing::debug;

use crate::config::DEFAULT_MAX_LOG_FILE_SIZE;
use crate::item::OutputStream;

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").expect("valid ANSI escape regex")
});

/// Remove ANSI escape sequences from `text`.
///
/// Removal is repeated until nothing matches, so that sequences formed by
/// joining the remains of a removed one are stripped as well.
pub fn strip_ansi_escape_codes(text: &str) -> String {
    let mut current = text.to_string();
    while ANSI_ESCAPE.is_match(&current) {
        current = ANSI_ESCAPE.replace_all(&current, "").into_owned();
    }
    current
}

/// Timestamp format shared by log files and result archives.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H.%M.%S";

#[derive(Debug)]
struct CurrentLog {
    path: PathBuf,
    file: File,
    body_size: u64,
}

/// Writes process output into size-capped log files, one series per filter.
#[derive(Debug)]
pub struct OutputLogWriter {
    logs_dir: PathBuf,
    item_name: String,
    max_size: u64,
    timestamp: String,
    next_part: u32,
    current: HashMap<String, CurrentLog>,
    created: HashMap<String, Vec<PathBuf>>,
}

impl OutputLogWriter {
    pub fn new(logs_dir: impl Into<PathBuf>, item_name: impl Into<String>) -> Self {
        Self::with_max_size(logs_dir, item_name, DEFAULT_MAX_LOG_FILE_SIZE)
    }

    pub fn with_max_size(
        logs_dir: impl Into<PathBuf>,
        item_name: impl Into<String>,
        max_size: u64,
    ) -> Self {
        Self {
            logs_dir: logs_dir.into(),
            item_name: item_name.into(),
            max_size: max_size.max(1),
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            next_part: 1,
            current: HashMap::new(),
            created: HashMap::new(),
        }
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    /// Log files created so far for `filter_id`, in creation order.
    pub fn log_files(&self, filter_id: &str) -> &[PathBuf] {
        self.created
            .get(filter_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Append a process output message.
    pub fn write(&mut self, filter_id: &str, stream: OutputStream, text: &str) -> io::Result<()> {
        let clean = strip_ansi_escape_codes(text);
        for line in clean.lines() {
            if line.is_empty() {
                continue;
            }
            let needs_new = match self.current.get(filter_id) {
                Some(current) => current.body_size >= self.max_size,
                None => true,
            };
            if needs_new {
                self.open_next(filter_id)?;
            }
            if let Some(current) = self.current.get_mut(filter_id) {
                current.file.write_all(line.as_bytes())?;
                current.file.write_all(b"\n")?;
                current.body_size += line.len() as u64 + 1;
            }
        }
        debug!(item = %self.item_name, filter_id, ?stream, "process output logged");
        Ok(())
    }

    fn open_next(&mut self, filter_id: &str) -> io::Result<()> {
        fs::create_dir_all(&self.logs_dir)?;

        let (path, part) = loop {
            let part = self.next_part;
            self.next_part += 1;
            let name = format!("{}_execution_{}.log", self.timestamp, part);
            let path = self.logs_dir.join(name);
            if !path.exists() {
                break (path, part);
            }
        };

        let mut file = OpenOptions::new().create_new(true).append(true).open(&path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        writeln!(file, "### Filename: {file_name}")?;
        writeln!(file, "### Item name: {}", self.item_name)?;
        writeln!(file, "### Filter id: {filter_id}")?;
        writeln!(file, "### Part: {part}")?;

        debug!(item = %self.item_name, filter_id, ?path, "started new execution log");

        self.created
            .entry(filter_id.to_string())
            .or_default()
            .push(path.clone());
        self.current.insert(
            filter_id.to_string(),
            CurrentLog {
                path,
                file,
                body_size: 0,
            },
        );
        Ok(())
    }

    /// Path of the file currently written for `filter_id`.
    pub fn current_path(&self, filter_id: &str) -> Option<&Path> {
        self.current.get(filter_id).map(|c| c.path.as_path())
    }
}
