// src/tool/archive.rs

//! Result archives: timestamped copies of a run's output files.
//!
//! Layout under an item's data directory:
//!
//! ```text
//! output/
//!   [<filter hash>/]
//!     <timestamp>/            successful runs
//!     failed/<timestamp>/     failed runs
//!     .filter_id              sentinel naming the filter
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::Local;
use regex::Regex;
use tracing::{debug, warn};

use crate::errors::{ItemError, Result};
use crate::output_log::TIMESTAMP_FORMAT;
use crate::resource::is_pattern;
use crate::tool::patterns::glob_paths;
use crate::tool::staging::{copy_dir_recursive, copy_file};

/// Name of the directory holding archives of failed runs.
pub const FAILED_DIR: &str = "failed";

/// Name of the sentinel recording the filter id of a filter output dir.
pub const FILTER_ID_FILE: &str = ".filter_id";

static TIMESTAMP_DIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}\.\d{2}\.\d{2}$").expect("valid timestamp regex")
});

/// Outcome of archiving a run's outputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveReport {
    pub result_dir: PathBuf,
    /// Files written into the archive.
    pub archived: Vec<PathBuf>,
    /// Literal output entries that did not exist or failed to copy.
    pub failed_files: Vec<String>,
}

/// Current time formatted for archive directory names.
pub fn timestamp_now() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// True if `name` looks like an archive directory name.
pub fn is_timestamp_dir_name(name: &str) -> bool {
    TIMESTAMP_DIR.is_match(name)
}

/// Stable directory name for a filter id: 40 hex characters of its digest.
pub fn filter_subdir(filter_id: &str) -> String {
    let digest = blake3::hash(filter_id.as_bytes()).to_hex();
    digest.as_str()[..40].to_string()
}

/// Output directory of an item for a filter. An empty filter id means the
/// unfiltered output directory.
pub fn filter_output_dir(output_root: &Path, filter_id: &str) -> PathBuf {
    if filter_id.is_empty() {
        output_root.to_path_buf()
    } else {
        output_root.join(filter_subdir(filter_id))
    }
}

/// Record `filter_id` next to the archives of a filter output directory.
pub fn write_filter_id_sentinel(filter_dir: &Path, filter_id: &str) -> Result<()> {
    fs::create_dir_all(filter_dir)
        .map_err(|e| ItemError::ArchiveIo(format!("{}: {e}", filter_dir.display())))?;
    let path = filter_dir.join(FILTER_ID_FILE);
    fs::write(&path, filter_id)
        .map_err(|e| ItemError::ArchiveIo(format!("{}: {e}", path.display())))?;
    Ok(())
}

/// Directory a run's outputs are archived into.
pub fn result_dir(output_dir: &Path, success: bool, timestamp: &str) -> PathBuf {
    if success {
        output_dir.join(timestamp)
    } else {
        output_dir.join(FAILED_DIR).join(timestamp)
    }
}

/// Copy the declared output files from `exec_dir` into `result_dir`.
///
/// Pattern entries copy every filesystem hit; literal entries that do not
/// exist are listed in `failed_files`. Sub-directories are preserved. Only
/// failing to create `result_dir` itself is an error; individual copy
/// failures are recorded and logged.
pub fn archive_output_files(
    outputfiles: impl IntoIterator<Item = impl AsRef<str>>,
    exec_dir: &Path,
    result_dir: &Path,
) -> Result<ArchiveReport> {
    fs::create_dir_all(result_dir)
        .map_err(|e| ItemError::ArchiveIo(format!("{}: {e}", result_dir.display())))?;

    let mut report = ArchiveReport {
        result_dir: result_dir.to_path_buf(),
        ..ArchiveReport::default()
    };

    for output in outputfiles {
        let output = output.as_ref();
        if is_pattern(output) {
            let hits = match glob_paths(&exec_dir.join(output)) {
                Ok(hits) => hits,
                Err(err) => {
                    warn!(pattern = %output, error = %err, "could not expand output pattern");
                    report.failed_files.push(output.to_string());
                    continue;
                }
            };
            for hit in hits {
                let rel = hit.strip_prefix(exec_dir).unwrap_or(&hit);
                let dst = result_dir.join(rel);
                match copy_entry(&hit, &dst) {
                    Ok(()) => report.archived.push(dst),
                    Err(err) => {
                        warn!(file = ?hit, error = %err, "failed to archive output file");
                        report.failed_files.push(rel.to_string_lossy().into_owned());
                    }
                }
            }
        } else {
            let src = exec_dir.join(output);
            if !src.exists() {
                report.failed_files.push(output.to_string());
                continue;
            }
            let dst = result_dir.join(output);
            match copy_entry(&src, &dst) {
                Ok(()) => report.archived.push(dst),
                Err(err) => {
                    warn!(file = ?src, error = %err, "failed to archive output file");
                    report.failed_files.push(output.to_string());
                }
            }
        }
    }

    debug!(
        result_dir = ?report.result_dir,
        archived = report.archived.len(),
        failed = report.failed_files.len(),
        "archived output files"
    );
    Ok(report)
}

fn copy_entry(src: &Path, dst: &Path) -> Result<()> {
    if src.is_dir() {
        copy_dir_recursive(src, dst).map(|_| ())
    } else {
        copy_file(src, dst)
    }
}

/// Find the latest archive directory under `dir`.
///
/// Looks at timestamp-named directories directly in `dir` and one level
/// further down (filter sub-directories). `failed` directories are skipped.
pub fn find_last_output_dir(dir: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<(String, PathBuf)> = Vec::new();
    for path in list_dirs(dir) {
        let Some(name) = dir_name(&path) else {
            continue;
        };
        if name == FAILED_DIR {
            continue;
        }
        if is_timestamp_dir_name(&name) {
            candidates.push((name, path));
            continue;
        }
        for sub in list_dirs(&path) {
            let Some(sub_name) = dir_name(&sub) else {
                continue;
            };
            if sub_name != FAILED_DIR && is_timestamp_dir_name(&sub_name) {
                candidates.push((sub_name, sub));
            }
        }
    }
    candidates
        .into_iter()
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, path)| path)
}

/// For every output entry, the files of the latest archive it produced.
pub fn find_last_output_files(
    outputfiles: impl IntoIterator<Item = impl AsRef<str>>,
    output_dir: &Path,
) -> BTreeMap<String, Vec<PathBuf>> {
    let mut found = BTreeMap::new();
    let Some(latest) = find_last_output_dir(output_dir) else {
        return found;
    };
    for output in outputfiles {
        let output = output.as_ref();
        let files = if is_pattern(output) {
            glob_paths(&latest.join(output))
                .unwrap_or_default()
                .into_iter()
                .filter(|p| p.is_file())
                .collect()
        } else {
            let path = latest.join(output);
            if path.exists() { vec![path] } else { Vec::new() }
        };
        found.insert(output.to_string(), files);
    }
    found
}

fn list_dirs(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect()
}

fn dir_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}
