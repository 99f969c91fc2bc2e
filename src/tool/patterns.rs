// src/tool/patterns.rs

//! Glob dialect used for optional inputs and output files.
//!
//! `*` matches within one path segment, `?` one character, `[seq]` and
//! `[!seq]` character classes, and `**` any number of directories. Matching
//! is done on forward-slash paths.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobMatcher};
use walkdir::WalkDir;

use crate::resource::posix_string;

/// Compile a pattern in the tool glob dialect.
pub fn compile(pattern: &str) -> Result<GlobMatcher> {
    let glob = GlobBuilder::new(pattern)
        .literal_separator(true)
        .backslash_escape(false)
        .build()
        .with_context(|| format!("invalid glob pattern '{pattern}'"))?;
    Ok(glob.compile_matcher())
}

/// Compile `pattern` so that it matches anywhere inside an absolute path.
pub fn compile_anywhere(pattern: &str) -> Result<GlobMatcher> {
    let trimmed = pattern.trim_start_matches("./").trim_start_matches('/');
    compile(&format!("**/{trimmed}"))
}

/// True if a path component contains glob meta-characters.
pub fn has_meta(s: &str) -> bool {
    s.contains('*') || s.contains('?') || s.contains('[')
}

/// Expand a glob against the filesystem, returning sorted existing paths.
///
/// The walk starts at the longest leading part of `pattern` without
/// meta-characters. A pattern without meta-characters yields itself if it
/// exists.
pub fn glob_paths(pattern: &Path) -> Result<Vec<PathBuf>> {
    let pattern_str = posix_string(pattern);
    if !has_meta(&pattern_str) {
        return Ok(if pattern.exists() {
            vec![pattern.to_path_buf()]
        } else {
            Vec::new()
        });
    }

    let mut base = PathBuf::new();
    let mut rest_depth = 0usize;
    let mut recursive = false;
    let mut in_pattern = false;
    for component in pattern.components() {
        let text = component.as_os_str().to_string_lossy();
        if !in_pattern && !has_meta(&text) {
            base.push(component.as_os_str());
            continue;
        }
        in_pattern = true;
        if matches!(component, Component::Normal(_)) {
            rest_depth += 1;
            if text == "**" {
                recursive = true;
            }
        }
    }
    if base.as_os_str().is_empty() {
        base = PathBuf::from(".");
    }
    if !base.is_dir() {
        return Ok(Vec::new());
    }

    let matcher = compile(&pattern_str)?;
    let mut walker = WalkDir::new(&base).min_depth(1);
    if !recursive {
        walker = walker.max_depth(rest_depth);
    }

    let mut hits = Vec::new();
    for entry in walker.into_iter().filter_map(|e| e.ok()) {
        let candidate = if base == Path::new(".") {
            entry.path().strip_prefix(".").unwrap_or(entry.path()).to_path_buf()
        } else {
            entry.path().to_path_buf()
        };
        if matcher.is_match(posix_string(&candidate)) {
            hits.push(entry.path().to_path_buf());
        }
    }
    hits.sort();
    Ok(hits)
}

/// Split a pattern into its directory part (if free of meta-characters) and
/// the last component.
pub fn split_dir(pattern: &str) -> (Option<&str>, &str) {
    let trimmed = pattern.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((dir, base)) if !dir.is_empty() && !has_meta(dir) => (Some(dir), base),
        Some((_, base)) => (None, base),
        None => (None, trimmed),
    }
}
