// src/tool/staging.rs

//! Materialising the execution directory of a tool run.
//!
//! Staging happens strictly before launch:
//! 1. create the execution directory (work mode) and copy program files,
//! 2. resolve and copy required input files, create required directories,
//! 3. resolve and copy optional inputs,
//! 4. pre-create output directories.
//!
//! Any IO error aborts staging with [`ItemError::StageIo`].

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::errors::{ItemError, Result};
use crate::item::ItemLogger;
use crate::resource::{posix_string, ProjectItemResource, ResourceType};
use crate::spec::ToolSpecification;
use crate::tool::patterns::{compile_anywhere, glob_paths, has_meta, split_dir};

/// Required inputs resolved against the available resources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedInputs {
    /// Spec entry (possibly with sub-directories) -> source file.
    pub files: BTreeMap<String, PathBuf>,
    /// Entries ending in `/`: directories to create.
    pub dirs: Vec<String>,
}

/// Create the directory a run executes in.
///
/// - work mode: `<work_root>/<short-name>__<uuid>__toolbox`, freshly created
/// - source mode: the specification's source directory, or its definition
///   directory for command-only executables
pub fn create_execution_dir(spec: &ToolSpecification, work_root: Option<&Path>) -> Result<PathBuf> {
    match work_root {
        Some(root) => {
            let dir_name = format!(
                "{}__{}__toolbox",
                spec.short_name(),
                Uuid::new_v4().simple()
            );
            let dir = root.join(dir_name);
            fs::create_dir_all(&dir).map_err(|e| ItemError::stage_io(&dir, e))?;
            debug!(?dir, "created work directory");
            Ok(dir)
        }
        None => {
            if spec.main_prgm().is_some() {
                Ok(spec.path().to_path_buf())
            } else {
                Ok(spec.definition_dir().to_path_buf())
            }
        }
    }
}

/// Copy the specification's program files from its source directory into
/// `exec_dir`, keeping their relative layout.
pub fn copy_program_files(spec: &ToolSpecification, exec_dir: &Path) -> Result<usize> {
    let mut count = 0;
    for include in spec.includes() {
        let src = spec.path().join(include);
        let dst = exec_dir.join(include);
        if src.is_dir() {
            count += copy_dir_recursive(&src, &dst)?;
        } else {
            copy_file(&src, &dst)?;
            count += 1;
        }
    }
    Ok(count)
}

/// Paths offered by `resources`.
///
/// Paths with glob meta-characters are expanded against the filesystem;
/// label-only pack members contribute their label verbatim.
pub fn expand_resource_paths(resources: &[ProjectItemResource]) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for resource in resources {
        match resource.path() {
            Some(path) => {
                if has_meta(&posix_string(&path)) {
                    match glob_paths(&path) {
                        Ok(hits) => paths.extend(hits),
                        Err(err) => debug!(error = %err, ?path, "skipping unusable resource path"),
                    }
                } else {
                    paths.push(path);
                }
            }
            None if resource.type_ == ResourceType::FileInPack => {
                paths.push(PathBuf::from(&resource.label));
            }
            None => {}
        }
    }
    paths
}

/// Resolve `inputfiles` of `spec` against `resources`.
///
/// Matching is by case-folded basename; the first match wins and a warning is
/// logged if there were several. Fails with every unresolved entry listed.
pub fn find_input_files(
    spec: &ToolSpecification,
    resources: &[ProjectItemResource],
    logger: &ItemLogger,
) -> Result<ResolvedInputs> {
    let available = expand_resource_paths(resources);
    let mut resolved = ResolvedInputs::default();
    let mut unresolved = Vec::new();

    for entry in spec.inputfiles() {
        if entry.ends_with('/') {
            resolved.dirs.push(entry.clone());
            continue;
        }
        let (_, base) = split_dir(entry);
        let wanted = base.to_lowercase();
        let matches: Vec<&PathBuf> = available
            .iter()
            .filter(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().to_lowercase() == wanted)
                    .unwrap_or(false)
            })
            .collect();
        match matches.as_slice() {
            [] => unresolved.push(entry.clone()),
            [first, rest @ ..] => {
                if !rest.is_empty() {
                    logger.msg_warning(format!(
                        "Multiple input files satisfy {entry}; using {}",
                        first.display()
                    ));
                }
                resolved.files.insert(entry.clone(), (*first).clone());
            }
        }
    }

    if !unresolved.is_empty() {
        return Err(ItemError::MissingRequiredInput(unresolved));
    }
    Ok(resolved)
}

/// Copy resolved required inputs and create required directories.
pub fn copy_input_files(resolved: &ResolvedInputs, exec_dir: &Path) -> Result<usize> {
    for dir in &resolved.dirs {
        let path = exec_dir.join(dir.trim_end_matches('/'));
        fs::create_dir_all(&path).map_err(|e| ItemError::stage_io(&path, e))?;
    }
    let mut count = 0;
    for (entry, src) in &resolved.files {
        let dst = exec_dir.join(entry);
        copy_file(src, &dst)?;
        count += 1;
    }
    Ok(count)
}

/// Match `inputfiles_opt` patterns against the available paths.
///
/// Patterns whose last component is empty are ignored. Every pattern gets an
/// entry, possibly empty.
pub fn find_optional_input_files(
    spec: &ToolSpecification,
    resources: &[ProjectItemResource],
) -> Result<BTreeMap<String, Vec<PathBuf>>> {
    let available = expand_resource_paths(resources);
    let mut found = BTreeMap::new();
    for pattern in spec.inputfiles_opt() {
        let (_, base) = split_dir(pattern);
        if base.is_empty() || pattern.ends_with('/') {
            continue;
        }
        let matcher = compile_anywhere(pattern)?;
        let hits: Vec<PathBuf> = available
            .iter()
            .filter(|p| matcher.is_match(posix_string(p)))
            .cloned()
            .collect();
        found.insert(pattern.clone(), hits);
    }
    Ok(found)
}

/// Copy optional inputs to `exec_dir/<dir of pattern>/<file name>`.
///
/// Patterns without matches are reported as warnings only.
pub fn copy_optional_input_files(
    found: &BTreeMap<String, Vec<PathBuf>>,
    exec_dir: &Path,
    logger: &ItemLogger,
) -> Result<usize> {
    let mut count = 0;
    for (pattern, paths) in found {
        if paths.is_empty() {
            logger.msg_warning(format!("No files matching pattern {pattern} found"));
            continue;
        }
        let (dir, _) = split_dir(pattern);
        let target_dir = match dir {
            Some(dir) => exec_dir.join(dir),
            None => exec_dir.to_path_buf(),
        };
        for src in paths {
            let Some(name) = src.file_name() else {
                continue;
            };
            copy_file(src, &target_dir.join(name))?;
            count += 1;
        }
    }
    Ok(count)
}

/// Create the directories of output files before launch.
pub fn create_output_dirs(spec: &ToolSpecification, exec_dir: &Path) -> Result<()> {
    for output in spec.outputfiles() {
        if let (Some(dir), _) = split_dir(output) {
            let path = exec_dir.join(dir);
            fs::create_dir_all(&path).map_err(|e| ItemError::stage_io(&path, e))?;
        }
    }
    Ok(())
}

/// Copy a file, creating parent directories. Copying a file onto itself is a
/// no-op.
pub fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    if is_same_file(src, dst) {
        return Ok(());
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|e| ItemError::stage_io(parent, e))?;
    }
    fs::copy(src, dst).map_err(|e| ItemError::stage_io(src, e))?;
    Ok(())
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Copy a directory tree; returns the number of files copied.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<usize> {
    let mut count = 0;
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| src.to_path_buf());
            ItemError::stage_io(path, io::Error::other(e.to_string()))
        })?;
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| ItemError::stage_io(&target, e))?;
        } else {
            copy_file(entry.path(), &target)?;
            count += 1;
        }
    }
    Ok(count)
}
