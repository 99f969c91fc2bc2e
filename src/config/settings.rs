// src/config/settings.rs

//! Application settings read from `spine-items.toml`.
//!
//! ```toml
//! [paths]
//! work_dir = "/tmp/spine-work"
//! python = "/usr/bin/python3"
//! julia = "/opt/julia/bin/julia"
//! gams = "/opt/gams/gams"
//!
//! [tool]
//! max_log_file_size = 131072
//! use_basic_julia_repl = false
//! ```
//!
//! All sections and keys are optional.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Default cap for a single execution log file, in bytes.
pub const DEFAULT_MAX_LOG_FILE_SIZE: u64 = 128 * 1024;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub paths: PathsSection,

    #[serde(default)]
    pub tool: ToolSection,
}

/// `[paths]` section. Empty strings count as unset.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsSection {
    /// Root for execute-in-work directories.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,

    #[serde(default)]
    pub python: Option<String>,

    #[serde(default)]
    pub julia: Option<String>,

    #[serde(default)]
    pub julia_project: Option<String>,

    #[serde(default)]
    pub julia_sysimage: Option<String>,

    #[serde(default)]
    pub gams: Option<String>,

    #[serde(default)]
    pub conda: Option<String>,
}

/// `[tool]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolSection {
    #[serde(default = "default_max_log_file_size")]
    pub max_log_file_size: u64,

    /// Run Julia tools as plain subprocesses instead of a persistent REPL.
    #[serde(default)]
    pub use_basic_julia_repl: bool,
}

fn default_max_log_file_size() -> u64 {
    DEFAULT_MAX_LOG_FILE_SIZE
}

impl Default for ToolSection {
    fn default() -> Self {
        Self {
            max_log_file_size: default_max_log_file_size(),
            use_basic_julia_repl: false,
        }
    }
}

impl AppSettings {
    /// Work directory root, defaulting to a folder in the system temp dir.
    pub fn work_dir(&self) -> PathBuf {
        match &self.paths.work_dir {
            Some(dir) if !dir.as_os_str().is_empty() => dir.clone(),
            _ => std::env::temp_dir().join("spine-items-work"),
        }
    }

    pub fn with_work_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.paths.work_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn python(&self) -> Option<&str> {
        non_empty(&self.paths.python)
    }

    pub fn julia(&self) -> Option<&str> {
        non_empty(&self.paths.julia)
    }

    pub fn julia_project(&self) -> Option<&str> {
        non_empty(&self.paths.julia_project)
    }

    pub fn julia_sysimage(&self) -> Option<&str> {
        non_empty(&self.paths.julia_sysimage)
    }

    pub fn gams(&self) -> Option<&str> {
        non_empty(&self.paths.gams)
    }

    pub fn conda(&self) -> Option<&str> {
        non_empty(&self.paths.conda)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
