// src/exec/programs.rs

//! Locating interpreters and executables.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::AppSettings;

/// Resolve a configured program, falling back to searching `PATH` for the
/// default names in order.
///
/// A configured value may be a path or a bare command name.
pub fn resolve_program(configured: Option<&str>, defaults: &[&str]) -> Option<PathBuf> {
    if let Some(configured) = configured.map(str::trim).filter(|s| !s.is_empty()) {
        let path = Path::new(configured);
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        return which::which(configured).ok();
    }
    for name in defaults {
        if let Ok(found) = which::which(name) {
            debug!(program = %name, path = ?found, "found program on PATH");
            return Some(found);
        }
    }
    None
}

/// Python interpreter: spec override, then `[paths] python`, then `PATH`.
pub fn python(settings: &AppSettings, override_exe: &str) -> Option<PathBuf> {
    let configured = non_empty(override_exe).or_else(|| settings.python());
    resolve_program(configured, &["python3", "python"])
}

/// Julia executable: spec override, then `[paths] julia`, then `PATH`.
pub fn julia(settings: &AppSettings, override_exe: &str) -> Option<PathBuf> {
    let configured = non_empty(override_exe).or_else(|| settings.julia());
    resolve_program(configured, &["julia"])
}

/// GAMS executable: `[paths] gams`, then `PATH`.
pub fn gams(settings: &AppSettings) -> Option<PathBuf> {
    resolve_program(settings.gams(), &["gams"])
}

fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    if s.is_empty() { None } else { Some(s) }
}
