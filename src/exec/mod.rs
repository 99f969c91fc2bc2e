// src/exec/mod.rs

//! Running tool programs.
//!
//! - [`instance`] holds [`ToolInstance`], a specification bound to an
//!   execution directory, and the handle used to cancel it.
//! - [`backends`] prepares an instance per tool type (GAMS, Julia, Python,
//!   executables).
//! - [`process`] runs one-shot subprocesses.
//! - [`persistent`] runs commands on long-lived interpreters shared by group.
//! - [`kernel`] launches Jupyter kernels behind the persistent protocol.
//! - [`programs`] locates interpreters and executables.

pub mod backends;
pub mod instance;
pub mod kernel;
pub mod persistent;
pub mod process;
pub mod programs;

use std::sync::Arc;

use crate::config::AppSettings;

pub use instance::{Backend, ExecutionManager, TerminateHandle, ToolInstance};
pub use persistent::{LaunchSpec, PersistentExecutionManager, PersistentPool};
pub use process::ProcessExecutionManager;

/// Result of running an execution manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub exit_code: i32,
    /// The run was cut short by a termination request.
    pub interrupted: bool,
}

/// Shared state of every tool instance in a process.
#[derive(Debug, Clone, Default)]
pub struct ExecContext {
    pub settings: Arc<AppSettings>,
    pub pool: Arc<PersistentPool>,
}

impl ExecContext {
    pub fn new(settings: AppSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            pool: Arc::new(PersistentPool::new()),
        }
    }
}

/// Who an instance runs for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceOwner {
    pub item_name: String,
    pub group_id: Option<String>,
}

impl InstanceOwner {
    pub fn new(item_name: impl Into<String>, group_id: Option<String>) -> Self {
        Self {
            item_name: item_name.into(),
            group_id,
        }
    }

    /// Key of the persistent worker queue; items without a group get their
    /// own queue.
    pub fn group_key(&self) -> String {
        match self.group_id.as_deref().map(str::trim) {
            Some(group) if !group.is_empty() => group.to_string(),
            _ => self.item_name.clone(),
        }
    }
}
