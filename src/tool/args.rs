// src/tool/args.rs

//! Expanding command line arguments against upstream resources.
//!
//! Label arguments are looked up in a table built from the forward and
//! backward resources of a run. Database resources are bound through a
//! [`ResourceScope`] that stays acquired until the tool has exited.

use std::collections::HashMap;

use anyhow::anyhow;
use tracing::debug;

use crate::dc::db_reference::sqlite_path;
use crate::errors::{ItemError, Result};
use crate::item::ItemLogger;
use crate::resource::{posix_string, ProjectItemResource, ResourceType};
use crate::spec::CmdLineArg;

/// Something acquired for a resource while a tool runs.
pub trait ResourceScope: Send {
    /// Label of the resource the scope belongs to.
    fn label(&self) -> &str;

    /// Release the scope. Called once, after the exit code is known.
    fn release(self: Box<Self>) -> anyhow::Result<()>;
}

/// Check-out of a database for the duration of a run.
///
/// For SQLite the database file must exist when the scope is acquired and
/// still exist when it is released.
#[derive(Debug)]
pub struct DatabaseCheckout {
    label: String,
    url: String,
}

impl DatabaseCheckout {
    pub fn acquire(resource: &ProjectItemResource) -> Result<Self> {
        let url = resource.url.clone().ok_or_else(|| {
            ItemError::PrepareFailed(format!("database resource {} has no URL", resource.label))
        })?;
        if let Some(path) = sqlite_path(&url) {
            if !path.is_file() {
                return Err(ItemError::PrepareFailed(format!(
                    "database {} is not available: {} does not exist",
                    resource.label,
                    path.display()
                )));
            }
        }
        debug!(label = %resource.label, "checked out database");
        Ok(Self {
            label: resource.label.clone(),
            url,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ResourceScope for DatabaseCheckout {
    fn label(&self) -> &str {
        &self.label
    }

    fn release(self: Box<Self>) -> anyhow::Result<()> {
        if let Some(path) = sqlite_path(&self.url) {
            if !path.is_file() {
                return Err(anyhow!(
                    "database file {} disappeared during execution",
                    path.display()
                ));
            }
        }
        debug!(label = %self.label, "checked in database");
        Ok(())
    }
}

/// Scopes acquired for a run, released in reverse order.
#[derive(Default)]
pub struct ResourceStack {
    scopes: Vec<Box<dyn ResourceScope>>,
}

impl std::fmt::Debug for ResourceStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let labels: Vec<&str> = self.scopes.iter().map(|s| s.label()).collect();
        f.debug_struct("ResourceStack").field("scopes", &labels).finish()
    }
}

impl ResourceStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, scope: Box<dyn ResourceScope>) {
        self.scopes.push(scope);
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Release everything. Failures are logged and do not stop the unwinding.
    pub fn release_all(&mut self, logger: &ItemLogger) {
        while let Some(scope) = self.scopes.pop() {
            let label = scope.label().to_string();
            if let Err(err) = scope.release() {
                logger.msg_warning(format!("Failed to release {label}: {err}"));
            }
        }
    }
}

/// Map every resource label to the argument strings it expands to.
///
/// - `file`: the path
/// - `file-in-pack`: every path of the pack, in order
/// - `database`: the URL, after checking the database out into `stack`
/// - `url`: the URL
/// - `transient-file`: nothing; the label stays unresolved
pub fn labelled_resource_args(
    resources: &[ProjectItemResource],
    stack: &mut ResourceStack,
) -> Result<HashMap<String, Vec<String>>> {
    let mut table: HashMap<String, Vec<String>> = HashMap::new();
    for resource in resources {
        match resource.type_ {
            ResourceType::File | ResourceType::FileInPack => {
                if let Some(path) = resource.path() {
                    table
                        .entry(resource.label.clone())
                        .or_default()
                        .push(posix_string(&path));
                }
            }
            ResourceType::Database => {
                let checkout = DatabaseCheckout::acquire(resource)?;
                let url = checkout.url().to_string();
                stack.push(Box::new(checkout));
                table.entry(resource.label.clone()).or_default().push(url);
            }
            ResourceType::Url => {
                if let Some(url) = &resource.url {
                    table
                        .entry(resource.label.clone())
                        .or_default()
                        .push(url.clone());
                }
            }
            ResourceType::TransientFile => {}
        }
    }
    Ok(table)
}

/// Expand `args` using `table`. Unresolved labels are kept as they are and
/// reported as warnings.
pub fn expand_cmd_line_args(
    args: &[CmdLineArg],
    table: &HashMap<String, Vec<String>>,
    logger: &ItemLogger,
) -> Vec<String> {
    let mut expanded = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            CmdLineArg::Literal(text) => expanded.push(text.clone()),
            CmdLineArg::Label { label, .. } => match table.get(label) {
                Some(values) => expanded.extend(values.iter().cloned()),
                None => {
                    logger.msg_warning(format!("No resources matching argument {label}"));
                    expanded.push(label.clone());
                }
            },
        }
    }
    expanded
}

/// Mark label arguments whose label is not offered by any resource.
pub fn update_missing_flags(args: &mut [CmdLineArg], resources: &[ProjectItemResource]) {
    for arg in args.iter_mut() {
        if let CmdLineArg::Label { label, missing } = arg {
            *missing = !resources.iter().any(|r| &r.label == label);
        }
    }
}
