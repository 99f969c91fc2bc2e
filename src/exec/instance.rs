// src/exec/instance.rs

//! Tool instances: one prepared run of a specification.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::errors::{ItemError, Result};
use crate::exec::backends::{self, PrepareContext};
use crate::exec::persistent::PersistentExecutionManager;
use crate::exec::process::ProcessExecutionManager;
use crate::exec::{ExecContext, InstanceOwner, RunOutcome};
use crate::item::ItemLogger;
use crate::spec::{ToolSpecification, ToolType};

/// Back-end of an instance, selected by the specification's tool type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Gams,
    Julia,
    Python,
    Executable,
}

impl From<ToolType> for Backend {
    fn from(tooltype: ToolType) -> Self {
        match tooltype {
            ToolType::Gams => Backend::Gams,
            ToolType::Julia => Backend::Julia,
            ToolType::Python => Backend::Python,
            ToolType::Executable => Backend::Executable,
        }
    }
}

/// What actually runs a prepared instance.
#[derive(Debug, Clone)]
pub enum ExecutionManager {
    Process(ProcessExecutionManager),
    Persistent(PersistentExecutionManager),
}

impl ExecutionManager {
    pub async fn run(
        &self,
        logger: &ItemLogger,
        cancel_rx: oneshot::Receiver<()>,
    ) -> anyhow::Result<RunOutcome> {
        match self {
            ExecutionManager::Process(manager) => manager.run(logger, cancel_rx).await,
            ExecutionManager::Persistent(manager) => manager.run(logger, cancel_rx).await,
        }
    }

    /// What would be run: the program and its arguments for a process,
    /// the interpreter followed by the submitted commands otherwise.
    pub fn command_line(&self) -> Vec<String> {
        match self {
            ExecutionManager::Process(manager) => std::iter::once(manager.program.clone())
                .chain(manager.args.iter().cloned())
                .collect(),
            ExecutionManager::Persistent(manager) => std::iter::once(manager.launch.program.clone())
                .chain(manager.commands.iter().cloned())
                .collect(),
        }
    }
}

/// Cancels a running instance from another task.
///
/// Clones share state. Terminating an instance that is not running is a
/// no-op.
#[derive(Debug, Clone, Default)]
pub struct TerminateHandle {
    cancel: Arc<Mutex<Option<oneshot::Sender<()>>>>,
    running: Arc<AtomicBool>,
}

impl TerminateHandle {
    fn arm(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        if let Ok(mut cancel) = self.cancel.lock() {
            *cancel = Some(tx);
        }
        self.running.store(true, Ordering::SeqCst);
        rx
    }

    fn disarm(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Ok(mut cancel) = self.cancel.lock() {
            cancel.take();
        }
    }

    /// Request termination. Returns true if a running instance was signalled.
    pub fn terminate(&self) -> bool {
        let sender = self.cancel.lock().ok().and_then(|mut c| c.take());
        match sender {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// A specification bound to an execution directory.
///
/// Lifecycle: [`ToolInstance::prepare`] once, then [`ToolInstance::execute`]
/// once. [`ToolInstance::terminate_instance`] (or a [`TerminateHandle`]) may
/// be called at any time.
#[derive(Debug)]
pub struct ToolInstance {
    spec: Arc<ToolSpecification>,
    basedir: PathBuf,
    kill_completed: bool,
    logger: ItemLogger,
    owner: InstanceOwner,
    context: ExecContext,
    backend: Backend,
    manager: Option<ExecutionManager>,
    handle: TerminateHandle,
    killed: bool,
}

impl ToolInstance {
    pub fn new(
        spec: Arc<ToolSpecification>,
        basedir: PathBuf,
        kill_completed: bool,
        logger: ItemLogger,
        owner: InstanceOwner,
        context: ExecContext,
    ) -> Self {
        let backend = Backend::from(spec.tooltype());
        Self {
            spec,
            basedir,
            kill_completed,
            logger,
            owner,
            context,
            backend,
            manager: None,
            handle: TerminateHandle::default(),
            killed: false,
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn basedir(&self) -> &Path {
        &self.basedir
    }

    pub fn manager(&self) -> Option<&ExecutionManager> {
        self.manager.as_ref()
    }

    /// Configure the execution manager. `extra_args` follow the
    /// specification's own arguments.
    pub fn prepare(&mut self, extra_args: Vec<String>) -> Result<()> {
        let mut args = self.spec.cmdline_args().to_vec();
        args.extend(extra_args);

        let group_id = self.owner.group_key();
        let ctx = PrepareContext {
            spec: &self.spec,
            basedir: &self.basedir,
            settings: &self.context.settings,
            pool: &self.context.pool,
            group_id: &group_id,
            kill_completed: self.kill_completed,
        };
        let manager = match self.backend {
            Backend::Gams => backends::prepare_gams(&ctx, args)?,
            Backend::Julia => backends::prepare_julia(&ctx, args)?,
            Backend::Python => backends::prepare_python(&ctx, args)?,
            Backend::Executable => backends::prepare_executable(&ctx, args)?,
        };
        debug!(item = %self.owner.item_name, backend = ?self.backend, "prepared tool instance");
        self.manager = Some(manager);
        Ok(())
    }

    /// Run to completion and return the exit code.
    pub async fn execute(&mut self) -> Result<i32> {
        let manager = self.manager.clone().ok_or_else(|| {
            ItemError::PrepareFailed("tool instance was not prepared".to_string())
        })?;

        let cancel_rx = self.handle.arm();
        let outcome = manager.run(&self.logger, cancel_rx).await;
        self.handle.disarm();
        let outcome = outcome?;

        self.killed = outcome.interrupted;
        if self.backend == Backend::Gams && outcome.exit_code != 0 && !self.killed {
            if let Err(err) = backends::write_gams_project_file(&self.spec, &self.basedir) {
                warn!(item = %self.owner.item_name, error = %err, "could not write GAMS project file");
            }
        }
        Ok(outcome.exit_code)
    }

    pub fn terminate_instance(&self) {
        if self.handle.terminate() {
            debug!(item = %self.owner.item_name, "terminating tool instance");
        }
    }

    pub fn terminate_handle(&self) -> TerminateHandle {
        self.handle.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    /// Human readable description of an exit code.
    pub fn return_code_message(&self, code: i32) -> &str {
        self.spec.return_code_message(code)
    }

    /// True if the last `execute` was cut short by termination.
    pub fn killed(&self) -> bool {
        self.killed
    }
}
