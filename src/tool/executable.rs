// src/tool/executable.rs

//! The Tool item driver.
//!
//! One call to [`ExecutableItem::execute`] walks through
//! stage -> resolve arguments -> run -> archive, strictly in that order.
//! Staging and prerequisite problems end the run with `Failure` before
//! anything is launched; a terminated run ends with `Stopped` and is not
//! archived.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::config::ToolItemConfig;
use crate::errors::{ItemError, Result};
use crate::exec::{programs, ExecContext, InstanceOwner, TerminateHandle};
use crate::item::{item_data_dir, ExecutableItem, ItemExecutionFinishState, ItemFuture, ItemLogger};
use crate::output_log::OutputLogWriter;
use crate::resource::{
    file_resource, file_resource_in_pack, is_pattern, transient_file_resource, ProjectItemResource,
};
use crate::spec::{CmdLineArg, ExecutionSettings, ToolSpecification};
use crate::tool::archive::{
    archive_output_files, filter_output_dir, find_last_output_files, result_dir, timestamp_now,
    write_filter_id_sentinel,
};
use crate::tool::args::{expand_cmd_line_args, labelled_resource_args, ResourceStack};
use crate::tool::staging::{
    copy_input_files, copy_optional_input_files, copy_program_files, create_execution_dir,
    create_output_dirs, find_input_files, find_optional_input_files,
};

pub const ITEM_TYPE: &str = "Tool";

/// Result of [`ToolExecutable::plan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub exec_dir: PathBuf,
    /// Required input entry -> source file.
    pub inputs: BTreeMap<String, PathBuf>,
    /// Optional input pattern -> matching files.
    pub optional_inputs: BTreeMap<String, Vec<PathBuf>>,
    /// Item arguments after label expansion.
    pub args: Vec<String>,
    pub command: Vec<String>,
}

#[derive(Debug, Default)]
struct RunState {
    output_dir: Option<PathBuf>,
    terminate: Option<TerminateHandle>,
    last_return_code: Option<i32>,
}

/// Headless Tool item.
#[derive(Debug)]
pub struct ToolExecutable {
    name: String,
    project_dir: PathBuf,
    data_dir: PathBuf,
    output_root: PathBuf,
    spec: Option<Arc<ToolSpecification>>,
    cmd_line_args: Vec<CmdLineArg>,
    execute_in_work: bool,
    kill_completed: bool,
    group_id: Option<String>,
    options: serde_json::Map<String, serde_json::Value>,
    context: ExecContext,
    logger: ItemLogger,
    output_log: Option<Arc<Mutex<OutputLogWriter>>>,
    state: Mutex<RunState>,
    stopped: AtomicBool,
}

impl ToolExecutable {
    pub fn new(
        name: impl Into<String>,
        project_dir: impl Into<PathBuf>,
        spec: Option<Arc<ToolSpecification>>,
        context: ExecContext,
        logger: ItemLogger,
    ) -> Self {
        let name = name.into();
        let project_dir = project_dir.into();
        let data_dir = item_data_dir(&project_dir, &name);
        let output_root = data_dir.join("output");
        Self {
            name,
            project_dir,
            data_dir,
            output_root,
            spec,
            cmd_line_args: Vec::new(),
            execute_in_work: true,
            kill_completed: false,
            group_id: None,
            options: serde_json::Map::new(),
            context,
            logger,
            output_log: None,
            state: Mutex::new(RunState::default()),
            stopped: AtomicBool::new(false),
        }
    }

    /// Build from a Tool item dictionary. `specifications` maps names to
    /// loaded specifications; an unknown name leaves the item without one.
    pub fn from_dict(
        name: impl Into<String>,
        config: &ToolItemConfig,
        project_dir: impl Into<PathBuf>,
        specifications: &BTreeMap<String, Arc<ToolSpecification>>,
        context: ExecContext,
        logger: ItemLogger,
    ) -> Result<Self> {
        crate::config::validate_item_type(ITEM_TYPE, &config.item_type)?;
        let name = name.into();
        let spec = if config.specification.is_empty() {
            None
        } else {
            let found = specifications.get(&config.specification).cloned();
            if found.is_none() {
                logger.msg_warning(format!(
                    "Tool {name}: specification {} not found",
                    config.specification
                ));
            }
            found
        };
        let cmd_line_args = config
            .cmd_line_args
            .iter()
            .cloned()
            .map(CmdLineArg::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(name, project_dir, spec, context, logger)
            .with_cmd_line_args(cmd_line_args)
            .with_execute_in_work(config.execute_in_work)
            .with_kill_completed(config.kill_completed_processes)
            .with_group_id(config.group_id.clone())
            .with_options(config.options.clone())
            .with_log_process_output(config.log_process_output))
    }

    pub fn with_cmd_line_args(mut self, args: Vec<CmdLineArg>) -> Self {
        self.cmd_line_args = args;
        self
    }

    pub fn with_execute_in_work(mut self, execute_in_work: bool) -> Self {
        self.execute_in_work = execute_in_work;
        self
    }

    pub fn with_kill_completed(mut self, kill_completed: bool) -> Self {
        self.kill_completed = kill_completed;
        self
    }

    pub fn with_group_id(mut self, group_id: Option<String>) -> Self {
        self.group_id = group_id;
        self
    }

    pub fn with_options(mut self, options: serde_json::Map<String, serde_json::Value>) -> Self {
        self.options = options;
        self
    }

    /// Write process output into rolling log files under `logs/`.
    pub fn with_log_process_output(mut self, enabled: bool) -> Self {
        self.output_log = enabled.then(|| {
            Arc::new(Mutex::new(OutputLogWriter::with_max_size(
                self.logs_dir(),
                self.name.clone(),
                self.context.settings.tool.max_log_file_size,
            )))
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn specification(&self) -> Option<&Arc<ToolSpecification>> {
        self.spec.as_ref()
    }

    pub fn cmd_line_args(&self) -> &[CmdLineArg] {
        &self.cmd_line_args
    }

    pub fn options(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.options
    }

    pub fn output_log(&self) -> Option<&Arc<Mutex<OutputLogWriter>>> {
        self.output_log.as_ref()
    }

    /// Output directory of the current filter, once a run or an exclusion
    /// has computed it.
    pub fn output_dir(&self) -> PathBuf {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.output_dir.clone())
            .unwrap_or_else(|| filter_output_dir(&self.output_root, self.logger.filter_id()))
    }

    pub fn last_return_code(&self) -> Option<i32> {
        self.state.lock().ok().and_then(|s| s.last_return_code)
    }

    fn set_output_dir(&self) -> PathBuf {
        let dir = filter_output_dir(&self.output_root, self.logger.filter_id());
        if let Ok(mut state) = self.state.lock() {
            state.output_dir = Some(dir.clone());
        }
        dir
    }

    fn set_terminate(&self, handle: Option<TerminateHandle>) {
        if let Ok(mut state) = self.state.lock() {
            state.terminate = handle;
        }
    }

    fn run_logger(&self) -> ItemLogger {
        match &self.output_log {
            Some(writer) => self.logger.clone().with_output_log(Arc::clone(writer)),
            None => self.logger.clone(),
        }
    }

    fn fail(&self, err: impl std::fmt::Display) -> ItemExecutionFinishState {
        self.logger.msg_error(format!("Tool {} failed: {err}", self.name));
        ItemExecutionFinishState::Failure
    }

    /// Check prerequisites, reporting the first one that is missing.
    fn check_ready(&self) -> Result<()> {
        let spec = self
            .spec
            .as_ref()
            .ok_or_else(|| ItemError::SpecMissing(self.name.clone()))?;

        if let Some(main) = spec.main_prgm_path() {
            if !main.is_file() {
                return Err(ItemError::PrerequisiteMissing(format!(
                    "Main program file {} not found",
                    main.display()
                )));
            }
        }

        let settings = &self.context.settings;
        match spec.execution_settings() {
            ExecutionSettings::Python(s) if s.use_jupyter_console => {
                if s.kernel_spec_name.trim().is_empty() {
                    return Err(ItemError::PrerequisiteMissing(format!(
                        "No kernel spec selected for specification {}",
                        spec.name()
                    )));
                }
            }
            ExecutionSettings::Julia(s) => {
                if s.use_jupyter_console {
                    if s.kernel_spec_name.trim().is_empty() {
                        return Err(ItemError::PrerequisiteMissing(format!(
                            "No kernel spec selected for specification {}",
                            spec.name()
                        )));
                    }
                } else if programs::julia(settings, &s.executable).is_none() {
                    return Err(ItemError::PrerequisiteMissing(
                        "Julia executable not found; set it in the settings".to_string(),
                    ));
                }
            }
            ExecutionSettings::Gams => {
                if programs::gams(settings).is_none() {
                    return Err(ItemError::PrerequisiteMissing(
                        "GAMS executable not found; set it in the settings".to_string(),
                    ));
                }
            }
            ExecutionSettings::Executable(s) => {
                if spec.main_prgm().is_none() && s.cmd.trim().is_empty() {
                    return Err(ItemError::PrerequisiteMissing(format!(
                        "Specification {} has neither a main program nor a command",
                        spec.name()
                    )));
                }
            }
            ExecutionSettings::Python(_) => {}
        }
        Ok(())
    }

    /// Resolve everything a run would use without touching the disk.
    ///
    /// Work-mode runs get a fresh directory at launch, so the plan shows a
    /// placeholder under the work root.
    pub fn plan(&self, resources: &[ProjectItemResource]) -> Result<ExecutionPlan> {
        self.check_ready()?;
        let spec = self
            .spec
            .clone()
            .ok_or_else(|| ItemError::SpecMissing(self.name.clone()))?;
        let inputs = find_input_files(&spec, resources, &self.logger)?;
        let optional_inputs = find_optional_input_files(&spec, resources)?;

        let mut stack = ResourceStack::new();
        let table = labelled_resource_args(resources, &mut stack);
        stack.release_all(&self.logger);
        let args = expand_cmd_line_args(&self.cmd_line_args, &table?, &self.logger);

        let exec_dir = if self.execute_in_work {
            self.context
                .settings
                .work_dir()
                .join(format!("{}__<new>__toolbox", spec.short_name()))
        } else {
            create_execution_dir(&spec, None)?
        };
        let owner = InstanceOwner::new(self.name.clone(), self.group_id.clone());
        let mut instance = spec.create_tool_instance(
            &exec_dir,
            self.kill_completed,
            self.logger.clone(),
            owner,
            self.context.clone(),
        );
        instance.prepare(args.clone())?;
        let command = instance
            .manager()
            .map(|m| m.command_line())
            .unwrap_or_default();

        Ok(ExecutionPlan {
            exec_dir,
            inputs: inputs.files,
            optional_inputs,
            args,
            command,
        })
    }

    async fn run(
        &self,
        forward_resources: &[ProjectItemResource],
        backward_resources: &[ProjectItemResource],
    ) -> ItemExecutionFinishState {
        self.stopped.store(false, Ordering::SeqCst);

        if let Err(err) = self.check_ready() {
            self.logger.msg_error(err.to_string());
            return ItemExecutionFinishState::Failure;
        }
        let Some(spec) = self.spec.clone() else {
            return ItemExecutionFinishState::Failure;
        };

        let filter_id = self.logger.filter_id().to_string();
        let output_dir = self.set_output_dir();
        let resources: Vec<ProjectItemResource> = forward_resources
            .iter()
            .chain(backward_resources)
            .cloned()
            .collect();

        // Resolve required inputs before anything touches the disk.
        let resolved = match find_input_files(&spec, &resources, &self.logger) {
            Ok(resolved) => resolved,
            Err(err) => return self.fail(err),
        };
        let optional = match find_optional_input_files(&spec, &resources) {
            Ok(found) => found,
            Err(err) => return self.fail(err),
        };

        let work_root = self.execute_in_work.then(|| self.context.settings.work_dir());
        let exec_dir = match self.stage(&spec, work_root.as_deref(), &resolved, &optional) {
            Ok(dir) => dir,
            Err(err) => return self.fail(err),
        };

        let run_logger = self.run_logger();
        let mut stack = ResourceStack::new();
        let table = match labelled_resource_args(&resources, &mut stack) {
            Ok(table) => table,
            Err(err) => {
                stack.release_all(&self.logger);
                return self.fail(err);
            }
        };
        let args = expand_cmd_line_args(&self.cmd_line_args, &table, &self.logger);

        let owner = InstanceOwner::new(self.name.clone(), self.group_id.clone());
        let mut instance = spec.create_tool_instance(
            &exec_dir,
            self.kill_completed,
            run_logger,
            owner,
            self.context.clone(),
        );
        if let Err(err) = instance.prepare(args) {
            stack.release_all(&self.logger);
            return self.fail(err);
        }

        self.set_terminate(Some(instance.terminate_handle()));
        if self.stopped.load(Ordering::SeqCst) {
            self.set_terminate(None);
            stack.release_all(&self.logger);
            self.logger.msg_warning(format!("Tool {} stopped", self.name));
            return ItemExecutionFinishState::Stopped;
        }

        self.logger.msg(format!("*** Starting instance of Tool specification {} ***", spec.name()));
        let result = instance.execute().await;
        self.set_terminate(None);
        stack.release_all(&self.logger);

        let code = match result {
            Ok(code) => code,
            Err(err) => return self.fail(err),
        };
        if instance.killed() || self.stopped.load(Ordering::SeqCst) {
            self.logger.msg_warning(format!("Tool {} stopped", self.name));
            return ItemExecutionFinishState::Stopped;
        }
        if let Ok(mut state) = self.state.lock() {
            state.last_return_code = Some(code);
        }

        let success = code == 0;
        self.archive(&spec, &exec_dir, &output_dir, &filter_id, success);

        if success {
            self.logger.msg_success(format!(
                "Tool specification {} execution finished",
                spec.name()
            ));
            ItemExecutionFinishState::Success
        } else {
            self.fail(ItemError::RunNonzero {
                code,
                message: instance.return_code_message(code).to_string(),
            })
        }
    }

    fn stage(
        &self,
        spec: &ToolSpecification,
        work_root: Option<&Path>,
        resolved: &crate::tool::staging::ResolvedInputs,
        optional: &BTreeMap<String, Vec<PathBuf>>,
    ) -> Result<PathBuf> {
        let exec_dir = create_execution_dir(spec, work_root)?;
        if work_root.is_some() {
            let copied = copy_program_files(spec, &exec_dir)?;
            debug!(item = %self.name, copied, "copied program files");
        }
        copy_input_files(resolved, &exec_dir)?;
        copy_optional_input_files(optional, &exec_dir, &self.logger)?;
        create_output_dirs(spec, &exec_dir)?;
        info!(item = %self.name, exec_dir = ?exec_dir, "staged execution directory");
        Ok(exec_dir)
    }

    fn archive(
        &self,
        spec: &ToolSpecification,
        exec_dir: &Path,
        output_dir: &Path,
        filter_id: &str,
        success: bool,
    ) {
        let target = result_dir(output_dir, success, &timestamp_now());
        match archive_output_files(spec.outputfiles(), exec_dir, &target) {
            Ok(report) => {
                if !report.failed_files.is_empty() {
                    self.logger.msg_warning(format!(
                        "Failed to archive output file(s): {}",
                        report.failed_files.join(", ")
                    ));
                }
            }
            Err(err) => self.logger.msg_error(err.to_string()),
        }
        if !filter_id.is_empty() {
            if let Err(err) = write_filter_id_sentinel(output_dir, filter_id) {
                self.logger.msg_error(err.to_string());
            }
        }
    }
}

impl ExecutableItem for ToolExecutable {
    fn item_name(&self) -> &str {
        &self.name
    }

    fn ready_to_execute(&self) -> bool {
        match self.check_ready() {
            Ok(()) => true,
            Err(err) => {
                self.logger.msg_warning(err.to_string());
                false
            }
        }
    }

    fn execute<'a>(
        &'a self,
        forward_resources: &'a [ProjectItemResource],
        backward_resources: &'a [ProjectItemResource],
    ) -> ItemFuture<'a, ItemExecutionFinishState> {
        Box::pin(self.run(forward_resources, backward_resources))
    }

    fn exclude_execution<'a>(
        &'a self,
        _forward_resources: &'a [ProjectItemResource],
        _backward_resources: &'a [ProjectItemResource],
    ) -> ItemFuture<'a, ()> {
        Box::pin(async move {
            let dir = self.set_output_dir();
            debug!(item = %self.name, output_dir = ?dir, "execution excluded");
        })
    }

    fn output_resources_forward(&self) -> Vec<ProjectItemResource> {
        let Some(spec) = &self.spec else {
            return Vec::new();
        };
        let found = find_last_output_files(spec.outputfiles(), &self.output_dir());
        let mut resources = Vec::new();
        for output in spec.outputfiles() {
            let files = found.get(output).map(Vec::as_slice).unwrap_or(&[]);
            if is_pattern(output) {
                if files.is_empty() {
                    resources.push(file_resource_in_pack(&self.name, output, None));
                }
                for file in files {
                    resources.push(file_resource_in_pack(&self.name, output, Some(file)));
                }
            } else {
                match files.first() {
                    Some(file) => {
                        resources.push(file_resource(&self.name, file, Some(output.clone())))
                    }
                    None => resources.push(transient_file_resource(&self.name, output)),
                }
            }
        }
        resources
    }

    fn stop_execution(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let handle = self.state.lock().ok().and_then(|s| s.terminate.clone());
        if let Some(handle) = handle {
            handle.terminate();
        }
        info!(item = %self.name, "stop requested");
    }
}
