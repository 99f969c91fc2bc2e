// src/lib.rs

pub mod cli;
pub mod config;
pub mod dc;
pub mod dt;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod item;
pub mod logging;
pub mod output_log;
pub mod resource;
pub mod spec;
pub mod tool;
pub mod watch;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::{CliArgs, Command, RunToolArgs, TransformArgs, WatchArgs};
use crate::config::{
    default_settings_path, load_json, load_settings, load_tool_item, load_tool_specification,
    load_transformer_specification, AppSettings, DataConnectionItemConfig, ToolItemConfig,
};
use crate::dc::DataConnection;
use crate::dt::DataTransformerExecutable;
use crate::exec::ExecContext;
use crate::fs::RealFileSystem;
use crate::item::{ExecutableItem, ItemEvent, ItemExecutionFinishState, ItemLogger};
use crate::resource::{database_resource, file_resource, ProjectItemResource};
use crate::tool::ToolExecutable;
use crate::watch::{spawn_reference_watcher, RefreshPolicy};

/// Provider name of resources given on the command line.
pub const CLI_PROVIDER: &str = "cli";

/// High-level entry point used by `main.rs`.
///
/// Returns the finish state of the item that was run; `watch` returns
/// `Success` once interrupted.
pub async fn run(args: CliArgs) -> Result<ItemExecutionFinishState> {
    let settings_path = args.settings.clone().unwrap_or_else(default_settings_path);
    let settings = load_settings(&settings_path)
        .with_context(|| format!("loading settings from {}", settings_path.display()))?;
    debug!(settings = ?settings_path, "settings loaded");

    match args.command {
        Command::RunTool(run_args) => run_tool(run_args, settings).await,
        Command::Transform(transform_args) => transform(transform_args),
        Command::Watch(watch_args) => watch(watch_args).await,
    }
}

/// Print item events on stdout as they arrive.
fn spawn_event_printer() -> mpsc::UnboundedSender<ItemEvent> {
    let (tx, mut rx) = mpsc::unbounded_channel::<ItemEvent>();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ItemEvent::Message { kind, text, .. } => println!("[{kind:?}] {text}"),
                ItemEvent::ProcessOutput { text, .. } => println!("{text}"),
            }
        }
    });
    tx
}

async fn run_tool(args: RunToolArgs, settings: AppSettings) -> Result<ItemExecutionFinishState> {
    let spec = Arc::new(load_tool_specification(&args.spec)?);
    let mut config = match &args.item_dict {
        Some(path) => load_tool_item(path)?,
        None => ToolItemConfig::default(),
    };
    if config.specification.is_empty() {
        config.specification = spec.name().to_string();
    }
    let specifications = BTreeMap::from([(spec.name().to_string(), Arc::clone(&spec))]);

    let logger = ItemLogger::new(args.item.clone())
        .with_filter_id(args.filter_id.clone())
        .with_sink(spawn_event_printer());
    let context = ExecContext::new(settings);
    let tool = ToolExecutable::from_dict(
        args.item.clone(),
        &config,
        args.project.clone(),
        &specifications,
        context.clone(),
        logger,
    )?;
    let inputs: Vec<ProjectItemResource> = args
        .inputs
        .iter()
        .map(|p| file_resource(CLI_PROVIDER, absolute(p), None))
        .collect();

    if args.dry_run {
        let plan = tool.plan(&inputs)?;
        println!("spine-items dry-run");
        println!("  item: {}", tool.name());
        println!("  exec dir: {}", plan.exec_dir.display());
        for (entry, source) in &plan.inputs {
            println!("  input {entry} <- {}", source.display());
        }
        for (pattern, files) in &plan.optional_inputs {
            println!("  optional {pattern}: {} file(s)", files.len());
        }
        println!("  args: {:?}", plan.args);
        println!("  command: {:?}", plan.command);
        return Ok(ItemExecutionFinishState::Skipped);
    }

    if !tool.ready_to_execute() {
        return Ok(ItemExecutionFinishState::Failure);
    }

    // The run keeps being polled after Ctrl-C so it can terminate its
    // process and report the stop itself.
    let mut execution = tool.execute(&inputs, &[]);
    let state = tokio::select! {
        state = &mut execution => state,
        _ = tokio::signal::ctrl_c() => {
            info!(item = %tool.name(), "Ctrl-C received, stopping");
            tool.stop_execution();
            execution.await
        }
    };
    context.pool.shutdown();

    println!("finish state: {state}");
    for resource in tool.output_resources_forward() {
        println!(
            "  {} {} {}",
            resource.type_,
            resource.label,
            resource.url.as_deref().unwrap_or("")
        );
    }
    Ok(state)
}

fn transform(args: TransformArgs) -> Result<ItemExecutionFinishState> {
    let spec = Arc::new(load_transformer_specification(&args.spec)?);
    let dt = DataTransformerExecutable::new(
        args.item.clone(),
        &args.project,
        Some(spec),
        Arc::new(RealFileSystem),
        ItemLogger::new(args.item.clone()),
    );
    let inbound: Vec<ProjectItemResource> = args
        .urls
        .iter()
        .map(|url| database_resource(CLI_PROVIDER, url.clone(), None))
        .collect();
    for resource in dt.rewrite(&inbound)? {
        println!("{}\t{}", resource.label, resource.url.unwrap_or_default());
    }
    Ok(ItemExecutionFinishState::Success)
}

async fn watch(args: WatchArgs) -> Result<ItemExecutionFinishState> {
    let config: DataConnectionItemConfig = load_json(&args.item_dict)?;
    let logger = ItemLogger::new(args.item.clone()).with_sink(spawn_event_printer());
    let mut dc =
        DataConnection::from_dict(args.item.clone(), &config, args.project.clone(), logger)?;

    let (watcher, initial) = dc.reference_watcher(Arc::new(RealFileSystem));
    for event in &initial {
        dc.apply_reference_event(event);
        println!("{event:?}");
    }
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = spawn_reference_watcher(watcher, RefreshPolicy::default(), tx)?;
    info!(item = %dc.name(), "watching references; Ctrl-C to stop");

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                if dc.apply_reference_event(&event) {
                    println!("{event:?}");
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    handle.shutdown().await?;
    Ok(ItemExecutionFinishState::Success)
}

fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    })
}
