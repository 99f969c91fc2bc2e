// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `spine-items`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "spine-items",
    version,
    about = "Run Tool, Data Connection and Data Transformer items headlessly.",
    long_about = None
)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SPINE_ITEMS_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Application settings (TOML).
    ///
    /// Default: `SPINE_ITEMS_SETTINGS`, else `spine-items.toml` in the
    /// current working directory.
    #[arg(long, global = true, value_name = "PATH")]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Execute one Tool item against the given input files.
    RunTool(RunToolArgs),
    /// Print database URLs as rewritten by a Data Transformer.
    Transform(TransformArgs),
    /// Watch the references of a Data Connection until Ctrl-C.
    Watch(WatchArgs),
}

#[derive(Debug, Clone, Args)]
pub struct RunToolArgs {
    /// Project directory.
    #[arg(long, value_name = "DIR")]
    pub project: PathBuf,

    /// Item name.
    #[arg(long, value_name = "NAME")]
    pub item: String,

    /// Tool specification file (JSON).
    #[arg(long, value_name = "PATH")]
    pub spec: PathBuf,

    /// Tool item dictionary (JSON). Defaults apply when omitted.
    #[arg(long, value_name = "PATH")]
    pub item_dict: Option<PathBuf>,

    /// Input file offered to the tool; may be repeated.
    #[arg(long = "input", value_name = "PATH")]
    pub inputs: Vec<PathBuf>,

    /// Filter id the run is scoped to.
    #[arg(long, value_name = "ID", default_value = "")]
    pub filter_id: String,

    /// Resolve inputs and arguments, print the plan, don't execute.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Args)]
pub struct TransformArgs {
    #[arg(long, value_name = "DIR")]
    pub project: PathBuf,

    #[arg(long, value_name = "NAME")]
    pub item: String,

    /// Data Transformer specification file (JSON).
    #[arg(long, value_name = "PATH")]
    pub spec: PathBuf,

    /// Database URL; may be repeated.
    #[arg(long = "url", value_name = "URL", required = true)]
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Args)]
pub struct WatchArgs {
    #[arg(long, value_name = "DIR")]
    pub project: PathBuf,

    #[arg(long, value_name = "NAME")]
    pub item: String,

    /// Data Connection item dictionary (JSON).
    #[arg(long, value_name = "PATH")]
    pub item_dict: PathBuf,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
