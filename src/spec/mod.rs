// src/spec/mod.rs

//! Tool specifications.
//!
//! - [`tool_spec`] holds the immutable [`ToolSpecification`] and the factory
//!   that turns it into a runnable tool instance.
//! - [`execution_settings`] holds the per-type settings and [`ToolType`].
//! - [`cmdline`] holds command line argument values of Tool items.

pub mod cmdline;
pub mod execution_settings;
pub mod tool_spec;

pub use cmdline::{split_cmdline_args, CmdLineArg};
pub use execution_settings::{
    ExecutableSettings, ExecutionSettings, JuliaSettings, PythonSettings, ToolType,
};
pub use tool_spec::{default_return_codes, ToolSpecification};
