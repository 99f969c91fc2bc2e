// src/tool/mod.rs

//! The Tool item.
//!
//! - [`staging`] materialises the execution directory.
//! - [`args`] expands command line arguments against upstream resources.
//! - [`archive`] keeps timestamped copies of output files.
//! - [`executable`] drives a run from staging to archiving.
//! - [`patterns`] is the glob dialect shared by the above.

pub mod archive;
pub mod args;
pub mod executable;
pub mod patterns;
pub mod staging;

pub use executable::{ExecutionPlan, ToolExecutable};
