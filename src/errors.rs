// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! The variants mirror the failure kinds an item can run into. Staging and
//! prerequisite errors short-circuit a run; run and archive errors are
//! surfaced but never change an exit code that was already observed.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ItemError {
    #[error("No specification set for item '{0}'")]
    SpecMissing(String),

    #[error("{0}")]
    PrerequisiteMissing(String),

    #[error("Required file(s) {} not found", .0.join(", "))]
    MissingRequiredInput(Vec<String>),

    #[error("Staging failed for {path:?}: {source}")]
    StageIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Preparing tool instance failed: {0}")]
    PrepareFailed(String),

    #[error("Tool exited with code {code}: {message}")]
    RunNonzero { code: i32, message: String },

    #[error("Execution cancelled")]
    Cancelled,

    #[error("Archiving output failed: {0}")]
    ArchiveIo(String),

    #[error("Database validation failed: {0}")]
    DbValidationFailed(String),

    #[error("Invalid specification: {0}")]
    InvalidSpecification(String),

    #[error("Invalid item dictionary: {0}")]
    InvalidItem(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ItemError {
    /// Wrap an IO error that happened while staging `path`.
    pub fn stage_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ItemError::StageIo {
            path: path.into(),
            source,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ItemError>;
