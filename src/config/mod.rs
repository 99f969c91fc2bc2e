// src/config/mod.rs

//! Configuration loading and validation.
//!
//! Responsibilities:
//! - Define the JSON-backed item and specification models (`model.rs`).
//! - Define the TOML-backed application settings (`settings.rs`).
//! - Load documents from disk (`loader.rs`).
//! - Validate structural invariants before deserialization (`validate.rs`).

pub mod loader;
pub mod model;
pub mod settings;
pub mod validate;

pub use loader::{
    default_settings_path, load_json, load_settings, load_tool_item, load_tool_specification,
    load_transformer_specification,
};
pub use model::{
    DataConnectionItemConfig, DataTransformerItemConfig, DbReferenceConfig, RawCmdLineArg,
    RawDataTransformerSpecification, RawToolSpecification, SerializedPath, ToolItemConfig,
};
pub use settings::{AppSettings, DEFAULT_MAX_LOG_FILE_SIZE};
pub use validate::{validate_item_type, validate_tool_spec_value};
