// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::config::model::{RawDataTransformerSpecification, ToolItemConfig};
use crate::config::settings::AppSettings;
use crate::dt::spec::DataTransformerSpecification;
use crate::errors::Result;
use crate::spec::ToolSpecification;

/// Read any JSON document from disk.
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let contents = fs::read_to_string(path.as_ref())?;
    let value = serde_json::from_str(&contents)?;
    Ok(value)
}

/// Load and validate a Tool specification file.
///
/// The file's directory becomes the specification's definition directory,
/// against which `includes_main_path` is resolved.
pub fn load_tool_specification(path: impl AsRef<Path>) -> Result<ToolSpecification> {
    let path = path.as_ref();
    let value: serde_json::Value = load_json(path)?;
    ToolSpecification::from_json(value, path)
}

/// Load and validate a Data Transformer specification file.
pub fn load_transformer_specification(
    path: impl AsRef<Path>,
) -> Result<DataTransformerSpecification> {
    let raw: RawDataTransformerSpecification = load_json(path)?;
    DataTransformerSpecification::try_from(raw)
}

/// Load a Tool item dictionary.
pub fn load_tool_item(path: impl AsRef<Path>) -> Result<ToolItemConfig> {
    load_json(path)
}

/// Load application settings from a TOML file.
///
/// A missing file yields the defaults so that a fresh checkout works without
/// any configuration.
pub fn load_settings(path: impl AsRef<Path>) -> Result<AppSettings> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(AppSettings::default());
    }
    let contents = fs::read_to_string(path)?;
    let settings: AppSettings = toml::from_str(&contents)?;
    Ok(settings)
}

/// Default settings location: `spine-items.toml` in the working directory,
/// unless `SPINE_ITEMS_SETTINGS` points elsewhere.
pub fn default_settings_path() -> PathBuf {
    std::env::var_os("SPINE_ITEMS_SETTINGS")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("spine-items.toml"))
}
