// src/config/validate.rs

use serde_json::Value;

use crate::errors::{ItemError, Result};

const REQUIRED_SPEC_KEYS: &[&str] = &["name", "tooltype", "includes"];
const LIST_SPEC_KEYS: &[&str] = &["includes", "inputfiles", "inputfiles_opt", "outputfiles"];

/// Structural checks on a Tool specification document before it is
/// deserialized, so that errors name the offending key.
pub fn validate_tool_spec_value(value: &Value) -> Result<()> {
    let obj = value.as_object().ok_or_else(|| {
        ItemError::InvalidSpecification("specification must be a JSON object".to_string())
    })?;

    let missing: Vec<&str> = REQUIRED_SPEC_KEYS
        .iter()
        .copied()
        .filter(|key| !obj.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        return Err(ItemError::InvalidSpecification(format!(
            "required keys missing: {}",
            missing.join(", ")
        )));
    }

    for key in LIST_SPEC_KEYS {
        if let Some(entry) = obj.get(*key) {
            ensure_string_list(key, entry)?;
        }
    }

    match obj.get("cmdline_args") {
        None | Some(Value::Null) | Some(Value::String(_)) => {}
        Some(entry) => ensure_string_list("cmdline_args", entry)?,
    }

    match obj.get("execution_settings") {
        None | Some(Value::Object(_)) => {}
        Some(_) => {
            return Err(ItemError::InvalidSpecification(
                "execution_settings must be an object".to_string(),
            ));
        }
    }

    Ok(())
}

fn ensure_string_list(key: &str, value: &Value) -> Result<()> {
    let items = value.as_array().ok_or_else(|| {
        ItemError::InvalidSpecification(format!("'{key}' must be a list"))
    })?;
    if items.iter().any(|item| !item.is_string()) {
        return Err(ItemError::InvalidSpecification(format!(
            "'{key}' must contain only strings"
        )));
    }
    Ok(())
}

/// Check the `type` field of an item dictionary.
pub fn validate_item_type(expected: &str, actual: &str) -> Result<()> {
    if actual != expected {
        return Err(ItemError::InvalidItem(format!(
            "expected item type '{expected}', got '{actual}'"
        )));
    }
    Ok(())
}
