// src/spec/execution_settings.rs

//! Per-type execution settings of Tool specifications.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{ItemError, Result};

/// Kind of program a Tool specification runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolType {
    Python,
    Julia,
    Gams,
    Executable,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::Python => "python",
            ToolType::Julia => "julia",
            ToolType::Gams => "gams",
            ToolType::Executable => "executable",
        }
    }
}

impl FromStr for ToolType {
    type Err = ItemError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "python" => Ok(ToolType::Python),
            "julia" => Ok(ToolType::Julia),
            "gams" => Ok(ToolType::Gams),
            "executable" => Ok(ToolType::Executable),
            other => Err(ItemError::InvalidSpecification(format!(
                "unknown tool type '{other}' (expected python, julia, gams or executable)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PythonSettings {
    #[serde(default)]
    pub use_jupyter_console: bool,

    #[serde(default)]
    pub kernel_spec_name: String,

    /// `""` or `"conda"`.
    #[serde(default)]
    pub env: String,

    /// Interpreter for the persistent console; empty means the default.
    #[serde(default)]
    pub executable: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JuliaSettings {
    #[serde(default)]
    pub use_jupyter_console: bool,

    #[serde(default)]
    pub kernel_spec_name: String,

    #[serde(default)]
    pub executable: String,

    /// Julia project (`--project=`).
    #[serde(default)]
    pub project: String,

    /// Sysimage (`--sysimage=`), used only if the file exists.
    #[serde(default)]
    pub sysimage: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutableSettings {
    /// Command to run when the specification has no program file.
    #[serde(default)]
    pub cmd: String,

    /// `""`, `cmd.exe`, `bash`, `sh`, ...
    #[serde(default)]
    pub shell: String,
}

/// Back-end specific settings, tagged by tool type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionSettings {
    Python(PythonSettings),
    Julia(JuliaSettings),
    Executable(ExecutableSettings),
    Gams,
}

impl ExecutionSettings {
    /// Interpret a JSON map according to the tool type.
    pub fn from_map(
        tooltype: ToolType,
        map: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self> {
        let value = serde_json::Value::Object(map);
        let settings = match tooltype {
            ToolType::Python => ExecutionSettings::Python(serde_json::from_value(value)?),
            ToolType::Julia => ExecutionSettings::Julia(serde_json::from_value(value)?),
            ToolType::Executable => {
                ExecutionSettings::Executable(serde_json::from_value(value)?)
            }
            ToolType::Gams => ExecutionSettings::Gams,
        };
        Ok(settings)
    }

    pub fn to_map(&self) -> serde_json::Map<String, serde_json::Value> {
        let value = match self {
            ExecutionSettings::Python(s) => serde_json::to_value(s),
            ExecutionSettings::Julia(s) => serde_json::to_value(s),
            ExecutionSettings::Executable(s) => serde_json::to_value(s),
            ExecutionSettings::Gams => return serde_json::Map::new(),
        };
        match value {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }

    /// True if the settings select a Jupyter kernel.
    pub fn uses_jupyter_console(&self) -> bool {
        match self {
            ExecutionSettings::Python(s) => s.use_jupyter_console,
            ExecutionSettings::Julia(s) => s.use_jupyter_console,
            _ => false,
        }
    }

    /// Configured kernel name, if any.
    pub fn kernel_spec_name(&self) -> Option<&str> {
        let name = match self {
            ExecutionSettings::Python(s) => s.kernel_spec_name.as_str(),
            ExecutionSettings::Julia(s) => s.kernel_spec_name.as_str(),
            _ => "",
        };
        Some(name.trim()).filter(|n| !n.is_empty())
    }
}
