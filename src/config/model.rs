// src/config/model.rs

//! Serde models for the persisted JSON documents.
//!
//! These are direct mappings of the item dictionaries and specification
//! files as they are stored in a project. They carry no semantics of their
//! own; [`crate::config::validate`] turns them into checked domain values.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::resource::posix_string;

/// Tool specification file.
///
/// ```json
/// { "name": "Sum", "tooltype": "python", "includes": ["sum.py"],
///   "includes_main_path": ".", "inputfiles": ["data.csv"],
///   "outputfiles": ["out.dat"], "cmdline_args": ["--fast"],
///   "execution_settings": { "use_jupyter_console": false } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawToolSpecification {
    pub name: String,

    pub tooltype: String,

    #[serde(default)]
    pub description: String,

    /// Program files; the first entry is the main program.
    pub includes: Vec<String>,

    /// Directory of the program files relative to the definition file.
    /// `None` iff the tool has no program files.
    #[serde(default)]
    pub includes_main_path: Option<String>,

    #[serde(default)]
    pub inputfiles: Vec<String>,

    #[serde(default)]
    pub inputfiles_opt: Vec<String>,

    #[serde(default)]
    pub outputfiles: Vec<String>,

    /// Either a list of arguments or, in older files, a single string.
    #[serde(default)]
    pub cmdline_args: RawCmdlineArgs,

    #[serde(default)]
    pub execution_settings: serde_json::Map<String, serde_json::Value>,

    /// Optional override of the return code descriptions.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub return_codes: BTreeMap<String, String>,
}

/// Command line arguments of a specification file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawCmdlineArgs {
    List(Vec<String>),
    Legacy(String),
}

impl Default for RawCmdlineArgs {
    fn default() -> Self {
        RawCmdlineArgs::List(Vec::new())
    }
}

/// One entry of a Tool item's `cmd_line_args`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCmdLineArg {
    /// `"literal"` or `"resource"`.
    #[serde(rename = "type")]
    pub type_: String,
    pub arg: String,
}

/// Tool item dictionary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolItemConfig {
    #[serde(rename = "type", default = "default_tool_type")]
    pub item_type: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub x: f64,

    #[serde(default)]
    pub y: f64,

    /// Name of the specification, `""` if none.
    #[serde(default)]
    pub specification: String,

    #[serde(default = "default_true")]
    pub execute_in_work: bool,

    #[serde(default)]
    pub cmd_line_args: Vec<RawCmdLineArg>,

    #[serde(default)]
    pub options: serde_json::Map<String, serde_json::Value>,

    #[serde(default)]
    pub kill_completed_processes: bool,

    #[serde(default)]
    pub log_process_output: bool,

    #[serde(default)]
    pub group_id: Option<String>,
}

fn default_tool_type() -> String {
    "Tool".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ToolItemConfig {
    fn default() -> Self {
        Self {
            item_type: default_tool_type(),
            description: String::new(),
            x: 0.0,
            y: 0.0,
            specification: String::new(),
            execute_in_work: true,
            cmd_line_args: Vec::new(),
            options: serde_json::Map::new(),
            kill_completed_processes: false,
            log_process_output: false,
            group_id: None,
        }
    }
}

/// A path as serialized inside item dictionaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedPath {
    /// Always `"path"`.
    #[serde(rename = "type", default = "default_path_type")]
    pub type_: String,
    /// If true, `path` is relative to the project directory.
    pub relative: bool,
    pub path: String,
}

impl SerializedPath {
    /// Serialize `path`, relative to `project_dir` when it lies inside it.
    pub fn from_path(path: &Path, project_dir: &Path) -> Self {
        match path.strip_prefix(project_dir) {
            Ok(rel) => Self {
                type_: default_path_type(),
                relative: true,
                path: posix_string(rel),
            },
            Err(_) => Self {
                type_: default_path_type(),
                relative: false,
                path: posix_string(path),
            },
        }
    }

    /// Absolute path, resolving relative entries against `project_dir`.
    pub fn resolve(&self, project_dir: &Path) -> PathBuf {
        if self.relative {
            project_dir.join(&self.path)
        } else {
            PathBuf::from(&self.path)
        }
    }
}

fn default_path_type() -> String {
    "path".to_string()
}

/// `database` of a DB reference: a plain name, or a path for file databases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DatabaseField {
    Path(SerializedPath),
    Name(String),
}

/// One `db_references` entry of a Data Connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbReferenceConfig {
    pub dialect: String,

    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    pub database: DatabaseField,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

/// Data Connection item dictionary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConnectionItemConfig {
    #[serde(rename = "type", default = "default_dc_type")]
    pub item_type: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub x: f64,

    #[serde(default)]
    pub y: f64,

    #[serde(default)]
    pub file_references: Vec<SerializedPath>,

    #[serde(default)]
    pub db_references: Vec<DbReferenceConfig>,

    /// Local only: `safe url -> [username, password]`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub db_credentials: BTreeMap<String, (String, String)>,
}

fn default_dc_type() -> String {
    "Data Connection".to_string()
}

impl Default for DataConnectionItemConfig {
    fn default() -> Self {
        Self {
            item_type: default_dc_type(),
            description: String::new(),
            x: 0.0,
            y: 0.0,
            file_references: Vec::new(),
            db_references: Vec::new(),
            db_credentials: BTreeMap::new(),
        }
    }
}

/// Data Transformer item dictionary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataTransformerItemConfig {
    #[serde(rename = "type", default = "default_dt_type")]
    pub item_type: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub specification: String,
}

fn default_dt_type() -> String {
    "Data Transformer".to_string()
}

/// Data Transformer specification file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDataTransformerSpecification {
    pub name: String,

    #[serde(default = "default_dt_type")]
    pub item_type: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub filter: Option<RawFilter>,
}

/// `filter` section of a Data Transformer specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFilter {
    #[serde(rename = "type")]
    pub type_: String,

    #[serde(default)]
    pub settings: serde_json::Value,
}
