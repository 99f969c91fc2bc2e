// src/spec/tool_spec.rs

//! Tool specifications: the declarative contract of an external program.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::config::model::{RawCmdlineArgs, RawToolSpecification};
use crate::config::validate::validate_tool_spec_value;
use crate::errors::{ItemError, Result};
use crate::exec::{ExecContext, InstanceOwner, ToolInstance};
use crate::item::ItemLogger;
use crate::spec::cmdline::split_cmdline_args;
use crate::spec::execution_settings::{ExecutionSettings, ToolType};

/// An immutable Tool specification.
///
/// Construct with [`ToolSpecification::from_json`] or
/// [`ToolSpecification::from_raw`]; both validate the document. A spec is
/// shared between runs as `Arc<ToolSpecification>` and never mutated; edits
/// produce a new value via [`ToolSpecification::clone_spec`].
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpecification {
    name: String,
    description: String,
    tooltype: ToolType,
    /// Source directory of the program files.
    path: PathBuf,
    /// Directory containing the definition file.
    definition_dir: PathBuf,
    includes: Vec<String>,
    includes_main_path: Option<String>,
    inputfiles: BTreeSet<String>,
    inputfiles_opt: BTreeSet<String>,
    outputfiles: BTreeSet<String>,
    cmdline_args: Vec<String>,
    execution_settings: ExecutionSettings,
    return_codes: BTreeMap<i32, String>,
}

impl ToolSpecification {
    /// Build a specification from a JSON document.
    ///
    /// `definition_file` is the path the document was read from; relative
    /// program paths are resolved against its directory.
    pub fn from_json(value: serde_json::Value, definition_file: &Path) -> Result<Self> {
        validate_tool_spec_value(&value)?;
        let raw: RawToolSpecification = serde_json::from_value(value)?;
        let definition_dir = definition_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::from_raw(raw, &definition_dir)
    }

    /// Build a specification from its raw model.
    pub fn from_raw(raw: RawToolSpecification, definition_dir: &Path) -> Result<Self> {
        let name = raw.name.trim().to_string();
        if name.is_empty() {
            return Err(ItemError::InvalidSpecification(
                "specification name must not be empty".to_string(),
            ));
        }
        let tooltype: ToolType = raw.tooltype.parse()?;

        let cmdline_args = match raw.cmdline_args {
            RawCmdlineArgs::List(args) => args,
            RawCmdlineArgs::Legacy(args) => split_cmdline_args(&args)?,
        };

        let execution_settings =
            ExecutionSettings::from_map(tooltype, raw.execution_settings)?;

        let includes: Vec<String> = raw
            .includes
            .into_iter()
            .filter(|i| !i.trim().is_empty())
            .collect();

        if tooltype != ToolType::Executable && includes.is_empty() {
            return Err(ItemError::InvalidSpecification(format!(
                "specification '{name}' of type {} needs at least one program file",
                tooltype.as_str()
            )));
        }
        if tooltype == ToolType::Executable && includes.is_empty() {
            let has_cmd = matches!(
                &execution_settings,
                ExecutionSettings::Executable(s) if !s.cmd.trim().is_empty()
            );
            if !has_cmd {
                return Err(ItemError::InvalidSpecification(format!(
                    "executable specification '{name}' needs a program file or a command"
                )));
            }
        }

        let mut return_codes = default_return_codes(tooltype);
        for (code, description) in raw.return_codes {
            let code: i32 = code.trim().parse().map_err(|_| {
                ItemError::InvalidSpecification(format!("invalid return code '{code}'"))
            })?;
            return_codes.insert(code, description);
        }

        let path = match &raw.includes_main_path {
            Some(main_path) if !includes.is_empty() => {
                normalize_path(&definition_dir.join(main_path))
            }
            _ => definition_dir.to_path_buf(),
        };

        Ok(Self {
            name,
            description: raw.description,
            tooltype,
            path,
            definition_dir: definition_dir.to_path_buf(),
            includes,
            includes_main_path: raw.includes_main_path,
            inputfiles: raw.inputfiles.into_iter().collect(),
            inputfiles_opt: raw.inputfiles_opt.into_iter().collect(),
            outputfiles: raw.outputfiles.into_iter().collect(),
            cmdline_args,
            execution_settings,
            return_codes,
        })
    }

    /// Raw model of this specification, e.g. for saving.
    pub fn to_raw(&self) -> RawToolSpecification {
        RawToolSpecification {
            name: self.name.clone(),
            tooltype: self.tooltype.as_str().to_string(),
            description: self.description.clone(),
            includes: self.includes.clone(),
            includes_main_path: self.includes_main_path.clone(),
            inputfiles: self.inputfiles.iter().cloned().collect(),
            inputfiles_opt: self.inputfiles_opt.iter().cloned().collect(),
            outputfiles: self.outputfiles.iter().cloned().collect(),
            cmdline_args: RawCmdlineArgs::List(self.cmdline_args.clone()),
            execution_settings: self.execution_settings.to_map(),
            return_codes: BTreeMap::new(),
        }
    }

    /// Deep copy that re-runs construction.
    pub fn clone_spec(&self) -> Result<Self> {
        let mut raw = self.to_raw();
        raw.return_codes = self
            .return_codes
            .iter()
            .map(|(code, description)| (code.to_string(), description.clone()))
            .collect();
        let mut copy = Self::from_raw(raw, &self.definition_dir)?;
        copy.path = self.path.clone();
        Ok(copy)
    }

    /// Same specification with a different execution settings map.
    pub fn with_execution_settings(
        &self,
        settings: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self> {
        let mut copy = self.clone_spec()?;
        copy.execution_settings = ExecutionSettings::from_map(self.tooltype, settings)?;
        Ok(copy)
    }

    /// Compare every attribute; list-valued attributes ignore order.
    pub fn is_equivalent(&self, other: &ToolSpecification) -> bool {
        fn sorted(v: &[String]) -> Vec<&String> {
            let mut s: Vec<&String> = v.iter().collect();
            s.sort();
            s
        }

        self.name == other.name
            && self.description == other.description
            && self.tooltype == other.tooltype
            && self.path == other.path
            && sorted(&self.includes) == sorted(&other.includes)
            && self.inputfiles == other.inputfiles
            && self.inputfiles_opt == other.inputfiles_opt
            && self.outputfiles == other.outputfiles
            && sorted(&self.cmdline_args) == sorted(&other.cmdline_args)
            && self.execution_settings == other.execution_settings
            && self.return_codes == other.return_codes
    }

    /// Create the back-end instance that runs this specification.
    pub fn create_tool_instance(
        self: &Arc<Self>,
        exec_dir: &Path,
        kill_completed: bool,
        logger: ItemLogger,
        owner: InstanceOwner,
        context: ExecContext,
    ) -> ToolInstance {
        ToolInstance::new(
            Arc::clone(self),
            exec_dir.to_path_buf(),
            kill_completed,
            logger,
            owner,
            context,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name usable in file paths: lower case, spaces replaced.
    pub fn short_name(&self) -> String {
        self.name.to_lowercase().replace(' ', "_")
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn tooltype(&self) -> ToolType {
        self.tooltype
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn definition_dir(&self) -> &Path {
        &self.definition_dir
    }

    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    /// Main program file, i.e. the first include.
    pub fn main_prgm(&self) -> Option<&str> {
        self.includes.first().map(String::as_str)
    }

    /// Absolute path of the main program file in the source directory.
    pub fn main_prgm_path(&self) -> Option<PathBuf> {
        self.main_prgm().map(|p| self.path.join(p))
    }

    pub fn inputfiles(&self) -> &BTreeSet<String> {
        &self.inputfiles
    }

    pub fn inputfiles_opt(&self) -> &BTreeSet<String> {
        &self.inputfiles_opt
    }

    pub fn outputfiles(&self) -> &BTreeSet<String> {
        &self.outputfiles
    }

    pub fn cmdline_args(&self) -> &[String] {
        &self.cmdline_args
    }

    pub fn execution_settings(&self) -> &ExecutionSettings {
        &self.execution_settings
    }

    pub fn return_codes(&self) -> &BTreeMap<i32, String> {
        &self.return_codes
    }

    /// Human readable description of an exit code.
    pub fn return_code_message(&self, code: i32) -> &str {
        self.return_codes
            .get(&code)
            .map(String::as_str)
            .unwrap_or("unknown")
    }
}

/// Return code descriptions every specification of a type starts with.
pub fn default_return_codes(tooltype: ToolType) -> BTreeMap<i32, String> {
    let table: &[(i32, &str)] = match tooltype {
        ToolType::Gams => &[
            (0, "Normal return"),
            (1, "Solver is to be called the system should never return this number"),
            (2, "There was a compilation error"),
            (3, "There was an execution error"),
            (4, "System limits were reached"),
            (5, "There was a file error"),
            (6, "There was a parameter error"),
            (7, "There was a licensing error"),
            (8, "There was a GAMS system error"),
            (9, "GAMS could not be started"),
            (10, "Out of memory"),
            (11, "Out of disk"),
            (62097, "Simulation interrupted by user"),
        ],
        ToolType::Python | ToolType::Julia | ToolType::Executable => {
            &[(0, "Normal return"), (-1, "Error happened in script")]
        }
    };
    table
        .iter()
        .map(|(code, description)| (*code, description.to_string()))
        .collect()
}

/// Lexically normalize `.` and `..` components.
fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
