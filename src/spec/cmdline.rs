// src/spec/cmdline.rs

//! Command line argument values of Tool items.

use std::fmt;

use crate::config::model::RawCmdLineArg;
use crate::errors::{ItemError, Result};

/// A command line argument as configured on a Tool item.
///
/// `Label` arguments refer to an upstream resource by its label and are
/// expanded at launch time. `missing` is set when the label was not found
/// among the available resources the last time they were checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CmdLineArg {
    Literal(String),
    Label { label: String, missing: bool },
}

impl CmdLineArg {
    pub fn literal(text: impl Into<String>) -> Self {
        CmdLineArg::Literal(text.into())
    }

    pub fn label(label: impl Into<String>) -> Self {
        CmdLineArg::Label {
            label: label.into(),
            missing: false,
        }
    }

    /// Text of the argument, without expansion.
    pub fn as_str(&self) -> &str {
        match self {
            CmdLineArg::Literal(text) => text,
            CmdLineArg::Label { label, .. } => label,
        }
    }

    pub fn to_raw(&self) -> RawCmdLineArg {
        match self {
            CmdLineArg::Literal(text) => RawCmdLineArg {
                type_: "literal".to_string(),
                arg: text.clone(),
            },
            CmdLineArg::Label { label, .. } => RawCmdLineArg {
                type_: "resource".to_string(),
                arg: label.clone(),
            },
        }
    }
}

impl fmt::Display for CmdLineArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<RawCmdLineArg> for CmdLineArg {
    type Error = ItemError;

    fn try_from(raw: RawCmdLineArg) -> std::result::Result<Self, Self::Error> {
        match raw.type_.as_str() {
            "literal" => Ok(CmdLineArg::Literal(raw.arg)),
            "resource" => Ok(CmdLineArg::Label {
                label: raw.arg,
                missing: false,
            }),
            other => Err(ItemError::InvalidItem(format!(
                "unknown command line argument type '{other}' (expected \"literal\" or \"resource\")"
            ))),
        }
    }
}

/// Tokenize a legacy command line string with shell-like quoting.
pub fn split_cmdline_args(args: &str) -> Result<Vec<String>> {
    shlex::split(args).ok_or_else(|| {
        ItemError::InvalidSpecification(format!(
            "could not parse command line arguments: {args}"
        ))
    })
}
