#![allow(dead_code)]

use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};
use spine_items::config::{RawCmdLineArg, ToolItemConfig};
use spine_items::resource::{database_resource, file_resource, ProjectItemResource};
use spine_items::spec::ToolSpecification;

/// Builder for Tool specification documents.
///
/// The document is written next to the program files, so `includes_main_path`
/// defaults to `"."`.
pub struct ToolSpecBuilder {
    doc: Map<String, Value>,
}

impl ToolSpecBuilder {
    pub fn new(name: &str, tooltype: &str) -> Self {
        let mut doc = Map::new();
        doc.insert("name".into(), json!(name));
        doc.insert("tooltype".into(), json!(tooltype));
        doc.insert("includes".into(), json!([]));
        Self { doc }
    }

    pub fn python(name: &str) -> Self {
        Self::new(name, "python")
    }

    pub fn executable(name: &str) -> Self {
        Self::new(name, "executable")
    }

    pub fn include(mut self, file: &str) -> Self {
        if let Some(Value::Array(includes)) = self.doc.get_mut("includes") {
            includes.push(json!(file));
        }
        self.doc
            .entry("includes_main_path")
            .or_insert_with(|| json!("."));
        self
    }

    fn push(mut self, key: &str, value: &str) -> Self {
        let list = self.doc.entry(key).or_insert_with(|| json!([]));
        if let Value::Array(items) = list {
            items.push(json!(value));
        }
        self
    }

    pub fn input(self, file: &str) -> Self {
        self.push("inputfiles", file)
    }

    pub fn optional_input(self, pattern: &str) -> Self {
        self.push("inputfiles_opt", pattern)
    }

    pub fn output(self, file: &str) -> Self {
        self.push("outputfiles", file)
    }

    pub fn cmdline_arg(self, arg: &str) -> Self {
        self.push("cmdline_args", arg)
    }

    pub fn execution_setting(mut self, key: &str, value: Value) -> Self {
        let settings = self
            .doc
            .entry("execution_settings")
            .or_insert_with(|| json!({}));
        if let Value::Object(map) = settings {
            map.insert(key.to_string(), value);
        }
        self
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.doc.clone())
    }

    /// Build against a definition file inside `dir`.
    pub fn build_in(self, dir: &Path) -> ToolSpecification {
        ToolSpecification::from_json(self.to_json(), &dir.join("spec.json"))
            .expect("Failed to build valid specification from builder")
    }

    /// Write the document to `<dir>/spec.json` and return its path.
    pub fn write_to(self, dir: &Path) -> PathBuf {
        let path = dir.join("spec.json");
        let text = serde_json::to_string_pretty(&self.to_json()).expect("serializable");
        std::fs::write(&path, text).expect("Failed to write specification");
        path
    }
}

/// Builder for Tool item dictionaries.
pub struct ToolItemBuilder {
    config: ToolItemConfig,
}

impl ToolItemBuilder {
    pub fn new(specification: &str) -> Self {
        Self {
            config: ToolItemConfig {
                specification: specification.to_string(),
                ..ToolItemConfig::default()
            },
        }
    }

    pub fn literal_arg(mut self, arg: &str) -> Self {
        self.config.cmd_line_args.push(RawCmdLineArg {
            type_: "literal".to_string(),
            arg: arg.to_string(),
        });
        self
    }

    pub fn resource_arg(mut self, label: &str) -> Self {
        self.config.cmd_line_args.push(RawCmdLineArg {
            type_: "resource".to_string(),
            arg: label.to_string(),
        });
        self
    }

    pub fn execute_in_work(mut self, value: bool) -> Self {
        self.config.execute_in_work = value;
        self
    }

    pub fn log_process_output(mut self, value: bool) -> Self {
        self.config.log_process_output = value;
        self
    }

    pub fn kill_completed(mut self, value: bool) -> Self {
        self.config.kill_completed_processes = value;
        self
    }

    pub fn group_id(mut self, group: &str) -> Self {
        self.config.group_id = Some(group.to_string());
        self
    }

    pub fn build(self) -> ToolItemConfig {
        self.config
    }
}

/// A file resource from an upstream item called `upstream`.
pub fn upstream_file(path: &Path) -> ProjectItemResource {
    file_resource("upstream", path, None)
}

/// A file resource with an explicit label.
pub fn labelled_file(path: &Path, label: &str) -> ProjectItemResource {
    file_resource("upstream", path, Some(label.to_string()))
}

pub fn upstream_database(url: &str) -> ProjectItemResource {
    database_resource("upstream", url, None)
}
