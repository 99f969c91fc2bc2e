// src/dt/rewriter.rs

//! Rewriting of database URLs passing through a Data Transformer.
//!
//! The filter configuration travels with the URL as a `spinedbfilter`
//! query parameter: inline when it has a shorthand form, otherwise as the
//! path of a JSON file in the transformer's data directory.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::fs::FileSystem;
use crate::resource::{database_resource, posix_string, ProjectItemResource};

pub const FILTER_QUERY_KEY: &str = "spinedbfilter";
pub const FILTER_CONFIG_FILE: &str = "filter_config.json";

const RESERVED: &[char] = &[':', '&', '#', '?', '='];

fn plain(name: &str) -> Option<&str> {
    (!name.contains(RESERVED)).then_some(name)
}

/// Inline form of a filter configuration, if it has one.
///
/// Renamers become `entity_class_rename:old:new[:old:new...]` and
/// `parameter_rename:class:old:new[...]`. Names containing one of
/// `: & # ? =` cannot be written inline.
pub fn config_to_shorthand(config: &Value) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    match config.get("type")?.as_str()? {
        "entity_class_renamer" => {
            parts.push("entity_class_rename");
            for (old, new) in config.get("name_map")?.as_object()? {
                parts.push(plain(old)?);
                parts.push(plain(new.as_str()?)?);
            }
        }
        "parameter_renamer" => {
            parts.push("parameter_rename");
            for (class, renames) in config.get("name_map")?.as_object()? {
                for (old, new) in renames.as_object()? {
                    parts.push(plain(class)?);
                    parts.push(plain(old)?);
                    parts.push(plain(new.as_str()?)?);
                }
            }
        }
        _ => return None,
    }
    Some(parts.join(":"))
}

/// Append `spinedbfilter=<filter>` to the query of `url`.
pub fn append_filter_config(url: &str, filter: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{FILTER_QUERY_KEY}={filter}")
}

/// Where a non-inline configuration of the transformer is stored.
pub fn filter_config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(FILTER_CONFIG_FILE)
}

/// One forward resource per inbound database resource, provided by
/// `provider` under the inbound label.
///
/// Without a configuration URLs pass through unchanged. Other resource
/// types are dropped.
pub fn rewrite_resources(
    provider: &str,
    config: Option<&Value>,
    resources: &[ProjectItemResource],
    data_dir: &Path,
    fs: &dyn FileSystem,
) -> Result<Vec<ProjectItemResource>> {
    let filter = match config {
        None => None,
        Some(config) => Some(match config_to_shorthand(config) {
            Some(shorthand) => shorthand,
            None => {
                let path = filter_config_path(data_dir);
                let contents = serde_json::to_vec_pretty(config)?;
                fs.write_file(&path, &contents)?;
                debug!(provider, path = ?path, "wrote filter configuration");
                posix_string(&path)
            }
        }),
    };

    let rewritten = resources
        .iter()
        .filter(|r| r.is_database())
        .filter_map(|r| {
            let url = r.url.as_deref()?;
            let url = match &filter {
                Some(filter) => append_filter_config(url, filter),
                None => url.to_string(),
            };
            Some(database_resource(provider, url, Some(r.label.clone())))
        })
        .collect();
    Ok(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renamer_shorthand() {
        let config = json!({ "type": "entity_class_renamer", "name_map": { "unit": "node" } });
        assert_eq!(
            config_to_shorthand(&config).as_deref(),
            Some("entity_class_rename:unit:node")
        );
        let config = json!({ "type": "parameter_renamer", "name_map": { "unit": { "a": "b" } } });
        assert_eq!(
            config_to_shorthand(&config).as_deref(),
            Some("parameter_rename:unit:a:b")
        );
    }

    #[test]
    fn reserved_characters_prevent_shorthand() {
        let config = json!({ "type": "entity_class_renamer", "name_map": { "a=b": "c" } });
        assert_eq!(config_to_shorthand(&config), None);
        let config = json!({ "type": "value_transformer", "instructions": {} });
        assert_eq!(config_to_shorthand(&config), None);
    }

    #[test]
    fn query_separator_depends_on_existing_query() {
        assert_eq!(
            append_filter_config("sqlite:///x.sqlite", "f"),
            "sqlite:///x.sqlite?spinedbfilter=f"
        );
        assert_eq!(
            append_filter_config("sqlite:///x.sqlite?a=1", "f"),
            "sqlite:///x.sqlite?a=1&spinedbfilter=f"
        );
    }
}
