// src/resource.rs

//! Typed resources passed along the edges between project items.
//!
//! A resource is identified by its provider, type and label; the label is the
//! stable key used when command-line arguments refer to upstream data. File
//! resources carry a `file://` URL, transient and label-only pack resources
//! carry no URL at all.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Kind of a [`ProjectItemResource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceType {
    File,
    FileInPack,
    TransientFile,
    Database,
    Url,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceType::File => "file",
            ResourceType::FileInPack => "file_in_pack",
            ResourceType::TransientFile => "transient_file",
            ResourceType::Database => "database",
            ResourceType::Url => "url",
        };
        f.write_str(s)
    }
}

/// A resource provided by a project item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectItemResource {
    pub provider_name: String,
    #[serde(rename = "type")]
    pub type_: ResourceType,
    pub label: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl PartialEq for ProjectItemResource {
    fn eq(&self, other: &Self) -> bool {
        self.provider_name == other.provider_name
            && self.type_ == other.type_
            && self.label == other.label
            && self.url == other.url
    }
}

impl Eq for ProjectItemResource {}

impl Hash for ProjectItemResource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.provider_name.hash(state);
        self.type_.hash(state);
        self.label.hash(state);
        self.url.hash(state);
    }
}

impl ProjectItemResource {
    fn new(
        provider_name: impl Into<String>,
        type_: ResourceType,
        label: impl Into<String>,
        url: Option<String>,
    ) -> Self {
        Self {
            provider_name: provider_name.into(),
            type_,
            label: label.into(),
            url,
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Local filesystem path of a file-like resource, if it has one.
    pub fn path(&self) -> Option<PathBuf> {
        match self.type_ {
            ResourceType::File | ResourceType::FileInPack => {
                self.url.as_deref().map(path_from_file_url)
            }
            _ => None,
        }
    }

    /// True iff the resource carries a resolvable local path.
    pub fn hasfilepath(&self) -> bool {
        self.path().is_some()
    }

    pub fn is_database(&self) -> bool {
        self.type_ == ResourceType::Database
    }

    /// True for `file` and `file-in-pack` resources, with or without a path.
    pub fn is_file_like(&self) -> bool {
        matches!(
            self.type_,
            ResourceType::File | ResourceType::FileInPack | ResourceType::TransientFile
        )
    }

    /// Return a copy of this resource with a different provider.
    pub fn clone_with_provider(&self, provider_name: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.provider_name = provider_name.into();
        copy
    }
}

/// A concrete file. The label defaults to the absolute path.
pub fn file_resource(
    provider: impl Into<String>,
    path: impl AsRef<Path>,
    label: Option<String>,
) -> ProjectItemResource {
    let path = path.as_ref();
    let label = label.unwrap_or_else(|| posix_string(path));
    ProjectItemResource::new(provider, ResourceType::File, label, Some(file_url(path)))
}

/// A member of a file pack, labelled by the pack's pattern.
pub fn file_resource_in_pack(
    provider: impl Into<String>,
    label: impl Into<String>,
    path: Option<&Path>,
) -> ProjectItemResource {
    ProjectItemResource::new(
        provider,
        ResourceType::FileInPack,
        label,
        path.map(file_url),
    )
}

/// A file that does not exist yet; only its label is known.
pub fn transient_file_resource(
    provider: impl Into<String>,
    label: impl Into<String>,
) -> ProjectItemResource {
    ProjectItemResource::new(provider, ResourceType::TransientFile, label, None)
}

pub fn url_resource(
    provider: impl Into<String>,
    url: impl Into<String>,
    label: impl Into<String>,
) -> ProjectItemResource {
    ProjectItemResource::new(provider, ResourceType::Url, label, Some(url.into()))
}

/// A database URL. Without an explicit label the password-free URL is used.
pub fn database_resource(
    provider: impl Into<String>,
    url: impl Into<String>,
    label: Option<String>,
) -> ProjectItemResource {
    let url = url.into();
    let label = label.unwrap_or_else(|| crate::dc::db_reference::safe_url(&url));
    ProjectItemResource::new(provider, ResourceType::Database, label, Some(url))
}

/// Compute the label of a file resource according to where it lives.
///
/// - inside `data_dir`: `<provider>/<relative path>`
/// - inside `project_dir`: `<project>/<relative path>`
/// - anywhere else: the absolute path
pub fn label_for_path(provider: &str, path: &Path, data_dir: &Path, project_dir: &Path) -> String {
    if let Ok(rel) = path.strip_prefix(data_dir) {
        return format!("{}/{}", provider, posix_string(rel));
    }
    if let Ok(rel) = path.strip_prefix(project_dir) {
        return format!("<project>/{}", posix_string(rel));
    }
    posix_string(path)
}

/// Path rendered with forward slashes.
pub fn posix_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Build a `file://` URL for a local path.
pub fn file_url(path: &Path) -> String {
    let s = posix_string(path);
    format!("file:///{}", s.trim_start_matches('/'))
}

/// Inverse of [`file_url`]; plain paths are passed through.
pub fn path_from_file_url(url: &str) -> PathBuf {
    match url.strip_prefix("file://") {
        Some(rest) => {
            if cfg!(windows) {
                PathBuf::from(rest.trim_start_matches('/'))
            } else {
                PathBuf::from(format!("/{}", rest.trim_start_matches('/')))
            }
        }
        None => PathBuf::from(url),
    }
}

/// True if `s` contains the glob meta-characters `*` or `?`.
pub fn is_pattern(s: &str) -> bool {
    s.contains('*') || s.contains('?')
}
