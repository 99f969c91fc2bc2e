// src/dc/item.rs

//! The Data Connection item: a list of file and database references that
//! are handed downstream as resources.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{DataConnectionItemConfig, SerializedPath};
use crate::dc::db_reference::DbReference;
use crate::errors::Result;
use crate::fs::FileSystem;
use crate::item::{item_data_dir, ExecutableItem, ItemExecutionFinishState, ItemFuture, ItemLogger};
use crate::resource::{database_resource, file_resource, label_for_path, ProjectItemResource};
use crate::watch::{ReferenceEvent, ReferenceWatcher};

pub const ITEM_TYPE: &str = "Data Connection";

#[derive(Debug)]
pub struct DataConnection {
    name: String,
    description: String,
    position: (f64, f64),
    project_dir: PathBuf,
    data_dir: PathBuf,
    file_references: Vec<PathBuf>,
    db_references: Vec<DbReference>,
    /// `safe url -> (username, password)`; never exported.
    db_credentials: BTreeMap<String, (String, String)>,
    missing_files: BTreeSet<PathBuf>,
    /// Safe URLs of database references whose file is gone.
    missing_dbs: BTreeSet<String>,
    logger: ItemLogger,
}

impl DataConnection {
    pub fn new(
        name: impl Into<String>,
        project_dir: impl Into<PathBuf>,
        logger: ItemLogger,
    ) -> Self {
        let name = name.into();
        let project_dir = project_dir.into();
        let data_dir = item_data_dir(&project_dir, &name);
        Self {
            name,
            description: String::new(),
            position: (0.0, 0.0),
            project_dir,
            data_dir,
            file_references: Vec::new(),
            db_references: Vec::new(),
            db_credentials: BTreeMap::new(),
            missing_files: BTreeSet::new(),
            missing_dbs: BTreeSet::new(),
            logger,
        }
    }

    /// Build from a Data Connection item dictionary.
    pub fn from_dict(
        name: impl Into<String>,
        config: &DataConnectionItemConfig,
        project_dir: impl Into<PathBuf>,
        logger: ItemLogger,
    ) -> Result<Self> {
        crate::config::validate_item_type(ITEM_TYPE, &config.item_type)?;
        let mut dc = Self::new(name, project_dir, logger);
        dc.description = config.description.clone();
        dc.position = (config.x, config.y);
        for reference in &config.file_references {
            let path = reference.resolve(&dc.project_dir);
            dc.add_file_reference(path);
        }
        for db in &config.db_references {
            let db = DbReference::from_config(db, &dc.project_dir);
            dc.add_db_reference(db);
        }
        dc.db_credentials = config.db_credentials.clone();
        debug!(
            item = %dc.name,
            files = dc.file_references.len(),
            dbs = dc.db_references.len(),
            "data connection loaded"
        );
        Ok(dc)
    }

    /// Item dictionary. Credentials are only included in the local dict.
    pub fn to_dict(&self, local: bool) -> DataConnectionItemConfig {
        DataConnectionItemConfig {
            item_type: ITEM_TYPE.to_string(),
            description: self.description.clone(),
            x: self.position.0,
            y: self.position.1,
            file_references: self
                .file_references
                .iter()
                .map(|p| SerializedPath::from_path(p, &self.project_dir))
                .collect(),
            db_references: self
                .db_references
                .iter()
                .map(|db| db.to_config(&self.project_dir))
                .collect(),
            db_credentials: if local {
                self.db_credentials.clone()
            } else {
                BTreeMap::new()
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn file_references(&self) -> &[PathBuf] {
        &self.file_references
    }

    pub fn db_references(&self) -> &[DbReference] {
        &self.db_references
    }

    /// Returns false if the path was already referenced.
    pub fn add_file_reference(&mut self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        if self.file_references.contains(&path) {
            return false;
        }
        if !path.is_file() {
            self.missing_files.insert(path.clone());
        }
        self.file_references.push(path);
        true
    }

    pub fn remove_file_reference(&mut self, path: &Path) -> bool {
        let before = self.file_references.len();
        self.file_references.retain(|p| p != path);
        self.missing_files.remove(path);
        before != self.file_references.len()
    }

    /// Returns false if a reference with the same safe URL exists.
    pub fn add_db_reference(&mut self, db: DbReference) -> bool {
        let url = db.safe_url();
        if self.db_references.iter().any(|d| d.safe_url() == url) {
            return false;
        }
        if let Some(file) = db.sqlite_file() {
            if !file.is_file() {
                self.missing_dbs.insert(url);
            }
        }
        self.db_references.push(db);
        true
    }

    pub fn remove_db_reference(&mut self, safe_url: &str) -> bool {
        let before = self.db_references.len();
        self.db_references.retain(|d| d.safe_url() != safe_url);
        self.missing_dbs.remove(safe_url);
        self.db_credentials.remove(safe_url);
        before != self.db_references.len()
    }

    pub fn set_credentials(
        &mut self,
        safe_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) {
        self.db_credentials
            .insert(safe_url.into(), (username.into(), password.into()));
    }

    pub fn credentials(&self, safe_url: &str) -> Option<&(String, String)> {
        self.db_credentials.get(safe_url)
    }

    pub fn is_missing(&self, path: &Path) -> bool {
        self.missing_files.contains(path)
    }

    pub fn is_db_missing(&self, db: &DbReference) -> bool {
        self.missing_dbs.contains(&db.safe_url())
    }

    /// Files directly inside the data directory, sorted.
    pub fn data_files(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.data_dir) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        files
    }

    /// Reference bookkeeping for every file this item depends on: file
    /// references, SQLite database files and the data directory.
    ///
    /// The returned events report references that are already missing.
    pub fn reference_watcher(
        &self,
        fs: Arc<dyn FileSystem>,
    ) -> (ReferenceWatcher, Vec<ReferenceEvent>) {
        let mut watcher = ReferenceWatcher::new(fs);
        let mut events = Vec::new();
        for path in &self.file_references {
            events.extend(watcher.add_file_reference(path.clone()));
        }
        for file in self.db_references.iter().filter_map(DbReference::sqlite_file) {
            events.extend(watcher.add_database_file(file));
        }
        watcher.watch_directory(self.data_dir.clone());
        (watcher, events)
    }

    /// Update references after a watcher event. Returns true if anything
    /// changed.
    ///
    /// A renamed or removed SQLite database file marks its reference missing;
    /// the URL itself is kept so the user can repair it.
    pub fn apply_reference_event(&mut self, event: &ReferenceEvent) -> bool {
        match event {
            ReferenceEvent::Renamed { old, new } => {
                if self.mark_db_missing(old) {
                    return true;
                }
                let Some(slot) = self.file_references.iter_mut().find(|p| *p == old) else {
                    return false;
                };
                *slot = new.clone();
                self.missing_files.remove(old);
                self.logger.msg(format!(
                    "File reference {} renamed to {}",
                    old.display(),
                    new.display()
                ));
                true
            }
            ReferenceEvent::Missing(path) => {
                if self.mark_db_missing(path) {
                    return true;
                }
                if self.file_references.contains(path) && self.missing_files.insert(path.clone()) {
                    let text = format!("File reference {} is missing", path.display());
                    self.logger.msg_warning(text);
                    return true;
                }
                false
            }
            ReferenceEvent::Found(path) => {
                let db_urls: Vec<String> = self
                    .db_references
                    .iter()
                    .filter(|db| db.sqlite_file().as_deref() == Some(path.as_path()))
                    .map(DbReference::safe_url)
                    .collect();
                let mut changed = false;
                for url in db_urls {
                    changed |= self.missing_dbs.remove(&url);
                }
                changed |= self.missing_files.remove(path);
                if changed {
                    info!(item = %self.name, path = ?path, "reference found again");
                }
                changed
            }
            // Data directory contents are listed on demand.
            ReferenceEvent::Added(_) | ReferenceEvent::Removed(_) => {
                debug!(item = %self.name, event = ?event, "data directory changed");
                true
            }
        }
    }

    fn mark_db_missing(&mut self, file: &Path) -> bool {
        let urls: Vec<String> = self
            .db_references
            .iter()
            .filter(|db| db.sqlite_file().as_deref() == Some(file))
            .map(DbReference::safe_url)
            .collect();
        if urls.is_empty() {
            return false;
        }
        for url in urls {
            if self.missing_dbs.insert(url.clone()) {
                self.logger.msg_warning(format!("Database {url} is missing"));
            }
        }
        true
    }

    fn resources(&self) -> Vec<ProjectItemResource> {
        let mut resources = Vec::new();
        for path in &self.file_references {
            if self.missing_files.contains(path) || !path.is_file() {
                continue;
            }
            let label = label_for_path(&self.name, path, &self.data_dir, &self.project_dir);
            resources.push(file_resource(&self.name, path, Some(label)));
        }
        for path in self.data_files() {
            let label = label_for_path(&self.name, &path, &self.data_dir, &self.project_dir);
            resources.push(file_resource(&self.name, &path, Some(label)));
        }
        for db in &self.db_references {
            let safe_url = db.safe_url();
            if self.missing_dbs.contains(&safe_url) {
                continue;
            }
            let url = db.url(self.db_credentials.get(&safe_url));
            resources.push(database_resource(&self.name, url, Some(safe_url)));
        }
        resources
    }
}

impl ExecutableItem for DataConnection {
    fn item_name(&self) -> &str {
        &self.name
    }

    fn ready_to_execute(&self) -> bool {
        true
    }

    fn execute<'a>(
        &'a self,
        _forward_resources: &'a [ProjectItemResource],
        _backward_resources: &'a [ProjectItemResource],
    ) -> ItemFuture<'a, ItemExecutionFinishState> {
        Box::pin(async { ItemExecutionFinishState::Success })
    }

    fn output_resources_forward(&self) -> Vec<ProjectItemResource> {
        self.resources()
    }

    fn stop_execution(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_only_in_local_dict() {
        let tmp = tempfile::tempdir().unwrap();
        let mut dc = DataConnection::new("DC", tmp.path(), ItemLogger::new("DC"));
        let db = DbReference::server("postgresql", "localhost", None, "models").with_username("u");
        let key = db.safe_url();
        dc.add_db_reference(db);
        dc.set_credentials(key.clone(), "u", "pw");

        assert_eq!(dc.to_dict(true).db_credentials.len(), 1);
        assert!(dc.to_dict(false).db_credentials.is_empty());

        let resources = dc.output_resources_forward();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].label, key);
        assert_eq!(resources[0].url.as_deref(), Some("postgresql://u:pw@localhost/models"));
    }

    #[test]
    fn renamed_sqlite_file_marks_db_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let db_file = tmp.path().join("x.sqlite");
        std::fs::write(&db_file, b"").unwrap();
        let mut dc = DataConnection::new("DC", tmp.path(), ItemLogger::new("DC"));
        dc.add_db_reference(DbReference::sqlite(&db_file));
        let url = dc.db_references()[0].url(None);

        let changed = dc.apply_reference_event(&ReferenceEvent::Renamed {
            old: db_file.clone(),
            new: tmp.path().join("y.sqlite"),
        });
        assert!(changed);
        assert!(dc.is_db_missing(&dc.db_references()[0].clone()));
        assert_eq!(dc.db_references()[0].url(None), url);
        assert!(dc.output_resources_forward().is_empty());

        assert!(dc.apply_reference_event(&ReferenceEvent::Found(db_file)));
        assert_eq!(dc.output_resources_forward().len(), 1);
    }
}
