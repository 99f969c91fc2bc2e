// src/dt/item.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::config::DataTransformerItemConfig;
use crate::dt::rewriter::rewrite_resources;
use crate::dt::spec::DataTransformerSpecification;
use crate::errors::Result;
use crate::fs::FileSystem;
use crate::item::{item_data_dir, ExecutableItem, ItemExecutionFinishState, ItemFuture, ItemLogger};
use crate::resource::ProjectItemResource;

pub const ITEM_TYPE: &str = "Data Transformer";

/// Headless Data Transformer: forwards inbound databases with its filter
/// configuration attached.
#[derive(Debug)]
pub struct DataTransformerExecutable {
    name: String,
    data_dir: PathBuf,
    spec: Option<Arc<DataTransformerSpecification>>,
    fs: Arc<dyn FileSystem>,
    logger: ItemLogger,
    forward: Mutex<Vec<ProjectItemResource>>,
}

impl DataTransformerExecutable {
    pub fn new(
        name: impl Into<String>,
        project_dir: &Path,
        spec: Option<Arc<DataTransformerSpecification>>,
        fs: Arc<dyn FileSystem>,
        logger: ItemLogger,
    ) -> Self {
        let name = name.into();
        let data_dir = item_data_dir(project_dir, &name);
        Self {
            name,
            data_dir,
            spec,
            fs,
            logger,
            forward: Mutex::new(Vec::new()),
        }
    }

    pub fn from_dict(
        name: impl Into<String>,
        config: &DataTransformerItemConfig,
        project_dir: &Path,
        specifications: &BTreeMap<String, Arc<DataTransformerSpecification>>,
        fs: Arc<dyn FileSystem>,
        logger: ItemLogger,
    ) -> Result<Self> {
        crate::config::validate_item_type(ITEM_TYPE, &config.item_type)?;
        let name = name.into();
        let spec = if config.specification.is_empty() {
            None
        } else {
            let found = specifications.get(&config.specification).cloned();
            if found.is_none() {
                logger.msg_warning(format!(
                    "Data Transformer {name}: specification {} not found",
                    config.specification
                ));
            }
            found
        };
        Ok(Self::new(name, project_dir, spec, fs, logger))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn specification(&self) -> Option<&Arc<DataTransformerSpecification>> {
        self.spec.as_ref()
    }

    /// Rewrite inbound database resources.
    pub fn rewrite(&self, resources: &[ProjectItemResource]) -> Result<Vec<ProjectItemResource>> {
        let config = self
            .spec
            .as_ref()
            .and_then(|spec| spec.settings())
            .map(|settings| settings.filter_config());
        rewrite_resources(&self.name, config.as_ref(), resources, &self.data_dir, self.fs.as_ref())
    }

    fn update_forward(&self, resources: &[ProjectItemResource]) -> ItemExecutionFinishState {
        match self.rewrite(resources) {
            Ok(rewritten) => {
                debug!(item = %self.name, count = rewritten.len(), "forward resources rewritten");
                if let Ok(mut forward) = self.forward.lock() {
                    *forward = rewritten;
                }
                ItemExecutionFinishState::Success
            }
            Err(err) => {
                self.logger.msg_error(format!("Data Transformer {} failed: {err}", self.name));
                ItemExecutionFinishState::Failure
            }
        }
    }
}

impl ExecutableItem for DataTransformerExecutable {
    fn item_name(&self) -> &str {
        &self.name
    }

    fn ready_to_execute(&self) -> bool {
        true
    }

    fn execute<'a>(
        &'a self,
        forward_resources: &'a [ProjectItemResource],
        _backward_resources: &'a [ProjectItemResource],
    ) -> ItemFuture<'a, ItemExecutionFinishState> {
        Box::pin(async move {
            if self.spec.is_none() {
                self.logger.msg_warning(format!(
                    "Data Transformer {} has no specification; databases pass through",
                    self.name
                ));
            }
            self.update_forward(forward_resources)
        })
    }

    // Downstream items still need the transformed URLs.
    fn exclude_execution<'a>(
        &'a self,
        forward_resources: &'a [ProjectItemResource],
        _backward_resources: &'a [ProjectItemResource],
    ) -> ItemFuture<'a, ()> {
        Box::pin(async move {
            self.update_forward(forward_resources);
        })
    }

    fn output_resources_forward(&self) -> Vec<ProjectItemResource> {
        self.forward.lock().map(|f| f.clone()).unwrap_or_default()
    }

    fn stop_execution(&self) {}
}
