// src/item.rs

//! The seam between project items and the engine that runs them.
//!
//! - [`ExecutableItem`] is what an engine calls to run an item for one
//!   filter.
//! - [`ItemLogger`] is how items report messages and process output. It
//!   always emits `tracing` events and optionally forwards [`ItemEvent`]s to
//!   a channel and process output to an [`OutputLogWriter`].

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::output_log::OutputLogWriter;
use crate::resource::ProjectItemResource;

/// How an item's execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemExecutionFinishState {
    Success,
    Failure,
    Skipped,
    Excluded,
    Stopped,
}

impl fmt::Display for ItemExecutionFinishState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ItemExecutionFinishState::Success => "SUCCESS",
            ItemExecutionFinishState::Failure => "FAILURE",
            ItemExecutionFinishState::Skipped => "SKIPPED",
            ItemExecutionFinishState::Excluded => "EXCLUDED",
            ItemExecutionFinishState::Stopped => "STOPPED",
        };
        f.write_str(s)
    }
}

/// Directory name of an item: lower case, spaces replaced.
pub fn short_name(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

/// `<project>/.spinetoolbox/items/<short name>`
pub fn item_data_dir(project_dir: &Path, name: &str) -> PathBuf {
    project_dir
        .join(".spinetoolbox")
        .join("items")
        .join(short_name(name))
}

/// Severity of an item message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Msg,
    Success,
    Warning,
    Error,
}

/// Stream a piece of process output belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    Stdin,
    Stdout,
    Stderr,
}

/// Events observable by whoever hosts the items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemEvent {
    Message {
        item: String,
        filter_id: String,
        kind: MessageKind,
        text: String,
    },
    ProcessOutput {
        item: String,
        filter_id: String,
        stream: OutputStream,
        text: String,
    },
}

/// Logger handed to items, staging helpers and tool instances.
///
/// Cheap to clone; clones share the sink and the output log.
#[derive(Clone)]
pub struct ItemLogger {
    item_name: String,
    filter_id: String,
    sink: Option<mpsc::UnboundedSender<ItemEvent>>,
    output_log: Option<Arc<Mutex<OutputLogWriter>>>,
}

impl fmt::Debug for ItemLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemLogger")
            .field("item_name", &self.item_name)
            .field("filter_id", &self.filter_id)
            .finish_non_exhaustive()
    }
}

impl ItemLogger {
    pub fn new(item_name: impl Into<String>) -> Self {
        Self {
            item_name: item_name.into(),
            filter_id: String::new(),
            sink: None,
            output_log: None,
        }
    }

    pub fn with_sink(mut self, sink: mpsc::UnboundedSender<ItemEvent>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_filter_id(mut self, filter_id: impl Into<String>) -> Self {
        self.filter_id = filter_id.into();
        self
    }

    pub fn with_output_log(mut self, writer: Arc<Mutex<OutputLogWriter>>) -> Self {
        self.output_log = Some(writer);
        self
    }

    pub fn item_name(&self) -> &str {
        &self.item_name
    }

    pub fn filter_id(&self) -> &str {
        &self.filter_id
    }

    pub fn msg(&self, text: impl Into<String>) {
        let text = text.into();
        info!(item = %self.item_name, filter_id = %self.filter_id, "{}", text);
        self.send_message(MessageKind::Msg, text);
    }

    pub fn msg_success(&self, text: impl Into<String>) {
        let text = text.into();
        info!(item = %self.item_name, filter_id = %self.filter_id, "{}", text);
        self.send_message(MessageKind::Success, text);
    }

    pub fn msg_warning(&self, text: impl Into<String>) {
        let text = text.into();
        warn!(item = %self.item_name, filter_id = %self.filter_id, "{}", text);
        self.send_message(MessageKind::Warning, text);
    }

    pub fn msg_error(&self, text: impl Into<String>) {
        let text = text.into();
        error!(item = %self.item_name, filter_id = %self.filter_id, "{}", text);
        self.send_message(MessageKind::Error, text);
    }

    /// Report process input or output.
    pub fn msg_proc(&self, stream: OutputStream, text: impl Into<String>) {
        let text = text.into();
        debug!(item = %self.item_name, filter_id = %self.filter_id, ?stream, "{}", text);

        if let Some(writer) = &self.output_log {
            match writer.lock() {
                Ok(mut writer) => {
                    if let Err(err) = writer.write(&self.filter_id, stream, &text) {
                        warn!(item = %self.item_name, error = %err, "failed to write execution log");
                    }
                }
                Err(_) => warn!(item = %self.item_name, "execution log mutex poisoned"),
            }
        }

        if let Some(sink) = &self.sink {
            let _ = sink.send(ItemEvent::ProcessOutput {
                item: self.item_name.clone(),
                filter_id: self.filter_id.clone(),
                stream,
                text,
            });
        }
    }

    fn send_message(&self, kind: MessageKind, text: String) {
        if let Some(sink) = &self.sink {
            let _ = sink.send(ItemEvent::Message {
                item: self.item_name.clone(),
                filter_id: self.filter_id.clone(),
                kind,
                text,
            });
        }
    }
}

/// Boxed future returned by [`ExecutableItem`] methods.
pub type ItemFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Headless half of a project item, as seen by the engine.
///
/// `execute` runs the item for the filter its logger is scoped to;
/// `stop_execution` may be called from another task while `execute` is
/// pending and must be idempotent.
pub trait ExecutableItem: Send + Sync {
    fn item_name(&self) -> &str;

    /// Check prerequisites; logs a specific diagnostic when not ready.
    fn ready_to_execute(&self) -> bool;

    fn execute<'a>(
        &'a self,
        forward_resources: &'a [ProjectItemResource],
        backward_resources: &'a [ProjectItemResource],
    ) -> ItemFuture<'a, ItemExecutionFinishState>;

    /// Called instead of `execute` when the engine skips this item.
    fn exclude_execution<'a>(
        &'a self,
        _forward_resources: &'a [ProjectItemResource],
        _backward_resources: &'a [ProjectItemResource],
    ) -> ItemFuture<'a, ()> {
        Box::pin(async {})
    }

    fn output_resources_forward(&self) -> Vec<ProjectItemResource>;

    fn output_resources_backward(&self) -> Vec<ProjectItemResource> {
        Vec::new()
    }

    fn stop_execution(&self);
}
