// src/watch/watcher.rs

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::watch::path_utils::watched_dir_of;
use crate::watch::references::{ReferenceEvent, ReferenceWatcher};

/// How often and how long a missing reference is re-checked.
///
/// Editors often save by writing a temporary file and renaming it over the
/// original, so a reference can vanish for a moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    pub interval: Duration,
    pub attempts: u32,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            attempts: 5,
        }
    }
}

/// Input of the watcher loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchCommand {
    /// Coarse notification: something in this directory changed.
    DirectoryChanged(PathBuf),
    /// Raw OS event path; mapped to its watched directory.
    PathChanged(PathBuf),
    /// Delayed re-check of a missing reference.
    Recheck { path: PathBuf, attempt: u32 },
    AddReference(PathBuf),
    RemoveReference(PathBuf),
    WatchDirectory(PathBuf),
}

/// Handle of a running reference watcher.
///
/// The loop ends once every sender is gone.
pub struct ReferenceWatcherHandle {
    tx: mpsc::UnboundedSender<WatchCommand>,
    join: JoinHandle<ReferenceWatcher>,
}

impl std::fmt::Debug for ReferenceWatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceWatcherHandle").finish_non_exhaustive()
    }
}

impl ReferenceWatcherHandle {
    pub fn sender(&self) -> mpsc::UnboundedSender<WatchCommand> {
        self.tx.clone()
    }

    pub fn send(&self, command: WatchCommand) {
        let _ = self.tx.send(command);
    }

    /// Stop the loop and get the bookkeeping back.
    pub async fn shutdown(self) -> Result<ReferenceWatcher> {
        let Self { tx, join } = self;
        drop(tx);
        Ok(join.await?)
    }
}

/// Run `watcher` on a task, watching its directories with `notify`.
///
/// Reference events are sent to `events`. Directory changes are processed
/// one at a time, in arrival order.
pub fn spawn_reference_watcher(
    watcher: ReferenceWatcher,
    policy: RefreshPolicy,
    events: mpsc::UnboundedSender<ReferenceEvent>,
) -> Result<ReferenceWatcherHandle> {
    let (tx, rx) = mpsc::unbounded_channel::<WatchCommand>();
    let (notify_tx, notify_rx) = mpsc::unbounded_channel::<Event>();

    let mut os_watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let _ = notify_tx.send(event);
            }
            Err(err) => warn!(error = %err, "file watch error"),
        },
        Config::default(),
    )?;
    for dir in watcher.directories() {
        if let Err(err) = os_watcher.watch(&dir, RecursiveMode::NonRecursive) {
            warn!(?dir, error = %err, "cannot watch directory");
        }
    }
    info!(dirs = watcher.directories().len(), "reference watcher started");

    spawn_notify_forwarder(notify_rx, tx.downgrade());
    let join = tokio::spawn(run_loop(
        watcher,
        policy,
        rx,
        tx.downgrade(),
        events,
        Some(os_watcher),
    ));

    Ok(ReferenceWatcherHandle { tx, join })
}

/// Run `watcher` without OS-level watching; every change must be reported
/// through [`WatchCommand::DirectoryChanged`].
pub fn spawn_manual_reference_watcher(
    watcher: ReferenceWatcher,
    policy: RefreshPolicy,
    events: mpsc::UnboundedSender<ReferenceEvent>,
) -> ReferenceWatcherHandle {
    let (tx, rx) = mpsc::unbounded_channel::<WatchCommand>();
    let join = tokio::spawn(run_loop(watcher, policy, rx, tx.downgrade(), events, None));
    ReferenceWatcherHandle { tx, join }
}

fn spawn_notify_forwarder(
    mut notify_rx: mpsc::UnboundedReceiver<Event>,
    tx: mpsc::WeakUnboundedSender<WatchCommand>,
) {
    tokio::spawn(async move {
        while let Some(event) = notify_rx.recv().await {
            let Some(tx) = tx.upgrade() else {
                break;
            };
            for path in event.paths {
                let _ = tx.send(WatchCommand::PathChanged(path));
            }
        }
        debug!("notify forwarder finished");
    });
}

async fn run_loop(
    mut watcher: ReferenceWatcher,
    policy: RefreshPolicy,
    mut rx: mpsc::UnboundedReceiver<WatchCommand>,
    self_tx: mpsc::WeakUnboundedSender<WatchCommand>,
    events: mpsc::UnboundedSender<ReferenceEvent>,
    mut os_watcher: Option<RecommendedWatcher>,
) -> ReferenceWatcher {
    while let Some(command) = rx.recv().await {
        debug!(?command, "reference watcher command");
        let produced: Vec<ReferenceEvent> = match command {
            WatchCommand::DirectoryChanged(dir) => watcher.handle_directory_changed(&dir),
            WatchCommand::PathChanged(path) => {
                match watched_dir_of(&path, &watcher.directories()) {
                    Some(dir) => watcher.handle_directory_changed(&dir),
                    None => Vec::new(),
                }
            }
            WatchCommand::Recheck { path, attempt } => match watcher.recheck_missing(&path) {
                Some(found) => vec![found],
                None => {
                    if watcher.is_missing(&path) && attempt < policy.attempts {
                        schedule_recheck(&self_tx, policy, path, attempt + 1);
                    }
                    Vec::new()
                }
            },
            WatchCommand::AddReference(path) => {
                let before = watcher.directories();
                let event = watcher.add_file_reference(path);
                watch_new_dirs(&mut os_watcher, &before, &watcher.directories());
                event.into_iter().collect()
            }
            WatchCommand::RemoveReference(path) => {
                watcher.remove_file_reference(&path);
                Vec::new()
            }
            WatchCommand::WatchDirectory(dir) => {
                let before = watcher.directories();
                watcher.watch_directory(dir);
                watch_new_dirs(&mut os_watcher, &before, &watcher.directories());
                Vec::new()
            }
        };

        for event in produced {
            if let ReferenceEvent::Missing(path) = &event {
                if policy.attempts > 0 {
                    schedule_recheck(&self_tx, policy, path.clone(), 1);
                }
            }
            if events.send(event).is_err() {
                debug!("reference event receiver dropped");
            }
        }
    }
    debug!("reference watcher loop finished");
    watcher
}

fn watch_new_dirs(
    os_watcher: &mut Option<RecommendedWatcher>,
    before: &[PathBuf],
    after: &[PathBuf],
) {
    let Some(os_watcher) = os_watcher.as_mut() else {
        return;
    };
    for dir in after.iter().filter(|d| !before.contains(d)) {
        if let Err(err) = os_watcher.watch(dir, RecursiveMode::NonRecursive) {
            warn!(?dir, error = %err, "cannot watch directory");
        }
    }
}

fn schedule_recheck(
    self_tx: &mpsc::WeakUnboundedSender<WatchCommand>,
    policy: RefreshPolicy,
    path: PathBuf,
    attempt: u32,
) {
    let self_tx = self_tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(policy.interval).await;
        if let Some(tx) = self_tx.upgrade() {
            let _ = tx.send(WatchCommand::Recheck { path, attempt });
        }
    });
}
