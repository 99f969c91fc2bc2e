// src/watch/mod.rs

//! File reference watching for Data Connections.
//!
//! This module is responsible for:
//! - Keeping per-directory snapshots and diffing them into file events.
//! - Turning file events into reference events (renamed, missing, found).
//! - Wiring up a cross-platform filesystem watcher (`notify`) and the
//!   delayed re-checks of missing references.
//!
//! It does **not** know about Data Connection items; they consume the
//! reference events.

pub mod path_utils;
pub mod references;
pub mod snapshot;
pub mod watcher;

pub use references::{ReferenceEvent, ReferenceWatcher};
pub use snapshot::{diff_snapshots, DirectorySnapshot, FileEvent};
pub use watcher::{
    spawn_manual_reference_watcher, spawn_reference_watcher, RefreshPolicy, ReferenceWatcherHandle,
    WatchCommand,
};
