// src/dc/validator.rs

//! Background validation of database URLs.
//!
//! A validator runs at most one validation at a time and keeps at most one
//! more queued. A newer request replaces the queued one; the replaced caller
//! gets an error. The queued request is started by a poller that re-checks
//! every 500 ms.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::dc::db_reference::{default_port, parse_url, sqlite_path, SQLITE};
use crate::errors::{ItemError, Result};

const SQLITE_HEADER: &[u8] = b"SQLite format 3\0";
const POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

struct Job {
    url: String,
    reply: oneshot::Sender<Result<()>>,
}

#[derive(Default)]
struct State {
    active: bool,
    polling: bool,
    queued: Option<Job>,
}

/// Validates database URLs off the caller's task.
#[derive(Clone)]
pub struct DatabaseConnectionValidator {
    state: Arc<Mutex<State>>,
    timeout: Duration,
}

impl std::fmt::Debug for DatabaseConnectionValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConnectionValidator")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Default for DatabaseConnectionValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseConnectionValidator {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Connection timeout for server databases.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// True while a validation is running.
    pub fn is_busy(&self) -> bool {
        self.state.lock().map(|s| s.active).unwrap_or(false)
    }

    /// Schedule validation of `url`. The receiver yields the outcome.
    pub fn validate(&self, url: impl Into<String>) -> oneshot::Receiver<Result<()>> {
        let (reply, rx) = oneshot::channel();
        let job = Job {
            url: url.into(),
            reply,
        };

        let Ok(mut state) = self.state.lock() else {
            let _ = job.reply.send(Err(ItemError::DbValidationFailed(
                "validator state poisoned".to_string(),
            )));
            return rx;
        };

        if !state.active {
            state.active = true;
            drop(state);
            self.spawn_job(job);
            return rx;
        }

        if let Some(replaced) = state.queued.replace(job) {
            debug!(url = %replaced.url, "queued validation superseded");
            let _ = replaced.reply.send(Err(ItemError::DbValidationFailed(
                "superseded by a newer validation request".to_string(),
            )));
        }
        if !state.polling {
            state.polling = true;
            drop(state);
            self.spawn_poller();
        }
        rx
    }

    fn spawn_job(&self, job: Job) {
        let state = Arc::clone(&self.state);
        let timeout = self.timeout;
        tokio::spawn(async move {
            let result = validate_url(&job.url, timeout).await;
            match &result {
                Ok(()) => info!(url = %job.url, "database validated"),
                Err(err) => info!(url = %job.url, error = %err, "database validation failed"),
            }
            if let Ok(mut state) = state.lock() {
                state.active = false;
            }
            let _ = job.reply.send(result);
        });
    }

    fn spawn_poller(&self) {
        let validator = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(POLL_INTERVAL).await;
                let next = {
                    let Ok(mut state) = validator.state.lock() else {
                        return;
                    };
                    if state.active {
                        continue;
                    }
                    state.polling = false;
                    let next = state.queued.take();
                    if next.is_some() {
                        state.active = true;
                    }
                    next
                };
                if let Some(job) = next {
                    validator.spawn_job(job);
                }
                return;
            }
        });
    }
}

/// Check that `url` refers to a reachable, openable database.
///
/// SQLite files must exist and carry the SQLite header (empty files are
/// accepted). Server URLs need a host and a database name and the host must
/// accept TCP connections within `timeout`.
pub async fn validate_url(url: &str, timeout: Duration) -> Result<()> {
    if let Some(path) = sqlite_path(url) {
        return validate_sqlite_file(&path).await;
    }
    let parts = parse_url(url)?;
    if parts.dialect.split('+').next() == Some(SQLITE) {
        return Ok(());
    }

    let host = parts
        .host
        .ok_or_else(|| ItemError::DbValidationFailed("host missing".to_string()))?;
    if parts.database.is_empty() {
        return Err(ItemError::DbValidationFailed("database missing".to_string()));
    }
    let port = parts
        .port
        .or_else(|| default_port(&parts.dialect))
        .ok_or_else(|| {
            ItemError::DbValidationFailed(format!("no port given for dialect '{}'", parts.dialect))
        })?;

    match tokio::time::timeout(timeout, TcpStream::connect((host.as_str(), port))).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(err)) => Err(ItemError::DbValidationFailed(format!(
            "cannot connect to {host}:{port}: {err}"
        ))),
        Err(_) => Err(ItemError::DbValidationFailed(format!(
            "connecting to {host}:{port} timed out"
        ))),
    }
}

async fn validate_sqlite_file(path: &Path) -> Result<()> {
    let mut file = tokio::fs::File::open(path).await.map_err(|err| {
        ItemError::DbValidationFailed(format!("cannot open {}: {err}", path.display()))
    })?;
    let mut header = Vec::with_capacity(SQLITE_HEADER.len());
    (&mut file)
        .take(SQLITE_HEADER.len() as u64)
        .read_to_end(&mut header)
        .await
        .map_err(|err| {
            ItemError::DbValidationFailed(format!("cannot read {}: {err}", path.display()))
        })?;
    if header.is_empty() || header == SQLITE_HEADER {
        Ok(())
    } else {
        Err(ItemError::DbValidationFailed(format!(
            "{} is not a SQLite database",
            path.display()
        )))
    }
}
