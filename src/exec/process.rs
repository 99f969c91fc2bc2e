// src/exec/process.rs

//! One-shot subprocess execution.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::exec::RunOutcome;
use crate::item::{ItemLogger, OutputStream};

/// Runs a program to completion, streaming its output into a logger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExecutionManager {
    pub program: String,
    pub args: Vec<String>,
    pub workdir: PathBuf,
    pub env: Vec<(String, String)>,
}

impl ProcessExecutionManager {
    pub fn new(program: impl Into<String>, args: Vec<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            workdir: workdir.into(),
            env: Vec::new(),
        }
    }

    /// Spawn the process and wait for it.
    ///
    /// If `cancel_rx` fires first the child is killed and the outcome is
    /// marked as interrupted. A dropped sender is not a cancellation.
    pub async fn run(
        &self,
        logger: &ItemLogger,
        mut cancel_rx: oneshot::Receiver<()>,
    ) -> Result<RunOutcome> {
        info!(
            item = %logger.item_name(),
            program = %self.program,
            args = ?self.args,
            workdir = ?self.workdir,
            "starting tool process"
        );

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&self.workdir)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning process '{}'", self.program))?;

        let stdout_task = child
            .stdout
            .take()
            .map(|out| forward_lines(out, logger.clone(), OutputStream::Stdout));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| forward_lines(err, logger.clone(), OutputStream::Stderr));

        let mut cancel_closed = false;
        let outcome = loop {
            tokio::select! {
                status_res = child.wait() => {
                    let status = status_res
                        .with_context(|| format!("waiting for process '{}'", self.program))?;
                    let code = status.code().unwrap_or(-1);
                    info!(
                        item = %logger.item_name(),
                        exit_code = code,
                        success = status.success(),
                        "tool process exited"
                    );
                    break RunOutcome { exit_code: code, interrupted: false };
                }

                cancel = &mut cancel_rx, if !cancel_closed => {
                    match cancel {
                        Ok(()) => {
                            info!(item = %logger.item_name(), "cancellation requested; killing tool process");
                            if let Err(e) = child.kill().await {
                                warn!(item = %logger.item_name(), error = %e, "failed to kill tool process");
                            }
                            let code = child
                                .wait()
                                .await
                                .ok()
                                .and_then(|s| s.code())
                                .unwrap_or(-1);
                            break RunOutcome { exit_code: code, interrupted: true };
                        }
                        Err(_) => {
                            debug!(item = %logger.item_name(), "cancel channel closed without cancellation");
                            cancel_closed = true;
                        }
                    }
                }
            }
        };

        // Drain the pipes so every line is logged before we report back.
        for task in [stdout_task, stderr_task].into_iter().flatten() {
            let _ = task.await;
        }

        Ok(outcome)
    }
}

fn forward_lines<R>(reader: R, logger: ItemLogger, stream: OutputStream) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            logger.msg_proc(stream, line);
        }
    })
}
