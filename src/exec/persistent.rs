// src/exec/persistent.rs

//! Long-lived interpreter workers.
//!
//! A worker owns one interpreter process (a Python or Julia REPL driver, or a
//! Jupyter bridge) and a FIFO of jobs. Workers are keyed by
//! `(program, args, group_id)`, so items sharing a group serialise their runs
//! on the same interpreter.
//!
//! Protocol on the interpreter's stdin: the lines of one command followed by
//! [`END_MARKER`]. After running the command the driver prints
//! `DONE_MARKER <code>` on both stdout and stderr; both are awaited so that
//! the output of a command never leaks into the next one. A lone
//! [`INTERRUPT_MARKER`] line asks the driver to interrupt the running
//! command; the interpreter and its namespace survive.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::exec::RunOutcome;
use crate::item::{ItemLogger, OutputStream};

pub const END_MARKER: &str = "__SPINE_ITEMS_END__";
pub const DONE_MARKER: &str = "__SPINE_ITEMS_DONE__";
pub const INTERRUPT_MARKER: &str = "__SPINE_ITEMS_INTERRUPT__";

/// Grace period for an interpreter to honour an interrupt before it is
/// killed.
const INTERRUPT_GRACE: Duration = Duration::from_secs(10);

/// How to start an interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WorkerKey {
    program: String,
    args: Vec<String>,
    group_id: String,
}

struct Job {
    commands: Vec<String>,
    logger: ItemLogger,
    cancel: oneshot::Receiver<()>,
    kill_after: bool,
    reply: oneshot::Sender<Result<RunOutcome>>,
}

/// Registry of persistent workers.
///
/// Dropping the pool (or calling [`PersistentPool::shutdown`]) closes every
/// queue; workers finish their current job and kill their interpreter.
#[derive(Default)]
pub struct PersistentPool {
    workers: Mutex<HashMap<WorkerKey, mpsc::UnboundedSender<Job>>>,
}

impl std::fmt::Debug for PersistentPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentPool")
            .field("workers", &self.worker_count())
            .finish()
    }
}

impl PersistentPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered workers whose queue is still open.
    pub fn worker_count(&self) -> usize {
        self.workers
            .lock()
            .map(|w| w.values().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    pub fn shutdown(&self) {
        if let Ok(mut workers) = self.workers.lock() {
            let count = workers.len();
            workers.clear();
            debug!(count, "shut down persistent workers");
        }
    }

    fn submit(&self, launch: &LaunchSpec, group_id: &str, job: Job) -> Result<()> {
        let key = WorkerKey {
            program: launch.program.clone(),
            args: launch.args.clone(),
            group_id: group_id.to_string(),
        };
        let mut workers = self
            .workers
            .lock()
            .map_err(|_| anyhow!("persistent worker registry poisoned"))?;

        let job = match workers.get(&key) {
            Some(tx) => match tx.send(job) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(job)) => job,
            },
            None => job,
        };

        info!(program = %key.program, group_id = %key.group_id, "starting persistent worker");
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(worker_loop(key.clone(), launch.clone(), rx));
        tx.send(job)
            .map_err(|_| anyhow!("persistent worker for group '{group_id}' closed on start"))?;
        workers.insert(key, tx);
        Ok(())
    }
}

/// Runs commands on a shared persistent worker.
#[derive(Debug, Clone)]
pub struct PersistentExecutionManager {
    pub pool: Arc<PersistentPool>,
    pub launch: LaunchSpec,
    pub group_id: String,
    pub commands: Vec<String>,
    /// End the interpreter once these commands are done.
    pub kill_after: bool,
}

impl PersistentExecutionManager {
    /// Queue the commands and wait for the worker to run them.
    pub async fn run(
        &self,
        logger: &ItemLogger,
        cancel_rx: oneshot::Receiver<()>,
    ) -> Result<RunOutcome> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pool.submit(
            &self.launch,
            &self.group_id,
            Job {
                commands: self.commands.clone(),
                logger: logger.clone(),
                cancel: cancel_rx,
                kill_after: self.kill_after,
                reply: reply_tx,
            },
        )?;
        reply_rx.await.map_err(|_| {
            anyhow!(
                "persistent worker for group '{}' stopped before replying",
                self.group_id
            )
        })?
    }
}

async fn worker_loop(key: WorkerKey, launch: LaunchSpec, mut rx: mpsc::UnboundedReceiver<Job>) {
    let mut interpreter: Option<Interpreter> = None;

    while let Some(job) = rx.recv().await {
        let Job {
            commands,
            logger,
            cancel,
            kill_after,
            reply,
        } = job;
        let mut cancel = CancelWatch::new(cancel);

        if cancel.already_fired() {
            debug!(group_id = %key.group_id, "job cancelled while queued");
            let _ = reply.send(Ok(RunOutcome {
                exit_code: -1,
                interrupted: true,
            }));
            continue;
        }

        if interpreter.is_none() {
            match Interpreter::spawn(&launch) {
                Ok(spawned) => interpreter = Some(spawned),
                Err(err) => {
                    let _ = reply.send(Err(err));
                    continue;
                }
            }
        }
        let Some(running) = interpreter.as_mut() else {
            continue;
        };

        let result = running
            .run_commands(&commands, &logger, &mut cancel)
            .await;

        let keep = result.is_ok() && running.alive && !kill_after;
        if !keep {
            if let Some(mut finished) = interpreter.take() {
                finished.kill().await;
            }
            debug!(group_id = %key.group_id, kill_after, "persistent interpreter ended");
        }
        let _ = reply.send(result);
    }

    if let Some(mut finished) = interpreter.take() {
        finished.kill().await;
    }
    debug!(program = %key.program, group_id = %key.group_id, "persistent worker exited");
}

/// One-shot cancel receiver that can be checked repeatedly.
struct CancelWatch {
    rx: oneshot::Receiver<()>,
    open: bool,
}

impl CancelWatch {
    fn new(rx: oneshot::Receiver<()>) -> Self {
        Self { rx, open: true }
    }

    fn already_fired(&mut self) -> bool {
        match self.rx.try_recv() {
            Ok(()) => {
                self.open = false;
                true
            }
            Err(oneshot::error::TryRecvError::Closed) => {
                self.open = false;
                false
            }
            Err(oneshot::error::TryRecvError::Empty) => false,
        }
    }
}

enum Completion {
    Done { code: i32, interrupted: bool },
    Exited { code: i32, interrupted: bool },
}

struct Interpreter {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    stderr: Lines<BufReader<ChildStderr>>,
    alive: bool,
}

impl Interpreter {
    fn spawn(launch: &LaunchSpec) -> Result<Self> {
        let mut child = Command::new(&launch.program)
            .args(&launch.args)
            .envs(launch.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("starting interpreter '{}'", launch.program))?;

        let stdin = child.stdin.take().context("interpreter has no stdin")?;
        let stdout = child.stdout.take().context("interpreter has no stdout")?;
        let stderr = child.stderr.take().context("interpreter has no stderr")?;

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            stderr: BufReader::new(stderr).lines(),
            alive: true,
        })
    }

    async fn run_commands(
        &mut self,
        commands: &[String],
        logger: &ItemLogger,
        cancel: &mut CancelWatch,
    ) -> Result<RunOutcome> {
        let mut outcome = RunOutcome {
            exit_code: 0,
            interrupted: false,
        };
        for command in commands {
            for line in command.lines() {
                logger.msg_proc(OutputStream::Stdin, line);
            }
            self.write_block(command).await?;
            let (code, interrupted) = match self.await_done(logger, cancel).await? {
                Completion::Done { code, interrupted } => (code, interrupted),
                Completion::Exited { code, interrupted } => {
                    self.alive = false;
                    (code, interrupted)
                }
            };
            outcome = RunOutcome {
                exit_code: code,
                interrupted,
            };
            if code != 0 || interrupted || !self.alive {
                break;
            }
        }
        Ok(outcome)
    }

    async fn write_block(&mut self, command: &str) -> Result<()> {
        let mut block = String::with_capacity(command.len() + END_MARKER.len() + 2);
        block.push_str(command);
        if !command.ends_with('\n') {
            block.push('\n');
        }
        block.push_str(END_MARKER);
        block.push('\n');
        self.stdin
            .write_all(block.as_bytes())
            .await
            .context("writing to interpreter")?;
        self.stdin.flush().await.context("flushing interpreter input")?;
        Ok(())
    }

    async fn await_done(
        &mut self,
        logger: &ItemLogger,
        cancel: &mut CancelWatch,
    ) -> Result<Completion> {
        let mut out_code: Option<i32> = None;
        let mut err_done = false;
        let mut interrupted = false;
        let mut deadline: Option<Instant> = None;

        loop {
            if let (Some(code), true) = (out_code, err_done) {
                return Ok(Completion::Done { code, interrupted });
            }

            tokio::select! {
                line = self.stdout.next_line(), if out_code.is_none() => {
                    match line.context("reading interpreter stdout")? {
                        Some(line) => match parse_done(&line) {
                            Some(code) => out_code = Some(code),
                            None => logger.msg_proc(OutputStream::Stdout, line),
                        },
                        None => {
                            self.drain_stderr(logger, err_done).await;
                            let code = self.wait_exit().await;
                            return Ok(Completion::Exited { code, interrupted });
                        }
                    }
                }

                line = self.stderr.next_line(), if !err_done => {
                    match line.context("reading interpreter stderr")? {
                        Some(line) => match parse_done(&line) {
                            Some(_) => err_done = true,
                            None => logger.msg_proc(OutputStream::Stderr, line),
                        },
                        None => err_done = true,
                    }
                }

                res = &mut cancel.rx, if cancel.open => {
                    cancel.open = false;
                    if res.is_err() {
                        continue;
                    }
                    interrupted = true;
                    info!(item = %logger.item_name(), "interrupting persistent command");
                    let line = format!("{INTERRUPT_MARKER}\n");
                    if self.stdin.write_all(line.as_bytes()).await.is_err()
                        || self.stdin.flush().await.is_err()
                    {
                        self.kill().await;
                        return Ok(Completion::Exited { code: -1, interrupted });
                    }
                    deadline = Some(Instant::now() + INTERRUPT_GRACE);
                }

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    warn!(item = %logger.item_name(), "interpreter ignored interrupt; killing it");
                    self.kill().await;
                    return Ok(Completion::Exited { code: -1, interrupted });
                }
            }
        }
    }

    async fn drain_stderr(&mut self, logger: &ItemLogger, done: bool) {
        if done {
            return;
        }
        while let Ok(Some(line)) = self.stderr.next_line().await {
            if parse_done(&line).is_none() {
                logger.msg_proc(OutputStream::Stderr, line);
            }
        }
    }

    async fn wait_exit(&mut self) -> i32 {
        self.alive = false;
        self.child
            .wait()
            .await
            .ok()
            .and_then(|s| s.code())
            .unwrap_or(-1)
    }

    async fn kill(&mut self) {
        if let Err(err) = self.child.kill().await {
            debug!(error = %err, "interpreter already gone");
        }
        self.alive = false;
    }
}

fn parse_done(line: &str) -> Option<i32> {
    let rest = line.strip_prefix(DONE_MARKER)?;
    rest.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_done_marker_lines() {
        assert_eq!(parse_done("__SPINE_ITEMS_DONE__ 0"), Some(0));
        assert_eq!(parse_done("__SPINE_ITEMS_DONE__ -1"), Some(-1));
        assert_eq!(parse_done("hello"), None);
        assert_eq!(parse_done("__SPINE_ITEMS_DONE__ x"), None);
    }
}
