//! Agent process supervision for one unit of work.
//!
//! The agent is interactive and does not exit on its own, so completion is
//! detected by a dual signal: a validated completion artifact plus an
//! idle-output heuristic. The [`TaskRunner`] trait decouples the orchestrator
//! from the real process backend; tests use scripted runners instead.

use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};
use wait_timeout::ChildExt;

use crate::cancel::CancelToken;
use crate::core::outcome::{CompletionArtifact, RunOutcome, classify};

/// How often blocked waits wake up to honor cancellation.
const CANCEL_POLL: Duration = Duration::from_millis(200);

/// Parameters for one monitor invocation.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Prompt handed to the agent as its final argument.
    pub prompt: String,
    /// Task identity the completion artifact must correlate with; `None` for
    /// project-wide work.
    pub expected_task_id: Option<String>,
    pub working_dir: PathBuf,
    /// Where the agent writes (and the monitor pre-deletes) the artifact.
    pub artifact_path: PathBuf,
    /// Primary bound on waiting for the next output chunk.
    pub idle_timeout: Duration,
    pub agent_command: String,
    pub model: Option<String>,
    pub skip_permissions: bool,
}

/// What one invocation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorReport {
    pub outcome: RunOutcome,
    /// Everything the process printed, also streamed live while running.
    pub captured_output: String,
}

/// Abstraction over agent execution backends.
pub trait TaskRunner {
    fn run(&self, request: &RunRequest, cancel: &CancelToken) -> Result<MonitorReport>;
}

/// Runner that spawns the real agent process and supervises it.
#[derive(Debug, Clone)]
pub struct AgentMonitor {
    /// Shorter idle window once a validated artifact is observed, giving the
    /// process a final bounded interval to flush output.
    pub post_detect_idle: Duration,
    /// Absolute cap on post-detection waiting so a stuck process cannot stall
    /// the loop.
    pub post_detect_max: Duration,
    /// How long the graceful exit instruction may take before force-kill.
    pub exit_grace: Duration,
}

impl Default for AgentMonitor {
    fn default() -> Self {
        Self {
            post_detect_idle: Duration::from_secs(3),
            post_detect_max: Duration::from_secs(10),
            exit_grace: Duration::from_secs(10),
        }
    }
}

enum WaitEvent {
    Chunk(Vec<u8>),
    Idle,
    Eof,
    Cancelled,
}

impl TaskRunner for AgentMonitor {
    #[instrument(skip_all, fields(expected_task_id = ?request.expected_task_id, idle_secs = request.idle_timeout.as_secs()))]
    fn run(&self, request: &RunRequest, cancel: &CancelToken) -> Result<MonitorReport> {
        remove_stale_artifact(&request.artifact_path)?;

        let mut cmd = Command::new(&request.agent_command);
        if request.skip_permissions {
            cmd.arg("--dangerously-skip-permissions");
        }
        if let Some(model) = &request.model {
            cmd.arg("--model").arg(model);
        }
        cmd.arg(&request.prompt)
            .current_dir(&request.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(command = %request.agent_command, "spawning agent process");
        let mut child = cmd.spawn().with_context(|| {
            format!("spawn agent process `{}`", request.agent_command)
        })?;
        let stdin = child.stdin.take();

        let (tx, rx) = mpsc::channel::<Vec<u8>>();
        spawn_readers(&mut child, &tx)?;
        drop(tx);

        let mut capture: Vec<u8> = Vec::new();
        let mut detected_at: Option<Instant> = None;
        let mut interrupted = false;

        loop {
            if let Some(t0) = detected_at
                && t0.elapsed() >= self.post_detect_max
            {
                debug!("post-detection wait cap reached");
                break;
            }
            let idle = if detected_at.is_some() {
                self.post_detect_idle
            } else {
                request.idle_timeout
            };
            match next_event(&rx, idle, cancel) {
                WaitEvent::Chunk(chunk) => {
                    stream_chunk(&chunk);
                    capture.extend_from_slice(&chunk);
                    if detected_at.is_none() && artifact_is_ours(request) {
                        info!("validated completion artifact detected");
                        detected_at = Some(Instant::now());
                    }
                }
                WaitEvent::Idle => {
                    debug!("agent went idle");
                    break;
                }
                WaitEvent::Eof => {
                    debug!("agent closed its output");
                    break;
                }
                WaitEvent::Cancelled => {
                    interrupted = true;
                    break;
                }
            }
        }

        if interrupted {
            warn!("interrupt requested, force-terminating agent");
            force_kill(&mut child);
        } else {
            self.terminate(&mut child, stdin);
        }

        // Drain whatever the readers flushed while we were shutting down. The
        // readers are detached, never joined: a grandchild of the agent can
        // inherit the pipe write ends and keep them open long after the agent
        // itself is dead, and termination must stay bounded regardless.
        for chunk in rx.try_iter() {
            capture.extend_from_slice(&chunk);
        }

        let captured_output = String::from_utf8_lossy(&capture).into_owned();
        let artifact_raw = std::fs::read_to_string(&request.artifact_path).ok();
        let outcome = classify(
            artifact_raw.as_deref(),
            request.expected_task_id.as_deref(),
            &captured_output,
        );
        debug!(?outcome, "agent invocation classified");
        Ok(MonitorReport {
            outcome,
            captured_output,
        })
    }
}

impl AgentMonitor {
    /// Ask a still-running agent to exit, then force-terminate on overrun.
    fn terminate(&self, child: &mut Child, stdin: Option<ChildStdin>) {
        match child.try_wait() {
            Ok(Some(_)) => return,
            Ok(None) => {}
            Err(err) => {
                warn!(%err, "could not query agent state");
                return;
            }
        }
        if let Some(mut stdin) = stdin {
            let _ = stdin.write_all(b"/exit\n");
            // Dropping stdin closes the pipe so the agent sees EOF too.
        }
        match child.wait_timeout(self.exit_grace) {
            Ok(Some(status)) => debug!(?status, "agent exited gracefully"),
            Ok(None) => {
                warn!(grace_secs = self.exit_grace.as_secs(), "agent ignored exit instruction, killing");
                force_kill(child);
            }
            Err(err) => warn!(%err, "wait for agent exit failed"),
        }
    }
}

/// Wait for the next output chunk with a bounded idle window, polling the
/// cancel token between short sleeps.
fn next_event(rx: &Receiver<Vec<u8>>, idle: Duration, cancel: &CancelToken) -> WaitEvent {
    let deadline = Instant::now() + idle;
    loop {
        if cancel.is_cancelled() {
            return WaitEvent::Cancelled;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return WaitEvent::Idle;
        }
        match rx.recv_timeout(remaining.min(CANCEL_POLL)) {
            Ok(chunk) => return WaitEvent::Chunk(chunk),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return WaitEvent::Eof,
        }
    }
}

/// Spawn detached forwarder threads for the child's output pipes. They exit
/// on pipe EOF or when the receiver is gone; nothing ever waits on them.
fn spawn_readers(child: &mut Child, tx: &Sender<Vec<u8>>) -> Result<()> {
    let stdout = child
        .stdout
        .take()
        .context("agent stdout was not piped")?;
    let stderr = child
        .stderr
        .take()
        .context("agent stderr was not piped")?;
    spawn_reader(stdout, tx.clone());
    spawn_reader(stderr, tx.clone());
    Ok(())
}

fn spawn_reader<R: Read + Send + 'static>(reader: R, tx: Sender<Vec<u8>>) {
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

/// Echo agent output live to the operator's terminal.
fn stream_chunk(chunk: &[u8]) {
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    let _ = lock.write_all(chunk);
    let _ = lock.flush();
}

/// True when the artifact file currently holds a parseable artifact whose
/// task id matches this invocation. Partially written files simply fail to
/// parse and are rechecked on the next chunk.
fn artifact_is_ours(request: &RunRequest) -> bool {
    let Ok(raw) = std::fs::read_to_string(&request.artifact_path) else {
        return false;
    };
    CompletionArtifact::parse(&raw)
        .is_some_and(|artifact| artifact.matches(request.expected_task_id.as_deref()))
}

/// Delete any artifact left over from a previous invocation reusing the same
/// directory.
fn remove_stale_artifact(path: &std::path::Path) -> Result<()> {
    if path.exists() {
        debug!(path = %path.display(), "removing stale completion artifact");
        std::fs::remove_file(path)
            .with_context(|| format!("remove stale artifact {}", path.display()))?;
    }
    Ok(())
}

fn force_kill(child: &mut Child) {
    if let Err(err) = child.kill() {
        debug!(%err, "kill agent failed (already exited?)");
    }
    let _ = child.wait();
}
