//! The top-level iteration control loop.
//!
//! Each pass selects one eligible task, drives one agent invocation through
//! the process monitor, records the outcome, persists the full aggregate, and
//! then decides whether to continue. The loop is strictly sequential: one
//! task in flight at a time, and iteration N is fully persisted before
//! iteration N+1 begins selection, so every halt point is resumable.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::core::model::{Iteration, IterationStatus, Project, TaskStatus};
use crate::core::outcome::RunOutcome;
use crate::core::selector::{Selection, next_task};
use crate::io::config::RunConfig;
use crate::io::monitor::{MonitorReport, RunRequest, TaskRunner};
use crate::io::prompt::{PromptContext, build_prompt};
use crate::io::source_doc::update_checkbox;
use crate::io::state_store::StateStore;
use crate::retry::{RetryOutcome, execute};

/// Why the loop stopped. Every variant leaves fully persisted state behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// Every task in every phase is completed.
    Complete,
    /// The additional-iteration budget for this invocation is spent; invoke
    /// again to continue.
    MaxIterationsReached,
    /// The agent reported the current task blocked.
    Blocked { reason: String },
    /// The agent reported failure, produced no completion signal, or could
    /// not be spawned.
    Failed { reason: String },
    /// No eligible task remains while the project is incomplete: a dependency
    /// graph or authoring defect in the source documents.
    Stalled,
    /// Explicit cancellation.
    Interrupted,
}

/// Summary of one loop invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub stop: LoopStop,
    /// Iterations executed by this invocation (not the lifetime counter).
    pub iterations_executed: u32,
    /// Final state of the aggregate, as persisted.
    pub project: Project,
}

/// Drives the loop: selection, monitor invocation, recording, persistence.
pub struct Orchestrator<R> {
    runner: R,
    store: StateStore,
    config: RunConfig,
    working_dir: PathBuf,
    cancel: CancelToken,
}

impl<R: TaskRunner> Orchestrator<R> {
    pub fn new(runner: R, store: StateStore, config: RunConfig, working_dir: &Path) -> Self {
        Self {
            runner,
            store,
            config,
            working_dir: working_dir.to_path_buf(),
            cancel: CancelToken::new(),
        }
    }

    /// Token a caller can cancel from another thread; the in-flight agent
    /// process is force-terminated and the loop halts as `Interrupted`.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run the loop from a freshly parsed project until a terminal outcome.
    ///
    /// Prior persisted progress is merged in first, and the starting
    /// iteration number continues from the persisted counter, so restarting
    /// after any halt resumes rather than resets.
    pub fn run(&self, parsed: &Project) -> Result<RunReport> {
        let mut project = self
            .store
            .merge_with_existing(parsed)
            .context("reconcile parsed project with persisted state")?;
        self.store.save(&mut project)?;

        let mut executed = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return Ok(self.report(LoopStop::Interrupted, executed, project));
            }

            let task_id = match next_task(&project) {
                Selection::Complete => {
                    return Ok(self.report(LoopStop::Complete, executed, project));
                }
                Selection::Stalled => {
                    warn!("no eligible task but project incomplete");
                    return Ok(self.report(LoopStop::Stalled, executed, project));
                }
                Selection::Eligible(id) => id,
            };

            let number = project.current_iteration + 1;
            info!(iteration = number, task = %task_id, "starting iteration");

            let mut iteration = Iteration::start(number);
            iteration.tasks_started.push(task_id.clone());
            project.add_iteration(iteration);
            if let Some(task) = project.task_by_id_mut(&task_id) {
                task.mark_started();
            }
            self.store.save(&mut project)?;

            let agent_report = self.run_agent(&project, &task_id)?;
            executed += 1;
            let outcome = agent_report.outcome;

            match self
                .store
                .write_iteration_log(number, &agent_report.captured_output)
            {
                Ok(log_path) => {
                    if let Some(iteration) = project.iteration_mut(number) {
                        iteration.output_log = Some(log_path);
                    }
                }
                Err(err) => warn!(%err, "could not write iteration log"),
            }

            self.record(&mut project, number, &task_id, &outcome);
            // Persist before evaluating termination so every halt point is
            // resumable.
            self.store.save(&mut project)?;

            if self.cancel.is_cancelled() {
                return Ok(self.report(LoopStop::Interrupted, executed, project));
            }
            match &outcome {
                RunOutcome::ProjectComplete => {
                    return Ok(self.report(LoopStop::Complete, executed, project));
                }
                RunOutcome::TaskBlocked { reason, .. } => {
                    let reason = reason.clone().unwrap_or_else(|| "unknown blocker".to_string());
                    return Ok(self.report(LoopStop::Blocked { reason }, executed, project));
                }
                RunOutcome::TaskFailed { reason, .. } => {
                    let reason = reason.clone().unwrap_or_else(|| "unknown failure".to_string());
                    return Ok(self.report(LoopStop::Failed { reason }, executed, project));
                }
                RunOutcome::Inconclusive => {
                    let reason = "agent produced no completion signal".to_string();
                    return Ok(self.report(LoopStop::Failed { reason }, executed, project));
                }
                RunOutcome::TaskCompleted { .. } => {}
            }

            match next_task(&project) {
                Selection::Complete => {
                    return Ok(self.report(LoopStop::Complete, executed, project));
                }
                Selection::Stalled => {
                    return Ok(self.report(LoopStop::Stalled, executed, project));
                }
                Selection::Eligible(next) => {
                    if executed >= self.config.max_iterations {
                        info!(budget = self.config.max_iterations, "iteration budget spent");
                        return Ok(self.report(LoopStop::MaxIterationsReached, executed, project));
                    }
                    debug!(next = %next, "task done, continuing");
                    thread::sleep(self.config.sleep_between());
                }
            }
        }
    }

    /// Invoke the monitor for one task, retrying spawn failures per the retry
    /// policy. A retry-exhausted or terminal spawn error becomes a failure
    /// outcome rather than an `Err`, so the loop records and persists it like
    /// any other halt.
    fn run_agent(&self, project: &Project, task_id: &str) -> Result<MonitorReport> {
        let task = project
            .task_by_id(task_id)
            .with_context(|| format!("selected task {task_id} disappeared"))?;
        let prompt = build_prompt(&PromptContext {
            project,
            task,
            artifact_path: self.store.artifact_path().display().to_string(),
            custom_instructions: &self.config.custom_instructions,
        })?;
        let request = RunRequest {
            prompt,
            expected_task_id: Some(task_id.to_string()),
            working_dir: self.working_dir.clone(),
            artifact_path: self.store.artifact_path(),
            idle_timeout: self.config.idle_timeout(),
            agent_command: self.config.agent_command.clone(),
            model: self.config.model.clone(),
            skip_permissions: self.config.skip_permissions,
        };

        let attempt = execute(
            &self.config.retry,
            || self.runner.run(&request, &self.cancel),
            Some(|err: &anyhow::Error| spawn_error_is_transient(err)),
            Some(|attempt: u32, err: &anyhow::Error| {
                warn!(attempt, %err, "agent invocation failed, retrying");
            }),
        );
        match attempt {
            RetryOutcome::Success(report) => Ok(report),
            RetryOutcome::Failure(err) | RetryOutcome::Exhausted(err) => {
                warn!(%err, "agent could not be started");
                Ok(MonitorReport {
                    outcome: RunOutcome::TaskFailed {
                        task_id: Some(task_id.to_string()),
                        reason: Some(format!("agent spawn failed: {err:#}")),
                    },
                    captured_output: String::new(),
                })
            }
        }
    }

    /// Apply one invocation's outcome to the aggregate and close the
    /// iteration.
    fn record(&self, project: &mut Project, number: u32, selected: &str, outcome: &RunOutcome) {
        let mut write_back: Option<(PathBuf, usize)> = None;

        match outcome {
            RunOutcome::TaskCompleted { task_id } => {
                if let Some(task) = project.task_by_id_mut(task_id) {
                    task.mark_completed(number);
                    if self.config.update_source
                        && let (Some(file), Some(line)) = (task.source_file.clone(), task.source_line)
                    {
                        write_back = Some((file, line));
                    }
                }
                if let Some(iteration) = project.iteration_mut(number) {
                    iteration.tasks_completed.push(task_id.clone());
                }
            }
            RunOutcome::TaskFailed { task_id, reason } => {
                let id = task_id.as_deref().unwrap_or(selected);
                if let Some(task) = project.task_by_id_mut(id) {
                    task.mark_failed(reason.clone().unwrap_or_else(|| "unknown failure".to_string()));
                }
            }
            RunOutcome::TaskBlocked { task_id, reason } => {
                let id = task_id.as_deref().unwrap_or(selected);
                if let Some(task) = project.task_by_id_mut(id) {
                    task.mark_blocked(reason.clone().unwrap_or_else(|| "unknown blocker".to_string()));
                }
            }
            RunOutcome::ProjectComplete | RunOutcome::Inconclusive => {
                // The selected task was not completed; hand it back so a
                // resumed run can pick it up again.
                if let Some(task) = project.task_by_id_mut(selected)
                    && task.status == TaskStatus::InProgress
                {
                    task.status = TaskStatus::Pending;
                }
            }
        }

        let (status, error) = match outcome {
            RunOutcome::TaskCompleted { .. } | RunOutcome::ProjectComplete => {
                (IterationStatus::Success, None)
            }
            RunOutcome::Inconclusive => (
                IterationStatus::Failed,
                Some("no completion signal".to_string()),
            ),
            other => (
                IterationStatus::Failed,
                other.reason().map(str::to_string),
            ),
        };
        if let Some(iteration) = project.iteration_mut(number) {
            iteration.close(status, error);
        }

        if let Some((file, line)) = write_back
            && let Err(err) = update_checkbox(&file, line, true)
        {
            // State stays authoritative; a write-back failure is cosmetic.
            warn!(%err, file = %file.display(), "checkbox write-back failed");
        }
    }

    fn report(&self, stop: LoopStop, executed: u32, project: Project) -> RunReport {
        info!(?stop, iterations = executed, "loop halted");
        RunReport {
            stop,
            iterations_executed: executed,
            project,
        }
    }
}

/// Spawn errors worth retrying: infrastructure hiccups, not a missing or
/// unusable agent binary.
fn spawn_error_is_transient(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<std::io::Error>() {
        Some(io_err) => !matches!(
            io_err.kind(),
            ErrorKind::NotFound | ErrorKind::PermissionDenied
        ),
        None => false,
    }
}
