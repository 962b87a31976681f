//! Task, phase, project, and iteration records shared across the crate.
//!
//! These types are constructed by input parsing, mutated only by the state
//! store and orchestrator, and serialized as the persisted state snapshot.
//! Phase and project status are always derived from task status, never stored
//! independently.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of an individual task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Blocked,
}

/// Derived status of a phase or whole project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    InProgress,
    Completed,
}

/// Atomic unit of work with a project-unique identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub status: TaskStatus,
    /// Identifier of the owning phase.
    pub phase_id: String,
    /// Task ids that must be `Completed` before this task is eligible.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Ordering tie-break within a phase (lower runs first).
    #[serde(default)]
    pub priority: i64,
    /// Iteration number in which the task completed.
    #[serde(default)]
    pub iteration: Option<u32>,
    /// Originating document, for checkbox write-back.
    #[serde(default)]
    pub source_file: Option<PathBuf>,
    /// 1-based line of the checkbox in `source_file`.
    #[serde(default)]
    pub source_line: Option<usize>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(id: impl Into<String>, name: impl Into<String>, phase_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: TaskStatus::Pending,
            phase_id: phase_id.into(),
            depends_on: Vec::new(),
            priority: 0,
            iteration: None,
            source_file: None,
            source_line: None,
            error: None,
            completed_at: None,
        }
    }

    pub fn mark_started(&mut self) {
        self.status = TaskStatus::InProgress;
    }

    pub fn mark_completed(&mut self, iteration: u32) {
        self.status = TaskStatus::Completed;
        self.iteration = Some(iteration);
        self.completed_at = Some(Utc::now());
        self.error = None;
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.error = Some(reason.into());
    }

    pub fn mark_blocked(&mut self, reason: impl Into<String>) {
        self.status = TaskStatus::Blocked;
        self.error = Some(reason.into());
    }
}

/// Ordered group of tasks. Phase ordering across the project follows
/// `priority`, tasks within a phase follow task `priority`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub source_file: Option<PathBuf>,
}

impl Phase {
    pub fn new(id: impl Into<String>, name: impl Into<String>, priority: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            priority,
            tasks: Vec::new(),
            source_file: None,
        }
    }

    /// Derived status: `Completed` when all tasks completed (and at least one
    /// exists), `Pending` when none have started, `InProgress` otherwise.
    pub fn status(&self) -> PhaseStatus {
        if !self.tasks.is_empty()
            && self
                .tasks
                .iter()
                .all(|t| t.status == TaskStatus::Completed)
        {
            return PhaseStatus::Completed;
        }
        if self.tasks.iter().all(|t| t.status == TaskStatus::Pending) {
            return PhaseStatus::Pending;
        }
        PhaseStatus::InProgress
    }
}

/// Outcome status of a single loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationStatus {
    Running,
    Success,
    Failed,
}

/// One pass of the control loop. Closed iterations are retained in project
/// history and never mutated again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iteration {
    /// 1-indexed sequence number, strictly increasing across a run and its
    /// resumptions.
    pub number: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    pub status: IterationStatus,
    #[serde(default)]
    pub tasks_started: Vec<String>,
    #[serde(default)]
    pub tasks_completed: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
    /// Captured agent output reference, when kept on disk.
    #[serde(default)]
    pub output_log: Option<PathBuf>,
}

impl Iteration {
    pub fn start(number: u32) -> Self {
        Self {
            number,
            started_at: Utc::now(),
            ended_at: None,
            status: IterationStatus::Running,
            tasks_started: Vec::new(),
            tasks_completed: Vec::new(),
            error: None,
            output_log: None,
        }
    }

    pub fn close(&mut self, status: IterationStatus, error: Option<String>) {
        self.ended_at = Some(Utc::now());
        self.status = status;
        self.error = error;
    }
}

/// The full persisted aggregate: phases, tasks, and iteration history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub phases: Vec<Phase>,
    #[serde(default)]
    pub iterations: Vec<Iteration>,
    /// Highest iteration number recorded so far. Only ever increases.
    #[serde(default)]
    pub current_iteration: u32,
    /// Source documents this project was parsed from.
    #[serde(default)]
    pub source_files: Vec<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            description: String::new(),
            phases: Vec::new(),
            iterations: Vec::new(),
            current_iteration: 0,
            source_files: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.phases.iter().flat_map(|p| p.tasks.iter())
    }

    pub fn task_by_id(&self, id: &str) -> Option<&Task> {
        self.tasks().find(|t| t.id == id)
    }

    pub fn task_by_id_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.phases
            .iter_mut()
            .flat_map(|p| p.tasks.iter_mut())
            .find(|t| t.id == id)
    }

    /// True iff every task in every phase is `Completed`.
    pub fn is_complete(&self) -> bool {
        self.tasks().all(|t| t.status == TaskStatus::Completed)
    }

    pub fn status(&self) -> PhaseStatus {
        if self.tasks().next().is_none() {
            return PhaseStatus::Pending;
        }
        if self.is_complete() {
            return PhaseStatus::Completed;
        }
        if self.tasks().all(|t| t.status == TaskStatus::Pending) {
            return PhaseStatus::Pending;
        }
        PhaseStatus::InProgress
    }

    /// Record a new iteration and advance the counter.
    ///
    /// The counter never moves backwards, even if a caller replays an old
    /// iteration number after a merge.
    pub fn add_iteration(&mut self, iteration: Iteration) {
        self.current_iteration = self.current_iteration.max(iteration.number);
        self.iterations.push(iteration);
    }

    pub fn iteration_mut(&mut self, number: u32) -> Option<&mut Iteration> {
        self.iterations.iter_mut().find(|i| i.number == number)
    }
}
