//! Builders and scripted doubles for tests. Compiled only for tests and the
//! `test-support` feature.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::sync::Mutex;

use anyhow::Result;

use crate::cancel::CancelToken;
use crate::core::model::{Phase, Project, Task};
use crate::core::outcome::RunOutcome;
use crate::io::monitor::{MonitorReport, RunRequest, TaskRunner};

/// Pending task in phase `p1`.
pub fn task(id: &str) -> Task {
    Task::new(id, format!("Task {id}"), "p1")
}

/// Pending task in phase `p1` depending on the given task ids.
pub fn task_with_deps(id: &str, deps: &[&str]) -> Task {
    let mut t = task(id);
    t.depends_on = deps.iter().map(|d| d.to_string()).collect();
    t
}

/// Project with a single phase `p1` holding the given tasks in order.
pub fn project_with_phase(tasks: Vec<Task>) -> Project {
    let mut phase = Phase::new("p1", "Phase 1", 0);
    phase.tasks = tasks;
    let mut project = Project::new("demo");
    project.phases.push(phase);
    project
}

/// Report wrapping an outcome with empty captured output.
pub fn scripted_outcome(outcome: RunOutcome) -> MonitorReport {
    MonitorReport {
        outcome,
        captured_output: String::new(),
    }
}

/// Runner double that replays a fixed script of reports, recording the task
/// id each request expected. Running past the script panics: the test asked
/// for more iterations than it scripted.
pub struct ScriptedRunner {
    script: Mutex<VecDeque<MonitorReport>>,
    seen: Mutex<Vec<Option<String>>>,
    fail_spawn: bool,
}

impl ScriptedRunner {
    pub fn new(script: Vec<MonitorReport>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            seen: Mutex::new(Vec::new()),
            fail_spawn: false,
        }
    }

    /// Runner whose every invocation fails like a missing agent binary.
    pub fn failing_spawn() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            seen: Mutex::new(Vec::new()),
            fail_spawn: true,
        }
    }

    /// Expected task ids observed so far, in invocation order.
    pub fn expected_ids(&self) -> Vec<Option<String>> {
        self.seen.lock().expect("seen lock").clone()
    }
}

impl TaskRunner for ScriptedRunner {
    fn run(&self, request: &RunRequest, _cancel: &CancelToken) -> Result<MonitorReport> {
        self.seen
            .lock()
            .expect("seen lock")
            .push(request.expected_task_id.clone());
        if self.fail_spawn {
            let io_err = std::io::Error::new(ErrorKind::NotFound, "agent binary not found");
            return Err(anyhow::Error::new(io_err).context("spawn agent process"));
        }
        self.script
            .lock()
            .expect("script lock")
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("scripted runner exhausted"))
    }
}
