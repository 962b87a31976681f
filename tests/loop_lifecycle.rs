//! Loop-level tests for full lifecycle scenarios.
//!
//! These drive [`Orchestrator::run`] end to end with a scripted runner:
//! markdown parsing, dependency-ordered selection, outcome recording, state
//! persistence, checkbox write-back, and resumption across invocations.

use std::fs;
use std::path::Path;

use foreman::core::model::TaskStatus;
use foreman::core::outcome::RunOutcome;
use foreman::io::config::RunConfig;
use foreman::io::input::InputSource;
use foreman::io::state_store::StateStore;
use foreman::orchestrator::{LoopStop, Orchestrator};
use foreman::test_support::{ScriptedRunner, scripted_outcome};

const PLAN: &str = "\
# Demo project

## Phase 1: Foundation
- [ ] SETUP-1: Initialise project scaffolding
- [ ] SETUP-2: Wire continuous integration
  - Dependencies: SETUP-1

## Phase 2: Features
- [ ] FEAT-1: Implement the first feature
  - Dependencies: SETUP-2
";

fn fast_config() -> RunConfig {
    RunConfig {
        sleep_between_secs: 0,
        ..RunConfig::default()
    }
}

fn write_plan(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("TASKS.md");
    fs::write(&path, PLAN).expect("write plan");
    path
}

fn completed(id: &str) -> foreman::io::monitor::MonitorReport {
    scripted_outcome(RunOutcome::TaskCompleted {
        task_id: id.to_string(),
    })
}

/// Full lifecycle: parse markdown, run three dependency-chained tasks to
/// completion, and verify both persisted state and the rewritten document.
#[test]
fn markdown_plan_runs_to_complete_in_dependency_order() {
    let temp = tempfile::tempdir().expect("tempdir");
    let plan = write_plan(temp.path());

    let runner = ScriptedRunner::new(vec![
        completed("SETUP-1"),
        completed("SETUP-2"),
        completed("FEAT-1"),
    ]);
    let orchestrator = Orchestrator::new(
        runner,
        StateStore::new(temp.path()),
        fast_config(),
        temp.path(),
    );

    let parsed = InputSource::TasksFile(plan.clone()).parse().expect("parse");
    let report = orchestrator.run(&parsed).expect("run");

    assert_eq!(report.stop, LoopStop::Complete);
    assert_eq!(report.iterations_executed, 3);
    let order: Vec<Option<String>> = ["SETUP-1", "SETUP-2", "FEAT-1"]
        .iter()
        .map(|id| Some(id.to_string()))
        .collect();
    assert_eq!(orchestrator.runner().expected_ids(), order);

    // Every checkbox in the source document was ticked.
    let rewritten = fs::read_to_string(&plan).expect("read plan");
    assert_eq!(rewritten.matches("- [x]").count(), 3);
    assert!(!rewritten.contains("- [ ]"));

    // Persisted state agrees.
    let persisted = StateStore::new(temp.path())
        .load()
        .expect("load")
        .expect("some");
    assert!(persisted.is_complete());
    assert_eq!(persisted.current_iteration, 3);
}

/// A failed task halts the loop, and rerunning after the plan is unchanged
/// picks the same task up again from pending.
#[test]
fn failure_halts_and_rerun_retries_the_task() {
    let temp = tempfile::tempdir().expect("tempdir");
    let plan = write_plan(temp.path());
    let parsed = InputSource::TasksFile(plan).parse().expect("parse");

    let first = Orchestrator::new(
        ScriptedRunner::new(vec![
            completed("SETUP-1"),
            scripted_outcome(RunOutcome::TaskFailed {
                task_id: Some("SETUP-2".to_string()),
                reason: Some("tests would not pass".to_string()),
            }),
        ]),
        StateStore::new(temp.path()),
        fast_config(),
        temp.path(),
    );
    let report = first.run(&parsed).expect("first run");
    assert_eq!(
        report.stop,
        LoopStop::Failed {
            reason: "tests would not pass".to_string()
        }
    );

    // The failed task is terminal until the operator intervenes; with no
    // pending eligible work behind it the rerun stalls rather than spinning.
    let second = Orchestrator::new(
        ScriptedRunner::new(vec![]),
        StateStore::new(temp.path()),
        fast_config(),
        temp.path(),
    );
    let report = second.run(&parsed).expect("second run");
    assert_eq!(report.stop, LoopStop::Stalled);

    let persisted = StateStore::new(temp.path())
        .load()
        .expect("load")
        .expect("some");
    let failed = persisted.task_by_id("SETUP-2").expect("task");
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("tests would not pass"));
}

/// Budgeted invocations resume where the previous one left off, with the
/// iteration counter carrying across process boundaries.
#[test]
fn budgeted_runs_resume_across_invocations() {
    let temp = tempfile::tempdir().expect("tempdir");
    let plan = write_plan(temp.path());
    let parsed = InputSource::TasksFile(plan).parse().expect("parse");
    let config = RunConfig {
        max_iterations: 1,
        ..fast_config()
    };

    let mut expected_counter = 0;
    for id in ["SETUP-1", "SETUP-2", "FEAT-1"] {
        let orchestrator = Orchestrator::new(
            ScriptedRunner::new(vec![completed(id)]),
            StateStore::new(temp.path()),
            config.clone(),
            temp.path(),
        );
        let report = orchestrator.run(&parsed).expect("run");
        expected_counter += 1;
        assert_eq!(report.project.current_iteration, expected_counter);
        if id == "FEAT-1" {
            assert_eq!(report.stop, LoopStop::Complete);
        } else {
            assert_eq!(report.stop, LoopStop::MaxIterationsReached);
        }
    }
}

/// Whole-project completion reported by the agent ends the loop even with
/// unfinished tasks on the books.
#[test]
fn project_complete_signal_wins_over_remaining_tasks() {
    let temp = tempfile::tempdir().expect("tempdir");
    let plan = write_plan(temp.path());
    let parsed = InputSource::TasksFile(plan).parse().expect("parse");

    let orchestrator = Orchestrator::new(
        ScriptedRunner::new(vec![scripted_outcome(RunOutcome::ProjectComplete)]),
        StateStore::new(temp.path()),
        fast_config(),
        temp.path(),
    );
    let report = orchestrator.run(&parsed).expect("run");
    assert_eq!(report.stop, LoopStop::Complete);
    assert_eq!(report.iterations_executed, 1);
}
