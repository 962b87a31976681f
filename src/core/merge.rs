//! Reconciliation of a freshly parsed project with previously persisted
//! progress.
//!
//! Source documents may be edited between runs, so the new parse is the
//! authority on which tasks exist and what their metadata says, while the old
//! state is the authority on progress. The merge is idempotent.

use std::collections::HashMap;

use crate::core::model::{IterationStatus, Project, Task, TaskStatus};

/// Merge a freshly parsed project with a previously persisted one.
///
/// For task ids present in both, metadata (name, dependencies, priority,
/// document location) comes from `new` and progress (status, iteration,
/// completion timestamp, error) from `old`. Ids only in `new` start Pending as
/// parsed; ids only in `old` are dropped. Iteration history and the iteration
/// counter always come from `old`.
///
/// A snapshot taken mid-iteration (hard crash, power loss) holds an
/// `InProgress` task inside a `Running` iteration; neither is durable
/// progress. The merge closes such iterations as failed and hands the task
/// back to pending so the resumed run can select it again.
pub fn merge_projects(new: &Project, old: &Project) -> Project {
    let old_tasks: HashMap<&str, &Task> =
        old.tasks().map(|task| (task.id.as_str(), task)).collect();

    let mut merged = new.clone();
    for phase in &mut merged.phases {
        for task in &mut phase.tasks {
            if let Some(prev) = old_tasks.get(task.id.as_str()) {
                task.status = prev.status;
                task.iteration = prev.iteration;
                task.completed_at = prev.completed_at;
                task.error = prev.error.clone();
            }
            if task.status == TaskStatus::InProgress {
                task.status = TaskStatus::Pending;
            }
        }
    }

    merged.iterations = old.iterations.clone();
    for iteration in &mut merged.iterations {
        if iteration.status == IterationStatus::Running {
            iteration.close(
                IterationStatus::Failed,
                Some("interrupted before completion".to_string()),
            );
        }
    }
    merged.current_iteration = old.current_iteration;
    merged.created_at = old.created_at;
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{Iteration, TaskStatus};
    use crate::test_support::{project_with_phase, task};

    fn old_with_completed_t1() -> Project {
        let mut old = project_with_phase(vec![task("t1"), task("t2")]);
        old.task_by_id_mut("t1").expect("t1").mark_completed(4);
        old.task_by_id_mut("t2")
            .expect("t2")
            .mark_failed("flaky test");
        old.add_iteration(Iteration::start(4));
        old
    }

    #[test]
    fn merge_keeps_old_progress_and_new_metadata() {
        let old = old_with_completed_t1();

        let mut t1 = task("t1");
        t1.name = "Renamed task".to_string();
        t1.depends_on = vec!["t0".to_string()];
        let new = project_with_phase(vec![t1, task("t2")]);

        let merged = merge_projects(&new, &old);
        let m1 = merged.task_by_id("t1").expect("t1");
        assert_eq!(m1.name, "Renamed task");
        assert_eq!(m1.depends_on, vec!["t0".to_string()]);
        assert_eq!(m1.status, TaskStatus::Completed);
        assert_eq!(m1.iteration, Some(4));
        assert!(m1.completed_at.is_some());

        let m2 = merged.task_by_id("t2").expect("t2");
        assert_eq!(m2.status, TaskStatus::Failed);
        assert_eq!(m2.error.as_deref(), Some("flaky test"));

        assert_eq!(merged.current_iteration, 4);
        assert_eq!(merged.iterations.len(), 1);
        assert_eq!(merged.created_at, old.created_at);
    }

    #[test]
    fn tasks_removed_from_source_are_dropped() {
        let old = old_with_completed_t1();
        let new = project_with_phase(vec![task("t2")]);

        let merged = merge_projects(&new, &old);
        assert!(merged.task_by_id("t1").is_none());
    }

    #[test]
    fn tasks_new_to_source_start_pending() {
        let old = old_with_completed_t1();
        let new = project_with_phase(vec![task("t1"), task("t2"), task("t3")]);

        let merged = merge_projects(&new, &old);
        assert_eq!(
            merged.task_by_id("t3").expect("t3").status,
            TaskStatus::Pending
        );
    }

    #[test]
    fn interrupted_snapshot_reopens_task_and_closes_iteration() {
        let mut old = project_with_phase(vec![task("t1")]);
        old.task_by_id_mut("t1").expect("t1").mark_started();
        old.add_iteration(Iteration::start(1));

        let merged = merge_projects(&project_with_phase(vec![task("t1")]), &old);
        assert_eq!(
            merged.task_by_id("t1").expect("t1").status,
            TaskStatus::Pending
        );
        let stale = &merged.iterations[0];
        assert_eq!(stale.status, IterationStatus::Failed);
        assert!(stale.ended_at.is_some());
    }

    #[test]
    fn merge_is_idempotent() {
        let old = old_with_completed_t1();
        let new = project_with_phase(vec![task("t1"), task("t2"), task("t3")]);

        let once = merge_projects(&new, &old);
        let twice = merge_projects(&new, &once);
        assert_eq!(once, twice);
    }
}
