//! Read-only progress views over a project: completion percentages, per-phase
//! rollups, and iteration history. No mutation side effects.

use chrono::Duration;
use serde::Serialize;

use crate::core::model::{IterationStatus, PhaseStatus, Project, TaskStatus};

/// Overall completion snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSummary {
    pub completed: usize,
    pub total: usize,
    /// `completed / total` in percent; zero when there are no tasks.
    pub percent: f64,
}

/// Per-phase completed/total rollup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseRollup {
    pub phase_id: String,
    pub name: String,
    pub status: PhaseStatus,
    pub completed: usize,
    pub total: usize,
}

/// One closed-or-running iteration as reported to the operator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationRecord {
    pub number: u32,
    pub status: IterationStatus,
    pub tasks_completed: Vec<String>,
    /// Wall-clock duration, unresolved while the iteration never closed.
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
}

pub fn summary(project: &Project) -> ProgressSummary {
    let total = project.tasks().count();
    let completed = project
        .tasks()
        .filter(|t| t.status == TaskStatus::Completed)
        .count();
    let percent = if total == 0 {
        0.0
    } else {
        completed as f64 / total as f64 * 100.0
    };
    ProgressSummary {
        completed,
        total,
        percent,
    }
}

pub fn phase_rollups(project: &Project) -> Vec<PhaseRollup> {
    let mut phases: Vec<_> = project.phases.iter().collect();
    phases.sort_by_key(|p| p.priority);
    phases
        .into_iter()
        .map(|phase| PhaseRollup {
            phase_id: phase.id.clone(),
            name: phase.name.clone(),
            status: phase.status(),
            completed: phase
                .tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Completed)
                .count(),
            total: phase.tasks.len(),
        })
        .collect()
}

pub fn iteration_history(project: &Project) -> Vec<IterationRecord> {
    project
        .iterations
        .iter()
        .map(|iteration| IterationRecord {
            number: iteration.number,
            status: iteration.status,
            tasks_completed: iteration.tasks_completed.clone(),
            duration_ms: iteration
                .ended_at
                .map(|end| (end - iteration.started_at).num_milliseconds()),
            error: iteration.error.clone(),
        })
        .collect()
}

/// Duration helper for display call sites.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.num_seconds();
    if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Iteration;
    use crate::test_support::{project_with_phase, task};

    #[test]
    fn empty_project_is_zero_percent() {
        let project = Project::new("empty");
        let s = summary(&project);
        assert_eq!(s.total, 0);
        assert_eq!(s.percent, 0.0);
    }

    #[test]
    fn summary_counts_completed_tasks() {
        let mut project = project_with_phase(vec![task("t1"), task("t2"), task("t3"), task("t4")]);
        project.task_by_id_mut("t1").expect("t1").mark_completed(1);
        let s = summary(&project);
        assert_eq!((s.completed, s.total), (1, 4));
        assert_eq!(s.percent, 25.0);
    }

    #[test]
    fn rollups_follow_phase_priority_order() {
        use crate::core::model::Phase;

        let mut project = project_with_phase(vec![task("t1")]);
        project.phases[0].priority = 2;
        project.phases.push(Phase::new("p0", "First", 1));
        let rollups = phase_rollups(&project);
        assert_eq!(rollups[0].phase_id, "p0");
        assert_eq!(rollups[1].completed, 0);
        assert_eq!(rollups[1].total, 1);
    }

    #[test]
    fn open_iteration_has_unresolved_duration() {
        let mut project = project_with_phase(vec![task("t1")]);
        let mut closed = Iteration::start(1);
        closed.close(IterationStatus::Success, None);
        project.add_iteration(closed);
        project.add_iteration(Iteration::start(2));

        let history = iteration_history(&project);
        assert!(history[0].duration_ms.is_some());
        assert!(history[1].duration_ms.is_none());
    }
}
