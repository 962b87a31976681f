//! Deterministic next-task selection over phases and dependencies.

use crate::core::model::{Project, Task, TaskStatus};

/// Structured selection outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Every task is completed.
    Complete,
    /// Id of the next eligible task.
    Eligible(String),
    /// No task is eligible but the project is incomplete: a dependency graph
    /// or authoring defect in the source documents.
    Stalled,
}

/// True when `task` is pending and every dependency resolves to a completed
/// task. Dependencies naming unknown ids never become satisfiable.
pub fn is_eligible(project: &Project, task: &Task) -> bool {
    if task.status != TaskStatus::Pending {
        return false;
    }
    task.depends_on.iter().all(|dep| {
        project
            .task_by_id(dep)
            .is_some_and(|d| d.status == TaskStatus::Completed)
    })
}

/// Select the next eligible task: phases in priority order, tasks in priority
/// order within each phase.
pub fn next_task(project: &Project) -> Selection {
    if project.is_complete() {
        return Selection::Complete;
    }

    let mut phases: Vec<_> = project.phases.iter().collect();
    phases.sort_by_key(|p| p.priority);

    for phase in phases {
        let mut tasks: Vec<_> = phase.tasks.iter().collect();
        tasks.sort_by_key(|t| t.priority);
        for task in tasks {
            if is_eligible(project, task) {
                return Selection::Eligible(task.id.clone());
            }
        }
    }

    Selection::Stalled
}
