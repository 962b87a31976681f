//! Input sources that resolve to a project at startup.
//!
//! A closed variant type with a uniform validate/parse capability: a single
//! tasks/plan markdown file, or a directory of plan files processed in name
//! order. Parsing is line oriented and builds on the pure checkbox parser.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use tracing::debug;

use crate::core::checkbox::{self, count_checkboxes};
use crate::core::model::{Phase, Project, Task, TaskStatus};

static H1: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#\s+(?:Project:\s*)?(.+?)\s*$").expect("h1 regex"));
static PHASE_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^##\s+(?:Phase\s+\d+[:\s]*)?(.+?)\s*$").expect("phase regex"));
static PRIORITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*-?\s*Priority:\s*(\d+|high|medium|low)\s*$").expect("priority regex")
});
static DEPENDENCIES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*-?\s*Dependenc(?:y|ies):\s*(.+?)\s*$").expect("dependencies regex")
});

/// Where the project definition comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// One markdown file of phases and checkbox tasks.
    TasksFile(PathBuf),
    /// Directory of plan files, parsed in file-name order.
    PlanDir(PathBuf),
}

impl InputSource {
    /// Collect problems without touching the data model. Empty means usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        match self {
            Self::TasksFile(path) => {
                if !path.is_file() {
                    errors.push(format!("tasks file not found: {}", path.display()));
                } else if path.extension().and_then(|e| e.to_str()) != Some("md") {
                    errors.push(format!("tasks file should be markdown: {}", path.display()));
                } else if let Ok(content) = fs::read_to_string(path)
                    && count_checkboxes(&content).1 == 0
                {
                    errors.push(format!("no checkbox tasks in: {}", path.display()));
                }
            }
            Self::PlanDir(dir) => {
                if !dir.is_dir() {
                    errors.push(format!("plan directory not found: {}", dir.display()));
                } else if plan_files(dir).map(|f| f.is_empty()).unwrap_or(true) {
                    errors.push(format!("no markdown files in: {}", dir.display()));
                }
            }
        }
        errors
    }

    /// Parse the source into a project ready for merging with prior state.
    pub fn parse(&self) -> Result<Project> {
        match self {
            Self::TasksFile(path) => {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("read {}", path.display()))?;
                let name = project_name(&content)
                    .unwrap_or_else(|| file_stem(path));
                let mut project = Project::new(name);
                project.source_files.push(path.clone());
                let mut next_phase = 0;
                parse_plan(&content, path, &mut next_phase, &mut project)?;
                ensure_unique_task_ids(&project)?;
                debug!(tasks = project.tasks().count(), "parsed tasks file");
                Ok(project)
            }
            Self::PlanDir(dir) => {
                let files = plan_files(dir)?;
                if files.is_empty() {
                    bail!("no markdown files in {}", dir.display());
                }
                let mut project = Project::new(file_stem(dir));
                let mut next_phase = 0;
                for path in files {
                    let content = fs::read_to_string(&path)
                        .with_context(|| format!("read {}", path.display()))?;
                    project.source_files.push(path.clone());
                    parse_plan(&content, &path, &mut next_phase, &mut project)?;
                }
                ensure_unique_task_ids(&project)?;
                debug!(
                    phases = project.phases.len(),
                    tasks = project.tasks().count(),
                    "parsed plan directory"
                );
                Ok(project)
            }
        }
    }
}

fn plan_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("read dir {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("md"))
        .collect();
    files.sort();
    Ok(files)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string())
}

fn project_name(content: &str) -> Option<String> {
    content
        .lines()
        .find_map(|line| H1.captures(line).map(|caps| caps[1].to_string()))
}

/// Append the phases and tasks found in one document to `project`.
///
/// Tasks before the first `##` header land in an implicit phase. Metadata
/// lines (`Priority:`, `Dependencies:`) attach to the task directly above
/// them; a `Priority:` seen before any task sets the current phase's.
fn parse_plan(
    content: &str,
    source: &Path,
    next_phase: &mut usize,
    project: &mut Project,
) -> Result<()> {
    let mut current: Option<Phase> = None;
    let mut task_counter = project.tasks().count();

    for (idx, line) in content.lines().enumerate() {
        if let Some(caps) = PHASE_HEADER.captures(line) {
            if let Some(done) = current.take() {
                project.phases.push(done);
            }
            let mut phase = Phase::new(
                format!("phase-{}", *next_phase + 1),
                caps[1].to_string(),
                *next_phase as i64,
            );
            phase.source_file = Some(source.to_path_buf());
            *next_phase += 1;
            current = Some(phase);
            continue;
        }
        if let Some((explicit_id, name, checked)) = checkbox::parse_line(line) {
            if current.is_none() {
                let mut phase = Phase::new(
                    format!("phase-{}", *next_phase + 1),
                    "Tasks".to_string(),
                    *next_phase as i64,
                );
                phase.source_file = Some(source.to_path_buf());
                *next_phase += 1;
                current = Some(phase);
            }
            if let Some(phase) = current.as_mut() {
                task_counter += 1;
                let id = explicit_id.unwrap_or_else(|| format!("task-{task_counter}"));
                let mut task = Task::new(id, name, phase.id.clone());
                task.priority = phase.tasks.len() as i64;
                task.source_file = Some(source.to_path_buf());
                task.source_line = Some(idx + 1);
                if checked {
                    task.status = TaskStatus::Completed;
                }
                phase.tasks.push(task);
            }
            continue;
        }
        if let Some(caps) = PRIORITY.captures(line) {
            let priority = parse_priority(&caps[1]);
            if let Some(phase) = current.as_mut() {
                if let Some(task) = phase.tasks.last_mut() {
                    task.priority = priority;
                } else {
                    phase.priority = priority;
                }
            }
            continue;
        }
        if let Some(caps) = DEPENDENCIES.captures(line)
            && let Some(task) = current.as_mut().and_then(|p| p.tasks.last_mut())
        {
            task.depends_on = caps[1]
                .split(',')
                .map(|dep| dep.trim().to_string())
                .filter(|dep| !dep.is_empty())
                .collect();
        }
    }

    if let Some(done) = current.take() {
        project.phases.push(done);
    }
    Ok(())
}

fn parse_priority(raw: &str) -> i64 {
    match raw.to_ascii_lowercase().as_str() {
        "high" => 0,
        "medium" => 50,
        "low" => 100,
        digits => digits.parse().unwrap_or(0),
    }
}

fn ensure_unique_task_ids(project: &Project) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for task in project.tasks() {
        if !seen.insert(task.id.as_str()) {
            return Err(anyhow!("duplicate task id: {}", task.id));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = "# Project: Demo\n\n## Phase 1: Foundation\n\n- [ ] US-001: init repo\n- [ ] US-002: add CI\n  - Priority: high\n  - Dependencies: US-001\n\n## Phase 2: Features\n\n- [x] US-003: parse input\n";

    #[test]
    fn parses_phases_tasks_and_metadata() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("plan.md");
        fs::write(&path, PLAN).expect("write");

        let project = InputSource::TasksFile(path.clone()).parse().expect("parse");
        assert_eq!(project.name, "Demo");
        assert_eq!(project.phases.len(), 2);
        assert_eq!(project.phases[0].name, "Foundation");

        let t2 = project.task_by_id("US-002").expect("US-002");
        assert_eq!(t2.priority, 0);
        assert_eq!(t2.depends_on, vec!["US-001".to_string()]);
        assert_eq!(t2.source_line, Some(6));
        assert_eq!(t2.source_file.as_deref(), Some(path.as_path()));

        let t3 = project.task_by_id("US-003").expect("US-003");
        assert_eq!(t3.status, TaskStatus::Completed);
    }

    #[test]
    fn tasks_without_ids_get_generated_ones() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("plan.md");
        fs::write(&path, "- [ ] first\n- [ ] second\n").expect("write");

        let project = InputSource::TasksFile(path).parse().expect("parse");
        assert!(project.task_by_id("task-1").is_some());
        assert!(project.task_by_id("task-2").is_some());
        assert_eq!(project.phases[0].name, "Tasks");
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("plan.md");
        fs::write(&path, "- [ ] US-001: a\n- [ ] US-001: b\n").expect("write");

        let err = InputSource::TasksFile(path).parse().expect_err("dup");
        assert!(err.to_string().contains("duplicate task id"));
    }

    #[test]
    fn plan_directory_orders_phases_by_file_name() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("02-later.md"), "## Later\n- [ ] L-1: later\n")
            .expect("write");
        fs::write(temp.path().join("01-early.md"), "## Early\n- [ ] E-1: early\n")
            .expect("write");

        let project = InputSource::PlanDir(temp.path().to_path_buf())
            .parse()
            .expect("parse");
        assert_eq!(project.phases[0].name, "Early");
        assert!(project.phases[0].priority < project.phases[1].priority);
        assert_eq!(project.source_files.len(), 2);
    }

    #[test]
    fn validate_reports_missing_sources() {
        let temp = tempfile::tempdir().expect("tempdir");
        let missing = InputSource::TasksFile(temp.path().join("gone.md"));
        assert!(!missing.validate().is_empty());

        let empty_dir = InputSource::PlanDir(temp.path().to_path_buf());
        assert!(!empty_dir.validate().is_empty());
    }

    #[test]
    fn validate_rejects_a_file_without_tasks() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("plan.md");
        fs::write(&path, "# Notes\n\njust prose, no checkboxes\n").expect("write");

        let errors = InputSource::TasksFile(path).validate();
        assert!(errors.iter().any(|e| e.contains("no checkbox tasks")));
    }
}
