//! Execution prompt construction for one iteration.

use anyhow::{Context as AnyhowContext, Result};
use minijinja::{Environment, context};

use crate::core::model::{Project, Task};
use crate::progress;

const EXECUTION_TEMPLATE: &str = r#"You are working on the project "{{ project_name }}"{% if description %} ({{ description }}){% endif %}.

Current progress: {{ completed }}/{{ total }} tasks completed.

Your single unit of work for this session:

Task {{ task_id }}: {{ task_name }}
Phase: {{ phase_name }}
{%- if dependencies %}
Already completed prerequisites: {{ dependencies | join(", ") }}
{%- endif %}

Work autonomously until this one task is done, then report by writing a JSON
object to {{ artifact_path }} with exactly these fields:

  {"status": "COMPLETED", "task_id": "{{ task_id }}", "reason": null}

Use status "FAILED" or "BLOCKED" (with a short reason) if you cannot finish,
or "PROJECT_COMPLETE" if you verify that every task in every phase is done.
Do not work on any other task in this session.
{%- if custom_instructions %}

Additional instructions:
{{ custom_instructions }}
{%- endif %}
"#;

/// Inputs the template needs beyond the task itself.
#[derive(Debug, Clone)]
pub struct PromptContext<'a> {
    pub project: &'a Project,
    pub task: &'a Task,
    /// Where the agent must write the completion artifact.
    pub artifact_path: String,
    pub custom_instructions: &'a str,
}

/// Render the execution prompt for one task.
pub fn build_prompt(ctx: &PromptContext<'_>) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("execution", EXECUTION_TEMPLATE)
        .context("register execution template")?;
    let template = env.get_template("execution").context("load template")?;

    let phase_name = ctx
        .project
        .phases
        .iter()
        .find(|p| p.id == ctx.task.phase_id)
        .map(|p| p.name.clone())
        .unwrap_or_default();
    let summary = progress::summary(ctx.project);

    template
        .render(context! {
            project_name => ctx.project.name,
            description => ctx.project.description,
            completed => summary.completed,
            total => summary.total,
            task_id => ctx.task.id,
            task_name => ctx.task.name,
            phase_name => phase_name,
            dependencies => ctx.task.depends_on,
            artifact_path => ctx.artifact_path,
            custom_instructions => ctx.custom_instructions,
        })
        .context("render execution prompt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{project_with_phase, task, task_with_deps};

    #[test]
    fn prompt_names_the_task_and_artifact_path() {
        let project = project_with_phase(vec![task("t1")]);
        let t1 = project.task_by_id("t1").expect("t1");
        let prompt = build_prompt(&PromptContext {
            project: &project,
            task: t1,
            artifact_path: ".foreman/status.json".to_string(),
            custom_instructions: "",
        })
        .expect("render");

        assert!(prompt.contains("Task t1"));
        assert!(prompt.contains(".foreman/status.json"));
        assert!(prompt.contains(r#""task_id": "t1""#));
        assert!(!prompt.contains("Additional instructions"));
    }

    #[test]
    fn prompt_lists_dependencies_and_instructions() {
        let mut project = project_with_phase(vec![task("t1"), task_with_deps("t2", &["t1"])]);
        project.task_by_id_mut("t1").expect("t1").mark_completed(1);
        let t2 = project.task_by_id("t2").expect("t2");
        let prompt = build_prompt(&PromptContext {
            project: &project,
            task: t2,
            artifact_path: "status.json".to_string(),
            custom_instructions: "Run the linter before finishing.",
        })
        .expect("render");

        assert!(prompt.contains("prerequisites: t1"));
        assert!(prompt.contains("Run the linter"));
        assert!(prompt.contains("1/2 tasks completed"));
    }
}
