//! Iteration-control CLI for an autonomous coding agent.
//!
//! `foreman run` parses a phased task list from markdown, then repeatedly
//! spawns the agent on the next eligible task until the project completes,
//! the iteration budget is spent, or the agent reports a terminal condition.
//! Progress is persisted under `.foreman/` and survives restarts.

use std::path::PathBuf;
use std::process::exit;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use foreman::core::model::TaskStatus;
use foreman::exit_codes;
use foreman::io::config::load_config;
use foreman::io::input::InputSource;
use foreman::io::monitor::AgentMonitor;
use foreman::io::state_store::StateStore;
use foreman::orchestrator::{LoopStop, Orchestrator};
use foreman::progress;

#[derive(Parser)]
#[command(
    name = "foreman",
    version,
    about = "Bounded iteration loop that drives a coding agent through a task list"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Working directory for state, sources, and the agent process.
    #[arg(long, global = true, default_value = ".")]
    dir: PathBuf,

    /// Namespace state by project identity (for shared working directories).
    #[arg(long, global = true)]
    project: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the loop until completion, budget exhaustion, or a terminal halt.
    Run {
        /// Single markdown task file (default: TASKS.md in the working dir).
        #[arg(long)]
        tasks: Option<PathBuf>,

        /// Directory of plan files, parsed in file-name order.
        #[arg(long, conflicts_with = "tasks")]
        plan: Option<PathBuf>,

        /// Override the configured iteration budget.
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Override the configured idle timeout in seconds.
        #[arg(long)]
        idle_timeout: Option<u64>,

        /// Override the configured agent model.
        #[arg(long)]
        model: Option<String>,

        /// Leave source documents untouched when tasks complete.
        #[arg(long)]
        no_update_source: bool,
    },
    /// Print progress from the persisted state.
    Status {
        /// Emit machine-readable JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Check task sources for structural problems without running anything.
    Validate {
        #[arg(long)]
        tasks: Option<PathBuf>,

        #[arg(long, conflicts_with = "tasks")]
        plan: Option<PathBuf>,
    },
    /// Discard persisted state for a fresh start.
    Reset {
        /// Keep a timestamped copy of the state file first.
        #[arg(long)]
        backup: bool,
    },
}

fn main() {
    foreman::logging::init();
    match run() {
        Ok(code) => exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let store = match &cli.project {
        Some(identity) => StateStore::with_identity(&cli.dir, identity),
        None => StateStore::new(&cli.dir),
    };
    match cli.command {
        Command::Run {
            tasks,
            plan,
            max_iterations,
            idle_timeout,
            model,
            no_update_source,
        } => cmd_run(
            &cli.dir,
            store,
            input_source(&cli.dir, tasks, plan),
            max_iterations,
            idle_timeout,
            model,
            no_update_source,
        ),
        Command::Status { json } => cmd_status(&store, json),
        Command::Validate { tasks, plan } => cmd_validate(&input_source(&cli.dir, tasks, plan)),
        Command::Reset { backup } => cmd_reset(&store, backup),
    }
}

/// Explicit flags win; otherwise a `plan/` directory in the working dir,
/// otherwise `TASKS.md`.
fn input_source(dir: &PathBuf, tasks: Option<PathBuf>, plan: Option<PathBuf>) -> InputSource {
    if let Some(path) = tasks {
        return InputSource::TasksFile(path);
    }
    if let Some(path) = plan {
        return InputSource::PlanDir(path);
    }
    let plan_dir = dir.join("plan");
    if plan_dir.is_dir() {
        InputSource::PlanDir(plan_dir)
    } else {
        InputSource::TasksFile(dir.join("TASKS.md"))
    }
}

fn cmd_run(
    dir: &PathBuf,
    store: StateStore,
    source: InputSource,
    max_iterations: Option<u32>,
    idle_timeout: Option<u64>,
    model: Option<String>,
    no_update_source: bool,
) -> Result<i32> {
    let errors = source.validate();
    if !errors.is_empty() {
        bail!("task sources invalid:\n- {}", errors.join("\n- "));
    }
    let parsed = source.parse()?;

    let mut config = load_config(&store.config_path())?;
    if let Some(n) = max_iterations {
        config.max_iterations = n;
    }
    if let Some(secs) = idle_timeout {
        config.idle_timeout_secs = secs;
    }
    if let Some(model) = model {
        config.model = Some(model);
    }
    if no_update_source {
        config.update_source = false;
    }
    config.validate().context("configuration invalid")?;

    let orchestrator = Orchestrator::new(AgentMonitor::default(), store, config, dir);
    let report = orchestrator.run(&parsed)?;

    match &report.stop {
        LoopStop::Complete => println!("project complete"),
        LoopStop::MaxIterationsReached => {
            println!(
                "iteration budget spent after {} iterations; run again to continue",
                report.iterations_executed
            );
        }
        LoopStop::Blocked { reason } => println!("blocked: {reason}"),
        LoopStop::Failed { reason } => println!("failed: {reason}"),
        LoopStop::Stalled => {
            println!("stalled: no eligible task remains; check task dependencies");
        }
        LoopStop::Interrupted => println!("interrupted"),
    }
    let summary = progress::summary(&report.project);
    println!(
        "{}/{} tasks complete ({:.0}%)",
        summary.completed, summary.total, summary.percent
    );
    Ok(exit_codes::for_stop(&report.stop))
}

fn cmd_status(store: &StateStore, json: bool) -> Result<i32> {
    let Some(project) = store.load()? else {
        println!("no saved state");
        return Ok(0);
    };

    if json {
        let report = serde_json::json!({
            "project": project.name,
            "summary": progress::summary(&project),
            "phases": progress::phase_rollups(&project),
            "iterations": progress::iteration_history(&project),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(0);
    }

    let summary = progress::summary(&project);
    println!(
        "{}: {}/{} tasks complete ({:.0}%)",
        project.name, summary.completed, summary.total, summary.percent
    );
    for phase in progress::phase_rollups(&project) {
        println!(
            "  [{:?}] {} ({}/{})",
            phase.status, phase.name, phase.completed, phase.total
        );
    }
    let failed: Vec<_> = project
        .tasks()
        .filter(|t| matches!(t.status, TaskStatus::Failed | TaskStatus::Blocked))
        .collect();
    for task in failed {
        println!(
            "  !! {} ({:?}): {}",
            task.id,
            task.status,
            task.error.as_deref().unwrap_or("no reason recorded")
        );
    }
    for record in progress::iteration_history(&project) {
        let duration = record
            .duration_ms
            .map(|ms| progress::format_duration(chrono::Duration::milliseconds(ms)))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  iteration {} [{:?}] {} completed: {}",
            record.number,
            record.status,
            duration,
            if record.tasks_completed.is_empty() {
                "none".to_string()
            } else {
                record.tasks_completed.join(", ")
            }
        );
    }
    Ok(0)
}

fn cmd_validate(source: &InputSource) -> Result<i32> {
    let errors = source.validate();
    if !errors.is_empty() {
        eprintln!("invalid:\n- {}", errors.join("\n- "));
        return Ok(1);
    }
    let project = source.parse()?;
    let total = project.tasks().count();
    println!("ok: {} phases, {} tasks", project.phases.len(), total);
    Ok(0)
}

fn cmd_reset(store: &StateStore, backup: bool) -> Result<i32> {
    if !store.exists() {
        println!("no saved state");
        return Ok(0);
    }
    if backup {
        let path = store.backup()?;
        println!("backed up to {}", path.display());
    }
    store.reset()?;
    println!("state discarded");
    Ok(0)
}
