//! Completion-signal classification for one unit of agent work.
//!
//! The agent reports through a structured artifact file; older prompt styles
//! reported through literal markers in terminal output. Classification is
//! pure: the monitor hands in whatever bytes it observed and gets back a
//! single [`RunOutcome`].

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Status field of the completion artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactStatus {
    Completed,
    Failed,
    Blocked,
    ProjectComplete,
}

/// Structured completion artifact written by the agent at
/// `<state_dir>/status.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionArtifact {
    pub status: ArtifactStatus,
    /// Required correlation id; an artifact without one is never trusted.
    pub task_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

impl CompletionArtifact {
    /// Parse artifact JSON. Malformed or partially written content is treated
    /// as absent, not as an error.
    pub fn parse(raw: &str) -> Option<Self> {
        match serde_json::from_str::<Self>(raw) {
            Ok(artifact) => Some(artifact),
            Err(err) => {
                debug!(%err, "ignoring unreadable completion artifact");
                None
            }
        }
    }

    /// True when the artifact correlates with the task this invocation is
    /// running. With no expected id (project-wide work) any artifact is
    /// accepted, matching the legacy single-project behavior.
    pub fn matches(&self, expected_task_id: Option<&str>) -> bool {
        match expected_task_id {
            Some(expected) => self.task_id == expected,
            None => true,
        }
    }
}

/// Classified result of one monitor invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    TaskCompleted { task_id: String },
    TaskFailed { task_id: Option<String>, reason: Option<String> },
    TaskBlocked { task_id: Option<String>, reason: Option<String> },
    ProjectComplete,
    /// No trusted artifact and no textual marker: the caller records the
    /// iteration as failed rather than guessing.
    Inconclusive,
}

impl RunOutcome {
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::TaskFailed { reason, .. } | Self::TaskBlocked { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }
}

/// Legacy textual markers scanned when no artifact is produced.
pub const TASK_STATUS_MARKER: &str = "TASK_STATUS:";
pub const PROJECT_COMPLETE_MARKER: &str = "PROJECT_COMPLETE";

/// Classify one invocation from the observed signals.
///
/// A validated artifact wins; a stale or cross-run artifact (wrong `task_id`)
/// is ignored entirely; the raw-output marker scan is the fallback.
pub fn classify(
    artifact_raw: Option<&str>,
    expected_task_id: Option<&str>,
    captured_output: &str,
) -> RunOutcome {
    if let Some(raw) = artifact_raw
        && let Some(artifact) = CompletionArtifact::parse(raw)
    {
        if artifact.matches(expected_task_id) {
            return outcome_from_artifact(artifact);
        }
        warn!(
            artifact_task_id = %artifact.task_id,
            expected_task_id = ?expected_task_id,
            "completion artifact belongs to another task, ignoring"
        );
    }

    scan_markers(captured_output, expected_task_id)
}

fn outcome_from_artifact(artifact: CompletionArtifact) -> RunOutcome {
    match artifact.status {
        ArtifactStatus::Completed => RunOutcome::TaskCompleted {
            task_id: artifact.task_id,
        },
        ArtifactStatus::Failed => RunOutcome::TaskFailed {
            task_id: Some(artifact.task_id),
            reason: artifact.reason,
        },
        ArtifactStatus::Blocked => RunOutcome::TaskBlocked {
            task_id: Some(artifact.task_id),
            reason: artifact.reason,
        },
        ArtifactStatus::ProjectComplete => RunOutcome::ProjectComplete,
    }
}

/// Scan captured output for legacy textual markers.
///
/// Marker lines look like `TASK_STATUS: COMPLETED task-3` or
/// `TASK_STATUS: BLOCKED task-3 - waiting on credentials`; a bare
/// `PROJECT_COMPLETE` line signals the whole-project case.
fn scan_markers(output: &str, expected_task_id: Option<&str>) -> RunOutcome {
    for line in output.lines() {
        let line = line.trim();
        if line == PROJECT_COMPLETE_MARKER {
            return RunOutcome::ProjectComplete;
        }
        let Some(rest) = line.strip_prefix(TASK_STATUS_MARKER) else {
            continue;
        };
        let rest = rest.trim();
        let (word, tail) = match rest.split_once(char::is_whitespace) {
            Some((word, tail)) => (word, tail.trim()),
            None => (rest, ""),
        };
        let (task_id, reason) = split_id_and_reason(tail, expected_task_id);
        match word {
            "COMPLETED" => {
                // The marker path carries the same correlation rule as the
                // artifact: a completion for some other task is not ours.
                if let Some(id) = task_id
                    && (expected_task_id.is_none() || expected_task_id == Some(id.as_str()))
                {
                    return RunOutcome::TaskCompleted { task_id: id };
                }
            }
            "FAILED" => return RunOutcome::TaskFailed { task_id, reason },
            "BLOCKED" => return RunOutcome::TaskBlocked { task_id, reason },
            _ => {}
        }
    }
    RunOutcome::Inconclusive
}

fn split_id_and_reason(
    tail: &str,
    expected_task_id: Option<&str>,
) -> (Option<String>, Option<String>) {
    if tail.is_empty() {
        return (expected_task_id.map(str::to_string), None);
    }
    match tail.split_once(" - ") {
        Some((id, reason)) => (
            Some(id.trim().to_string()),
            Some(reason.trim().to_string()).filter(|r| !r.is_empty()),
        ),
        None => (Some(tail.to_string()), None),
    }
}
