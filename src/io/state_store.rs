//! Durable persistence of the project aggregate under the state directory.
//!
//! Saves are atomic (temp file + rename), so a crash at any point leaves the
//! previous snapshot intact. Loads are tolerant: a corrupt state file is a
//! fresh start, not a fatal error.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, warn};

use crate::core::merge::merge_projects;
use crate::core::model::Project;

pub const STATE_DIR: &str = ".foreman";
pub const STATE_FILE: &str = "state.json";
pub const ARTIFACT_FILE: &str = "status.json";
pub const CONFIG_FILE: &str = "config.toml";
pub const LOG_DIR: &str = "logs";

/// Project state persistence rooted at a working directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    state_dir: PathBuf,
}

impl StateStore {
    pub fn new(working_dir: &Path) -> Self {
        Self {
            state_dir: working_dir.join(STATE_DIR),
        }
    }

    /// Store namespaced by a project identity, for working directories shared
    /// by several independent projects.
    pub fn with_identity(working_dir: &Path, identity: &str) -> Self {
        Self {
            state_dir: working_dir.join(STATE_DIR).join("projects").join(identity),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE)
    }

    /// Path of the completion artifact the agent writes into this store's
    /// state directory.
    pub fn artifact_path(&self) -> PathBuf {
        self.state_dir.join(ARTIFACT_FILE)
    }

    pub fn config_path(&self) -> PathBuf {
        self.state_dir.join(CONFIG_FILE)
    }

    pub fn exists(&self) -> bool {
        self.state_path().exists()
    }

    /// Serialize the aggregate and atomically replace the canonical file.
    pub fn save(&self, project: &mut Project) -> Result<()> {
        project.updated_at = Utc::now();
        fs::create_dir_all(&self.state_dir)
            .with_context(|| format!("create state dir {}", self.state_dir.display()))?;

        let mut buf = serde_json::to_string_pretty(project).context("serialize project state")?;
        buf.push('\n');

        let path = self.state_path();
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, &buf)
            .with_context(|| format!("write temp state {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path)
            .with_context(|| format!("replace state {}", path.display()))?;
        debug!(path = %path.display(), "state saved");
        Ok(())
    }

    /// Load the persisted snapshot. Missing or unreadable files yield `None`
    /// so a fresh run can proceed.
    pub fn load(&self) -> Result<Option<Project>> {
        let path = self.state_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read state {}", path.display()))?;
        match serde_json::from_str::<Project>(&contents) {
            Ok(project) => {
                debug!(path = %path.display(), iteration = project.current_iteration, "state loaded");
                Ok(Some(project))
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "state file unreadable, starting fresh");
                Ok(None)
            }
        }
    }

    /// Reconcile a freshly parsed project with whatever was persisted. With
    /// no prior state the parse is returned as-is.
    pub fn merge_with_existing(&self, parsed: &Project) -> Result<Project> {
        match self.load()? {
            Some(old) => Ok(merge_projects(parsed, &old)),
            None => Ok(parsed.clone()),
        }
    }

    /// Discard the canonical state file.
    pub fn reset(&self) -> Result<()> {
        let path = self.state_path();
        if path.exists() {
            fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
        }
        Ok(())
    }

    /// Persist one iteration's captured agent output under `logs/`.
    pub fn write_iteration_log(&self, number: u32, contents: &str) -> Result<PathBuf> {
        let dir = self.state_dir.join(LOG_DIR);
        fs::create_dir_all(&dir)
            .with_context(|| format!("create log dir {}", dir.display()))?;
        let path = dir.join(format!("iteration_{number:03}.log"));
        fs::write(&path, contents)
            .with_context(|| format!("write iteration log {}", path.display()))?;
        Ok(path)
    }

    /// Copy the state file to a timestamped backup beside it.
    pub fn backup(&self) -> Result<PathBuf> {
        let path = self.state_path();
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let backup_path = self.state_dir.join(format!("state_backup_{stamp}.json"));
        fs::copy(&path, &backup_path)
            .with_context(|| format!("backup state to {}", backup_path.display()))?;
        Ok(backup_path)
    }
}
