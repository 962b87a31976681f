//! Run configuration stored under `.foreman/config.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::retry::RetryConfig;

/// Loop configuration (TOML).
///
/// Edited by humans; missing fields fall back to defaults so the file stays
/// forward-compatible. CLI flags override loaded values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    /// Additional-iteration budget for one invocation of the loop.
    pub max_iterations: u32,

    /// Seconds of agent silence before one unit of work is considered done.
    pub idle_timeout_secs: u64,

    /// Seconds to sleep between iterations.
    pub sleep_between_secs: u64,

    /// Model passed to the agent command, when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Pass the permission-skip flag to the agent.
    pub skip_permissions: bool,

    /// Mirror completed tasks back into their source documents.
    pub update_source: bool,

    /// Agent executable to spawn.
    pub agent_command: String,

    /// Extra instructions appended to every execution prompt.
    pub custom_instructions: String,

    pub retry: RetryConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            idle_timeout_secs: 60,
            sleep_between_secs: 2,
            model: None,
            skip_permissions: true,
            update_source: true,
            agent_command: "claude".to_string(),
            custom_instructions: String::new(),
            retry: RetryConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sleep_between(&self) -> Duration {
        Duration::from_secs(self.sleep_between_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.idle_timeout_secs == 0 {
            return Err(anyhow!("idle_timeout_secs must be > 0"));
        }
        if self.agent_command.trim().is_empty() {
            return Err(anyhow!("agent_command must be non-empty"));
        }
        if self.retry.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file; a missing file yields defaults.
pub fn load_config(path: &Path) -> Result<RunConfig> {
    if !path.exists() {
        let cfg = RunConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RunConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RunConfig) -> Result<()> {
    cfg.validate()?;
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, &buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
