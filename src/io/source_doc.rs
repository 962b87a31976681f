//! Checkbox write-back into originating source documents.
//!
//! The single place where the core's pure toggle touches disk. The mutation
//! is idempotent: writing the state a line already has leaves the file alone.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::checkbox::toggle_line;

/// Set the checkbox at a recorded 1-based line. Returns whether the file
/// changed; an out-of-range line or already-matching state is a quiet no-op.
pub fn update_checkbox(path: &Path, line: usize, checked: bool) -> Result<bool> {
    if !path.exists() {
        debug!(path = %path.display(), "source document missing, skipping write-back");
        return Ok(false);
    }
    let original =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let updated = toggle_line(&original, line, checked);
    if updated == original {
        return Ok(false);
    }
    fs::write(path, &updated).with_context(|| format!("write {}", path.display()))?;
    debug!(path = %path.display(), line, checked, "checkbox updated");
    Ok(true)
}
