//! Improvement history persisted as a JSON array.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::io::config::write_atomic;
use crate::tracker::ImprovementTracking;

/// Load history rows. A missing file is an empty history.
pub fn load_history(path: &Path) -> Result<Vec<ImprovementTracking>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read history {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse history {}", path.display()))
}

/// Atomically write history (temp file + rename).
pub fn save_history(path: &Path, rows: &[ImprovementTracking]) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(rows).context("serialize history")?;
    buf.push('\n');
    write_atomic(path, &buf)
}
