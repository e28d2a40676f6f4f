//! Loop artifacts: `loop_result.json` plus one directory per iteration.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::state::{IterationSummary, LoopResult};

#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub dir: PathBuf,
    pub loop_result_path: PathBuf,
    pub iterations_dir: PathBuf,
}

impl ArtifactPaths {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            loop_result_path: dir.join("loop_result.json"),
            iterations_dir: dir.join("iterations"),
        }
    }

    pub fn iteration_summary_path(&self, iteration: u32) -> PathBuf {
        self.iterations_dir
            .join(iteration.to_string())
            .join("summary.json")
    }
}

pub fn write_iteration_summary(paths: &ArtifactPaths, summary: &IterationSummary) -> Result<PathBuf> {
    let path = paths.iteration_summary_path(summary.iteration);
    write_json(&path, summary)?;
    Ok(path)
}

pub fn write_loop_result(paths: &ArtifactPaths, result: &LoopResult) -> Result<PathBuf> {
    write_json(&paths.loop_result_path, result)?;
    Ok(paths.loop_result_path.clone())
}

pub fn load_loop_result(path: &Path) -> Result<LoopResult> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read loop result {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("parse loop result {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}
