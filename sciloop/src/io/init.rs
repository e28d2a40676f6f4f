//! Initialization helpers for `.sciloop/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{LoopConfig, write_config};
use super::history::save_history;
use super::input::DETECTION_INPUT_SCHEMA;

/// All canonical paths within `.sciloop/` for a project root.
#[derive(Debug, Clone)]
pub struct SciloopPaths {
    pub root: PathBuf,
    pub sciloop_dir: PathBuf,
    pub runs_dir: PathBuf,
    pub gitignore_path: PathBuf,
    pub config_path: PathBuf,
    pub history_path: PathBuf,
    pub schema_path: PathBuf,
}

impl SciloopPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let sciloop_dir = root.join(".sciloop");
        Self {
            root: root.clone(),
            sciloop_dir: sciloop_dir.clone(),
            runs_dir: sciloop_dir.join("runs"),
            gitignore_path: sciloop_dir.join(".gitignore"),
            config_path: sciloop_dir.join("config.toml"),
            history_path: sciloop_dir.join("history.json"),
            schema_path: sciloop_dir.join("detection_input.schema.json"),
        }
    }
}

/// Options for `init_sciloop`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing sciloop-owned files.
    pub force: bool,
}

/// Create `.sciloop/` scaffolding in `root`.
///
/// Fails if `.sciloop/` already exists unless `options.force` is set.
pub fn init_sciloop(root: &Path, options: &InitOptions) -> Result<SciloopPaths> {
    let paths = SciloopPaths::new(root);
    if paths.sciloop_dir.exists() && !options.force {
        return Err(anyhow!(
            "sciloop init: .sciloop already exists (use --force to overwrite)"
        ));
    }
    if paths.sciloop_dir.exists() && !paths.sciloop_dir.is_dir() {
        return Err(anyhow!(
            "sciloop init: .sciloop exists but is not a directory"
        ));
    }

    create_dir(&paths.sciloop_dir)?;
    create_dir(&paths.runs_dir)?;

    write_file(&paths.gitignore_path, SCILOOP_GITIGNORE)?;
    write_config(&paths.config_path, &LoopConfig::default())?;
    write_file(&paths.schema_path, DETECTION_INPUT_SCHEMA)?;
    save_history(&paths.history_path, &[])?;

    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir(parent)?;
    }
    fs::write(path, contents).with_context(|| format!("write file {}", path.display()))
}

const SCILOOP_GITIGNORE: &str = "runs/\n";
