//! Loop configuration stored under `.sciloop/config.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::process::ProcessLimits;

/// Loop configuration (TOML).
///
/// Intended to be edited by humans. Missing fields take the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoopConfig {
    /// Upper bound on `run_until_done` iterations.
    pub max_iterations: u32,

    /// Hypotheses tested per problem before escalating.
    pub max_hypotheses_per_problem: usize,

    /// Fix verifications per problem before escalating.
    pub max_fix_attempts_per_problem: usize,

    /// Candidate fixes materialized per supported hypothesis.
    pub max_fixes: usize,

    /// Deadline for every command the agents run.
    pub command_timeout_ms: u64,

    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Minimum confidence for a `supported` verdict.
    pub supported_threshold: f64,

    /// Confidence below which a hypothesis is `refuted`.
    pub refuted_threshold: f64,

    pub verification: VerificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VerificationConfig {
    /// Whole test suite; also the fallback for the original failing test.
    pub full_suite_command: String,

    pub type_check_command: String,

    /// Command for a single test file. `{path}` and `{stem}` are substituted.
    pub test_file_command: String,

    /// Working directory for verification commands.
    pub workdir: Option<String>,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            full_suite_command: "cargo test".to_string(),
            type_check_command: "cargo check --all-targets".to_string(),
            test_file_command: "cargo test --test {stem}".to_string(),
            workdir: None,
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_hypotheses_per_problem: 5,
            max_fix_attempts_per_problem: 3,
            max_fixes: 3,
            command_timeout_ms: 60_000,
            output_limit_bytes: 1_000_000,
            supported_threshold: 0.5,
            refuted_threshold: 0.3,
            verification: VerificationConfig::default(),
        }
    }
}

impl LoopConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        if self.max_hypotheses_per_problem == 0 {
            return Err(anyhow!("max_hypotheses_per_problem must be > 0"));
        }
        if self.max_fix_attempts_per_problem == 0 {
            return Err(anyhow!("max_fix_attempts_per_problem must be > 0"));
        }
        if self.max_fixes == 0 {
            return Err(anyhow!("max_fixes must be > 0"));
        }
        if self.command_timeout_ms == 0 {
            return Err(anyhow!("command_timeout_ms must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        for (name, value) in [
            ("supported_threshold", self.supported_threshold),
            ("refuted_threshold", self.refuted_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{name} must be within [0, 1]"));
            }
        }
        if self.refuted_threshold > self.supported_threshold {
            return Err(anyhow!(
                "refuted_threshold must not exceed supported_threshold"
            ));
        }
        let verification = &self.verification;
        for (name, value) in [
            (
                "verification.full_suite_command",
                &verification.full_suite_command,
            ),
            (
                "verification.type_check_command",
                &verification.type_check_command,
            ),
            (
                "verification.test_file_command",
                &verification.test_file_command,
            ),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow!("{name} must be non-empty"));
            }
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn process_limits(&self) -> ProcessLimits {
        ProcessLimits {
            timeout: self.command_timeout(),
            output_limit_bytes: self.output_limit_bytes,
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `LoopConfig::default()`.
pub fn load_config(path: &Path) -> Result<LoopConfig> {
    if !path.exists() {
        let cfg = LoopConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: LoopConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &LoopConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, LoopConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested/config.toml");
        let cfg = LoopConfig {
            max_iterations: 4,
            ..LoopConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "max_fixes = 2\n[verification]\ntype_check_command = \"tsc --noEmit\"\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_fixes, 2);
        assert_eq!(cfg.max_iterations, 10);
        assert_eq!(cfg.verification.type_check_command, "tsc --noEmit");
        assert_eq!(cfg.verification.full_suite_command, "cargo test");
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let cfg = LoopConfig {
            supported_threshold: 0.2,
            refuted_threshold: 0.4,
            ..LoopConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("refuted_threshold"));
    }

    #[test]
    fn rejects_empty_commands() {
        let mut cfg = LoopConfig::default();
        cfg.verification.full_suite_command = "  ".to_string();
        assert!(cfg.validate().is_err());
    }
}
