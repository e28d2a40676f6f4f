//! Command execution seam shared by every agent that runs real commands.
//!
//! The [`CommandRunner`] trait decouples agents from process spawning. Tests
//! use scripted runners that return predetermined results.

use std::fmt;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::core::types::CommandResult;
use crate::io::process::{ProcessLimits, run_with_deadline};

/// Per-call overrides for a command execution.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Working directory; the runner's default when `None`.
    pub cwd: Option<PathBuf>,
    /// Deadline; the runner's default when `None`.
    pub timeout: Option<Duration>,
}

impl ExecOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cwd: None,
            timeout: Some(timeout),
        }
    }
}

/// Executes one shell command.
///
/// Implementations return `Err` only when the command could not be executed
/// at all; a command that runs and fails is an `Ok` with a non-zero exit code.
/// A timed-out command must resolve to a non-zero exit code.
pub trait CommandRunner: Send + Sync + fmt::Debug {
    fn execute(&self, command: &str, options: &ExecOptions) -> Result<CommandResult>;
}

/// Runs commands through `sh -c` with a deadline.
#[derive(Debug, Clone)]
pub struct ShellCommandRunner {
    pub default_cwd: Option<PathBuf>,
    pub limits: ProcessLimits,
}

impl ShellCommandRunner {
    pub fn new(limits: ProcessLimits) -> Self {
        Self {
            default_cwd: None,
            limits,
        }
    }

    pub fn in_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.default_cwd = Some(cwd.into());
        self
    }
}

impl Default for ShellCommandRunner {
    fn default() -> Self {
        Self::new(ProcessLimits::default())
    }
}

impl CommandRunner for ShellCommandRunner {
    #[instrument(skip_all, fields(command = %command))]
    fn execute(&self, command: &str, options: &ExecOptions) -> Result<CommandResult> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        if let Some(cwd) = options.cwd.as_ref().or(self.default_cwd.as_ref()) {
            cmd.current_dir(cwd);
        }
        let limits = ProcessLimits {
            timeout: options.timeout.unwrap_or(self.limits.timeout),
            ..self.limits
        };

        let output =
            run_with_deadline(cmd, limits).with_context(|| format!("execute `{command}`"))?;
        let result = CommandResult {
            command: command.to_string(),
            exit_code: output.exit_code(),
            stdout: output.stdout_text(),
            stderr: output.stderr_text(),
            duration_ms: output.elapsed.as_millis() as u64,
        };
        debug!(exit_code = result.exit_code, duration_ms = result.duration_ms, "command executed");
        Ok(result)
    }
}
