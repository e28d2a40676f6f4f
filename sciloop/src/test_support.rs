//! Test-only helpers: a scripted command runner and deterministic builders.

use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};

use crate::agents::SharedRunner;
use crate::core::types::{
    ChangeType, CommandResult, ExecutionLogEntry, FileChange, Fix, HypothesisTestResult, Problem,
    ProblemType, Recommendation, Severity, Verdict, Verification, VerificationResult,
};
use crate::io::runner::{CommandRunner, ExecOptions};

#[derive(Debug, Clone)]
enum Reply {
    Exit {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    Error(String),
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    reply: Reply,
    /// `None` means the rule never runs out.
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct ScriptState {
    rules: Vec<Rule>,
    calls: Vec<String>,
}

/// Command runner that answers from a script instead of spawning processes.
///
/// Rules match when the command contains the rule's pattern. The first rule
/// with uses left wins; unmatched commands exit with the default code and no
/// output.
#[derive(Debug)]
pub struct ScriptedCommandRunner {
    state: Mutex<ScriptState>,
    default_exit: i32,
}

impl ScriptedCommandRunner {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ScriptState::default()),
            default_exit: 0,
        }
    }

    /// Answer every matching command with this result.
    pub fn respond(self, pattern: &str, exit_code: i32, stdout: &str, stderr: &str) -> Self {
        self.push(pattern, exit(exit_code, stdout, stderr), None)
    }

    /// Answer only the first matching command with this result.
    pub fn respond_once(self, pattern: &str, exit_code: i32, stdout: &str, stderr: &str) -> Self {
        self.push(pattern, exit(exit_code, stdout, stderr), Some(1))
    }

    /// Fail to execute matching commands at all.
    pub fn fail_on(self, pattern: &str, message: &str) -> Self {
        self.push(pattern, Reply::Error(message.to_string()), None)
    }

    pub fn default_exit(mut self, exit_code: i32) -> Self {
        self.default_exit = exit_code;
        self
    }

    /// Commands seen so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    fn push(self, pattern: &str, reply: Reply, remaining: Option<usize>) -> Self {
        self.lock().rules.push(Rule {
            pattern: pattern.to_string(),
            reply,
            remaining,
        });
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ScriptedCommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for ScriptedCommandRunner {
    fn execute(&self, command: &str, _options: &ExecOptions) -> Result<CommandResult> {
        let mut state = self.lock();
        state.calls.push(command.to_string());

        let rule = state
            .rules
            .iter_mut()
            .find(|rule| command.contains(&rule.pattern) && rule.remaining != Some(0));
        let reply = match rule {
            Some(rule) => {
                if let Some(remaining) = rule.remaining.as_mut() {
                    *remaining -= 1;
                }
                rule.reply.clone()
            }
            None => exit(self.default_exit, "", ""),
        };

        match reply {
            Reply::Exit {
                exit_code,
                stdout,
                stderr,
            } => Ok(CommandResult {
                command: command.to_string(),
                exit_code,
                stdout,
                stderr,
                duration_ms: 1,
            }),
            Reply::Error(message) => Err(anyhow!("{message}")),
        }
    }
}

fn exit(exit_code: i32, stdout: &str, stderr: &str) -> Reply {
    Reply::Exit {
        exit_code,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    }
}

/// Hand a scripted runner to an agent.
pub fn scripted_runner(runner: ScriptedCommandRunner) -> SharedRunner {
    Some(Arc::new(runner))
}

/// Share a scripted runner while keeping a handle for `calls()`.
pub fn shared(runner: &Arc<ScriptedCommandRunner>) -> SharedRunner {
    let runner: Arc<dyn CommandRunner> = runner.clone();
    Some(runner)
}

/// A reproducible high-severity problem with no file paths or reproduction.
pub fn problem(id: &str, problem_type: ProblemType) -> Problem {
    Problem {
        id: id.to_string(),
        problem_type,
        description: format!("{} observed in {}", problem_type, id),
        evidence: vec![format!("signal: {}", problem_type)],
        severity: Severity::High,
        reproducible: true,
        minimal_reproduction: None,
    }
}

pub fn fix(id: &str, problem_id: &str, hypothesis_id: &str) -> Fix {
    Fix {
        id: id.to_string(),
        problem_id: problem_id.to_string(),
        hypothesis_id: hypothesis_id.to_string(),
        description: "Tighten the failing assertion".to_string(),
        changes: vec![FileChange {
            file_path: "src/lib.rs".to_string(),
            change_type: ChangeType::Modify,
            before: Some("assert!(a == b);".to_string()),
            after: Some("assert_eq!(a, b);".to_string()),
            description: "compare with assert_eq".to_string(),
        }],
        rationale: "assertion compares the wrong values".to_string(),
        prediction: "the failing test passes".to_string(),
    }
}

pub fn hypothesis_result(
    hypothesis_id: &str,
    verdict: Verdict,
    confidence: f64,
) -> HypothesisTestResult {
    HypothesisTestResult {
        hypothesis_id: hypothesis_id.to_string(),
        verdict,
        evidence: Vec::new(),
        confidence,
        recommendation: Recommendation::from(verdict),
    }
}

/// A verification result with one log entry per check.
pub fn verification(
    fix_id: &str,
    original_test_passes: bool,
    no_regressions: bool,
    types_valid: bool,
) -> VerificationResult {
    let entry = |command: &str, passed: bool| ExecutionLogEntry {
        command: command.to_string(),
        exit_code: if passed { 0 } else { 1 },
        stdout: None,
        stderr: None,
        duration_ms: 1,
    };
    VerificationResult::from_checks(
        fix_id,
        Verification {
            original_test_passes,
            no_regressions,
            types_valid,
        },
        Vec::new(),
        vec![
            entry("cargo test original", original_test_passes),
            entry("cargo test", no_regressions),
            entry("cargo check --all-targets", types_valid),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn respond_once_falls_through_to_later_rules() {
        let runner = ScriptedCommandRunner::new()
            .respond_once("cargo test a", 101, "", "boom")
            .respond("cargo test", 2, "", "");
        let options = ExecOptions::default();

        assert_eq!(runner.execute("cargo test a", &options).unwrap().exit_code, 101);
        assert_eq!(runner.execute("cargo test a", &options).unwrap().exit_code, 2);
        assert_eq!(runner.execute("cargo check", &options).unwrap().exit_code, 0);
        assert_eq!(runner.calls().len(), 3);
    }

    #[test]
    fn fail_on_returns_error_and_default_exit_applies() {
        let runner = ScriptedCommandRunner::new()
            .fail_on("spawn", "no such binary")
            .default_exit(7);
        let options = ExecOptions::default();

        let err = runner.execute("spawn it", &options).unwrap_err();
        assert!(err.to_string().contains("no such binary"));
        assert_eq!(runner.execute("other", &options).unwrap().exit_code, 7);
    }
}
