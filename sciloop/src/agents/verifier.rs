//! Binary fix verification: three checks, one reward.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::agents::{Agent, AgentDescriptor, AgentType, Lifecycle, QualityTier, SharedRunner};
use crate::core::keywords::{extract_test_paths, looks_like_test_invocation, truncate_chars};
use crate::core::types::{
    CommandResult, ExecutionLogEntry, Fix, Problem, Verification, VerificationResult,
};
use crate::io::config::VerificationConfig;
use crate::io::runner::ExecOptions;

const STDERR_NOTE_CHARS: usize = 200;

#[derive(Debug)]
pub struct FixVerifier {
    runner: SharedRunner,
    config: VerificationConfig,
    timeout: Duration,
    lifecycle: Lifecycle,
}

impl FixVerifier {
    pub fn new(runner: SharedRunner, config: VerificationConfig) -> Self {
        Self {
            runner,
            config,
            timeout: Duration::from_secs(60),
            lifecycle: Lifecycle::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn set_runner(&mut self, runner: SharedRunner) {
        self.runner = runner;
    }

    /// Run the original test, the full suite, and the type check, in that
    /// order and without short-circuiting. Reward is 1 only if all three pass.
    #[instrument(skip_all, fields(problem = %problem.id, fix = %fix.id))]
    pub fn verify_fix(
        &self,
        problem: &Problem,
        fix: &Fix,
        original_test: Option<&str>,
    ) -> VerificationResult {
        let Some(runner) = self.runner.as_ref() else {
            warn!("no command runner configured, rejecting fix without checks");
            return VerificationResult::rejected_without_checks(
                &fix.id,
                "no command runner configured; verification checks were not run",
            );
        };

        let original_command = self.original_test_command(problem, original_test);
        let options = ExecOptions {
            cwd: self.config.workdir.as_ref().map(PathBuf::from),
            timeout: Some(self.timeout),
        };
        let steps = [
            ("original_test", original_command),
            ("full_suite", self.config.full_suite_command.clone()),
            ("type_check", self.config.type_check_command.clone()),
        ];

        let mut outcomes = Vec::with_capacity(steps.len());
        for (name, command) in steps {
            let result = runner.execute(&command, &options).unwrap_or_else(|err| {
                warn!(check = name, command = %command, err = %err, "verification command failed to execute");
                CommandResult {
                    command: command.clone(),
                    exit_code: -1,
                    stdout: String::new(),
                    stderr: format!("execution error: {err:#}"),
                    duration_ms: 0,
                }
            });
            outcomes.push((name, result));
        }

        let verification = Verification {
            original_test_passes: outcomes[0].1.succeeded(),
            no_regressions: outcomes[1].1.succeeded(),
            types_valid: outcomes[2].1.succeeded(),
        };
        let accepted = verification.all_passed();

        let mut notes = Vec::new();
        for (name, result) in &outcomes {
            if result.succeeded() {
                notes.push(format!("{name}: passed"));
            } else {
                notes.push(format!("{name}: failed (exit code {})", result.exit_code));
            }
        }
        if !accepted {
            for (name, result) in &outcomes {
                let stderr = result.stderr.trim();
                if !result.succeeded() && !stderr.is_empty() {
                    notes.push(format!(
                        "{name} stderr: {}",
                        truncate_chars(stderr, STDERR_NOTE_CHARS)
                    ));
                }
            }
        }

        let execution_log: Vec<ExecutionLogEntry> = outcomes
            .into_iter()
            .map(|(_, result)| ExecutionLogEntry::from(result))
            .collect();
        let result = VerificationResult::from_checks(&fix.id, verification, notes, execution_log);
        info!(reward = result.reward, "fix verified");
        result
    }

    fn original_test_command(&self, problem: &Problem, explicit: Option<&str>) -> String {
        if let Some(command) = explicit.map(str::trim).filter(|c| !c.is_empty()) {
            return command.to_string();
        }
        if let Some(reproduction) = problem
            .minimal_reproduction
            .as_deref()
            .filter(|r| looks_like_test_invocation(r))
        {
            return reproduction.to_string();
        }
        let test_path = problem
            .minimal_reproduction
            .iter()
            .chain(problem.evidence.iter())
            .chain(std::iter::once(&problem.description))
            .find_map(|text| extract_test_paths(text).into_iter().next());
        match test_path {
            Some(path) => render_test_file_command(&self.config.test_file_command, &path),
            None => self.config.full_suite_command.clone(),
        }
    }
}

impl Agent for FixVerifier {
    fn descriptor(&self) -> AgentDescriptor {
        AgentDescriptor::new(
            AgentType::FixVerifier,
            "Fix Verifier",
            &["original_test_check", "regression_check", "type_check"],
            QualityTier::Full,
        )
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }
}

fn render_test_file_command(template: &str, path: &str) -> String {
    let stem = Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    template.replace("{path}", path).replace("{stem}", &stem)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::types::{FixVerdict, ProblemType};
    use crate::test_support::{ScriptedCommandRunner, fix, problem, scripted_runner, shared};

    fn verifier(runner: SharedRunner) -> FixVerifier {
        FixVerifier::new(runner, VerificationConfig::default())
    }

    #[test]
    fn no_runner_rejects_without_checks() {
        let result = verifier(None).verify_fix(
            &problem("PROB-1", ProblemType::TestFailure),
            &fix("FIX-1", "PROB-1", "HYP-1-A"),
            None,
        );
        assert_eq!(result.reward, 0);
        assert_eq!(result.verdict, FixVerdict::FixRejected);
        assert!(result.execution_log.is_empty());
        assert!(result.notes.iter().any(|n| n.contains("runner")));
    }

    #[test]
    fn all_checks_passing_accepts() {
        let result = verifier(scripted_runner(ScriptedCommandRunner::new())).verify_fix(
            &problem("PROB-1", ProblemType::TestFailure),
            &fix("FIX-1", "PROB-1", "HYP-1-A"),
            Some("cargo test parser"),
        );
        assert_eq!(result.reward, 1);
        assert_eq!(result.verdict, FixVerdict::FixAccepted);
        assert_eq!(result.execution_log.len(), 3);
        assert_eq!(result.execution_log[0].command, "cargo test parser");
        assert_eq!(result.execution_log[1].command, "cargo test");
        assert_eq!(result.execution_log[2].command, "cargo check --all-targets");
    }

    #[test]
    fn failing_original_test_rejects_without_partial_credit() {
        let runner = ScriptedCommandRunner::new().respond(
            "cargo test parser",
            1,
            "",
            "assertion failed",
        );
        let result = verifier(scripted_runner(runner)).verify_fix(
            &problem("PROB-1", ProblemType::TestFailure),
            &fix("FIX-1", "PROB-1", "HYP-1-A"),
            Some("cargo test parser"),
        );
        assert_eq!(result.reward, 0);
        assert_eq!(result.verdict, FixVerdict::FixRejected);
        assert!(!result.verification.original_test_passes);
        assert!(result.verification.no_regressions);
        assert!(result.verification.types_valid);
        assert!(result.notes.contains(&"original_test: failed (exit code 1)".to_string()));
        assert!(
            result
                .notes
                .contains(&"original_test stderr: assertion failed".to_string())
        );
    }

    #[test]
    fn every_step_runs_even_after_execution_errors() {
        let runner = Arc::new(ScriptedCommandRunner::new().fail_on("cargo", "spawn failed"));
        let result = verifier(shared(&runner)).verify_fix(
            &problem("PROB-1", ProblemType::TestFailure),
            &fix("FIX-1", "PROB-1", "HYP-1-A"),
            None,
        );
        assert_eq!(runner.calls().len(), 3);
        assert_eq!(result.execution_log.len(), 3);
        assert!(result.execution_log.iter().all(|entry| entry.exit_code == -1));
        assert_eq!(result.reward, 0);
    }

    #[test]
    fn original_test_resolution_order() {
        let verifier = verifier(None);
        let mut failing = problem("PROB-1", ProblemType::TestFailure);

        failing.minimal_reproduction = Some("cargo test lexer".to_string());
        assert_eq!(
            verifier.original_test_command(&failing, Some("just check")),
            "just check"
        );
        assert_eq!(verifier.original_test_command(&failing, None), "cargo test lexer");

        failing.minimal_reproduction = Some("tests/lexer_edge.rs".to_string());
        assert_eq!(
            verifier.original_test_command(&failing, None),
            "cargo test --test lexer_edge"
        );

        failing.minimal_reproduction = None;
        assert_eq!(verifier.original_test_command(&failing, None), "cargo test");
    }

    #[test]
    fn test_file_command_substitutes_path_and_stem() {
        assert_eq!(
            render_test_file_command("pytest {path} -k {stem}", "tests/test_x.py"),
            "pytest tests/test_x.py -k test_x"
        );
    }
}
