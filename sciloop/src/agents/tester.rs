//! Hypothesis testing: one scoring strategy per test type.

use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::agents::{Agent, AgentDescriptor, AgentType, Lifecycle, QualityTier, SharedRunner};
use crate::core::keywords::{
    categories_for, has_related_keywords, matches_expected, significant_words, truncate_chars,
};
use crate::core::types::{
    EvidenceItem, Hypothesis, HypothesisTestResult, Problem, Recommendation, TestType, Verdict,
};
use crate::io::runner::ExecOptions;

const MATCHED_OUTPUT_SCORE: f64 = 0.8;
const FAILED_WITHOUT_MATCH_SCORE: f64 = 0.4;
const PASSED_WITHOUT_MATCH_SCORE: f64 = 0.2;
const PAIR_SIGNAL: f64 = 0.5;
const UNREPRODUCIBLE_PENALTY: f64 = 0.8;

/// Raw result of one strategy before likelihood weighting.
#[derive(Debug, Default)]
struct Assessment {
    evidence: Vec<EvidenceItem>,
    score: f64,
    was_testable: bool,
}

#[derive(Debug)]
pub struct HypothesisTester {
    runner: SharedRunner,
    supported_threshold: f64,
    refuted_threshold: f64,
    timeout: Duration,
    lifecycle: Lifecycle,
}

impl HypothesisTester {
    pub fn new(runner: SharedRunner) -> Self {
        Self {
            runner,
            supported_threshold: 0.5,
            refuted_threshold: 0.3,
            timeout: Duration::from_secs(60),
            lifecycle: Lifecycle::default(),
        }
    }

    pub fn with_thresholds(mut self, supported: f64, refuted: f64) -> Self {
        self.supported_threshold = supported;
        self.refuted_threshold = refuted;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn set_runner(&mut self, runner: SharedRunner) {
        self.runner = runner;
    }

    #[instrument(skip_all, fields(problem = %problem.id, hypothesis = %hypothesis.id))]
    pub fn test_hypothesis(&self, problem: &Problem, hypothesis: &Hypothesis) -> HypothesisTestResult {
        let assessment = match hypothesis.test.test_type {
            TestType::CodeInspection => inspect_code(problem, hypothesis),
            TestType::TestRun => self.run_test(hypothesis),
            TestType::LogAnalysis => analyze_logs(problem, hypothesis),
            TestType::Behavioral => analyze_behavior(problem, hypothesis),
            TestType::Unknown => {
                debug!("unknown test type, no evidence collected");
                Assessment::default()
            }
        };

        let mut confidence = assessment.score + hypothesis.likelihood.boost();
        if !problem.reproducible {
            confidence *= UNREPRODUCIBLE_PENALTY;
        }
        let confidence = round3(confidence.clamp(0.0, 1.0));

        let verdict = if assessment.evidence.is_empty() || !assessment.was_testable {
            Verdict::Inconclusive
        } else if confidence >= self.supported_threshold {
            Verdict::Supported
        } else if confidence < self.refuted_threshold {
            Verdict::Refuted
        } else {
            Verdict::Inconclusive
        };

        debug!(?verdict, confidence, "hypothesis tested");
        HypothesisTestResult {
            hypothesis_id: hypothesis.id.clone(),
            verdict,
            evidence: assessment.evidence,
            confidence,
            recommendation: Recommendation::from(verdict),
        }
    }

    fn run_test(&self, hypothesis: &Hypothesis) -> Assessment {
        let Some(runner) = self.runner.as_ref() else {
            return Assessment {
                evidence: vec![EvidenceItem::new(
                    "test_run",
                    "no command runner configured",
                    "the test could not be executed",
                )],
                ..Assessment::default()
            };
        };
        let target = hypothesis.test.target.trim();
        if target.is_empty() {
            return Assessment {
                evidence: vec![EvidenceItem::new(
                    "test_run",
                    "no reproduction command available",
                    "the test could not be executed",
                )],
                ..Assessment::default()
            };
        }

        let result = match runner.execute(target, &ExecOptions::with_timeout(self.timeout)) {
            Ok(result) => result,
            Err(err) => {
                warn!(command = %target, err = %err, "hypothesis test command failed to execute");
                return Assessment {
                    evidence: vec![EvidenceItem::new(
                        "test_run",
                        format!("execution error: {err:#}"),
                        "the test could not be executed",
                    )],
                    ..Assessment::default()
                };
            }
        };

        let output = result.combined_output();
        let expected = &hypothesis.test.expected;
        let (score, implication) = if matches_expected(&output, expected) {
            (MATCHED_OUTPUT_SCORE, "output matches the predicted failure")
        } else if !result.succeeded() {
            (
                FAILED_WITHOUT_MATCH_SCORE,
                "the test fails but not in the predicted way",
            )
        } else {
            (PASSED_WITHOUT_MATCH_SCORE, "the test passes; prediction not observed")
        };
        let mut evidence = vec![EvidenceItem::new(
            "test_run",
            format!("`{}` exited with code {}", result.command, result.exit_code),
            implication,
        )];
        let excerpt = truncate_chars(output.trim(), 200);
        if !excerpt.is_empty() {
            evidence.push(EvidenceItem::new(
                "output",
                excerpt,
                format!("searched for \"{expected}\""),
            ));
        }
        Assessment {
            evidence,
            score,
            was_testable: true,
        }
    }
}

impl Agent for HypothesisTester {
    fn descriptor(&self) -> AgentDescriptor {
        AgentDescriptor::new(
            AgentType::HypothesisTester,
            "Hypothesis Tester",
            &["code_inspection", "test_run", "log_analysis", "behavioral"],
            QualityTier::Enhanced,
        )
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }
}

/// Static inspection never counts as a real test; the score is reported only.
fn inspect_code(problem: &Problem, hypothesis: &Hypothesis) -> Assessment {
    let expected = &hypothesis.test.expected;
    let expected_words = significant_words(expected);
    let categories = categories_for(expected);
    let mut evidence = Vec::new();
    let mut hits = 0usize;
    for line in &problem.evidence {
        let words = significant_words(line);
        let shared = expected_words.iter().filter(|w| words.contains(w)).count();
        let related = has_related_keywords(line, expected);
        if shared > 0 || related {
            hits += 1;
            evidence.push(EvidenceItem::new(
                "code_inspection",
                line.clone(),
                format!("consistent with \"{expected}\""),
            ));
        }
    }
    let considered = problem.evidence.len().max(1);
    let score = if categories.is_empty() && expected_words.is_empty() {
        0.0
    } else {
        hits as f64 / considered as f64
    };
    evidence.push(EvidenceItem::new(
        "code_inspection",
        format!("target {} requires manual inspection", hypothesis.test.target),
        "static inspection cannot confirm the hypothesis",
    ));
    Assessment {
        evidence,
        score,
        was_testable: false,
    }
}

/// Share of evidence lines plus the description that match the expectation.
fn keyword_ratio(problem: &Problem, expected: &str) -> (f64, Vec<EvidenceItem>) {
    let lines = problem
        .evidence
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(problem.description.as_str()));
    let mut total = 0usize;
    let mut evidence = Vec::new();
    for line in lines {
        total += 1;
        if matches_expected(line, expected) {
            evidence.push(EvidenceItem::new(
                "log_analysis",
                line.to_string(),
                format!("matches \"{expected}\""),
            ));
        }
    }
    let ratio = if total == 0 {
        0.0
    } else {
        evidence.len() as f64 / total as f64
    };
    (ratio, evidence)
}

fn analyze_logs(problem: &Problem, hypothesis: &Hypothesis) -> Assessment {
    let (score, evidence) = keyword_ratio(problem, &hypothesis.test.expected);
    Assessment {
        evidence,
        score,
        was_testable: true,
    }
}

fn analyze_behavior(problem: &Problem, hypothesis: &Hypothesis) -> Assessment {
    // Detector evidence is often prefixed (`stderr: expected: ...`).
    let expected_line = problem
        .evidence
        .iter()
        .find(|line| line.contains("expected:"));
    let actual_line = problem
        .evidence
        .iter()
        .find(|line| line.contains("actual:"));

    let mut score = 0.0;
    let mut evidence = Vec::new();
    if let (Some(expected), Some(actual)) = (expected_line, actual_line) {
        score += PAIR_SIGNAL;
        evidence.push(EvidenceItem::new(
            "behavioral",
            format!("{expected} / {actual}"),
            "observed behavior diverges from the expectation",
        ));
    }
    let (ratio, keyword_evidence) = keyword_ratio(problem, &hypothesis.test.expected);
    score += ratio;
    evidence.extend(keyword_evidence);
    Assessment {
        evidence,
        score: score.min(1.0),
        was_testable: true,
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{HypothesisTest, Likelihood, ProblemType};
    use crate::test_support::{ScriptedCommandRunner, problem, scripted_runner};

    fn hypothesis(test_type: TestType, target: &str, expected: &str, likelihood: Likelihood) -> Hypothesis {
        Hypothesis {
            id: "HYP-1-A".to_string(),
            statement: "statement".to_string(),
            rationale: "rationale".to_string(),
            prediction: "prediction".to_string(),
            test: HypothesisTest {
                test_type,
                target: target.to_string(),
                expected: expected.to_string(),
            },
            likelihood,
        }
    }

    #[test]
    fn code_inspection_is_always_inconclusive() {
        let mut failing = problem("PROB-1", ProblemType::TestFailure);
        failing.evidence = vec!["stderr: type mismatch error in src/lib.rs".to_string()];
        let tester = HypothesisTester::new(None);
        let result = tester.test_hypothesis(
            &failing,
            &hypothesis(TestType::CodeInspection, "src/lib.rs", "type mismatch error", Likelihood::High),
        );
        assert_eq!(result.verdict, Verdict::Inconclusive);
        assert_eq!(result.recommendation, Recommendation::NeedMoreEvidence);
        assert!(result.confidence >= 0.5);
    }

    #[test]
    fn test_run_without_runner_is_inconclusive() {
        let tester = HypothesisTester::new(None);
        let result = tester.test_hypothesis(
            &problem("PROB-1", ProblemType::TestFailure),
            &hypothesis(TestType::TestRun, "cargo test", "assertion failed", Likelihood::High),
        );
        assert_eq!(result.verdict, Verdict::Inconclusive);
    }

    #[test]
    fn test_run_with_empty_target_is_inconclusive() {
        let runner = ScriptedCommandRunner::new();
        let tester = HypothesisTester::new(scripted_runner(runner));
        let result = tester.test_hypothesis(
            &problem("PROB-1", ProblemType::TestFailure),
            &hypothesis(TestType::TestRun, "  ", "assertion failed", Likelihood::High),
        );
        assert_eq!(result.verdict, Verdict::Inconclusive);
    }

    #[test]
    fn matching_output_supports_hypothesis() {
        let runner = ScriptedCommandRunner::new().respond(
            "cargo test parser",
            101,
            "",
            "assertion failed: left == right",
        );
        let tester = HypothesisTester::new(scripted_runner(runner));
        let result = tester.test_hypothesis(
            &problem("PROB-1", ProblemType::TestFailure),
            &hypothesis(TestType::TestRun, "cargo test parser", "assertion failed", Likelihood::High),
        );
        assert_eq!(result.verdict, Verdict::Supported);
        assert_eq!(result.confidence, 0.95);
        assert_eq!(result.recommendation, Recommendation::ProceedToFix);
    }

    #[test]
    fn passing_test_refutes_low_likelihood_hypothesis() {
        let runner = ScriptedCommandRunner::new();
        let tester = HypothesisTester::new(scripted_runner(runner));
        let result = tester.test_hypothesis(
            &problem("PROB-1", ProblemType::TestFailure),
            &hypothesis(TestType::TestRun, "cargo test parser", "zebra", Likelihood::Low),
        );
        assert_eq!(result.confidence, 0.05);
        assert_eq!(result.verdict, Verdict::Refuted);
        assert_eq!(result.recommendation, Recommendation::TestAnotherHypothesis);
    }

    #[test]
    fn failing_test_without_predicted_output_still_supports_likely_hypothesis() {
        let runner = ScriptedCommandRunner::new().respond("cargo test parser", 1, "", "boom");
        let tester = HypothesisTester::new(scripted_runner(runner));
        let result = tester.test_hypothesis(
            &problem("PROB-1", ProblemType::TestFailure),
            &hypothesis(TestType::TestRun, "cargo test parser", "zebra", Likelihood::High),
        );
        assert_eq!(result.confidence, 0.55);
        assert_eq!(result.verdict, Verdict::Supported);
        assert_eq!(
            result.evidence[0].implication,
            "the test fails but not in the predicted way"
        );
    }

    #[test]
    fn execution_error_is_not_testable() {
        let runner = ScriptedCommandRunner::new().fail_on("cargo", "spawn failed");
        let tester = HypothesisTester::new(scripted_runner(runner));
        let result = tester.test_hypothesis(
            &problem("PROB-1", ProblemType::TestFailure),
            &hypothesis(TestType::TestRun, "cargo test", "assertion failed", Likelihood::High),
        );
        assert_eq!(result.verdict, Verdict::Inconclusive);
        assert_eq!(result.confidence, 0.15);
    }

    #[test]
    fn behavioral_pairs_add_strong_signal() {
        let mut regression = problem("PROB-1", ProblemType::Regression);
        regression.description = "Regression in capital".to_string();
        regression.evidence = vec!["expected: Paris".to_string(), "actual: Lyon".to_string()];
        let tester = HypothesisTester::new(None);
        let result = tester.test_hypothesis(
            &regression,
            &hypothesis(TestType::Behavioral, "problem evidence", "zebra", Likelihood::Medium),
        );
        assert_eq!(result.confidence, 0.5);
        assert_eq!(result.verdict, Verdict::Supported);
    }

    #[test]
    fn behavioral_pairs_are_found_inside_prefixed_evidence() {
        let mut failing = problem("PROB-1", ProblemType::TestFailure);
        failing.evidence = vec![
            "exit code: 101".to_string(),
            "stderr: expected: 4".to_string(),
            "stderr: actual: 5".to_string(),
        ];
        let tester = HypothesisTester::new(None);
        let result = tester.test_hypothesis(
            &failing,
            &hypothesis(TestType::Behavioral, "problem evidence", "zebra", Likelihood::Medium),
        );
        assert_eq!(result.confidence, 0.5);
        assert_eq!(result.verdict, Verdict::Supported);
        assert_eq!(result.evidence[0].finding, "stderr: expected: 4 / stderr: actual: 5");
    }

    #[test]
    fn log_analysis_ratio_and_reproducibility_penalty() {
        let mut flaky = problem("PROB-1", ProblemType::Inconsistency);
        flaky.reproducible = false;
        flaky.description = "answers were inconsistent".to_string();
        flaky.evidence = vec!["unrelated".to_string()];
        let tester = HypothesisTester::new(None);
        let result = tester.test_hypothesis(
            &flaky,
            &hypothesis(TestType::LogAnalysis, "problem evidence", "inconsistent", Likelihood::Medium),
        );
        assert_eq!(result.confidence, 0.4);
        assert_eq!(result.verdict, Verdict::Inconclusive);
    }

    #[test]
    fn unknown_test_type_has_no_evidence() {
        let tester = HypothesisTester::new(None);
        let result = tester.test_hypothesis(
            &problem("PROB-1", ProblemType::TestFailure),
            &hypothesis(TestType::Unknown, "x", "error", Likelihood::High),
        );
        assert!(result.evidence.is_empty());
        assert_eq!(result.verdict, Verdict::Inconclusive);
    }
}
