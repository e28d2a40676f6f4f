//! Problem detection: raw check results in, typed problems out.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::agents::{Agent, AgentDescriptor, AgentType, Lifecycle, QualityTier, SharedRunner};
use crate::core::ids::IdSequence;
use crate::core::signals::{
    AdversarialProbe, ConsistencyCheck, PerformanceExperiment, ProblemDetectionInput,
    RegressionCheck, TestFailureCheck,
};
use crate::core::types::{Problem, ProblemType, Severity};
use crate::io::runner::ExecOptions;

const MAX_STDERR_LINES: usize = 20;
const MAX_STDOUT_LINES: usize = 10;
const CRASH_MARKERS: &[&str] = &[
    "segmentation fault",
    "sigsegv",
    "sigabrt",
    "core dumped",
    "stack overflow",
    "out of memory",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub total: usize,
    pub by_type: BTreeMap<ProblemType, usize>,
    pub by_severity: BTreeMap<Severity, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub problems: Vec<Problem>,
    pub summary: DetectionSummary,
}

/// Turns five kinds of raw signals into [`Problem`]s.
///
/// Every classifier is pure except [`ProblemDetector::test_failure`], which
/// runs the check's command when no exit code was recorded.
#[derive(Debug)]
pub struct ProblemDetector {
    runner: SharedRunner,
    timeout: Duration,
    ids: IdSequence,
    lifecycle: Lifecycle,
}

impl ProblemDetector {
    pub fn new(runner: SharedRunner) -> Self {
        Self {
            runner,
            timeout: Duration::from_secs(60),
            ids: IdSequence::new(),
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

    fn next_id(&self) -> String {
        format!("PROB-{}", self.ids.next())
    }

    /// Merge all five categories, in input order, without deduplication.
    #[instrument(skip_all, fields(
        test_runs = input.test_runs.len(),
        regressions = input.regressions.len(),
        adversarial = input.adversarial.len(),
        performance = input.performance.len(),
        consistency = input.consistency.len(),
    ))]
    pub fn identify_problems(&self, input: &ProblemDetectionInput) -> DetectionReport {
        let mut problems = self.test_failures(&input.test_runs);
        problems.extend(
            input
                .regressions
                .iter()
                .filter_map(|check| self.regression_check(check)),
        );
        problems.extend(
            input
                .adversarial
                .iter()
                .filter_map(|probe| self.adversarial_probe(probe)),
        );
        problems.extend(
            input
                .performance
                .iter()
                .filter_map(|experiment| self.performance_gap(experiment)),
        );
        problems.extend(
            input
                .consistency
                .iter()
                .filter_map(|check| self.consistency_violation(check)),
        );

        let summary = summarize(&problems);
        info!(total = summary.total, "problems identified");
        DetectionReport { problems, summary }
    }

    pub fn test_failures(&self, checks: &[TestFailureCheck]) -> Vec<Problem> {
        checks
            .iter()
            .filter_map(|check| self.test_failure(check))
            .collect()
    }

    /// A non-zero exit code is a `test_failure`; zero is not a problem.
    pub fn test_failure(&self, check: &TestFailureCheck) -> Option<Problem> {
        let name = test_label(check);
        let (exit_code, stdout, stderr, reproducible) = match check.exit_code {
            Some(code) => (
                code,
                check.stdout.clone().unwrap_or_default(),
                check.stderr.clone().unwrap_or_default(),
                true,
            ),
            None => {
                let Some(command) = check.command.as_deref() else {
                    debug!(test = %name, "check has neither exit code nor command, skipping");
                    return None;
                };
                let Some(runner) = self.runner.as_ref() else {
                    debug!(test = %name, "no command runner, skipping unexecuted check");
                    return None;
                };
                match runner.execute(command, &ExecOptions::with_timeout(self.timeout)) {
                    Ok(result) => (result.exit_code, result.stdout, result.stderr, true),
                    Err(err) => {
                        warn!(test = %name, err = %err, "test command could not be executed");
                        (-1, String::new(), format!("execution error: {err:#}"), false)
                    }
                }
            }
        };

        if exit_code == 0 {
            return None;
        }

        let mut evidence = Vec::new();
        if let Some(command) = &check.command {
            evidence.push(format!("command: {command}"));
        }
        if let Some(file) = &check.file {
            evidence.push(format!("file: {file}"));
        }
        evidence.push(format!("exit code: {exit_code}"));
        evidence.extend(
            non_empty_lines(&stderr)
                .take(MAX_STDERR_LINES)
                .map(|line| format!("stderr: {line}")),
        );
        let stdout_lines: Vec<&str> = non_empty_lines(&stdout).collect();
        let skip = stdout_lines.len().saturating_sub(MAX_STDOUT_LINES);
        evidence.extend(
            stdout_lines[skip..]
                .iter()
                .map(|line| format!("stdout: {line}")),
        );

        let combined = format!("{stdout}\n{stderr}").to_lowercase();
        let crashed = exit_code >= 128 || CRASH_MARKERS.iter().any(|m| combined.contains(m));

        Some(Problem {
            id: self.next_id(),
            problem_type: ProblemType::TestFailure,
            description: format!("Test failed: {name}"),
            evidence,
            severity: if crashed {
                Severity::Critical
            } else {
                Severity::High
            },
            reproducible: reproducible && (check.command.is_some() || check.file.is_some()),
            minimal_reproduction: check.command.clone().or_else(|| check.file.clone()),
        })
    }

    /// Raised only when `expected != actual`.
    pub fn regression_check(&self, check: &RegressionCheck) -> Option<Problem> {
        if check.expected == check.actual {
            return None;
        }
        let mut evidence = Vec::new();
        if let Some(input) = &check.input {
            evidence.push(format!("input: {input}"));
        }
        if let Some(version) = &check.baseline_version {
            evidence.push(format!("baseline version: {version}"));
        }
        evidence.push(format!("expected: {}", check.expected));
        evidence.push(format!("actual: {}", check.actual));

        Some(Problem {
            id: self.next_id(),
            problem_type: ProblemType::Regression,
            description: format!("Regression in {}: output no longer matches baseline", check.name),
            evidence,
            severity: Severity::High,
            reproducible: true,
            minimal_reproduction: Some(check.input.clone().unwrap_or_else(|| check.name.clone())),
        })
    }

    /// Raised only when `expected != actual`; safety probes are critical.
    pub fn adversarial_probe(&self, probe: &AdversarialProbe) -> Option<Problem> {
        if probe.expected == probe.actual {
            return None;
        }
        let safety = probe
            .category
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case("safety"));
        let mut evidence = vec![format!("query: {}", probe.query)];
        if let Some(category) = &probe.category {
            evidence.push(format!("category: {category}"));
        }
        evidence.push(format!("expected: {}", probe.expected));
        evidence.push(format!("actual: {}", probe.actual));

        Some(Problem {
            id: self.next_id(),
            problem_type: ProblemType::Hallucination,
            description: format!("Hallucinated answer for probe {}", probe.name),
            evidence,
            severity: if safety {
                Severity::Critical
            } else {
                Severity::High
            },
            reproducible: true,
            minimal_reproduction: Some(probe.query.clone()),
        })
    }

    /// Raised when `treatment < control + min_improvement`.
    pub fn performance_gap(&self, experiment: &PerformanceExperiment) -> Option<Problem> {
        let required = experiment.control_score + experiment.min_improvement;
        if experiment.treatment_score >= required {
            return None;
        }
        let metric = experiment.metric.as_deref().unwrap_or("score");
        let shortfall = required - experiment.treatment_score;
        let regressed = experiment.treatment_score < experiment.control_score;

        Some(Problem {
            id: self.next_id(),
            problem_type: ProblemType::PerformanceGap,
            description: format!(
                "Performance gap in {}: treatment {metric} {} below required {}",
                experiment.name, experiment.treatment_score, required
            ),
            evidence: vec![
                format!("control score: {}", experiment.control_score),
                format!("treatment score: {}", experiment.treatment_score),
                format!("required improvement: {}", experiment.min_improvement),
                format!("shortfall: {shortfall}"),
            ],
            severity: if regressed {
                Severity::High
            } else {
                Severity::Medium
            },
            reproducible: true,
            minimal_reproduction: Some(experiment.name.clone()),
        })
    }

    /// Raised when equivalent variants received more than one distinct answer.
    pub fn consistency_violation(&self, check: &ConsistencyCheck) -> Option<Problem> {
        let mut distinct: Vec<&str> = Vec::new();
        for answer in &check.answers {
            let answer = answer.trim();
            if !distinct.contains(&answer) {
                distinct.push(answer);
            }
        }
        if distinct.len() <= 1 {
            return None;
        }

        let mut evidence: Vec<String> = check
            .answers
            .iter()
            .enumerate()
            .map(|(i, answer)| {
                let variant = check
                    .variants
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("variant {}", i + 1));
                format!("variant: {variant} => answer: {}", answer.trim())
            })
            .collect();
        evidence.push(format!("distinct answers: {}", distinct.len()));

        let all_distinct = distinct.len() == check.answers.len() && distinct.len() >= 3;
        Some(Problem {
            id: self.next_id(),
            problem_type: ProblemType::Inconsistency,
            description: format!(
                "Inconsistent answers for {}: {} distinct answers across {} variants",
                check.name,
                distinct.len(),
                check.answers.len()
            ),
            evidence,
            severity: if all_distinct {
                Severity::High
            } else {
                Severity::Medium
            },
            reproducible: false,
            minimal_reproduction: check.variants.first().cloned(),
        })
    }
}

impl Agent for ProblemDetector {
    fn descriptor(&self) -> AgentDescriptor {
        AgentDescriptor::new(
            AgentType::ProblemDetector,
            "Problem Detector",
            &[
                "test_failure_detection",
                "regression_detection",
                "hallucination_detection",
                "performance_gap_detection",
                "inconsistency_detection",
            ],
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

fn test_label(check: &TestFailureCheck) -> String {
    if !check.test_name.trim().is_empty() {
        return check.test_name.clone();
    }
    check
        .command
        .clone()
        .or_else(|| check.file.clone())
        .unwrap_or_else(|| "unnamed test".to_string())
}

fn non_empty_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim_end).filter(|l| !l.trim().is_empty())
}

fn summarize(problems: &[Problem]) -> DetectionSummary {
    let mut summary = DetectionSummary {
        total: problems.len(),
        ..DetectionSummary::default()
    };
    for problem in problems {
        *summary.by_type.entry(problem.problem_type).or_default() += 1;
        *summary.by_severity.entry(problem.severity).or_default() += 1;
    }
    summary
}
