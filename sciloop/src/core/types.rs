//! Shared deterministic types for the debugging loop.
//!
//! These types are the contracts passed between agents. They carry no I/O and
//! serialize with stable `snake_case` names so loop artifacts diff cleanly.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Category of a detected problem. Drives every per-type template table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemType {
    TestFailure,
    Regression,
    Hallucination,
    PerformanceGap,
    Inconsistency,
}

impl ProblemType {
    pub const ALL: [ProblemType; 5] = [
        ProblemType::TestFailure,
        ProblemType::Regression,
        ProblemType::Hallucination,
        ProblemType::PerformanceGap,
        ProblemType::Inconsistency,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProblemType::TestFailure => "test_failure",
            ProblemType::Regression => "regression",
            ProblemType::Hallucination => "hallucination",
            ProblemType::PerformanceGap => "performance_gap",
            ProblemType::Inconsistency => "inconsistency",
        }
    }
}

impl fmt::Display for ProblemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

/// A typed failure signal. Immutable once produced by the detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub id: String,
    #[serde(rename = "type")]
    pub problem_type: ProblemType,
    pub description: String,
    pub evidence: Vec<String>,
    pub severity: Severity,
    pub reproducible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimal_reproduction: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Likelihood {
    High,
    Medium,
    Low,
}

impl Likelihood {
    /// Sort key: lower ranks first.
    pub fn rank(self) -> u8 {
        match self {
            Likelihood::High => 0,
            Likelihood::Medium => 1,
            Likelihood::Low => 2,
        }
    }

    /// Confidence adjustment applied by the hypothesis tester.
    pub fn boost(self) -> f64 {
        match self {
            Likelihood::High => 0.15,
            Likelihood::Medium => 0.0,
            Likelihood::Low => -0.15,
        }
    }
}

/// Strategy used to test a hypothesis.
///
/// Unrecognized strategy names deserialize as [`TestType::Unknown`], which the
/// tester treats as a zero-evidence test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    CodeInspection,
    TestRun,
    LogAnalysis,
    Behavioral,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HypothesisTest {
    #[serde(rename = "type")]
    pub test_type: TestType,
    pub target: String,
    pub expected: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub id: String,
    pub statement: String,
    pub rationale: String,
    pub prediction: String,
    pub test: HypothesisTest,
    pub likelihood: Likelihood,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Supported,
    Refuted,
    Inconclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    ProceedToFix,
    TestAnotherHypothesis,
    NeedMoreEvidence,
}

impl From<Verdict> for Recommendation {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Supported => Recommendation::ProceedToFix,
            Verdict::Refuted => Recommendation::TestAnotherHypothesis,
            Verdict::Inconclusive => Recommendation::NeedMoreEvidence,
        }
    }
}

/// One entry in a hypothesis test's evidence trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub finding: String,
    pub implication: String,
}

impl EvidenceItem {
    pub fn new(kind: &str, finding: impl Into<String>, implication: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            finding: finding.into(),
            implication: implication.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypothesisTestResult {
    pub hypothesis_id: String,
    pub verdict: Verdict,
    pub evidence: Vec<EvidenceItem>,
    pub confidence: f64,
    pub recommendation: Recommendation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Modify,
    Create,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub file_path: String,
    pub change_type: ChangeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fix {
    pub id: String,
    pub problem_id: String,
    pub hypothesis_id: String,
    pub description: String,
    pub changes: Vec<FileChange>,
    pub rationale: String,
    pub prediction: String,
}

/// The three binary checks behind every reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Verification {
    pub original_test_passes: bool,
    pub no_regressions: bool,
    pub types_valid: bool,
}

impl Verification {
    pub fn all_passed(&self) -> bool {
        self.original_test_passes && self.no_regressions && self.types_valid
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixVerdict {
    FixAccepted,
    FixRejected,
}

/// Raw outcome of one command execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout and stderr joined with a newline.
    pub fn combined_output(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub command: String,
    pub exit_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    pub duration_ms: u64,
}

impl From<CommandResult> for ExecutionLogEntry {
    fn from(result: CommandResult) -> Self {
        Self {
            command: result.command,
            exit_code: result.exit_code,
            stdout: (!result.stdout.is_empty()).then_some(result.stdout),
            stderr: (!result.stderr.is_empty()).then_some(result.stderr),
            duration_ms: result.duration_ms,
        }
    }
}

/// Binary RLVR outcome for one fix.
///
/// Construct through [`VerificationResult::from_checks`] or
/// [`VerificationResult::rejected_without_checks`] so `reward` and `verdict`
/// always agree with `verification`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub fix_id: String,
    pub verification: Verification,
    pub reward: u8,
    pub verdict: FixVerdict,
    pub notes: Vec<String>,
    pub execution_log: Vec<ExecutionLogEntry>,
}

impl VerificationResult {
    pub fn from_checks(
        fix_id: &str,
        verification: Verification,
        notes: Vec<String>,
        execution_log: Vec<ExecutionLogEntry>,
    ) -> Self {
        let accepted = verification.all_passed();
        Self {
            fix_id: fix_id.to_string(),
            verification,
            reward: u8::from(accepted),
            verdict: if accepted {
                FixVerdict::FixAccepted
            } else {
                FixVerdict::FixRejected
            },
            notes,
            execution_log,
        }
    }

    pub fn rejected_without_checks(fix_id: &str, note: impl Into<String>) -> Self {
        Self::from_checks(
            fix_id,
            Verification::default(),
            vec![note.into()],
            Vec::new(),
        )
    }

    pub fn accepted(&self) -> bool {
        self.verdict == FixVerdict::FixAccepted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestCategory {
    Prevention,
    RegressionGuard,
    Variant,
}

/// A generated benchmark test stub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkTest {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: TestCategory,
    pub code: String,
    pub target_file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageGap {
    pub description: String,
    pub affected_area: String,
    pub suggested_tests: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkEvolution {
    pub problem_id: String,
    pub fix_id: String,
    pub new_tests: Vec<BenchmarkTest>,
    pub regression_guards: Vec<BenchmarkTest>,
    pub variant_tests: Vec<BenchmarkTest>,
    pub coverage_gaps: Vec<CoverageGap>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    NoSupportedHypothesis,
    AllFixesFailed,
    RegressionUnavoidable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationRecommendation {
    HumanReview,
    Defer,
    Wontfix,
}

/// A problem the loop handed off instead of fixing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escalation {
    pub problem_id: String,
    pub iteration: u32,
    pub hypotheses_tried: Vec<String>,
    pub fixes_tried: Vec<String>,
    pub reason: EscalationReason,
    pub recommendation: EscalationRecommendation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reward_requires_every_check() {
        let partial = Verification {
            original_test_passes: true,
            no_regressions: true,
            types_valid: false,
        };
        let result = VerificationResult::from_checks("FIX-1", partial, Vec::new(), Vec::new());
        assert_eq!(result.reward, 0);
        assert_eq!(result.verdict, FixVerdict::FixRejected);

        let full = Verification {
            types_valid: true,
            ..partial
        };
        let result = VerificationResult::from_checks("FIX-1", full, Vec::new(), Vec::new());
        assert_eq!(result.reward, 1);
        assert!(result.accepted());
    }

    #[test]
    fn unknown_test_type_deserializes() {
        let test: HypothesisTest =
            serde_json::from_str(r#"{"type":"telepathy","target":"x","expected":"y"}"#)
                .expect("parse");
        assert_eq!(test.test_type, TestType::Unknown);
    }

    #[test]
    fn recommendation_follows_verdict() {
        assert_eq!(
            Recommendation::from(Verdict::Supported),
            Recommendation::ProceedToFix
        );
        assert_eq!(
            Recommendation::from(Verdict::Refuted),
            Recommendation::TestAnotherHypothesis
        );
        assert_eq!(
            Recommendation::from(Verdict::Inconclusive),
            Recommendation::NeedMoreEvidence
        );
    }

    #[test]
    fn log_entry_drops_empty_streams() {
        let entry = ExecutionLogEntry::from(CommandResult {
            command: "true".to_string(),
            exit_code: 0,
            stdout: String::new(),
            stderr: "warn".to_string(),
            duration_ms: 3,
        });
        assert!(entry.stdout.is_none());
        assert_eq!(entry.stderr.as_deref(), Some("warn"));
    }
}
