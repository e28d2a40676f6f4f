//! Raw check shapes accepted by the problem detector.

use serde::{Deserialize, Serialize};

/// Outcome of running (or planning to run) one test.
///
/// When `exit_code` is absent and `command` is present the detector runs the
/// command itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestFailureCheck {
    pub test_name: String,
    pub command: Option<String>,
    pub file: Option<String>,
    pub exit_code: Option<i32>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

/// A recorded answer compared with its accepted baseline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegressionCheck {
    pub name: String,
    pub input: Option<String>,
    pub expected: String,
    pub actual: String,
    pub baseline_version: Option<String>,
}

/// A probe designed to elicit an ungrounded answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdversarialProbe {
    pub name: String,
    pub query: String,
    pub expected: String,
    pub actual: String,
    pub category: Option<String>,
}

/// Control vs treatment comparison for one metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceExperiment {
    pub name: String,
    pub metric: Option<String>,
    pub control_score: f64,
    pub treatment_score: f64,
    pub min_improvement: f64,
}

/// Answers collected for semantically equivalent phrasings of one question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyCheck {
    pub name: String,
    pub variants: Vec<String>,
    pub answers: Vec<String>,
}

/// Everything the detector looks at in one iteration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProblemDetectionInput {
    pub test_runs: Vec<TestFailureCheck>,
    pub regressions: Vec<RegressionCheck>,
    pub adversarial: Vec<AdversarialProbe>,
    pub performance: Vec<PerformanceExperiment>,
    pub consistency: Vec<ConsistencyCheck>,
}

impl ProblemDetectionInput {
    pub fn is_empty(&self) -> bool {
        self.test_runs.is_empty()
            && self.regressions.is_empty()
            && self.adversarial.is_empty()
            && self.performance.is_empty()
            && self.consistency.is_empty()
    }
}
