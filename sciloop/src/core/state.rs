//! Accumulated loop state and the result contract handed to reporting layers.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::types::{
    BenchmarkEvolution, Escalation, Fix, HypothesisTestResult, Problem, Verdict,
    VerificationResult,
};

/// One verified fix attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixAttempt {
    pub fix: Fix,
    pub verification: VerificationResult,
}

/// State appended to by every iteration until [`ScientificLoopState::reset`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScientificLoopState {
    pub iteration: u32,
    pub problems_detected: Vec<Problem>,
    pub problems_fixed: Vec<String>,
    pub problems_escalated: Vec<String>,
    pub hypotheses_tested: Vec<HypothesisTestResult>,
    pub fixes_attempted: Vec<FixAttempt>,
    pub benchmark_evolutions: Vec<BenchmarkEvolution>,
}

impl ScientificLoopState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn supported_hypotheses(&self) -> usize {
        self.hypotheses_tested
            .iter()
            .filter(|result| result.verdict == Verdict::Supported)
            .count()
    }

    pub fn fixes_accepted(&self) -> usize {
        self.fixes_attempted
            .iter()
            .filter(|attempt| attempt.verification.accepted())
            .count()
    }

    /// Accepted fixes whose originating hypothesis was tested as supported.
    pub fn accepted_with_supported_hypothesis(&self) -> usize {
        let supported: BTreeSet<&str> = self
            .hypotheses_tested
            .iter()
            .filter(|result| result.verdict == Verdict::Supported)
            .map(|result| result.hypothesis_id.as_str())
            .collect();
        self.fixes_attempted
            .iter()
            .filter(|attempt| {
                attempt.verification.accepted()
                    && supported.contains(attempt.fix.hypothesis_id.as_str())
            })
            .count()
    }

    /// Attempts whose `no_regressions` check did not pass, including
    /// rejections where no check could run.
    pub fn regressions_observed(&self) -> usize {
        self.fixes_attempted
            .iter()
            .filter(|attempt| !attempt.verification.verification.no_regressions)
            .count()
    }

    pub fn summarize(&self) -> LoopSummary {
        let fixes_attempted = self.fixes_attempted.len();
        let fixes_accepted = self.fixes_accepted();
        let supported_hypotheses = self.supported_hypotheses();
        LoopSummary {
            iterations: self.iteration,
            problems_detected: self.problems_detected.len(),
            problems_fixed: self.problems_fixed.len(),
            problems_escalated: self.problems_escalated.len(),
            hypotheses_tested: self.hypotheses_tested.len(),
            supported_hypotheses,
            fixes_attempted,
            fixes_accepted,
            fix_success_rate: ratio(fixes_accepted, fixes_attempted),
            hypothesis_accuracy: ratio(fixes_accepted, supported_hypotheses),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopSummary {
    pub iterations: u32,
    pub problems_detected: usize,
    pub problems_fixed: usize,
    pub problems_escalated: usize,
    pub hypotheses_tested: usize,
    pub supported_hypotheses: usize,
    pub fixes_attempted: usize,
    pub fixes_accepted: usize,
    pub fix_success_rate: f64,
    pub hypothesis_accuracy: f64,
}

/// What happened during one `run_iteration` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationSummary {
    pub iteration: u32,
    pub problems_detected: Vec<String>,
    pub problems_fixed: Vec<String>,
    pub problems_escalated: Vec<String>,
    pub cancelled: bool,
    pub duration_ms: u64,
}

/// Output contract of a loop run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopResult {
    pub state: ScientificLoopState,
    pub escalations: Vec<Escalation>,
    pub summary: LoopSummary,
    #[serde(default)]
    pub iterations: Vec<IterationSummary>,
}

/// `num / den`, or 0 when nothing was attempted.
pub fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}
