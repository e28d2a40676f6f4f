//! Improvement tracking across loop runs.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::state::{LoopResult, ratio};

const TREND_EPSILON: f64 = 1e-9;
const HEALTHY_PASS_RATE: f64 = 0.90;
const DEGRADING_PASS_RATE: f64 = 0.70;

pub const TARGET_FIX_SUCCESS_RATE: f64 = 0.70;
pub const TARGET_HYPOTHESIS_ACCURACY: f64 = 0.50;
pub const MAX_REGRESSION_RATE: f64 = 0.05;

/// One row of improvement history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementTracking {
    pub iteration: u32,
    pub problems_fixed: usize,
    pub test_suite_pass_rate: f64,
    pub agent_success_rate_lift: f64,
    pub agent_time_reduction: f64,
    #[serde(default)]
    pub loop_duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuiteHealth {
    Healthy,
    Degrading,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub trend_direction: TrendDirection,
    pub test_suite_health: SuiteHealth,
    pub samples: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopHealth {
    pub loops: usize,
    pub fix_success_rate: f64,
    pub hypothesis_accuracy: f64,
    pub regression_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementReport {
    pub generated_at: DateTime<Utc>,
    pub latest: Option<ImprovementTracking>,
    pub trend: Trend,
    pub health: LoopHealth,
    pub recommendations: Vec<String>,
}

impl ImprovementReport {
    /// Plain-text rendering for terminals.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Improvement report ({})", self.generated_at.to_rfc3339());
        match &self.latest {
            Some(row) => {
                let _ = writeln!(
                    out,
                    "  latest: iteration {} fixed {} pass rate {:.2} lift {:.3}",
                    row.iteration,
                    row.problems_fixed,
                    row.test_suite_pass_rate,
                    row.agent_success_rate_lift
                );
            }
            None => {
                let _ = writeln!(out, "  latest: no history");
            }
        }
        let _ = writeln!(
            out,
            "  trend: {:?} over {} samples, suite health {:?}",
            self.trend.trend_direction, self.trend.samples, self.trend.test_suite_health
        );
        let _ = writeln!(
            out,
            "  health ({} loops): fix success {:.2}, hypothesis accuracy {:.2}, regression rate {:.2}",
            self.health.loops,
            self.health.fix_success_rate,
            self.health.hypothesis_accuracy,
            self.health.regression_rate
        );
        if self.recommendations.is_empty() {
            let _ = writeln!(out, "  all metrics on target");
        }
        for recommendation in &self.recommendations {
            let _ = writeln!(out, "  - {recommendation}");
        }
        out
    }
}

/// Append-only improvement history.
#[derive(Debug, Clone, Default)]
pub struct ImprovementTracker {
    history: Vec<ImprovementTracking>,
}

impl ImprovementTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_history(history: Vec<ImprovementTracking>) -> Self {
        Self { history }
    }

    pub fn history(&self) -> &[ImprovementTracking] {
        &self.history
    }

    pub fn record(&mut self, row: ImprovementTracking) {
        debug!(iteration = row.iteration, "improvement row recorded");
        self.history.push(row);
    }

    /// Derive and append a row from a finished loop run.
    ///
    /// Pass rate is the share of executed full-suite checks that passed; with
    /// none executed it falls back to fixed / detected (1.0 when nothing was
    /// detected). Lift is the run's fix success rate over a baseline that fixes
    /// nothing. Time reduction compares against the previous row's duration.
    pub fn record_loop(&mut self, result: &LoopResult, duration_ms: u64) -> &ImprovementTracking {
        let state = &result.state;
        let executed: Vec<bool> = state
            .fixes_attempted
            .iter()
            .filter(|attempt| !attempt.verification.execution_log.is_empty())
            .map(|attempt| attempt.verification.verification.no_regressions)
            .collect();
        let test_suite_pass_rate = if !executed.is_empty() {
            ratio(executed.iter().filter(|passed| **passed).count(), executed.len())
        } else if state.problems_detected.is_empty() {
            1.0
        } else {
            ratio(state.problems_fixed.len(), state.problems_detected.len())
        };
        let agent_time_reduction = match self.history.last() {
            Some(previous) if previous.loop_duration_ms > 0 => {
                1.0 - duration_ms as f64 / previous.loop_duration_ms as f64
            }
            _ => 0.0,
        };

        self.record(ImprovementTracking {
            iteration: self.history.last().map_or(1, |row| row.iteration + 1),
            problems_fixed: state.problems_fixed.len(),
            test_suite_pass_rate,
            agent_success_rate_lift: result.summary.fix_success_rate,
            agent_time_reduction,
            loop_duration_ms: duration_ms,
            timestamp: Utc::now(),
        });
        &self.history[self.history.len() - 1]
    }

    pub fn compute_trend(&self) -> Trend {
        let net: f64 = self
            .history
            .windows(2)
            .map(|pair| pair[1].agent_success_rate_lift - pair[0].agent_success_rate_lift)
            .sum();
        let trend_direction = if self.history.len() < 2 {
            TrendDirection::Stable
        } else if net > TREND_EPSILON {
            TrendDirection::Improving
        } else if net < -TREND_EPSILON {
            TrendDirection::Declining
        } else {
            TrendDirection::Stable
        };
        let test_suite_health = match self.history.last() {
            Some(row) if row.test_suite_pass_rate >= HEALTHY_PASS_RATE => SuiteHealth::Healthy,
            Some(row) if row.test_suite_pass_rate >= DEGRADING_PASS_RATE => SuiteHealth::Degrading,
            _ => SuiteHealth::Critical,
        };
        Trend {
            trend_direction,
            test_suite_health,
            samples: self.history.len(),
        }
    }

    pub fn compute_health(&self, results: &[LoopResult]) -> LoopHealth {
        let mut attempted = 0usize;
        let mut accepted = 0usize;
        let mut supported = 0usize;
        let mut accepted_supported = 0usize;
        let mut regressions = 0usize;
        for result in results {
            attempted += result.state.fixes_attempted.len();
            accepted += result.state.fixes_accepted();
            supported += result.state.supported_hypotheses();
            accepted_supported += result.state.accepted_with_supported_hypothesis();
            regressions += result.state.regressions_observed();
        }
        LoopHealth {
            loops: results.len(),
            fix_success_rate: ratio(accepted, attempted),
            hypothesis_accuracy: ratio(accepted_supported, supported),
            regression_rate: ratio(regressions, attempted),
        }
    }

    pub fn generate_report(&self, results: &[LoopResult]) -> ImprovementReport {
        let trend = self.compute_trend();
        let health = self.compute_health(results);

        let mut recommendations = Vec::new();
        if health.fix_success_rate < TARGET_FIX_SUCCESS_RATE {
            recommendations.push(format!(
                "Fix success rate {:.2} is below {TARGET_FIX_SUCCESS_RATE:.2}: broaden fix templates or improve file path inference",
                health.fix_success_rate
            ));
        }
        if health.hypothesis_accuracy < TARGET_HYPOTHESIS_ACCURACY {
            recommendations.push(format!(
                "Hypothesis accuracy {:.2} is below {TARGET_HYPOTHESIS_ACCURACY:.2}: tighten hypothesis tests or raise the supported threshold",
                health.hypothesis_accuracy
            ));
        }
        if health.regression_rate > MAX_REGRESSION_RATE {
            recommendations.push(format!(
                "Regression rate {:.2} exceeds {MAX_REGRESSION_RATE:.2}: prefer narrower fixes and add regression guards",
                health.regression_rate
            ));
        }
        if trend.test_suite_health != SuiteHealth::Healthy {
            recommendations.push(format!(
                "Test suite health is {:?}: stabilize failing tests before running further loops",
                trend.test_suite_health
            ));
        }

        ImprovementReport {
            generated_at: Utc::now(),
            latest: self.history.last().cloned(),
            trend,
            health,
            recommendations,
        }
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}
