//! The DETECT → HYPOTHESIZE → TEST → FIX → VERIFY → EVOLVE loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use crate::agents::detector::ProblemDetector;
use crate::agents::evolver::BenchmarkEvolver;
use crate::agents::fixer::FixGenerator;
use crate::agents::hypothesis::HypothesisGenerator;
use crate::agents::tester::HypothesisTester;
use crate::agents::verifier::FixVerifier;
use crate::agents::{Agent, SharedRunner};
use crate::core::signals::ProblemDetectionInput;
use crate::core::state::{FixAttempt, IterationSummary, LoopResult, ScientificLoopState};
use crate::core::types::{
    Escalation, EscalationReason, EscalationRecommendation, Problem, Severity, Verdict,
    Verification,
};
use crate::io::config::LoopConfig;
use crate::io::storage::Storage;
use crate::registry::AgentRegistry;

/// How a single problem left the per-problem loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProblemOutcome {
    Fixed,
    Escalated,
}

/// Drives the six agents over detection input and accumulates loop state.
///
/// Processing is strictly sequential: problems in detection order, hypotheses
/// in ranked order, fixes preferred-first.
#[derive(Debug)]
pub struct ScientificLoopOrchestrator {
    config: LoopConfig,
    detector: ProblemDetector,
    generator: HypothesisGenerator,
    tester: HypothesisTester,
    fixer: FixGenerator,
    verifier: FixVerifier,
    evolver: BenchmarkEvolver,
    state: ScientificLoopState,
    escalations: Vec<Escalation>,
    iterations: Vec<IterationSummary>,
    cancel: Option<Arc<AtomicBool>>,
}

impl ScientificLoopOrchestrator {
    pub fn new(config: LoopConfig, runner: SharedRunner) -> Self {
        let timeout = config.command_timeout();
        Self {
            detector: ProblemDetector::new(runner.clone()).with_timeout(timeout),
            generator: HypothesisGenerator::new(),
            tester: HypothesisTester::new(runner.clone())
                .with_thresholds(config.supported_threshold, config.refuted_threshold)
                .with_timeout(timeout),
            fixer: FixGenerator::new(config.max_fixes),
            verifier: FixVerifier::new(runner, config.verification.clone()).with_timeout(timeout),
            evolver: BenchmarkEvolver::new(),
            config,
            state: ScientificLoopState::default(),
            escalations: Vec::new(),
            iterations: Vec::new(),
            cancel: None,
        }
    }

    /// Stop between problems once `flag` is set.
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn state(&self) -> &ScientificLoopState {
        &self.state
    }

    pub fn escalations(&self) -> &[Escalation] {
        &self.escalations
    }

    /// Replace the runner of every agent that executes commands.
    pub fn set_runner(&mut self, runner: SharedRunner) {
        self.detector.set_runner(runner.clone());
        self.tester.set_runner(runner.clone());
        self.verifier.set_runner(runner);
    }

    pub fn initialize(&mut self, storage: Arc<dyn Storage>) {
        for agent in self.agents_mut() {
            agent.initialize(storage.clone());
        }
        info!("agents initialized");
    }

    pub fn is_ready(&self) -> bool {
        self.agents().iter().all(|agent| agent.is_ready())
    }

    pub fn shutdown(&mut self) {
        for agent in self.agents_mut() {
            agent.shutdown();
        }
    }

    pub fn registry(&self) -> AgentRegistry {
        let mut registry = AgentRegistry::new();
        for agent in self.agents() {
            registry.register(agent.descriptor());
        }
        registry
    }

    /// Zero the loop state, escalations, and iteration history.
    ///
    /// Agent id counters keep counting so ids stay unique per orchestrator.
    pub fn reset(&mut self) {
        self.state.reset();
        self.escalations.clear();
        self.iterations.clear();
    }

    pub fn result(&self) -> LoopResult {
        LoopResult {
            state: self.state.clone(),
            escalations: self.escalations.clone(),
            summary: self.state.summarize(),
            iterations: self.iterations.clone(),
        }
    }

    pub fn run_until_done(&mut self, input: &ProblemDetectionInput) -> LoopResult {
        self.run_until_done_with(input, |_| {})
    }

    /// Repeat [`Self::run_iteration`] until an iteration detects nothing,
    /// `max_iterations` is reached, or cancellation is requested.
    pub fn run_until_done_with<F: FnMut(&IterationSummary)>(
        &mut self,
        input: &ProblemDetectionInput,
        mut on_iteration: F,
    ) -> LoopResult {
        let mut executed = 0u32;
        loop {
            if self.cancelled() {
                info!(executed, "loop cancelled");
                break;
            }
            let summary = self.run_iteration(input);
            executed += 1;
            on_iteration(&summary);

            if summary.cancelled {
                info!(executed, "loop cancelled");
                break;
            }
            if summary.problems_detected.is_empty() {
                info!(executed, "no problems detected, loop done");
                break;
            }
            if executed >= self.config.max_iterations {
                warn!(max_iterations = self.config.max_iterations, "max iterations reached");
                break;
            }
        }
        self.result()
    }

    #[instrument(skip_all, fields(iteration = self.state.iteration + 1))]
    pub fn run_iteration(&mut self, input: &ProblemDetectionInput) -> IterationSummary {
        let started = Instant::now();
        self.state.iteration += 1;
        let mut summary = IterationSummary {
            iteration: self.state.iteration,
            ..IterationSummary::default()
        };

        let report = self.detector.identify_problems(input);
        summary.problems_detected = report.problems.iter().map(|p| p.id.clone()).collect();
        self.state
            .problems_detected
            .extend(report.problems.iter().cloned());

        for problem in &report.problems {
            if self.cancelled() {
                warn!(problem = %problem.id, "cancellation requested, leaving remaining problems");
                summary.cancelled = true;
                break;
            }
            match self.process_problem(problem) {
                ProblemOutcome::Fixed => summary.problems_fixed.push(problem.id.clone()),
                ProblemOutcome::Escalated => summary.problems_escalated.push(problem.id.clone()),
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            detected = summary.problems_detected.len(),
            fixed = summary.problems_fixed.len(),
            escalated = summary.problems_escalated.len(),
            "iteration complete"
        );
        self.iterations.push(summary.clone());
        summary
    }

    #[instrument(skip_all, fields(problem = %problem.id))]
    fn process_problem(&mut self, problem: &Problem) -> ProblemOutcome {
        let generation = self.generator.generate_hypotheses(problem);
        let mut hypotheses_tried = Vec::new();
        let mut supported = None;
        for hypothesis in generation
            .ranked()
            .take(self.config.max_hypotheses_per_problem)
        {
            let result = self.tester.test_hypothesis(problem, hypothesis);
            hypotheses_tried.push(hypothesis.id.clone());
            self.state.hypotheses_tested.push(result.clone());
            if result.verdict == Verdict::Supported {
                supported = Some((hypothesis.clone(), result));
                break;
            }
        }

        let Some((hypothesis, test_result)) = supported else {
            return self.escalate(
                problem,
                EscalationReason::NoSupportedHypothesis,
                hypotheses_tried,
                Vec::new(),
            );
        };
        debug!(hypothesis = %hypothesis.id, confidence = test_result.confidence, "hypothesis supported");

        let generation = self.fixer.generate_fix(problem, &hypothesis, &test_result);
        let mut fixes_tried = Vec::new();
        let mut rejected: Vec<Verification> = Vec::new();
        for fix in generation
            .fixes
            .iter()
            .take(self.config.max_fix_attempts_per_problem)
        {
            let verification = self.verifier.verify_fix(problem, fix, None);
            fixes_tried.push(fix.id.clone());
            self.state.fixes_attempted.push(FixAttempt {
                fix: fix.clone(),
                verification: verification.clone(),
            });
            if verification.accepted() {
                let evolution = self.evolver.evolve_benchmark(problem, fix, &verification);
                self.state.benchmark_evolutions.push(evolution);
                self.state.problems_fixed.push(problem.id.clone());
                info!(fix = %fix.id, "fix accepted");
                return ProblemOutcome::Fixed;
            }
            rejected.push(verification.verification);
        }

        let regression_unavoidable = !rejected.is_empty()
            && rejected
                .iter()
                .all(|v| v.original_test_passes && !v.no_regressions);
        let reason = if regression_unavoidable {
            EscalationReason::RegressionUnavoidable
        } else {
            EscalationReason::AllFixesFailed
        };
        self.escalate(problem, reason, hypotheses_tried, fixes_tried)
    }

    fn escalate(
        &mut self,
        problem: &Problem,
        reason: EscalationReason,
        hypotheses_tried: Vec<String>,
        fixes_tried: Vec<String>,
    ) -> ProblemOutcome {
        let recommendation = if reason == EscalationReason::RegressionUnavoidable {
            EscalationRecommendation::Defer
        } else if problem.severity == Severity::Low {
            EscalationRecommendation::Wontfix
        } else {
            EscalationRecommendation::HumanReview
        };
        warn!(problem = %problem.id, ?reason, ?recommendation, "problem escalated");
        self.state.problems_escalated.push(problem.id.clone());
        self.escalations.push(Escalation {
            problem_id: problem.id.clone(),
            iteration: self.state.iteration,
            hypotheses_tried,
            fixes_tried,
            reason,
            recommendation,
        });
        ProblemOutcome::Escalated
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn agents(&self) -> [&dyn Agent; 6] {
        [
            &self.detector,
            &self.generator,
            &self.tester,
            &self.fixer,
            &self.verifier,
            &self.evolver,
        ]
    }

    fn agents_mut(&mut self) -> [&mut dyn Agent; 6] {
        [
            &mut self.detector,
            &mut self.generator,
            &mut self.tester,
            &mut self.fixer,
            &mut self.verifier,
            &mut self.evolver,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentType;
    use crate::core::signals::{RegressionCheck, TestFailureCheck};
    use crate::core::types::{FixVerdict, ProblemType};
    use crate::io::storage::MemoryStorage;
    use crate::test_support::{ScriptedCommandRunner, scripted_runner};

    fn failing_test_input() -> ProblemDetectionInput {
        ProblemDetectionInput {
            test_runs: vec![TestFailureCheck {
                test_name: "parser_handles_empty".to_string(),
                command: Some("cargo test parser_handles_empty".to_string()),
                exit_code: Some(101),
                stderr: Some("assertion failed: left == right".to_string()),
                ..TestFailureCheck::default()
            }],
            ..ProblemDetectionInput::default()
        }
    }

    #[test]
    fn iteration_counter_increments_by_one() {
        let mut orchestrator = ScientificLoopOrchestrator::new(LoopConfig::default(), None);
        let input = ProblemDetectionInput::default();
        orchestrator.run_iteration(&input);
        assert_eq!(orchestrator.state().iteration, 1);
        orchestrator.run_iteration(&input);
        assert_eq!(orchestrator.state().iteration, 2);
    }

    #[test]
    fn empty_input_stops_after_one_iteration() {
        let mut orchestrator = ScientificLoopOrchestrator::new(LoopConfig::default(), None);
        let result = orchestrator.run_until_done(&ProblemDetectionInput::default());
        assert_eq!(result.state.iteration, 1);
        assert_eq!(result.iterations.len(), 1);
        assert_eq!(result.summary.fix_success_rate, 0.0);
    }

    #[test]
    fn accepted_fix_records_problem_and_evolution() {
        // First run of the failing test reproduces the assertion; afterwards
        // every command passes.
        let runner = ScriptedCommandRunner::new().respond_once(
            "cargo test parser_handles_empty",
            101,
            "",
            "assertion failed: left == right",
        );
        let mut orchestrator =
            ScientificLoopOrchestrator::new(LoopConfig::default(), scripted_runner(runner));
        let summary = orchestrator.run_iteration(&failing_test_input());

        assert_eq!(summary.problems_fixed, vec!["PROB-1".to_string()]);
        assert!(summary.problems_escalated.is_empty());
        let state = orchestrator.state();
        assert_eq!(state.problems_fixed, vec!["PROB-1".to_string()]);
        assert_eq!(state.hypotheses_tested.len(), 1);
        assert_eq!(state.hypotheses_tested[0].verdict, Verdict::Supported);
        assert_eq!(state.fixes_attempted.len(), 1);
        assert_eq!(state.fixes_attempted[0].fix.id, "FIX-1");
        assert_eq!(
            state.fixes_attempted[0].verification.verdict,
            FixVerdict::FixAccepted
        );
        assert_eq!(state.benchmark_evolutions.len(), 1);
        assert_eq!(state.benchmark_evolutions[0].fix_id, "FIX-1");
        assert_eq!(orchestrator.result().summary.fix_success_rate, 1.0);
    }

    #[test]
    fn failing_original_test_escalates_after_all_fixes() {
        let runner = ScriptedCommandRunner::new().respond(
            "cargo test parser_handles_empty",
            101,
            "",
            "assertion failed: left == right",
        );
        let mut orchestrator =
            ScientificLoopOrchestrator::new(LoopConfig::default(), scripted_runner(runner));
        let summary = orchestrator.run_iteration(&failing_test_input());

        assert_eq!(summary.problems_escalated, vec!["PROB-1".to_string()]);
        let escalation = &orchestrator.escalations()[0];
        assert_eq!(escalation.reason, EscalationReason::AllFixesFailed);
        assert_eq!(escalation.recommendation, EscalationRecommendation::HumanReview);
        assert_eq!(escalation.fixes_tried, vec!["FIX-1", "FIX-2", "FIX-3"]);
        assert_eq!(escalation.iteration, 1);
    }

    #[test]
    fn full_suite_breakage_escalates_as_unavoidable_regression() {
        let runner = ScriptedCommandRunner::new()
            .respond_once("cargo test parser_handles_empty", 101, "", "assertion failed")
            .respond("cargo test parser_handles_empty", 0, "ok", "")
            .respond("cargo test", 1, "", "other::test failed");
        let mut orchestrator =
            ScientificLoopOrchestrator::new(LoopConfig::default(), scripted_runner(runner));
        orchestrator.run_iteration(&failing_test_input());

        let escalation = &orchestrator.escalations()[0];
        assert_eq!(escalation.reason, EscalationReason::RegressionUnavoidable);
        assert_eq!(escalation.recommendation, EscalationRecommendation::Defer);
        assert_eq!(orchestrator.state().regressions_observed(), 3);
    }

    #[test]
    fn fix_attempts_respect_budget() {
        let runner = ScriptedCommandRunner::new().respond(
            "cargo test parser_handles_empty",
            101,
            "",
            "assertion failed: left == right",
        );
        let config = LoopConfig {
            max_fix_attempts_per_problem: 1,
            ..LoopConfig::default()
        };
        let mut orchestrator = ScientificLoopOrchestrator::new(config, scripted_runner(runner));
        orchestrator.run_iteration(&failing_test_input());
        assert_eq!(orchestrator.state().fixes_attempted.len(), 1);
        assert_eq!(orchestrator.escalations()[0].fixes_tried, vec!["FIX-1"]);
    }

    #[test]
    fn run_until_done_stops_at_max_iterations() {
        let config = LoopConfig {
            max_iterations: 3,
            ..LoopConfig::default()
        };
        let mut orchestrator = ScientificLoopOrchestrator::new(config, None);
        let mut seen = Vec::new();
        let result =
            orchestrator.run_until_done_with(&failing_test_input(), |s| seen.push(s.iteration));
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(result.state.iteration, 3);
        assert_eq!(result.escalations.len(), 3);
        assert_eq!(result.state.problems_detected[2].id, "PROB-3");
    }

    #[test]
    fn regression_problem_without_runner_is_fixed_or_escalated_deterministically() {
        let input = ProblemDetectionInput {
            regressions: vec![RegressionCheck {
                name: "capital".to_string(),
                expected: "Paris".to_string(),
                actual: "Lyon".to_string(),
                ..RegressionCheck::default()
            }],
            ..ProblemDetectionInput::default()
        };
        let mut orchestrator = ScientificLoopOrchestrator::new(LoopConfig::default(), None);
        let summary = orchestrator.run_iteration(&input);
        // Behavioral evidence supports the hypothesis, but without a runner
        // verification rejects every fix.
        assert_eq!(summary.problems_escalated, vec!["PROB-1".to_string()]);
        let escalation = &orchestrator.escalations()[0];
        assert_eq!(escalation.reason, EscalationReason::AllFixesFailed);
        assert_eq!(escalation.hypotheses_tried, vec!["HYP-1-A".to_string()]);
        assert!(orchestrator.state().supported_hypotheses() >= 1);
        assert_eq!(orchestrator.state().problems_detected[0].problem_type, ProblemType::Regression);
    }

    #[test]
    fn cancellation_leaves_remaining_problems_unprocessed() {
        let flag = Arc::new(AtomicBool::new(true));
        let mut orchestrator = ScientificLoopOrchestrator::new(LoopConfig::default(), None)
            .with_cancellation(flag.clone());
        let summary = orchestrator.run_iteration(&failing_test_input());
        assert!(summary.cancelled);
        assert_eq!(summary.problems_detected.len(), 1);
        assert!(summary.problems_escalated.is_empty());
        assert!(orchestrator.escalations().is_empty());

        let result = orchestrator.run_until_done(&failing_test_input());
        assert_eq!(result.state.iteration, 1);
    }

    #[test]
    fn reset_zeroes_state_and_escalations() {
        let mut orchestrator = ScientificLoopOrchestrator::new(LoopConfig::default(), None);
        orchestrator.run_iteration(&failing_test_input());
        assert!(!orchestrator.escalations().is_empty());
        orchestrator.reset();
        assert_eq!(orchestrator.state(), &ScientificLoopState::default());
        assert!(orchestrator.escalations().is_empty());
        assert!(orchestrator.result().iterations.is_empty());
    }

    #[test]
    fn lifecycle_and_registry_cover_all_agents() {
        let mut orchestrator = ScientificLoopOrchestrator::new(LoopConfig::default(), None);
        assert!(!orchestrator.is_ready());
        let storage = Arc::new(MemoryStorage::new());
        orchestrator.initialize(storage.clone());
        assert!(orchestrator.is_ready());
        assert_eq!(storage.keys().len(), 6);

        let registry = orchestrator.registry();
        assert_eq!(registry.len(), 6);
        assert!(registry.get(AgentType::BenchmarkEvolver).is_some());
        assert_eq!(registry.find_by_capability("type_check").len(), 1);

        orchestrator.shutdown();
        assert!(!orchestrator.is_ready());
    }
}
