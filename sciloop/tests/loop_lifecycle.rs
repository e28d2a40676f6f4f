//! Loop-level tests driving the orchestrator and tracker together.
//!
//! A scripted runner stands in for `cargo`, so every verdict below follows
//! from the scripted exit codes alone.

use std::sync::Arc;

use sciloop::core::signals::{ProblemDetectionInput, TestFailureCheck};
use sciloop::core::types::{EscalationReason, FixVerdict};
use sciloop::io::config::LoopConfig;
use sciloop::io::storage::MemoryStorage;
use sciloop::orchestrator::ScientificLoopOrchestrator;
use sciloop::test_support::{ScriptedCommandRunner, scripted_runner};
use sciloop::tracker::ImprovementTracker;

fn failing_check(name: &str) -> TestFailureCheck {
    TestFailureCheck {
        test_name: name.to_string(),
        command: Some(format!("cargo test {name}")),
        exit_code: Some(101),
        stderr: Some("assertion failed: left == right".to_string()),
        ..TestFailureCheck::default()
    }
}

/// One failure is fixed on the first attempt, the other never stops failing.
///
/// Runner script:
/// - `cargo test parser_handles_empty` fails once (the hypothesis test), then passes.
/// - `cargo test lexer_rejects_tabs` always fails, so every fix is rejected.
/// - everything else passes.
#[test]
fn one_problem_fixed_one_escalated_then_tracked() {
    let runner = ScriptedCommandRunner::new()
        .respond_once("cargo test parser_handles_empty", 101, "", "assertion failed")
        .respond("cargo test lexer_rejects_tabs", 101, "", "assertion failed");
    let input = ProblemDetectionInput {
        test_runs: vec![
            failing_check("parser_handles_empty"),
            failing_check("lexer_rejects_tabs"),
        ],
        ..ProblemDetectionInput::default()
    };

    let mut orchestrator =
        ScientificLoopOrchestrator::new(LoopConfig::default(), scripted_runner(runner));
    orchestrator.initialize(Arc::new(MemoryStorage::new()));
    let summary = orchestrator.run_iteration(&input);

    assert_eq!(summary.iteration, 1);
    assert_eq!(summary.problems_detected, vec!["PROB-1", "PROB-2"]);
    assert_eq!(summary.problems_fixed, vec!["PROB-1"]);
    assert_eq!(summary.problems_escalated, vec!["PROB-2"]);

    let result = orchestrator.result();
    let accepted: Vec<&str> = result
        .state
        .fixes_attempted
        .iter()
        .filter(|attempt| attempt.verification.verdict == FixVerdict::FixAccepted)
        .map(|attempt| attempt.fix.problem_id.as_str())
        .collect();
    assert_eq!(accepted, vec!["PROB-1"]);
    assert_eq!(result.state.benchmark_evolutions.len(), 1);
    assert_eq!(result.state.benchmark_evolutions[0].problem_id, "PROB-1");

    let escalation = &result.escalations[0];
    assert_eq!(escalation.problem_id, "PROB-2");
    assert_eq!(escalation.reason, EscalationReason::AllFixesFailed);
    assert_eq!(
        escalation.fixes_tried.len(),
        LoopConfig::default().max_fix_attempts_per_problem
    );

    let mut tracker = ImprovementTracker::new();
    let row = tracker.record_loop(&result, 500).clone();
    assert_eq!(row.iteration, 1);
    assert_eq!(row.problems_fixed, 1);
    assert_eq!(row.test_suite_pass_rate, 1.0);
    assert_eq!(row.agent_success_rate_lift, result.summary.fix_success_rate);

    let report = tracker.generate_report(std::slice::from_ref(&result));
    assert_eq!(report.health.loops, 1);
    assert_eq!(report.health.regression_rate, 0.0);
    assert!(
        report
            .recommendations
            .iter()
            .any(|line| line.starts_with("Fix success rate"))
    );
    orchestrator.shutdown();
}

/// A persisting problem is re-detected every iteration until the budget runs out.
#[test]
fn run_until_done_escalates_each_iteration_without_runner() {
    let config = LoopConfig {
        max_iterations: 2,
        ..LoopConfig::default()
    };
    let mut orchestrator = ScientificLoopOrchestrator::new(config, None);
    let input = ProblemDetectionInput {
        test_runs: vec![failing_check("parser_handles_empty")],
        ..ProblemDetectionInput::default()
    };
    let result = orchestrator.run_until_done(&input);

    assert_eq!(result.state.iteration, 2);
    assert_eq!(result.iterations.len(), 2);
    assert_eq!(result.escalations.len(), 2);
    assert_eq!(result.escalations[1].iteration, 2);
    assert!(result.state.problems_fixed.is_empty());
    assert_eq!(result.summary.problems_detected, 2);
}
