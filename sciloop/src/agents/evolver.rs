//! Benchmark evolution: turn an accepted fix into new test stubs.

use minijinja::context;
use tracing::{debug, instrument, warn};

use crate::agents::render::StubEngine;
use crate::agents::{Agent, AgentDescriptor, AgentType, Lifecycle, QualityTier};
use crate::core::keywords::slugify;
use crate::core::types::{
    BenchmarkEvolution, BenchmarkTest, CoverageGap, Fix, Problem, ProblemType, TestCategory,
    VerificationResult,
};

struct TestPlan {
    name: &'static str,
    description: &'static str,
    steps: &'static [&'static str],
}

struct EvolutionPlan {
    prevention: &'static [TestPlan],
    variants: &'static [TestPlan],
    gap: &'static str,
    suggested: &'static [&'static str],
}

const TEST_FAILURE_PLAN: EvolutionPlan = EvolutionPlan {
    prevention: &[
        TestPlan {
            name: "handles_boundary_inputs",
            description: "Boundary inputs around the failing case keep their expected results",
            steps: &["call the fixed code with empty, minimal and maximal inputs", "assert each result"],
        },
        TestPlan {
            name: "reports_errors_instead_of_aborting",
            description: "Invalid inputs surface an error value rather than aborting",
            steps: &["feed malformed input", "assert an error is returned"],
        },
    ],
    variants: &[TestPlan {
        name: "neighbouring_inputs_pass",
        description: "Inputs adjacent to the original failure behave consistently",
        steps: &["derive inputs one step away from the failing case", "assert matching behavior"],
    }],
    gap: "No test covered the edge case that triggered the failure",
    suggested: &["property test over the input domain", "explicit edge-case table"],
};

const REGRESSION_PLAN: EvolutionPlan = EvolutionPlan {
    prevention: &[
        TestPlan {
            name: "matches_recorded_baseline",
            description: "Output for the baseline input matches the recorded baseline",
            steps: &["load the baseline input", "assert output equals the baseline"],
        },
        TestPlan {
            name: "baseline_survives_config_changes",
            description: "Supported configuration variations keep baseline output",
            steps: &["run the baseline input under each supported config", "assert identical output"],
        },
    ],
    variants: &[TestPlan {
        name: "related_inputs_match_baseline",
        description: "Inputs related to the regressed case still match their baselines",
        steps: &["run neighbouring baseline inputs", "assert no drift"],
    }],
    gap: "The baseline suite did not include the regressed input",
    suggested: &["snapshot test for the regressed input", "version-pinned golden files"],
};

const HALLUCINATION_PLAN: EvolutionPlan = EvolutionPlan {
    prevention: &[
        TestPlan {
            name: "answers_are_grounded",
            description: "Answers only contain facts present in retrieved context",
            steps: &["ask the probe query", "assert every claim appears in the context"],
        },
        TestPlan {
            name: "refuses_without_evidence",
            description: "Queries without supporting sources produce a refusal",
            steps: &["ask a query with no matching source", "assert a refusal"],
        },
    ],
    variants: &[TestPlan {
        name: "paraphrased_probe_stays_grounded",
        description: "Paraphrases of the probe remain grounded",
        steps: &["ask paraphrased probe queries", "assert grounded answers"],
    }],
    gap: "Adversarial probes did not cover this query family",
    suggested: &["adversarial probe set for the query family", "citation check on answers"],
};

const PERFORMANCE_GAP_PLAN: EvolutionPlan = EvolutionPlan {
    prevention: &[
        TestPlan {
            name: "treatment_beats_control",
            description: "Treatment clears control plus the required improvement",
            steps: &["score control and treatment", "assert the lift meets the threshold"],
        },
        TestPlan {
            name: "no_scenario_drops_below_control",
            description: "No individual scenario scores below control",
            steps: &["score each scenario", "assert treatment >= control per scenario"],
        },
    ],
    variants: &[TestPlan {
        name: "lift_holds_on_held_out_scenarios",
        description: "The lift holds on held-out scenarios",
        steps: &["score held-out scenarios", "assert the lift persists"],
    }],
    gap: "Experiments measured only the aggregate score",
    suggested: &["per-scenario score assertions", "held-out evaluation set"],
};

const INCONSISTENCY_PLAN: EvolutionPlan = EvolutionPlan {
    prevention: &[
        TestPlan {
            name: "equivalent_variants_agree",
            description: "All equivalent variants receive the same answer",
            steps: &["ask every variant", "assert a single distinct answer"],
        },
        TestPlan {
            name: "repeated_asks_are_stable",
            description: "Asking one variant repeatedly yields a stable answer",
            steps: &["ask the same variant several times", "assert identical answers"],
        },
    ],
    variants: &[TestPlan {
        name: "new_phrasings_agree",
        description: "Newly generated phrasings agree with the canonical answer",
        steps: &["generate additional phrasings", "assert agreement with the canonical answer"],
    }],
    gap: "Consistency checks used too few phrasings",
    suggested: &["paraphrase expansion per query", "repeat-sampling stability check"],
};

fn plan_for(problem_type: ProblemType) -> &'static EvolutionPlan {
    match problem_type {
        ProblemType::TestFailure => &TEST_FAILURE_PLAN,
        ProblemType::Regression => &REGRESSION_PLAN,
        ProblemType::Hallucination => &HALLUCINATION_PLAN,
        ProblemType::PerformanceGap => &PERFORMANCE_GAP_PLAN,
        ProblemType::Inconsistency => &INCONSISTENCY_PLAN,
    }
}

#[derive(Debug)]
pub struct BenchmarkEvolver {
    stubs: StubEngine,
    lifecycle: Lifecycle,
}

impl Default for BenchmarkEvolver {
    fn default() -> Self {
        Self::new()
    }
}

impl BenchmarkEvolver {
    pub fn new() -> Self {
        Self {
            stubs: StubEngine::new(),
            lifecycle: Lifecycle::default(),
        }
    }

    #[instrument(skip_all, fields(problem = %problem.id, fix = %fix.id))]
    pub fn evolve_benchmark(
        &self,
        problem: &Problem,
        fix: &Fix,
        verification: &VerificationResult,
    ) -> BenchmarkEvolution {
        let plan = plan_for(problem.problem_type);
        let builder = TestBuilder {
            stubs: &self.stubs,
            problem,
            fix,
            target_file: format!("tests/benchmarks/{}.rs", slugify(&problem.id)),
            exercised: fix
                .changes
                .first()
                .map_or_else(|| "the fixed code".to_string(), |c| c.file_path.clone()),
        };
        let mut seq = 0usize;
        let mut next_id = || {
            seq += 1;
            format!("BENCH-{}-{seq}", problem.id)
        };

        let new_tests: Vec<BenchmarkTest> = plan
            .prevention
            .iter()
            .map(|test| {
                let steps: Vec<String> = test.steps.iter().map(|s| s.to_string()).collect();
                builder.build(next_id(), test.name, test.description, TestCategory::Prevention, steps)
            })
            .collect();

        let replay = verification
            .execution_log
            .first()
            .map(|entry| entry.command.clone())
            .or_else(|| problem.minimal_reproduction.clone())
            .unwrap_or_else(|| problem.description.clone());
        let guard = builder.build(
            next_id(),
            "guards_fix",
            &format!("Guards {}: {}", fix.id, fix.description),
            TestCategory::RegressionGuard,
            vec![
                format!("replay: {replay}"),
                format!("assert: {}", fix.prediction),
            ],
        );

        let variant_tests: Vec<BenchmarkTest> = plan
            .variants
            .iter()
            .map(|test| {
                let steps: Vec<String> = test.steps.iter().map(|s| s.to_string()).collect();
                builder.build(next_id(), test.name, test.description, TestCategory::Variant, steps)
            })
            .collect();

        let mut suggested_tests: Vec<String> = new_tests.iter().map(|t| t.name.clone()).collect();
        suggested_tests.extend(plan.suggested.iter().map(|s| s.to_string()));
        let coverage_gaps = vec![CoverageGap {
            description: format!("{} ({})", plan.gap, problem.description),
            affected_area: builder.exercised.clone(),
            suggested_tests,
        }];

        debug!(
            prevention = new_tests.len(),
            variants = variant_tests.len(),
            "benchmark evolved"
        );
        BenchmarkEvolution {
            problem_id: problem.id.clone(),
            fix_id: fix.id.clone(),
            new_tests,
            regression_guards: vec![guard],
            variant_tests,
            coverage_gaps,
        }
    }
}

impl Agent for BenchmarkEvolver {
    fn descriptor(&self) -> AgentDescriptor {
        AgentDescriptor::new(
            AgentType::BenchmarkEvolver,
            "Benchmark Evolver",
            &["prevention_tests", "regression_guards", "variant_tests", "coverage_gaps"],
            QualityTier::Mvp,
        )
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }
}

struct TestBuilder<'a> {
    stubs: &'a StubEngine,
    problem: &'a Problem,
    fix: &'a Fix,
    target_file: String,
    exercised: String,
}

impl TestBuilder<'_> {
    fn build(
        &self,
        id: String,
        name: &str,
        description: &str,
        category: TestCategory,
        steps: Vec<String>,
    ) -> BenchmarkTest {
        let fn_name = format!("{name}_{}", slugify(&self.problem.id));
        let guarded_fix = (category == TestCategory::RegressionGuard).then_some(self.fix.id.as_str());
        let ctx = context! {
            name => fn_name.as_str(),
            description => description,
            test_id => id.as_str(),
            category => category_label(category),
            problem_id => self.problem.id.as_str(),
            guarded_fix => guarded_fix,
            fix_description => self.fix.description.as_str(),
            steps => steps,
            target => self.exercised.as_str(),
        };
        let code = self.stubs.render("benchmark_test", ctx).unwrap_or_else(|err| {
            warn!(test = %id, err = %err, "failed to render benchmark test");
            format!("// {id}: {description}")
        });
        BenchmarkTest {
            id,
            name: fn_name,
            description: description.to_string(),
            category,
            code,
            target_file: self.target_file.clone(),
        }
    }
}

fn category_label(category: TestCategory) -> &'static str {
    match category {
        TestCategory::Prevention => "prevention",
        TestCategory::RegressionGuard => "regression_guard",
        TestCategory::Variant => "variant",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fix, problem, verification};

    #[test]
    fn every_type_meets_minimum_coverage() {
        let evolver = BenchmarkEvolver::new();
        for problem_type in ProblemType::ALL {
            let evolution = evolver.evolve_benchmark(
                &problem("PROB-4", problem_type),
                &fix("FIX-9", "PROB-4", "HYP-1-A"),
                &verification("FIX-9", true, true, true),
            );
            assert!(evolution.new_tests.len() >= 2, "{problem_type}");
            assert!(!evolution.regression_guards.is_empty(), "{problem_type}");
            assert!(!evolution.variant_tests.is_empty(), "{problem_type}");
            assert!(!evolution.coverage_gaps.is_empty(), "{problem_type}");
            assert!(
                evolution
                    .coverage_gaps
                    .iter()
                    .all(|gap| !gap.suggested_tests.is_empty())
            );
        }
    }

    #[test]
    fn regression_guard_embeds_fix_id() {
        let evolution = BenchmarkEvolver::new().evolve_benchmark(
            &problem("PROB-4", ProblemType::TestFailure),
            &fix("FIX-9", "PROB-4", "HYP-1-A"),
            &verification("FIX-9", true, true, true),
        );
        let guard = &evolution.regression_guards[0];
        assert_eq!(guard.category, TestCategory::RegressionGuard);
        assert!(guard.code.contains("FIX-9"));
        assert!(guard.code.contains("#[test]"));
        assert!(!evolution.new_tests[0].code.contains("FIX-9"));
    }

    #[test]
    fn ids_are_numbered_per_problem() {
        let evolution = BenchmarkEvolver::new().evolve_benchmark(
            &problem("PROB-4", ProblemType::Regression),
            &fix("FIX-9", "PROB-4", "HYP-1-A"),
            &verification("FIX-9", true, true, true),
        );
        assert_eq!(evolution.new_tests[0].id, "BENCH-PROB-4-1");
        assert_eq!(evolution.new_tests[1].id, "BENCH-PROB-4-2");
        assert_eq!(evolution.regression_guards[0].id, "BENCH-PROB-4-3");
        assert_eq!(evolution.variant_tests[0].id, "BENCH-PROB-4-4");
        assert_eq!(evolution.new_tests[0].target_file, "tests/benchmarks/prob_4.rs");
        assert_eq!(evolution.new_tests[0].name, "matches_recorded_baseline_prob_4");
    }
}
