//! Hypothesis generation from fixed per-type template tables.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::agents::{Agent, AgentDescriptor, AgentType, Lifecycle, QualityTier};
use crate::core::ids::{IdSequence, letter_suffix};
use crate::core::keywords::extract_paths;
use crate::core::types::{Hypothesis, HypothesisTest, Likelihood, Problem, ProblemType, TestType};

struct HypothesisTemplate {
    statement: &'static str,
    rationale: &'static str,
    prediction: &'static str,
    test_type: TestType,
    expected: &'static str,
    likelihood: Likelihood,
}

const TEST_FAILURE_TEMPLATES: &[HypothesisTemplate] = &[
    HypothesisTemplate {
        statement: "An assertion in the failing test no longer holds for the current implementation",
        rationale: "Most test failures are assertion mismatches between expected and actual values.",
        prediction: "Re-running the test reproduces the same assertion failure.",
        test_type: TestType::TestRun,
        expected: "assertion failed",
        likelihood: Likelihood::High,
    },
    HypothesisTemplate {
        statement: "The code under test changed its behavior or signature",
        rationale: "A changed contract surfaces as a type mismatch or an unexpected error.",
        prediction: "The implicated source file shows a recent change to the tested function.",
        test_type: TestType::CodeInspection,
        expected: "type mismatch error",
        likelihood: Likelihood::Medium,
    },
    HypothesisTemplate {
        statement: "An error raised during setup or execution aborts the test",
        rationale: "Setup failures abort a test before its assertions run.",
        prediction: "The failure output contains an error raised outside the assertions.",
        test_type: TestType::LogAnalysis,
        expected: "error",
        likelihood: Likelihood::Medium,
    },
    HypothesisTemplate {
        statement: "The test depends on timing or ordering and is flaky",
        rationale: "Intermittent failures usually point at shared state or deadlines.",
        prediction: "Repeated runs alternate between passing and timing out.",
        test_type: TestType::Behavioral,
        expected: "timeout",
        likelihood: Likelihood::Low,
    },
];

const REGRESSION_TEMPLATES: &[HypothesisTemplate] = &[
    HypothesisTemplate {
        statement: "A recent change altered output that previously matched the baseline",
        rationale: "The same input now yields a different result than the recorded baseline.",
        prediction: "Comparing actual and expected output shows a deterministic difference.",
        test_type: TestType::Behavioral,
        expected: "actual output differs from expected baseline",
        likelihood: Likelihood::High,
    },
    HypothesisTemplate {
        statement: "A dependency or configuration upgrade changed behavior",
        rationale: "Upgrades shift defaults without any change to the calling code.",
        prediction: "The regression appears only after the version or config change.",
        test_type: TestType::LogAnalysis,
        expected: "version",
        likelihood: Likelihood::Medium,
    },
    HypothesisTemplate {
        statement: "The recorded baseline is stale and needs updating",
        rationale: "An intended behavior change can leave an outdated baseline behind.",
        prediction: "The new output is correct and the baseline predates the change.",
        test_type: TestType::CodeInspection,
        expected: "baseline",
        likelihood: Likelihood::Low,
    },
];

const HALLUCINATION_TEMPLATES: &[HypothesisTemplate] = &[
    HypothesisTemplate {
        statement: "The answer was produced without grounding in retrieved context",
        rationale: "Ungrounded answers fill gaps with plausible but wrong content.",
        prediction: "The actual answer cites nothing from the expected source.",
        test_type: TestType::Behavioral,
        expected: "actual answer not supported by expected source",
        likelihood: Likelihood::High,
    },
    HypothesisTemplate {
        statement: "Retrieval returned irrelevant or missing context for the query",
        rationale: "When retrieval misses, generation has nothing correct to ground on.",
        prediction: "The retrieved context for the query lacks the expected facts.",
        test_type: TestType::LogAnalysis,
        expected: "context",
        likelihood: Likelihood::Medium,
    },
    HypothesisTemplate {
        statement: "Prompt construction omits the relevant source material",
        rationale: "Context can be retrieved and then dropped before generation.",
        prediction: "The assembled prompt is missing the source passage.",
        test_type: TestType::CodeInspection,
        expected: "missing source",
        likelihood: Likelihood::Low,
    },
];

const PERFORMANCE_GAP_TEMPLATES: &[HypothesisTemplate] = &[
    HypothesisTemplate {
        statement: "The treatment does not deliver the required improvement over control",
        rationale: "The measured lift falls short of the minimum improvement threshold.",
        prediction: "The shortfall persists across repeated measurements.",
        test_type: TestType::LogAnalysis,
        expected: "shortfall",
        likelihood: Likelihood::High,
    },
    HypothesisTemplate {
        statement: "The treatment regressed scenarios the control handled",
        rationale: "Gains on some scenarios can be cancelled by losses on others.",
        prediction: "Per-scenario scores show losses relative to control.",
        test_type: TestType::Behavioral,
        expected: "score",
        likelihood: Likelihood::Medium,
    },
    HypothesisTemplate {
        statement: "The change under test is not active in the treatment configuration",
        rationale: "A treatment that silently falls back to control shows no lift.",
        prediction: "The treatment config does not enable the new behavior.",
        test_type: TestType::CodeInspection,
        expected: "config",
        likelihood: Likelihood::Low,
    },
];

const INCONSISTENCY_TEMPLATES: &[HypothesisTemplate] = &[
    HypothesisTemplate {
        statement: "Equivalent query variants take different reasoning paths",
        rationale: "Surface wording changes steer the model toward different answers.",
        prediction: "The answer differs across variants in a repeatable way.",
        test_type: TestType::Behavioral,
        expected: "answer differs across variants",
        likelihood: Likelihood::High,
    },
    HypothesisTemplate {
        statement: "Sampling nondeterminism makes the answer unstable",
        rationale: "Non-zero temperature produces divergent answers for one prompt.",
        prediction: "Re-asking the same variant yields inconsistent answers.",
        test_type: TestType::LogAnalysis,
        expected: "inconsistent",
        likelihood: Likelihood::Medium,
    },
    HypothesisTemplate {
        statement: "Input normalization treats equivalent variants differently",
        rationale: "Whitespace, casing, or punctuation handling can split equivalent inputs.",
        prediction: "Normalized variants map to different internal queries.",
        test_type: TestType::CodeInspection,
        expected: "variant",
        likelihood: Likelihood::Low,
    },
];

fn templates_for(problem_type: ProblemType) -> &'static [HypothesisTemplate] {
    match problem_type {
        ProblemType::TestFailure => TEST_FAILURE_TEMPLATES,
        ProblemType::Regression => REGRESSION_TEMPLATES,
        ProblemType::Hallucination => HALLUCINATION_TEMPLATES,
        ProblemType::PerformanceGap => PERFORMANCE_GAP_TEMPLATES,
        ProblemType::Inconsistency => INCONSISTENCY_TEMPLATES,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub problem_id: String,
    /// Template declaration order.
    pub hypotheses: Vec<Hypothesis>,
    /// Hypothesis ids, most likely first.
    pub ranked_by_likelihood: Vec<String>,
}

impl GenerationResult {
    /// Hypotheses in ranked order.
    pub fn ranked(&self) -> impl Iterator<Item = &Hypothesis> {
        self.ranked_by_likelihood
            .iter()
            .filter_map(|id| self.hypotheses.iter().find(|h| &h.id == id))
    }
}

#[derive(Debug, Default)]
pub struct HypothesisGenerator {
    ids: IdSequence,
    lifecycle: Lifecycle,
}

impl HypothesisGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(skip_all, fields(problem = %problem.id, problem_type = %problem.problem_type))]
    pub fn generate_hypotheses(&self, problem: &Problem) -> GenerationResult {
        let seq = self.ids.next();
        let hypotheses: Vec<Hypothesis> = templates_for(problem.problem_type)
            .iter()
            .enumerate()
            .map(|(index, template)| Hypothesis {
                id: format!("HYP-{seq}-{}", letter_suffix(index)),
                statement: template.statement.to_string(),
                rationale: format!("{} Observed: {}", template.rationale, problem.description),
                prediction: template.prediction.to_string(),
                test: HypothesisTest {
                    test_type: template.test_type,
                    target: test_target(template.test_type, problem),
                    expected: template.expected.to_string(),
                },
                likelihood: template.likelihood,
            })
            .collect();

        let mut ranked: Vec<&Hypothesis> = hypotheses.iter().collect();
        ranked.sort_by_key(|h| h.likelihood.rank());
        let ranked_by_likelihood = ranked.into_iter().map(|h| h.id.clone()).collect();

        debug!(count = hypotheses.len(), "hypotheses generated");
        GenerationResult {
            problem_id: problem.id.clone(),
            hypotheses,
            ranked_by_likelihood,
        }
    }
}

impl Agent for HypothesisGenerator {
    fn descriptor(&self) -> AgentDescriptor {
        AgentDescriptor::new(
            AgentType::HypothesisGenerator,
            "Hypothesis Generator",
            &["template_hypotheses", "likelihood_ranking"],
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

fn test_target(test_type: TestType, problem: &Problem) -> String {
    match test_type {
        TestType::TestRun => problem.minimal_reproduction.clone().unwrap_or_default(),
        TestType::CodeInspection => problem
            .minimal_reproduction
            .iter()
            .chain(problem.evidence.iter())
            .find_map(|text| extract_paths(text).into_iter().next())
            .unwrap_or_else(|| "source".to_string()),
        TestType::LogAnalysis | TestType::Behavioral | TestType::Unknown => {
            "problem evidence".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::problem;

    #[test]
    fn every_type_has_three_templates_and_a_high_first() {
        let generator = HypothesisGenerator::new();
        for problem_type in ProblemType::ALL {
            let result = generator.generate_hypotheses(&problem("PROB-1", problem_type));
            assert!(result.hypotheses.len() >= 3, "{problem_type}");
            let first = result.ranked().next().expect("ranked");
            assert_eq!(first.likelihood, Likelihood::High, "{problem_type}");
            assert_eq!(result.ranked_by_likelihood.len(), result.hypotheses.len());
        }
    }

    #[test]
    fn ranking_is_stable_within_a_tier() {
        let generator = HypothesisGenerator::new();
        let result = generator.generate_hypotheses(&problem("PROB-1", ProblemType::TestFailure));
        assert_eq!(
            result.ranked_by_likelihood,
            vec!["HYP-1-A", "HYP-1-B", "HYP-1-C", "HYP-1-D"]
        );

        let result = generator.generate_hypotheses(&problem("PROB-2", ProblemType::PerformanceGap));
        assert_eq!(
            result.ranked_by_likelihood,
            vec!["HYP-2-A", "HYP-2-B", "HYP-2-C"]
        );
    }

    #[test]
    fn targets_follow_test_type() {
        let mut failing = problem("PROB-1", ProblemType::TestFailure);
        failing.minimal_reproduction = Some("cargo test lexer".to_string());
        failing.evidence = vec!["stderr: panicked at src/lexer.rs:10:5".to_string()];
        let result = HypothesisGenerator::new().generate_hypotheses(&failing);

        let by_type = |test_type| {
            result
                .hypotheses
                .iter()
                .find(|h| h.test.test_type == test_type)
                .map(|h| h.test.target.clone())
                .expect("template present")
        };
        assert_eq!(by_type(TestType::TestRun), "cargo test lexer");
        assert_eq!(by_type(TestType::CodeInspection), "src/lexer.rs");
        assert_eq!(by_type(TestType::LogAnalysis), "problem evidence");
    }

    #[test]
    fn missing_reproduction_leaves_empty_run_target() {
        let result =
            HypothesisGenerator::new().generate_hypotheses(&problem("PROB-1", ProblemType::TestFailure));
        let run = result
            .hypotheses
            .iter()
            .find(|h| h.test.test_type == TestType::TestRun)
            .expect("test_run template");
        assert!(run.test.target.is_empty());
    }
}
