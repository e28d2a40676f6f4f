//! Fix generation: score per-type fix templates against a supported hypothesis.

use minijinja::context;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::agents::render::StubEngine;
use crate::agents::{Agent, AgentDescriptor, AgentType, Lifecycle, QualityTier};
use crate::core::ids::IdSequence;
use crate::core::keywords::{extract_paths, significant_words, slugify, word_overlap};
use crate::core::types::{
    ChangeType, FileChange, Fix, Hypothesis, HypothesisTestResult, Problem, ProblemType,
};

struct FixTemplate {
    category: &'static str,
    description: &'static str,
    change_type: ChangeType,
    file_pattern: &'static str,
    rationale: &'static str,
    prediction: &'static str,
}

const TEST_FAILURE_FIXES: &[FixTemplate] = &[
    FixTemplate {
        category: "assertion",
        description: "Correct the implementation so the failing assertion holds",
        change_type: ChangeType::Modify,
        file_pattern: "src/lib.rs",
        rationale: "The assertion encodes intended behavior that the implementation drifted from.",
        prediction: "The failing test passes without changing its assertion.",
    },
    FixTemplate {
        category: "guard",
        description: "Handle the error path that aborts the test",
        change_type: ChangeType::Modify,
        file_pattern: "src/lib.rs",
        rationale: "An unhandled error stops execution before the assertions run.",
        prediction: "The test reaches its assertions and passes.",
    },
    FixTemplate {
        category: "regression_test",
        description: "Add a focused test reproducing the failing behavior",
        change_type: ChangeType::Create,
        file_pattern: "tests/regression.rs",
        rationale: "A narrow reproduction pins the failure for the next change.",
        prediction: "The new test fails before the fix and passes after it.",
    },
];

const REGRESSION_FIXES: &[FixTemplate] = &[
    FixTemplate {
        category: "revert",
        description: "Revert the change that altered output against the baseline",
        change_type: ChangeType::Modify,
        file_pattern: "src/lib.rs",
        rationale: "Restoring the previous logic restores the baseline output.",
        prediction: "Actual output matches the expected baseline again.",
    },
    FixTemplate {
        category: "config",
        description: "Pin the dependency version or configuration that changed behavior",
        change_type: ChangeType::Modify,
        file_pattern: "Cargo.toml",
        rationale: "An unpinned upgrade shifted behavior underneath unchanged code.",
        prediction: "With the previous version pinned the regression disappears.",
    },
    FixTemplate {
        category: "baseline",
        description: "Update the stale baseline to the intended output",
        change_type: ChangeType::Modify,
        file_pattern: "tests/fixtures/baseline.json",
        rationale: "The behavior change was intended and the baseline lagged behind.",
        prediction: "The regression check passes against the refreshed baseline.",
    },
];

const HALLUCINATION_FIXES: &[FixTemplate] = &[
    FixTemplate {
        category: "grounding",
        description: "Require answers to be grounded in retrieved context",
        change_type: ChangeType::Modify,
        file_pattern: "src/prompt.rs",
        rationale: "Answers constrained to retrieved context cannot invent unsupported facts.",
        prediction: "The probe answer matches the expected grounded answer.",
    },
    FixTemplate {
        category: "retrieval",
        description: "Improve retrieval so the query returns the relevant source",
        change_type: ChangeType::Modify,
        file_pattern: "src/retrieval.rs",
        rationale: "Better recall gives generation the facts it was missing.",
        prediction: "The retrieved context for the probe query contains the expected facts.",
    },
    FixTemplate {
        category: "refusal",
        description: "Refuse to answer when no supporting source is found",
        change_type: ChangeType::Modify,
        file_pattern: "src/answer.rs",
        rationale: "Declining is safer than answering without evidence.",
        prediction: "Unsupported probes receive an explicit refusal.",
    },
];

const PERFORMANCE_GAP_FIXES: &[FixTemplate] = &[
    FixTemplate {
        category: "tuning",
        description: "Tune the treatment to close the improvement shortfall",
        change_type: ChangeType::Modify,
        file_pattern: "src/config.rs",
        rationale: "The treatment moves in the right direction but not far enough.",
        prediction: "The treatment score clears control plus the required improvement.",
    },
    FixTemplate {
        category: "revert",
        description: "Restore control behavior for scenarios the treatment regressed",
        change_type: ChangeType::Modify,
        file_pattern: "src/lib.rs",
        rationale: "Losses on some scenarios cancel out the gains elsewhere.",
        prediction: "Per-scenario scores no longer drop below control.",
    },
    FixTemplate {
        category: "config",
        description: "Enable the change under test in the treatment configuration",
        change_type: ChangeType::Modify,
        file_pattern: "config/treatment.toml",
        rationale: "A treatment that silently runs the control path cannot show lift.",
        prediction: "The treatment run exercises the new behavior and its score rises.",
    },
];

const INCONSISTENCY_FIXES: &[FixTemplate] = &[
    FixTemplate {
        category: "determinism",
        description: "Make the answer deterministic across equivalent variants",
        change_type: ChangeType::Modify,
        file_pattern: "src/generate.rs",
        rationale: "Equivalent inputs should follow one reasoning path.",
        prediction: "Every variant receives the same answer.",
    },
    FixTemplate {
        category: "normalization",
        description: "Normalize equivalent variants before answering",
        change_type: ChangeType::Modify,
        file_pattern: "src/normalize.rs",
        rationale: "Superficial differences in wording should not reach the model.",
        prediction: "Normalized variants map to one query and one answer.",
    },
    FixTemplate {
        category: "sampling",
        description: "Lower sampling temperature to stabilize the answer",
        change_type: ChangeType::Modify,
        file_pattern: "config/model.toml",
        rationale: "Sampling noise alone can produce divergent answers.",
        prediction: "Repeated answers for the same variant stop diverging.",
    },
];

fn templates_for(problem_type: ProblemType) -> &'static [FixTemplate] {
    match problem_type {
        ProblemType::TestFailure => TEST_FAILURE_FIXES,
        ProblemType::Regression => REGRESSION_FIXES,
        ProblemType::Hallucination => HALLUCINATION_FIXES,
        ProblemType::PerformanceGap => PERFORMANCE_GAP_FIXES,
        ProblemType::Inconsistency => INCONSISTENCY_FIXES,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixGenerationResult {
    pub problem_id: String,
    pub hypothesis_id: String,
    pub fixes: Vec<Fix>,
    pub preferred: String,
    pub alternatives: Vec<String>,
}

#[derive(Debug)]
pub struct FixGenerator {
    max_fixes: usize,
    ids: IdSequence,
    stubs: StubEngine,
    lifecycle: Lifecycle,
}

impl Default for FixGenerator {
    fn default() -> Self {
        Self::new(3)
    }
}

impl FixGenerator {
    pub fn new(max_fixes: usize) -> Self {
        Self {
            max_fixes: max_fixes.max(1),
            ids: IdSequence::new(),
            stubs: StubEngine::new(),
            lifecycle: Lifecycle::default(),
        }
    }

    /// Candidate fixes for a supported hypothesis, best first.
    ///
    /// Always yields at least one fix: when no template relates to the
    /// hypothesis, a single generic fix is derived from its statement.
    #[instrument(skip_all, fields(problem = %problem.id, hypothesis = %hypothesis.id))]
    pub fn generate_fix(
        &self,
        problem: &Problem,
        hypothesis: &Hypothesis,
        test_result: &HypothesisTestResult,
    ) -> FixGenerationResult {
        let mut scored: Vec<(f64, &FixTemplate)> = templates_for(problem.problem_type)
            .iter()
            .filter_map(|template| {
                let relevance = relevance(template, hypothesis, test_result);
                (relevance > 0).then(|| {
                    (
                        relevance as f64 + test_result.confidence * 5.0,
                        template,
                    )
                })
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        let fixes: Vec<Fix> = if scored.is_empty() {
            debug!("no fix template matched, using generic fix");
            vec![self.generic_fix(problem, hypothesis)]
        } else {
            scored
                .into_iter()
                .take(self.max_fixes)
                .map(|(score, template)| {
                    debug!(category = template.category, score, "fix template selected");
                    self.materialize(template, problem, hypothesis)
                })
                .collect()
        };

        let preferred = fixes[0].id.clone();
        let alternatives = fixes[1..].iter().map(|fix| fix.id.clone()).collect();
        FixGenerationResult {
            problem_id: problem.id.clone(),
            hypothesis_id: hypothesis.id.clone(),
            fixes,
            preferred,
            alternatives,
        }
    }

    fn materialize(&self, template: &FixTemplate, problem: &Problem, hypothesis: &Hypothesis) -> Fix {
        let file_path = match template.change_type {
            ChangeType::Create => template.file_pattern.to_string(),
            ChangeType::Modify | ChangeType::Delete => {
                infer_file_path(problem, hypothesis).unwrap_or_else(|| template.file_pattern.to_string())
            }
        };
        let id = format!("FIX-{}", self.ids.next());
        let (before, after) = self.snippets(
            template.category,
            template.change_type,
            &file_path,
            template.description,
            template.prediction,
            problem,
            hypothesis,
        );
        Fix {
            id,
            problem_id: problem.id.clone(),
            hypothesis_id: hypothesis.id.clone(),
            description: template.description.to_string(),
            changes: vec![FileChange {
                file_path,
                change_type: template.change_type,
                before,
                after,
                description: format!("{} ({})", template.description, template.category),
            }],
            rationale: format!("{} Hypothesis: {}", template.rationale, hypothesis.statement),
            prediction: template.prediction.to_string(),
        }
    }

    fn generic_fix(&self, problem: &Problem, hypothesis: &Hypothesis) -> Fix {
        let file_path = infer_file_path(problem, hypothesis).unwrap_or_else(|| "src/lib.rs".to_string());
        let description = format!("Address: {}", hypothesis.statement);
        let (before, after) = self.snippets(
            "generic",
            ChangeType::Modify,
            &file_path,
            &description,
            &hypothesis.prediction,
            problem,
            hypothesis,
        );
        Fix {
            id: format!("FIX-{}", self.ids.next()),
            problem_id: problem.id.clone(),
            hypothesis_id: hypothesis.id.clone(),
            changes: vec![FileChange {
                file_path,
                change_type: ChangeType::Modify,
                before,
                after,
                description: description.clone(),
            }],
            description,
            rationale: hypothesis.rationale.clone(),
            prediction: hypothesis.prediction.clone(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn snippets(
        &self,
        category: &str,
        change_type: ChangeType,
        file_path: &str,
        description: &str,
        prediction: &str,
        problem: &Problem,
        hypothesis: &Hypothesis,
    ) -> (Option<String>, Option<String>) {
        let observed = problem
            .evidence
            .first()
            .map_or(problem.description.as_str(), String::as_str);
        let ctx = context! {
            category => category,
            file_path => file_path,
            description => description,
            prediction => prediction,
            observed => observed,
            problem_id => problem.id.as_str(),
            hypothesis => hypothesis.statement.as_str(),
            slug => slugify(&problem.description),
        };
        let render = |name: &str| match self.stubs.render(name, ctx.clone()) {
            Ok(rendered) => Some(rendered),
            Err(err) => {
                warn!(template = name, err = %err, "failed to render fix snippet");
                None
            }
        };
        match change_type {
            ChangeType::Modify => (render("fix_before"), render("fix_after")),
            ChangeType::Create => (None, render("fix_after")),
            ChangeType::Delete => (render("fix_before"), None),
        }
    }
}

impl Agent for FixGenerator {
    fn descriptor(&self) -> AgentDescriptor {
        AgentDescriptor::new(
            AgentType::FixGenerator,
            "Fix Generator",
            &["template_fixes", "fix_ranking", "file_path_inference"],
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

/// Word and evidence component of a template's score.
fn relevance(template: &FixTemplate, hypothesis: &Hypothesis, test_result: &HypothesisTestResult) -> usize {
    let template_words = significant_words(template.description);
    let shared = word_overlap(template.description, &hypothesis.statement);
    let evidence_hits = test_result
        .evidence
        .iter()
        .filter(|item| {
            let finding = significant_words(&item.finding);
            let implication = significant_words(&item.implication);
            template_words
                .iter()
                .any(|word| finding.contains(word) || implication.contains(word))
        })
        .count();
    shared * 2 + evidence_hits * 3
}

/// Explicit path in the reproduction or evidence, then the hypothesis target.
fn infer_file_path(problem: &Problem, hypothesis: &Hypothesis) -> Option<String> {
    problem
        .minimal_reproduction
        .iter()
        .chain(problem.evidence.iter())
        .chain(std::iter::once(&hypothesis.test.target))
        .find_map(|text| extract_paths(text).into_iter().next())
}
