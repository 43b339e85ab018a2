//! Per-step test case spawning.
//!
//! One fill-in prompt is sent `batch_size` times. Each completion is an
//! independent sample: extracted, decoded, checked against the whole-task
//! examples and folded into the accumulated suites in sample order. Failures
//! only exclude their own sample.

use std::collections::BTreeMap;

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::extract::extract_structured;
use crate::core::test_cases::{
    FilterOutcome, build_skeleton, combine_suites, decode_suites, filter_suites, to_case_map,
};
use crate::core::types::{NodeTestSuite, Plan, TestCase};
use crate::io::model::ModelClient;
use crate::io::prompt::PromptBuilder;

/// Settings for a spawn round.
#[derive(Debug, Clone)]
pub struct SpawnerConfig {
    pub prompt_budget_bytes: usize,
    pub batch_size: usize,
    pub unique: bool,
}

/// Per-step test cases plus every diagnostic collected on the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpawnReport {
    pub cases: BTreeMap<String, Vec<TestCase>>,
    pub diagnostics: Vec<String>,
    pub accepted_samples: usize,
}

impl SpawnReport {
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Diagnostics newline-joined; empty when every sample was clean.
    pub fn error_text(&self) -> String {
        self.diagnostics.join("\n")
    }
}

#[derive(Debug, Clone)]
pub struct TestCaseSpawner {
    config: SpawnerConfig,
}

impl TestCaseSpawner {
    pub fn new(config: SpawnerConfig) -> Self {
        Self { config }
    }

    #[instrument(skip_all, fields(steps = plan.nodes.len(), examples = examples.len(), batch = self.config.batch_size))]
    pub fn spawn<M: ModelClient>(
        &self,
        model: &M,
        plan: &Plan,
        examples: &[TestCase],
    ) -> SpawnReport {
        let mut report = SpawnReport::default();
        if plan.is_empty() {
            report
                .diagnostics
                .push("Error in spawning test cases: plan has no steps".to_string());
            return report;
        }

        let skeleton = build_skeleton(plan, examples);
        let prompt = match PromptBuilder::new(self.config.prompt_budget_bytes)
            .build_spawn_tests(plan, &skeleton)
        {
            Ok(pack) => pack.render(),
            Err(err) => {
                warn!(error = %err, "spawn prompt failed to render");
                report
                    .diagnostics
                    .push(format!("Error in spawning test cases: {err}"));
                return report;
            }
        };

        let prompts = vec![prompt; self.config.batch_size.max(1)];
        let mut acc: Option<Vec<NodeTestSuite>> = None;

        for (sample, result) in model.complete_batch(&prompts).into_iter().enumerate() {
            let outcome = match sample_suites(result, plan, examples) {
                Ok(outcome) => outcome,
                Err(message) => {
                    warn!(sample, %message, "spawn sample failed");
                    report
                        .diagnostics
                        .push(format!("Error in spawning test cases: {message}"));
                    continue;
                }
            };
            report
                .diagnostics
                .extend(outcome.rejections.iter().map(ToString::to_string));
            if outcome.is_empty() {
                warn!(sample, "spawn sample matched no example");
                continue;
            }

            let rows = outcome.kept.first().map_or(0, |suite| suite.inputs.len());
            let combined = match &acc {
                None => outcome.kept,
                Some(prior) => {
                    match combine_suites(prior.clone(), &outcome.kept, self.config.unique) {
                        Ok(combined) => combined,
                        Err(err) => {
                            warn!(sample, error = %err, "spawn sample could not be combined");
                            report
                                .diagnostics
                                .push(format!("Error in spawning test cases: {err}"));
                            continue;
                        }
                    }
                }
            };
            acc = Some(combined);
            report.accepted_samples += 1;
            info!(sample, rows, "spawn sample accepted");
        }

        if let Some(suites) = acc {
            report.cases = to_case_map(suites);
        }
        report
    }
}

fn sample_suites(
    response: Result<String>,
    plan: &Plan,
    examples: &[TestCase],
) -> Result<FilterOutcome, String> {
    let response = response.map_err(|err| format!("{err:#}"))?;
    let value = extract_structured(&response).map_err(|err| err.to_string())?;
    let suites = decode_suites(value, plan).map_err(|err| err.to_string())?;
    Ok(filter_suites(&suites, examples))
}
