//! Plan decomposition: pseudo-code sketch, then plan graph, then validation.

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::code::extract_code_block;
use crate::core::extract::extract_structured;
use crate::core::plan_validator::{PlanOutcome, check_and_rectify};
use crate::core::types::TaskSignature;
use crate::io::model::ModelClient;
use crate::io::prompt::PromptBuilder;

/// Two-call decomposition of a task into a validated [`Plan`](crate::core::types::Plan).
#[derive(Debug, Clone)]
pub struct PlanDecomposer {
    builder: PromptBuilder,
}

impl PlanDecomposer {
    pub fn new(prompt_budget_bytes: usize) -> Self {
        Self {
            builder: PromptBuilder::new(prompt_budget_bytes),
        }
    }

    /// Model call and template failures are errors; a bad plan is a
    /// rejected [`PlanOutcome`] whose error text can be fed back as feedback.
    #[instrument(skip_all, fields(func = %signature.func_name))]
    pub fn decompose<M: ModelClient>(
        &self,
        model: &M,
        signature: &TaskSignature,
        feedback: Option<&str>,
    ) -> Result<PlanOutcome> {
        let prompt = self
            .builder
            .build_plan_sketch(signature, feedback)
            .context("build plan sketch prompt")?;
        let response = model
            .complete(prompt.as_str())
            .context("request plan sketch")?;
        let sketch = match extract_code_block(&response) {
            Ok(block) => block.to_string(),
            Err(_) => {
                debug!("plan sketch had no code fence, using raw response");
                response.trim().to_string()
            }
        };
        self.plan_from_sketch(model, signature, &sketch)
    }

    /// Ask for the plan graph realizing `sketch` and validate it.
    #[instrument(skip_all, fields(func = %signature.func_name))]
    pub fn plan_from_sketch<M: ModelClient>(
        &self,
        model: &M,
        signature: &TaskSignature,
        sketch: &str,
    ) -> Result<PlanOutcome> {
        let prompt = self
            .builder
            .build_plan_graph(signature, sketch)
            .context("build plan graph prompt")?;
        let response = model
            .complete(prompt.as_str())
            .context("request plan graph")?;

        let outcome = match extract_structured(&response) {
            Ok(raw) => check_and_rectify(&raw, signature),
            Err(err) => PlanOutcome::rejected(err),
        };
        match &outcome.plan {
            Some(plan) => info!(steps = plan.nodes.len(), "plan accepted"),
            None => warn!(error = %outcome.error_text, "plan rejected"),
        }
        Ok(outcome)
    }
}
