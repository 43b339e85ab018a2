//! Operator-driven generation of new individuals.

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use crate::core::code::parse_individual;
use crate::core::types::{Individual, Operator, TaskSignature};
use crate::io::model::ModelClient;
use crate::io::prompt::PromptBuilder;

#[derive(Debug, Clone)]
pub struct Evolver {
    builder: PromptBuilder,
}

impl Evolver {
    pub fn new(prompt_budget_bytes: usize) -> Self {
        Self {
            builder: PromptBuilder::new(prompt_budget_bytes),
        }
    }

    /// Produce one offspring. A response without code is an error.
    #[instrument(skip_all, fields(func = %signature.func_name, %operator, parents = parents.len()))]
    pub fn offspring<M: ModelClient>(
        &self,
        model: &M,
        signature: &TaskSignature,
        operator: Operator,
        parents: &[Individual],
        feedback: Option<&str>,
    ) -> Result<Individual> {
        let prompt = self
            .builder
            .build_operator(signature, operator, parents, feedback)
            .with_context(|| format!("build {operator} prompt"))?;
        let response = model
            .complete(prompt.as_str())
            .with_context(|| format!("request {operator} offspring"))?;
        let individual = parse_individual(&response);
        if individual.code.is_empty() {
            return Err(anyhow!("{operator} response carried no python code block"));
        }
        debug!(reasoning = %individual.reasoning, "offspring parsed");
        Ok(individual)
    }
}
