//! Plan validation entry point.
//!
//! Validation is a pure transform from a decoded model response to an
//! immutable [`Plan`]. Each stage short-circuits, so a rejected plan never
//! yields a partial result.

use serde_json::Value;
use tracing::debug;

use crate::core::edge_endpoints::resolve_edges;
use crate::core::errors::PlanError;
use crate::core::plan_schema::{check_required_fields, check_shape, prune_and_decode};
use crate::core::rectify::rectify;
use crate::core::types::{Plan, TaskSignature};

/// Validate and rectify a raw plan against the owning task contract.
///
/// Stages: shape, required fields, endpoint resolution, field pruning and
/// typed decoding, rectification.
pub fn validate_plan(raw: &Value, signature: &TaskSignature) -> Result<Plan, PlanError> {
    let raw_plan = check_shape(raw)?;
    check_required_fields(&raw_plan.nodes)?;
    let edges = resolve_edges(&raw_plan.nodes, &raw_plan.edges)?;
    let nodes = prune_and_decode(raw_plan.nodes)?;
    let plan = rectify(nodes, edges, signature)?;
    debug!(
        nodes = plan.nodes.len(),
        edges = plan.edges.len(),
        "plan validated"
    );
    Ok(plan)
}

/// `(plan, error_text)` handed to the synthesis loop.
///
/// `plan` is `None` exactly when `error_text` is non-empty.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanOutcome {
    pub plan: Option<Plan>,
    pub error_text: String,
}

impl PlanOutcome {
    pub fn accepted(plan: Plan) -> Self {
        Self {
            plan: Some(plan),
            error_text: String::new(),
        }
    }

    pub fn rejected(error: impl ToString) -> Self {
        Self {
            plan: None,
            error_text: error.to_string(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.plan.is_some()
    }
}

impl<E: ToString> From<Result<Plan, E>> for PlanOutcome {
    fn from(result: Result<Plan, E>) -> Self {
        match result {
            Ok(plan) => PlanOutcome::accepted(plan),
            Err(err) => PlanOutcome::rejected(err),
        }
    }
}

/// Validate and fold the result into a [`PlanOutcome`].
pub fn check_and_rectify(raw: &Value, signature: &TaskSignature) -> PlanOutcome {
    validate_plan(raw, signature).into()
}
