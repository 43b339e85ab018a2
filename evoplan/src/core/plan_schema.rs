//! Shape, field-completeness and field-pruning checks for raw plans.

use serde_json::{Map, Value};
use tracing::debug;

use crate::core::errors::PlanError;
use crate::core::types::PlanNode;

/// Keys every plan node must carry.
pub const REQUIRED_NODE_FIELDS: [&str; 8] = [
    "task",
    "name",
    "inputs",
    "input_types",
    "outputs",
    "output_types",
    "target",
    "mode",
];

/// Keys a plan node may carry in addition to the required ones.
pub const OPTIONAL_NODE_FIELDS: [&str; 3] = ["code", "reasoning", "fitness"];

/// Decoded plan before endpoint resolution: nodes stay untyped.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPlan {
    pub nodes: Vec<Map<String, Value>>,
    pub edges: Vec<RawEdge>,
}

/// Edge whose endpoints may be ids, task text or names.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEdge {
    pub source: Value,
    pub target: Value,
}

/// Require a mapping with `nodes` (mappings) and `edges` (mappings with
/// `source` and `target`).
pub fn check_shape(raw: &Value) -> Result<RawPlan, PlanError> {
    let Some(object) = raw.as_object() else {
        return Err(shape_error("must be a mapping with 'nodes' and 'edges' keys"));
    };
    let (Some(nodes), Some(edges)) = (object.get("nodes"), object.get("edges")) else {
        return Err(shape_error("must be a mapping with 'nodes' and 'edges' keys"));
    };
    let Some(nodes) = nodes.as_array() else {
        return Err(shape_error("'nodes' must be a list"));
    };
    let Some(edges) = edges.as_array() else {
        return Err(shape_error("'edges' must be a list"));
    };

    let nodes = nodes
        .iter()
        .enumerate()
        .map(|(idx, node)| {
            node.as_object()
                .cloned()
                .ok_or_else(|| shape_error(format!("node {idx} is not a mapping")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let edges = edges
        .iter()
        .enumerate()
        .map(|(idx, edge)| {
            let source = edge.get("source");
            let target = edge.get("target");
            match (source, target) {
                (Some(source), Some(target)) => Ok(RawEdge {
                    source: source.clone(),
                    target: target.clone(),
                }),
                _ => Err(shape_error(format!(
                    "edge {idx} must be a mapping with 'source' and 'target'"
                ))),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RawPlan { nodes, edges })
}

/// Every node must carry all required keys; report every offender.
pub fn check_required_fields(nodes: &[Map<String, Value>]) -> Result<(), PlanError> {
    let errors: Vec<String> = nodes
        .iter()
        .filter_map(|node| {
            let missing: Vec<&str> = REQUIRED_NODE_FIELDS
                .iter()
                .copied()
                .filter(|key| !node.contains_key(*key))
                .collect();
            (!missing.is_empty()).then(|| {
                format!(
                    "Planning Node {} is missing required keys: {}",
                    node_label(node),
                    missing.join(", ")
                )
            })
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(PlanError::Schema(errors))
    }
}

/// Drop keys outside the required and optional sets. Returns dropped keys.
pub fn prune_fields(node: &mut Map<String, Value>) -> Vec<String> {
    let dropped: Vec<String> = node
        .keys()
        .filter(|key| {
            !REQUIRED_NODE_FIELDS.contains(&key.as_str())
                && !OPTIONAL_NODE_FIELDS.contains(&key.as_str())
        })
        .cloned()
        .collect();
    for key in &dropped {
        node.remove(key);
    }
    dropped
}

/// Drop optional keys whose value has the wrong type. Returns dropped keys.
pub fn drop_malformed_optionals(node: &mut Map<String, Value>) -> Vec<String> {
    let malformed: Vec<String> = OPTIONAL_NODE_FIELDS
        .iter()
        .filter(|key| match node.get(**key) {
            None | Some(Value::Null) => false,
            Some(value) if **key == "fitness" => !value.is_number(),
            Some(value) => !value.is_string(),
        })
        .map(|key| (*key).to_string())
        .collect();
    for key in &malformed {
        node.remove(key);
    }
    malformed
}

/// Prune then decode every node into a typed [`PlanNode`]. Optional fields
/// never reject a node.
pub fn prune_and_decode(nodes: Vec<Map<String, Value>>) -> Result<Vec<PlanNode>, PlanError> {
    let mut errors = Vec::new();
    let mut decoded = Vec::with_capacity(nodes.len());
    for mut node in nodes {
        let dropped = prune_fields(&mut node);
        if !dropped.is_empty() {
            debug!(node = %node_label(&node), ?dropped, "pruned plan node fields");
        }
        let malformed = drop_malformed_optionals(&mut node);
        if !malformed.is_empty() {
            debug!(node = %node_label(&node), ?malformed, "dropped malformed optional fields");
        }
        let label = node_label(&node);
        match serde_json::from_value::<PlanNode>(Value::Object(node)) {
            Ok(node) => decoded.push(node),
            Err(err) => errors.push(format!("Planning Node {label} has malformed fields: {err}")),
        }
    }
    if errors.is_empty() {
        Ok(decoded)
    } else {
        Err(PlanError::Schema(errors))
    }
}

pub(crate) fn node_label(node: &Map<String, Value>) -> String {
    node.get("name")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string()
}

fn shape_error(message: impl Into<String>) -> PlanError {
    PlanError::Shape(message.into())
}
