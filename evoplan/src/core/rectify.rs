//! Rectification of a decoded plan against its owning task contract.
//!
//! - Nodes named like the enclosing function (or unnamed) are dropped, along
//!   with every edge touching them.
//! - Duplicate names collapse last-write-wins: the node keeps the position of
//!   its first occurrence and the contents of its last.
//! - Start nodes must take the task's input types and end nodes must return
//!   its output types. Differing names are rewritten; differing types reject
//!   the whole plan.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::core::errors::PlanError;
use crate::core::types::{Plan, PlanEdge, PlanNode, TaskSignature};

/// Produce the rectified plan, or every boundary mismatch found.
pub fn rectify(
    nodes: Vec<PlanNode>,
    edges: Vec<PlanEdge>,
    signature: &TaskSignature,
) -> Result<Plan, PlanError> {
    let (nodes, removed) = dedup_nodes(nodes, &signature.func_name);
    let edges: Vec<PlanEdge> = edges
        .into_iter()
        .filter(|edge| !removed.contains(&edge.source) && !removed.contains(&edge.target))
        .collect();

    let mut plan = Plan { nodes, edges };
    if plan.is_empty() {
        return Err(PlanError::Shape(
            "plan has no steps besides the enclosing task".to_string(),
        ));
    }

    let starts: HashSet<String> = plan.start_nodes().into_iter().map(str::to_string).collect();
    let ends: HashSet<String> = plan.end_nodes().into_iter().map(str::to_string).collect();

    let mut errors = Vec::new();
    for node in &mut plan.nodes {
        if starts.contains(&node.name) {
            if node.input_types != signature.input_types {
                errors.push(format!(
                    "Start node {} has incompatible input types: expected {:?}, got {:?}",
                    node.name, signature.input_types, node.input_types
                ));
            } else if node.inputs != signature.inputs {
                debug!(node = %node.name, from = ?node.inputs, to = ?signature.inputs, "rewrote start node inputs");
                node.inputs = signature.inputs.clone();
            }
        }
        if ends.contains(&node.name) {
            if node.output_types != signature.output_types {
                errors.push(format!(
                    "End node {} has incompatible output types: expected {:?}, got {:?}",
                    node.name, signature.output_types, node.output_types
                ));
            } else if node.outputs != signature.outputs {
                debug!(node = %node.name, from = ?node.outputs, to = ?signature.outputs, "rewrote end node outputs");
                node.outputs = signature.outputs.clone();
            }
        }
    }

    if errors.is_empty() {
        Ok(plan)
    } else {
        Err(PlanError::TypeMismatch(errors))
    }
}

/// Returns surviving nodes and the names that were removed outright.
fn dedup_nodes(nodes: Vec<PlanNode>, reserved: &str) -> (Vec<PlanNode>, HashSet<String>) {
    let mut kept: Vec<PlanNode> = Vec::with_capacity(nodes.len());
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut removed = HashSet::new();

    for node in nodes {
        if node.name.is_empty() || node.name == reserved {
            debug!(node = %node.name, "dropped enclosing-task node");
            removed.insert(node.name);
            continue;
        }
        match positions.get(&node.name) {
            Some(&idx) => {
                debug!(node = %node.name, "duplicate node name, keeping last");
                kept[idx] = node;
            }
            None => {
                positions.insert(node.name.clone(), kept.len());
                kept.push(node);
            }
        }
    }

    (kept, removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{plan_node, signature};

    fn sig() -> TaskSignature {
        signature(&["x"], &["str"], &["y"], &["int"])
    }

    #[test]
    fn mismatched_start_types_reject_the_plan() {
        let nodes = vec![plan_node("only", &["x"], &["int"], &["y"], &["int"])];
        let err = rectify(nodes, Vec::new(), &sig()).unwrap_err();
        assert!(matches!(err, PlanError::TypeMismatch(_)));
        assert!(err.to_string().contains("Start node only has incompatible input types"));
    }

    #[test]
    fn differing_boundary_names_are_rewritten() {
        let nodes = vec![
            plan_node("first", &["y_in"], &["str"], &["mid"], &["float"]),
            plan_node("last", &["mid"], &["float"], &["result"], &["int"]),
        ];
        let edges = vec![PlanEdge::new("first", "last")];
        let plan = rectify(nodes, edges, &sig()).expect("rectify");
        assert_eq!(plan.nodes[0].inputs, vec!["x".to_string()]);
        assert_eq!(plan.nodes[0].outputs, vec!["mid".to_string()]);
        assert_eq!(plan.nodes[1].inputs, vec!["mid".to_string()]);
        assert_eq!(plan.nodes[1].outputs, vec!["y".to_string()]);
    }

    #[test]
    fn enclosing_task_node_and_its_edges_are_dropped() {
        let sig = sig();
        let nodes = vec![
            plan_node(&sig.func_name, &["x"], &["str"], &["y"], &["int"]),
            plan_node("step", &["x"], &["str"], &["y"], &["int"]),
        ];
        let edges = vec![PlanEdge::new(sig.func_name.clone(), "step")];
        let plan = rectify(nodes, edges, &sig).expect("rectify");
        assert_eq!(plan.nodes.len(), 1);
        assert_eq!(plan.nodes[0].name, "step");
        assert!(plan.edges.is_empty());
    }

    #[test]
    fn duplicate_names_keep_first_position_and_last_contents() {
        let mut late = plan_node("a", &["x"], &["str"], &["m"], &["str"]);
        late.task = "late".to_string();
        let nodes = vec![
            plan_node("a", &["x"], &["str"], &["m"], &["str"]),
            plan_node("b", &["m"], &["str"], &["y"], &["int"]),
            late,
        ];
        let edges = vec![PlanEdge::new("a", "b")];
        let plan = rectify(nodes, edges, &sig()).expect("rectify");
        assert_eq!(plan.nodes.len(), 2);
        assert_eq!(plan.nodes[0].name, "a");
        assert_eq!(plan.nodes[0].task, "late");
        assert_eq!(plan.edges, vec![PlanEdge::new("a", "b")]);
    }

    #[test]
    fn plan_of_only_the_enclosing_task_is_rejected() {
        let sig = sig();
        let nodes = vec![plan_node(&sig.func_name, &["x"], &["str"], &["y"], &["int"])];
        let err = rectify(nodes, Vec::new(), &sig).unwrap_err();
        assert!(matches!(err, PlanError::Shape(_)));
    }
}
