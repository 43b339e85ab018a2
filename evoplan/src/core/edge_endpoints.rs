//! Normalization of edge endpoints onto canonical node names.
//!
//! Models reference nodes by a transient `id`, by the literal `task` text, or
//! by `name`. Resolution priority is id, then task text, then name. Scalar ids
//! compare by their textual form, so `2` and `"2"` name the same node.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::core::errors::PlanError;
use crate::core::plan_schema::RawEdge;
use crate::core::types::PlanEdge;

/// Lookup tables built from raw nodes. Later nodes overwrite earlier ones.
#[derive(Debug, Clone, Default)]
pub struct EndpointIndex {
    by_id: HashMap<String, String>,
    by_task: HashMap<String, String>,
    names: HashSet<String>,
}

impl EndpointIndex {
    pub fn from_nodes(nodes: &[Map<String, Value>]) -> Self {
        let mut index = Self::default();
        for node in nodes {
            let Some(name) = node.get("name").and_then(Value::as_str) else {
                continue;
            };
            if let Some(id) = node.get("id").and_then(scalar_key) {
                index.by_id.insert(id, name.to_string());
            }
            if let Some(task) = node.get("task").and_then(Value::as_str) {
                index.by_task.insert(task.to_string(), name.to_string());
            }
            index.names.insert(name.to_string());
        }
        index
    }

    /// Canonical name for an endpoint, if any node matches.
    pub fn resolve(&self, endpoint: &Value) -> Option<String> {
        let key = scalar_key(endpoint)?;
        if let Some(name) = self.by_id.get(&key) {
            return Some(name.clone());
        }
        if let Some(name) = self.by_task.get(&key) {
            return Some(name.clone());
        }
        self.names.contains(&key).then_some(key)
    }
}

/// Resolve every edge endpoint; unresolved endpoints are collected and fatal.
pub fn resolve_edges(
    nodes: &[Map<String, Value>],
    edges: &[RawEdge],
) -> Result<Vec<PlanEdge>, PlanError> {
    let index = EndpointIndex::from_nodes(nodes);
    let mut errors = Vec::new();
    let mut resolved = Vec::with_capacity(edges.len());

    for edge in edges {
        let source = index.resolve(&edge.source);
        let target = index.resolve(&edge.target);
        if source.is_none() {
            errors.push(unresolved(&edge.source));
        }
        if target.is_none() {
            errors.push(unresolved(&edge.target));
        }
        if let (Some(source), Some(target)) = (source, target) {
            resolved.push(PlanEdge { source, target });
        }
    }

    if errors.is_empty() {
        Ok(resolved)
    } else {
        Err(PlanError::EndpointResolution(errors))
    }
}

fn scalar_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn unresolved(endpoint: &Value) -> String {
    let shown = match endpoint {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    format!("Planning EdgeEndpoint {shown} not found in plan")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::raw_node;
    use serde_json::json;

    fn nodes() -> Vec<Map<String, Value>> {
        let mut first = raw_node("node_1_name", &["x"], &["str"], &["m"], &["str"]);
        first.insert("task".to_string(), json!("task_1"));
        let mut second = raw_node("node_2_name", &["m"], &["str"], &["y"], &["str"]);
        second.insert("id".to_string(), json!(2));
        vec![first, second]
    }

    #[test]
    fn resolves_task_text_and_id() {
        let edges = vec![RawEdge {
            source: json!("task_1"),
            target: json!(2),
        }];
        let resolved = resolve_edges(&nodes(), &edges).expect("resolve");
        assert_eq!(resolved, vec![PlanEdge::new("node_1_name", "node_2_name")]);
    }

    #[test]
    fn numeric_ids_match_their_string_form() {
        let edges = vec![RawEdge {
            source: json!("node_1_name"),
            target: json!("2"),
        }];
        let resolved = resolve_edges(&nodes(), &edges).expect("resolve");
        assert_eq!(resolved[0].target, "node_2_name");
    }

    #[test]
    fn id_wins_over_task_text_and_name() {
        let mut nodes = nodes();
        nodes[0].insert("id".to_string(), json!("node_2_name"));
        let index = EndpointIndex::from_nodes(&nodes);
        assert_eq!(
            index.resolve(&json!("node_2_name")).as_deref(),
            Some("node_1_name")
        );
    }

    #[test]
    fn unknown_endpoints_are_all_reported() {
        let edges = vec![RawEdge {
            source: json!("ghost"),
            target: json!(7),
        }];
        let err = resolve_edges(&nodes(), &edges).unwrap_err();
        assert_eq!(
            err,
            PlanError::EndpointResolution(vec![
                "Planning EdgeEndpoint ghost not found in plan".to_string(),
                "Planning EdgeEndpoint 7 not found in plan".to_string(),
            ])
        );
    }
}
