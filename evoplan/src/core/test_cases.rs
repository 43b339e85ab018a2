//! Per-step test case derivation from whole-task examples.
//!
//! The model fills a skeleton in which the task's real inputs and outputs
//! are pinned to the first and last steps. Filled suites are checked against
//! those examples, then folded across samples.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::core::errors::ConsistencyError;
use crate::core::types::{NodeTestSuite, Plan, TaskSignature, TestCase};

/// Value the model is asked to replace.
pub const PLACEHOLDER: &str = "...";

/// Build the fill-in skeleton: one suite per plan node, one row per example.
///
/// The first node receives the literal example inputs and the last node the
/// literal example outputs. Every other slot is a placeholder keyed by the
/// node's own parameter names. A single-node plan carries both literals.
pub fn build_skeleton(plan: &Plan, examples: &[TestCase]) -> Vec<NodeTestSuite> {
    let last = plan.nodes.len().saturating_sub(1);
    plan.nodes
        .iter()
        .enumerate()
        .map(|(idx, node)| {
            let inputs = if idx == 0 {
                examples.iter().map(|case| case.input.clone()).collect()
            } else {
                vec![placeholders(&node.inputs); examples.len()]
            };
            let outputs = if idx == last {
                examples.iter().map(|case| case.output.clone()).collect()
            } else {
                vec![placeholders(&node.outputs); examples.len()]
            };
            NodeTestSuite {
                name: node.name.clone(),
                inputs,
                outputs,
            }
        })
        .collect()
}

/// Fenced, pretty-printed JSON for embedding in a prompt.
pub fn render_skeleton(suites: &[NodeTestSuite]) -> String {
    let body = serde_json::to_string_pretty(suites).unwrap_or_else(|_| "[]".to_string());
    format!("```json\n{body}\n```")
}

fn placeholders(names: &[String]) -> Map<String, Value> {
    names
        .iter()
        .map(|name| (name.clone(), Value::String(PLACEHOLDER.to_string())))
        .collect()
}

/// Decode an extracted payload into one suite per plan node, in plan order.
///
/// Suites pair with nodes by name. When the payload has exactly one suite
/// per node, a node with no suite of its name takes the suite at its own
/// position if that suite names no other node. Suites naming no node are
/// dropped. Every suite must have as many inputs as outputs, and as many
/// rows as the first suite; otherwise positional filtering would pair
/// unrelated rows.
pub fn decode_suites(value: Value, plan: &Plan) -> Result<Vec<NodeTestSuite>, ConsistencyError> {
    let decoded: Vec<NodeTestSuite> = serde_json::from_value(value)
        .map_err(|err| ConsistencyError::Undecodable(err.to_string()))?;
    if decoded.is_empty() {
        return Err(ConsistencyError::NoMatch);
    }
    let suites = align_to_plan(decoded, plan)?;
    let rows = suites.first().map_or(0, |suite| suite.inputs.len());
    for suite in &suites {
        if suite.inputs.len() != rows || suite.outputs.len() != rows {
            return Err(ConsistencyError::Misaligned {
                name: suite.name.clone(),
                detail: format!(
                    "expected {rows} rows, got {} inputs and {} outputs",
                    suite.inputs.len(),
                    suite.outputs.len()
                ),
            });
        }
    }
    Ok(suites)
}

fn align_to_plan(
    decoded: Vec<NodeTestSuite>,
    plan: &Plan,
) -> Result<Vec<NodeTestSuite>, ConsistencyError> {
    let positional = decoded.len() == plan.nodes.len();
    let mut aligned = Vec::with_capacity(plan.nodes.len());
    for (idx, node) in plan.nodes.iter().enumerate() {
        let by_name = decoded.iter().find(|suite| suite.name == node.name);
        let by_position = || {
            decoded
                .get(idx)
                .filter(|suite| positional && plan.node(&suite.name).is_none())
        };
        let Some(suite) = by_name.or_else(by_position) else {
            return Err(ConsistencyError::Misaligned {
                name: node.name.clone(),
                detail: "step missing from the spawned suites".to_string(),
            });
        };
        aligned.push(NodeTestSuite {
            name: node.name.clone(),
            inputs: suite.inputs.clone(),
            outputs: suite.outputs.clone(),
        });
    }

    let unknown: Vec<&str> = decoded
        .iter()
        .map(|suite| suite.name.as_str())
        .filter(|name| plan.node(name).is_none())
        .collect();
    if !unknown.is_empty() {
        debug!(?unknown, "spawned suites named no plan step");
    }
    Ok(aligned)
}

/// Suites narrowed to the rows that agree with the examples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOutcome {
    pub kept: Vec<NodeTestSuite>,
    pub rejections: Vec<ConsistencyError>,
}

impl FilterOutcome {
    pub fn is_empty(&self) -> bool {
        self.kept.first().is_none_or(|suite| suite.inputs.is_empty())
    }
}

/// Keep rows whose first-step input matches an example and whose last-step
/// output equals that example's output.
///
/// Only the first row matching each example input is considered. Kept row
/// positions apply to every suite.
pub fn filter_suites(suites: &[NodeTestSuite], examples: &[TestCase]) -> FilterOutcome {
    let (Some(first), Some(last)) = (suites.first(), suites.last()) else {
        return FilterOutcome {
            kept: Vec::new(),
            rejections: vec![ConsistencyError::NoMatch],
        };
    };

    let mut positions = Vec::new();
    let mut rejections = Vec::new();
    for example in examples {
        let Some(idx) = first
            .inputs
            .iter()
            .position(|input| map_equal(input, &example.input))
        else {
            rejections.push(ConsistencyError::Unmatched {
                input: render_map(&example.input),
            });
            continue;
        };
        match last.outputs.get(idx) {
            Some(actual) if map_equal(actual, &example.output) => positions.push(idx),
            Some(actual) => rejections.push(ConsistencyError::Mismatch {
                input: render_map(&example.input),
                expected: render_map(&example.output),
                actual: render_map(actual),
            }),
            None => rejections.push(ConsistencyError::Misaligned {
                name: last.name.clone(),
                detail: format!("no output at row {idx}"),
            }),
        }
    }

    if positions.is_empty() {
        rejections.push(ConsistencyError::NoMatch);
        return FilterOutcome {
            kept: Vec::new(),
            rejections,
        };
    }

    let kept = suites
        .iter()
        .map(|suite| select_rows(suite, &positions))
        .collect();
    FilterOutcome { kept, rejections }
}

/// Append `delta` onto `acc`, pairing suites by name and falling back to
/// position. With `unique`, rows are deduplicated on the first suite's input.
pub fn combine_suites(
    acc: Vec<NodeTestSuite>,
    delta: &[NodeTestSuite],
    unique: bool,
) -> Result<Vec<NodeTestSuite>, ConsistencyError> {
    let mut combined = Vec::with_capacity(acc.len());
    for (idx, mut suite) in acc.into_iter().enumerate() {
        let other = delta
            .iter()
            .find(|other| other.name == suite.name)
            .or_else(|| delta.get(idx))
            .ok_or_else(|| ConsistencyError::Misaligned {
                name: suite.name.clone(),
                detail: "step missing from a later sample".to_string(),
            })?;
        suite.inputs.extend(other.inputs.iter().cloned());
        suite.outputs.extend(other.outputs.iter().cloned());
        combined.push(suite);
    }

    if unique {
        combined = dedup_by_entry(combined);
    }
    Ok(combined)
}

/// Drop rows whose first-suite input was already seen. First seen wins.
pub fn dedup_by_entry(suites: Vec<NodeTestSuite>) -> Vec<NodeTestSuite> {
    let Some(first) = suites.first() else {
        return suites;
    };
    let mut seen: Vec<&Map<String, Value>> = Vec::new();
    let mut positions = Vec::new();
    for (idx, input) in first.inputs.iter().enumerate() {
        if seen.iter().any(|prior| map_equal(prior, input)) {
            continue;
        }
        seen.push(input);
        positions.push(idx);
    }
    if positions.len() == first.inputs.len() {
        return suites;
    }
    debug!(
        kept = positions.len(),
        total = first.inputs.len(),
        "deduplicated spawned rows"
    );
    suites
        .iter()
        .map(|suite| select_rows(suite, &positions))
        .collect()
}

/// Final per-step mapping handed to the synthesis loop.
pub fn to_case_map(suites: Vec<NodeTestSuite>) -> BTreeMap<String, Vec<TestCase>> {
    suites
        .into_iter()
        .map(|suite| (suite.name.clone(), suite.into_cases()))
        .collect()
}

fn select_rows(suite: &NodeTestSuite, positions: &[usize]) -> NodeTestSuite {
    NodeTestSuite {
        name: suite.name.clone(),
        inputs: positions
            .iter()
            .filter_map(|&idx| suite.inputs.get(idx).cloned())
            .collect(),
        outputs: positions
            .iter()
            .filter_map(|&idx| suite.outputs.get(idx).cloned())
            .collect(),
    }
}

/// Structural equality where numbers compare by value (`1` equals `1.0`).
pub fn json_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => a.as_f64() == b.as_f64(),
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| json_equal(a, b))
        }
        (Value::Object(a), Value::Object(b)) => map_equal(a, b),
        _ => left == right,
    }
}

fn map_equal(left: &Map<String, Value>, right: &Map<String, Value>) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .all(|(key, value)| right.get(key).is_some_and(|other| json_equal(value, other)))
}

fn render_map(map: &Map<String, Value>) -> String {
    serde_json::to_string(map).unwrap_or_default()
}

/// Decode model-authored examples: a list of `{input, expected_output}`
/// mappings (`output` is accepted as well).
///
/// Entries whose parameter names differ from the signature are dropped.
pub fn parse_example_cases(
    value: &Value,
    signature: &TaskSignature,
) -> Result<Vec<TestCase>, ConsistencyError> {
    let Some(entries) = value.as_array() else {
        return Err(ConsistencyError::Undecodable(
            "expected a list of {input, expected_output} mappings".to_string(),
        ));
    };

    let mut cases = Vec::with_capacity(entries.len());
    for (idx, entry) in entries.iter().enumerate() {
        let input = entry.get("input").and_then(Value::as_object);
        let output = entry
            .get("expected_output")
            .or_else(|| entry.get("output"))
            .and_then(Value::as_object);
        let (Some(input), Some(output)) = (input, output) else {
            warn!(entry = idx, "skipped example without input/expected_output mappings");
            continue;
        };
        if !same_keys(input, &signature.inputs) || !same_keys(output, &signature.outputs) {
            warn!(entry = idx, "skipped example whose parameter names differ from the task");
            continue;
        }
        cases.push(TestCase::new(input.clone(), output.clone()));
    }
    Ok(cases)
}

fn same_keys(map: &Map<String, Value>, names: &[String]) -> bool {
    map.len() == names.len() && names.iter().all(|name| map.contains_key(name))
}
