//! Load/save helpers for signatures, plans and examples.
//!
//! Signatures and plans are checked against the JSON Schemas in
//! `evoplan/schemas/` before typed decoding.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde::Serialize;
use serde_json::Value;

use crate::core::types::{Plan, TaskSignature, TestCase};

const SIGNATURE_SCHEMA: &str = include_str!("../../schemas/task_signature.schema.json");
const PLAN_SCHEMA: &str = include_str!("../../schemas/plan.schema.json");

/// Load a task signature and check its name/type alignment.
pub fn load_signature(path: &Path) -> Result<TaskSignature> {
    let value = read_json(path)?;
    validate_schema("signature", SIGNATURE_SCHEMA, &value)
        .with_context(|| format!("validate signature {}", path.display()))?;
    let signature: TaskSignature = serde_json::from_value(value)
        .with_context(|| format!("deserialize signature {}", path.display()))?;
    Ok(signature)
}

/// Load a rectified plan (canonical names, lowercase modes).
pub fn load_plan(path: &Path) -> Result<Plan> {
    let value = read_json(path)?;
    validate_schema("plan", PLAN_SCHEMA, &value)
        .with_context(|| format!("validate plan {}", path.display()))?;
    let plan: Plan = serde_json::from_value(value)
        .with_context(|| format!("deserialize plan {}", path.display()))?;
    let dangling = plan.dangling_edges();
    if !dangling.is_empty() {
        let listed: Vec<String> = dangling
            .iter()
            .map(|edge| format!("{} -> {}", edge.source, edge.target))
            .collect();
        return Err(anyhow!(
            "plan {} has edges naming no node: {}",
            path.display(),
            listed.join(", ")
        ));
    }
    Ok(plan)
}

/// Load whole-task examples: a list of `{input, output}` mappings.
pub fn load_examples(path: &Path) -> Result<Vec<TestCase>> {
    let value = read_json(path)?;
    serde_json::from_value(value)
        .with_context(|| format!("deserialize examples {}", path.display()))
}

pub fn write_signature(path: &Path, signature: &TaskSignature) -> Result<()> {
    write_json(path, signature)
}

pub fn write_plan(path: &Path, plan: &Plan) -> Result<()> {
    write_json(path, plan)
}

/// Read a text file, naming it on failure.
pub fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

fn read_json(path: &Path) -> Result<Value> {
    let contents = read_text(path)?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}

fn validate_schema(kind: &str, schema: &str, value: &Value) -> Result<()> {
    let schema_value: Value =
        serde_json::from_str(schema).with_context(|| format!("parse {kind} schema"))?;
    let compiled =
        validator_for(&schema_value).map_err(|err| anyhow!("invalid {kind} schema: {err}"))?;
    if !compiled.is_valid(value) {
        let messages = compiled
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "{kind} schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Mode, PlanEdge};
    use crate::test_support::{plan_node, signature};
    use serde_json::json;

    #[test]
    fn signature_round_trips_through_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("signature.json");
        let sig = signature(&["x"], &["str"], &["y"], &["int"]);
        write_signature(&path, &sig).expect("write");
        assert_eq!(load_signature(&path).expect("load"), sig);
    }

    #[test]
    fn signature_mode_is_parsed_leniently() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("signature.json");
        let raw = json!({
            "task": "count words",
            "name": "count_words",
            "inputs": ["text"],
            "input_types": ["str"],
            "outputs": ["count"],
            "output_types": ["int"],
            "mode": "CODE node"
        });
        fs::write(&path, raw.to_string()).expect("write");
        let sig = load_signature(&path).expect("load");
        assert_eq!(sig.mode, Mode::Code);
        assert_eq!(sig.func_name, "count_words");
    }

    #[test]
    fn misaligned_signature_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("signature.json");
        let raw = json!({
            "task": "t",
            "func_name": "f",
            "inputs": ["a", "b"],
            "input_types": ["str"],
            "outputs": [],
            "output_types": [],
            "mode": "code"
        });
        fs::write(&path, raw.to_string()).expect("write");
        let err = load_signature(&path).unwrap_err();
        assert!(format!("{err:#}").contains("differ in length"));
    }

    #[test]
    fn plan_schema_rejects_unknown_node_keys() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("plan.json");
        let plan = Plan {
            nodes: vec![plan_node("a", &["x"], &["str"], &["y"], &["int"])],
            edges: vec![PlanEdge::new("a", "a")],
        };
        write_plan(&path, &plan).expect("write");
        assert_eq!(load_plan(&path).expect("load"), plan);

        let mut value = serde_json::to_value(&plan).expect("value");
        value["nodes"][0]["label"] = json!("extra");
        fs::write(&path, value.to_string()).expect("write");
        let err = load_plan(&path).unwrap_err();
        assert!(format!("{err:#}").contains("plan schema validation failed"));
    }

    #[test]
    fn plan_with_dangling_edge_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("plan.json");
        let plan = Plan {
            nodes: vec![
                plan_node("a", &["x"], &["str"], &["m"], &["str"]),
                plan_node("b", &["m"], &["str"], &["y"], &["str"]),
            ],
            edges: vec![PlanEdge::new("a", "b"), PlanEdge::new("b", "ghost")],
        };
        write_plan(&path, &plan).expect("write");
        let err = load_plan(&path).unwrap_err();
        assert!(err.to_string().contains("has edges naming no node: b -> ghost"));
    }

    #[test]
    fn examples_accept_expected_output_key() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("examples.json");
        fs::write(
            &path,
            r#"[{"input": {"x": 1}, "expected_output": {"y": 2}}, {"input": {"x": 2}, "output": {"y": 3}}]"#,
        )
        .expect("write");
        let examples = load_examples(&path).expect("load");
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].output["y"], json!(2));
    }
}
