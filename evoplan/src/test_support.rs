//! Test-only helpers for building signatures, plans and scripted models.

use std::cell::RefCell;
use std::collections::VecDeque;

use anyhow::{Result, anyhow};
use serde_json::{Map, Value, json};

use crate::core::types::{Individual, Mode, PlanNode, TaskSignature};
use crate::io::model::ModelClient;

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Code-mode signature named `main_task`.
pub fn signature(
    inputs: &[&str],
    input_types: &[&str],
    outputs: &[&str],
    output_types: &[&str],
) -> TaskSignature {
    TaskSignature::new(
        "main task",
        "main_task",
        owned(inputs),
        owned(input_types),
        owned(outputs),
        owned(output_types),
        Mode::Code,
    )
    .expect("valid test signature")
}

/// Code-mode plan node with deterministic task/target text.
pub fn plan_node(
    name: &str,
    inputs: &[&str],
    input_types: &[&str],
    outputs: &[&str],
    output_types: &[&str],
) -> PlanNode {
    PlanNode {
        task: format!("{name} task"),
        name: name.to_string(),
        inputs: owned(inputs),
        input_types: owned(input_types),
        outputs: owned(outputs),
        output_types: owned(output_types),
        target: format!("{name} target"),
        mode: Mode::Code,
        code: None,
        reasoning: None,
        fitness: None,
    }
}

/// Raw node mapping carrying every required key, as a model would write it.
pub fn raw_node(
    name: &str,
    inputs: &[&str],
    input_types: &[&str],
    outputs: &[&str],
    output_types: &[&str],
) -> Map<String, Value> {
    let value = json!({
        "task": format!("{name} task"),
        "name": name,
        "inputs": inputs,
        "input_types": input_types,
        "outputs": outputs,
        "output_types": output_types,
        "target": format!("{name} target"),
        "mode": "CODE",
    });
    match value {
        Value::Object(map) => map,
        _ => unreachable!("json object literal"),
    }
}

pub fn individual(reasoning: &str, code: &str) -> Individual {
    Individual {
        reasoning: reasoning.to_string(),
        code: code.to_string(),
    }
}

/// Wrap a value in a fenced json block.
pub fn fenced_json(value: &Value) -> String {
    let body = serde_json::to_string_pretty(value).expect("serialize test json");
    format!("Here you go:\n```json\n{body}\n```\n")
}

/// Model that returns scripted results in order and records every prompt.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    results: RefCell<VecDeque<Result<String, String>>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedModel {
    pub fn new<S: Into<String>>(responses: impl IntoIterator<Item = S>) -> Self {
        Self::from_results(responses.into_iter().map(|s| Ok(s.into())))
    }

    /// `Err(text)` entries become failed completions.
    pub fn from_results(results: impl IntoIterator<Item = Result<String, String>>) -> Self {
        Self {
            results: RefCell::new(results.into_iter().collect()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl ModelClient for ScriptedModel {
    fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        match self.results.borrow_mut().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted model exhausted")),
        }
    }
}
