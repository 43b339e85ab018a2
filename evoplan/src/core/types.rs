//! Shared deterministic types for the plan-graph lifecycle.
//!
//! These types define stable contracts between core components and the
//! interchange format: every type here round-trips through serde JSON, with
//! [`Mode`] serialized as its lowercase tag.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::core::errors::SignatureError;

/// Execution mode of a synthesizable unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Implement a typed function.
    Code,
    /// Implement a function that produces a prompt for a downstream model call.
    Prompt,
    /// Tool-backed unit (no prompt templates).
    Tool,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Code => "code",
            Mode::Prompt => "prompt",
            Mode::Tool => "tool",
        }
    }

    /// Parse a model-authored mode value.
    ///
    /// Exact lowercase tags map directly. Anything else containing `CODE`
    /// (any case) is [`Mode::Code`], containing `TOOL` is [`Mode::Tool`], and
    /// everything remaining falls back to [`Mode::Prompt`].
    pub fn parse_lenient(raw: &str) -> Self {
        match raw {
            "code" => Mode::Code,
            "prompt" => Mode::Prompt,
            "tool" => Mode::Tool,
            other => {
                let upper = other.to_ascii_uppercase();
                if upper.contains("CODE") {
                    Mode::Code
                } else if upper.contains("TOOL") {
                    Mode::Tool
                } else {
                    Mode::Prompt
                }
            }
        }
    }
}

impl<'de> Deserialize<'de> for Mode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Mode::parse_lenient(&raw))
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synthesis operator used to generate, recombine or mutate individuals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    /// Generate from scratch.
    I1,
    /// Recombine into a totally different form.
    E1,
    /// Recombine by combining strengths.
    E2,
    /// Mutate into a different form.
    M1,
    /// Mutate parameter settings.
    M2,
}

impl Operator {
    pub const ALL: [Operator; 5] = [
        Operator::I1,
        Operator::E1,
        Operator::E2,
        Operator::M1,
        Operator::M2,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::I1 => "i1",
            Operator::E1 => "e1",
            Operator::E2 => "e2",
            Operator::M1 => "m1",
            Operator::M2 => "m2",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown operator '{s}' (expected one of i1, e1, e2, m1, m2)"))
    }
}

/// Name/input/output/type/mode contract for one synthesizable unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SignatureFields")]
pub struct TaskSignature {
    pub task: String,
    pub func_name: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub input_types: Vec<String>,
    pub output_types: Vec<String>,
    pub mode: Mode,
}

#[derive(Deserialize)]
struct SignatureFields {
    task: String,
    #[serde(alias = "name")]
    func_name: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    input_types: Vec<String>,
    output_types: Vec<String>,
    mode: Mode,
}

impl TryFrom<SignatureFields> for TaskSignature {
    type Error = SignatureError;

    fn try_from(fields: SignatureFields) -> Result<Self, Self::Error> {
        let signature = TaskSignature {
            task: fields.task,
            func_name: fields.func_name,
            inputs: fields.inputs,
            outputs: fields.outputs,
            input_types: fields.input_types,
            output_types: fields.output_types,
            mode: fields.mode,
        };
        signature.validate()?;
        Ok(signature)
    }
}

impl TaskSignature {
    /// Build a signature, rejecting contract violations.
    pub fn new(
        task: impl Into<String>,
        func_name: impl Into<String>,
        inputs: Vec<String>,
        input_types: Vec<String>,
        outputs: Vec<String>,
        output_types: Vec<String>,
        mode: Mode,
    ) -> Result<Self, SignatureError> {
        let signature = Self {
            task: task.into(),
            func_name: func_name.into(),
            inputs,
            outputs,
            input_types,
            output_types,
            mode,
        };
        signature.validate()?;
        Ok(signature)
    }

    /// Check the parallel-sequence and uniqueness invariants.
    pub fn validate(&self) -> Result<(), SignatureError> {
        if self.func_name.trim().is_empty() {
            return Err(SignatureError::EmptyName);
        }
        if self.inputs.len() != self.input_types.len() {
            return Err(SignatureError::LengthMismatch {
                side: "input",
                names: self.inputs.len(),
                types: self.input_types.len(),
            });
        }
        if self.outputs.len() != self.output_types.len() {
            return Err(SignatureError::LengthMismatch {
                side: "output",
                names: self.outputs.len(),
                types: self.output_types.len(),
            });
        }
        ensure_unique("input", &self.inputs)?;
        ensure_unique("output", &self.outputs)?;
        Ok(())
    }
}

fn ensure_unique(side: &'static str, names: &[String]) -> Result<(), SignatureError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name.as_str()) {
            return Err(SignatureError::DuplicateName {
                side,
                name: name.clone(),
            });
        }
    }
    Ok(())
}

/// One decomposition step of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanNode {
    pub task: String,
    pub name: String,
    pub inputs: Vec<String>,
    pub input_types: Vec<String>,
    pub outputs: Vec<String>,
    pub output_types: Vec<String>,
    pub target: String,
    pub mode: Mode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fitness: Option<f64>,
}

/// Data/control dependency between two plan nodes, by canonical name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanEdge {
    pub source: String,
    pub target: String,
}

impl PlanEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Task-decomposition graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub nodes: Vec<PlanNode>,
    pub edges: Vec<PlanEdge>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, name: &str) -> Option<&PlanNode> {
        self.nodes.iter().find(|node| node.name == name)
    }

    /// Edges whose source or target names no node.
    pub fn dangling_edges(&self) -> Vec<&PlanEdge> {
        self.edges
            .iter()
            .filter(|edge| self.node(&edge.source).is_none() || self.node(&edge.target).is_none())
            .collect()
    }

    /// Names of nodes without an incoming edge, in node order.
    pub fn start_nodes(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|node| !self.edges.iter().any(|edge| edge.target == node.name))
            .map(|node| node.name.as_str())
            .collect()
    }

    /// Names of nodes without an outgoing edge, in node order.
    pub fn end_nodes(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|node| !self.edges.iter().any(|edge| edge.source == node.name))
            .map(|node| node.name.as_str())
            .collect()
    }
}

/// One `(input, output)` example keyed by parameter name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: Map<String, Value>,
    #[serde(alias = "expected_output")]
    pub output: Map<String, Value>,
}

impl TestCase {
    pub fn new(input: Map<String, Value>, output: Map<String, Value>) -> Self {
        Self { input, output }
    }
}

/// Positionally aligned test rows for one plan node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTestSuite {
    pub name: String,
    pub inputs: Vec<Map<String, Value>>,
    pub outputs: Vec<Map<String, Value>>,
}

impl NodeTestSuite {
    pub fn into_cases(self) -> Vec<TestCase> {
        self.inputs
            .into_iter()
            .zip(self.outputs)
            .map(|(input, output)| TestCase { input, output })
            .collect()
    }
}

/// A candidate produced by an operator prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Individual {
    pub reasoning: String,
    pub code: String,
}
