//! Error taxonomy for the plan-graph lifecycle.
//!
//! Extraction, plan and consistency errors describe bad model output and are
//! folded into `(result, error_text)` outcomes by the validator and spawner.
//! [`SignatureError`] is a caller contract violation and is returned directly.

use thiserror::Error;

const PREVIEW_CHARS: usize = 240;

/// Failure to turn free-form model text into structured data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("no structured payload found in response: {}", preview(.text))]
    NotFound { text: String },
    #[error(
        "payload malformed: JsonDecodeError: {strict}; LiteralDecodeError: {literal}; payload: {}",
        preview(.payload)
    )]
    Malformed {
        payload: String,
        strict: String,
        literal: String,
    },
    #[error("no code block found in response: {}", preview(.text))]
    NoCodeBlock { text: String },
}

/// Plan rejected by the validator. Each variant carries every offending item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("Invalid plan structure: {0}")]
    Shape(String),
    #[error("{}", .0.join("\n"))]
    Schema(Vec<String>),
    #[error("{}", .0.join("\n"))]
    EndpointResolution(Vec<String>),
    #[error("{}", .0.join("\n"))]
    TypeMismatch(Vec<String>),
}

/// Spawned test cases that disagree with the whole-task examples.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyError {
    #[error("Output mismatch for input {input}, expected {expected}, got {actual}")]
    Mismatch {
        input: String,
        expected: String,
        actual: String,
    },
    #[error("No filled test case found for input {input}")]
    Unmatched { input: String },
    #[error("Test case rows for step '{name}' are misaligned: {detail}")]
    Misaligned { name: String, detail: String },
    #[error("Spawned test cases are not a list of step suites: {0}")]
    Undecodable(String),
    #[error("No matching test cases with main test cases found")]
    NoMatch,
}

/// Malformed [`TaskSignature`](crate::core::types::TaskSignature).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("func_name must be non-empty")]
    EmptyName,
    #[error("{side} names ({names}) and {side} types ({types}) differ in length")]
    LengthMismatch {
        side: &'static str,
        names: usize,
        types: usize,
    },
    #[error("duplicate {side} name '{name}'")]
    DuplicateName { side: &'static str, name: String },
}

fn preview(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= PREVIEW_CHARS {
        return trimmed.to_string();
    }
    let head: String = trimmed.chars().take(PREVIEW_CHARS).collect();
    format!("{head}... [{} chars]", trimmed.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_payloads_are_previewed() {
        let err = ExtractionError::NotFound {
            text: "x".repeat(1_000),
        };
        let message = err.to_string();
        assert!(message.ends_with("[1000 chars]"));
        assert!(message.len() < 400);
    }

    #[test]
    fn plan_errors_join_every_item() {
        let err = PlanError::Schema(vec!["first".to_string(), "second".to_string()]);
        assert_eq!(err.to_string(), "first\nsecond");
    }
}
