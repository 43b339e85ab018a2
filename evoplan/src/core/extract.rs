//! Structured payload extraction from free-form model output.
//!
//! Locating the payload and decoding it are separate steps. Location walks an
//! ordered list of [`Matcher`]s and takes the first hit. Decoding tries strict
//! JSON first and the permissive literal decoder second, so a failure can be
//! attributed to "not strict JSON" versus "not a literal at all".

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::core::errors::ExtractionError;
use crate::core::literal::parse_literal;

static JSON_OBJECT_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(\{.*?\})\s*```").expect("valid regex"));
static PYTHON_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```python\s*(.*?)\s*```").expect("valid regex"));
static JSON_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").expect("valid regex"));
static BARE_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^}]+\}").expect("valid regex"));

/// Payload locator, tried in [`Matcher::PRIORITY`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matcher {
    /// ```` ```json ```` fence whose body is a brace-delimited object.
    JsonObjectFence,
    /// ```` ```python ```` fence carrying the payload.
    PythonFence,
    /// Any ```` ```json ```` fence (object or list).
    JsonFence,
    /// Innermost bare `{...}` anywhere in the text.
    BareObject,
}

impl Matcher {
    pub const PRIORITY: [Matcher; 4] = [
        Matcher::JsonObjectFence,
        Matcher::PythonFence,
        Matcher::JsonFence,
        Matcher::BareObject,
    ];

    fn pattern(self) -> &'static Regex {
        match self {
            Matcher::JsonObjectFence => &JSON_OBJECT_FENCE,
            Matcher::PythonFence => &PYTHON_FENCE,
            Matcher::JsonFence => &JSON_FENCE,
            Matcher::BareObject => &BARE_OBJECT,
        }
    }

    /// Return the payload substring this matcher selects, if any.
    pub fn find(self, text: &str) -> Option<&str> {
        let group = match self {
            Matcher::BareObject => 0,
            _ => 1,
        };
        self.pattern()
            .captures(text)
            .and_then(|caps| caps.get(group))
            .map(|m| m.as_str())
    }
}

/// A located payload and the matcher that found it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadMatch<'a> {
    pub matcher: Matcher,
    pub payload: &'a str,
}

/// First matcher hit in priority order.
pub fn locate_payload(text: &str) -> Option<PayloadMatch<'_>> {
    Matcher::PRIORITY.into_iter().find_map(|matcher| {
        matcher
            .find(text)
            .map(|payload| PayloadMatch { matcher, payload })
    })
}

/// Extract one structured value (mapping or sequence) from model output.
pub fn extract_structured(text: &str) -> Result<Value, ExtractionError> {
    let found = locate_payload(text).ok_or_else(|| ExtractionError::NotFound {
        text: text.to_string(),
    })?;
    debug!(matcher = ?found.matcher, bytes = found.payload.len(), "located payload");
    decode_payload(found.payload)
}

/// Strict JSON, then the permissive literal decoder.
pub fn decode_payload(payload: &str) -> Result<Value, ExtractionError> {
    let strict = match serde_json::from_str::<Value>(payload) {
        Ok(value) => return Ok(value),
        Err(err) => err.to_string(),
    };
    match parse_literal(payload) {
        Ok(value) => {
            debug!(strict_error = %strict, "payload decoded by literal fallback");
            Ok(value)
        }
        Err(err) => Err(ExtractionError::Malformed {
            payload: payload.to_string(),
            strict,
            literal: err.to_string(),
        }),
    }
}

/// Render a value the way a well-behaved model would return it.
pub fn render_fenced_json(value: &Value) -> String {
    let body = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    format!("```json\n{body}\n```")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extraction_is_idempotent_on_canonical_rendering() {
        for value in [
            json!({"nodes": [{"name": "a", "inputs": ["x"]}], "edges": []}),
            json!([{"name": "a", "inputs": [{"x": 1}], "outputs": [{"y": "z"}]}]),
            json!({"aligned": true, "comment": null}),
        ] {
            let rendered = render_fenced_json(&value);
            assert_eq!(extract_structured(&rendered).expect("extract"), value);
        }
    }

    #[test]
    fn fenced_block_is_preferred_over_stray_braces() {
        let text = "Reasoning {not: json} here.\n```json\n{\"picked\": 1}\n```\ntrailing {\"other\": 2}";
        assert_eq!(extract_structured(text).expect("extract"), json!({"picked": 1}));
    }

    #[test]
    fn python_fence_beats_list_json_fence() {
        let text = "```python\n{'from': 'python'}\n```\n```json\n[1, 2]\n```";
        let found = locate_payload(text).expect("match");
        assert_eq!(found.matcher, Matcher::PythonFence);
        assert_eq!(extract_structured(text).expect("extract"), json!({"from": "python"}));
    }

    #[test]
    fn json_list_fence_is_parsed() {
        let text = "Here you go:\n```json\n[{'a': 1}, {'a': 2},]\n```";
        assert_eq!(
            extract_structured(text).expect("extract"),
            json!([{"a": 1}, {"a": 2}])
        );
    }

    #[test]
    fn bare_object_is_last_resort() {
        let text = "The answer is {'label': True, 'comment': 'fine'} as requested.";
        let found = locate_payload(text).expect("match");
        assert_eq!(found.matcher, Matcher::BareObject);
        assert_eq!(
            extract_structured(text).expect("extract"),
            json!({"label": true, "comment": "fine"})
        );
    }

    #[test]
    fn missing_payload_is_not_found() {
        let err = extract_structured("no structure at all").unwrap_err();
        assert!(matches!(err, ExtractionError::NotFound { .. }));
    }

    #[test]
    fn malformed_payload_carries_both_decoder_errors() {
        let err = extract_structured("```json\n{\"a\": [1, 2}\n```").unwrap_err();
        match err {
            ExtractionError::Malformed {
                payload,
                strict,
                literal,
            } => {
                assert_eq!(payload, "{\"a\": [1, 2}");
                assert!(!strict.is_empty());
                assert!(literal.contains("expected ']'"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn deeply_nested_payload_is_malformed() {
        let text = format!("```json\n{}\n```", "[".repeat(200_000));
        let err = extract_structured(&text).unwrap_err();
        match err {
            ExtractionError::Malformed { literal, .. } => {
                assert!(literal.contains("nesting deeper than"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
