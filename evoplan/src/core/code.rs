//! Source-code extraction from operator responses.
//!
//! The first ```` ```python ```` fence is scanned statically: top-level imports
//! and top-level function definitions are kept, everything else (module
//! statements, classes and their methods, `__main__` blocks) is dropped. Nested
//! definitions stay inside their enclosing function.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::core::errors::ExtractionError;
use crate::core::types::Individual;

static PYTHON_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```python\s*(.*?)\s*```").expect("valid regex"));
static BRACED_REASONING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{(.*)\}").expect("valid regex"));

/// Imports and function definitions collected from one code block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeUnit {
    pub imports: Vec<String>,
    pub functions: Vec<String>,
}

impl CodeUnit {
    /// Imports first, then functions, newline-joined.
    pub fn render(&self) -> String {
        self.imports
            .iter()
            .chain(&self.functions)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Body of the first fenced python block.
pub fn extract_code_block(text: &str) -> Result<&str, ExtractionError> {
    PYTHON_BLOCK
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| ExtractionError::NoCodeBlock {
            text: text.to_string(),
        })
}

/// Extract the first python block and reduce it to imports + functions.
pub fn extract_code_unit(text: &str) -> Result<String, ExtractionError> {
    let block = extract_code_block(text)?;
    Ok(collect_top_level(block).render())
}

/// Statically collect top-level imports and function definitions.
pub fn collect_top_level(code: &str) -> CodeUnit {
    let lines: Vec<&str> = code.lines().collect();
    let mut unit = CodeUnit::default();
    let mut decorator_start: Option<usize> = None;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if line.trim().is_empty() || is_indented(line) {
            i += 1;
            continue;
        }

        if line.starts_with('@') {
            decorator_start.get_or_insert(i);
            i += 1;
            continue;
        }

        if is_import(line) {
            let end = statement_end(&lines, i);
            unit.imports.push(lines[i..end].join("\n"));
            decorator_start = None;
            i = end;
            continue;
        }

        if line.starts_with("def ") || line.starts_with("async def ") {
            let start = decorator_start.take().unwrap_or(i);
            let end = block_end(&lines, i);
            unit.functions.push(lines[start..end].join("\n"));
            i = end;
            continue;
        }

        if line.starts_with("class ") {
            debug!(line, "skipping class body");
            decorator_start = None;
            i = block_end(&lines, i);
            continue;
        }

        decorator_start = None;
        i += 1;
    }

    unit
}

/// Split an operator response into its one-line reasoning and code unit.
pub fn parse_individual(text: &str) -> Individual {
    let reasoning = BRACED_REASONING
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .or_else(|| prose_before_code(text))
        .map(clean_reasoning)
        .unwrap_or_default();

    let code = match extract_code_unit(text) {
        Ok(code) => code,
        Err(err) => {
            debug!(error = %err, "operator response carried no code");
            String::new()
        }
    };

    Individual { reasoning, code }
}

fn prose_before_code(text: &str) -> Option<&str> {
    ["python", "import", "def"]
        .into_iter()
        .find_map(|keyword| text.find(keyword))
        .map(|idx| &text[..idx])
}

fn clean_reasoning(raw: &str) -> String {
    let first_line = raw.split('\n').next().unwrap_or_default();
    first_line
        .split('}')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn is_indented(line: &str) -> bool {
    line.starts_with([' ', '\t'])
}

fn is_import(line: &str) -> bool {
    line.starts_with("import ") || (line.starts_with("from ") && line.contains(" import"))
}

/// One past the last line of a statement that may continue with open
/// brackets or trailing backslashes.
fn statement_end(lines: &[&str], start: usize) -> usize {
    let mut depth = 0i32;
    let mut i = start;
    while i < lines.len() {
        let line = lines[i];
        depth += bracket_delta(line);
        i += 1;
        if depth <= 0 && !line.trim_end().ends_with('\\') {
            break;
        }
    }
    i
}

/// One past the last line of a `def`/`class` block starting at `start`.
fn block_end(lines: &[&str], start: usize) -> usize {
    let mut i = statement_end(lines, start);
    while i < lines.len() {
        let line = lines[i];
        if line.trim().is_empty() || is_indented(line) {
            i += 1;
        } else {
            break;
        }
    }
    while i > start + 1 && lines[i - 1].trim().is_empty() {
        i -= 1;
    }
    i
}

fn bracket_delta(line: &str) -> i32 {
    line.chars()
        .map(|c| match c {
            '(' | '[' | '{' => 1,
            ')' | ']' | '}' => -1,
            _ => 0,
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = r#"{Use a sliding window over the tokens.}

```python
import re
from collections import (
    Counter,
    defaultdict,
)

THRESHOLD = 3

@cache
def score(text: str) -> int:
    def helper(token):
        return len(token)

    return sum(helper(t) for t in re.findall(r"\w+", text))

class Scorer:
    def method(self):
        return 1

def main(
    text: str,
) -> int:
    return score(text)

if __name__ == "__main__":
    print(main("hi"))
```
"#;

    #[test]
    fn collects_top_level_imports_then_functions() {
        let code = extract_code_unit(RESPONSE).expect("code");
        let expected = [
            "import re",
            "from collections import (\n    Counter,\n    defaultdict,\n)",
            "@cache\ndef score(text: str) -> int:\n    def helper(token):\n        return len(token)\n\n    return sum(helper(t) for t in re.findall(r\"\\w+\", text))",
            "def main(\n    text: str,\n) -> int:\n    return score(text)",
        ]
        .join("\n");
        assert_eq!(code, expected);
    }

    #[test]
    fn nested_and_method_definitions_are_not_top_level() {
        let unit = collect_top_level(extract_code_block(RESPONSE).expect("block"));
        assert_eq!(unit.functions.len(), 2);
        assert!(!unit.functions.iter().any(|f| f.starts_with("def helper")));
        assert!(!unit.functions.iter().any(|f| f.contains("def method")));
    }

    #[test]
    fn missing_fence_is_no_code_block() {
        let err = extract_code_unit("def f():\n    return 1").unwrap_err();
        assert!(matches!(err, ExtractionError::NoCodeBlock { .. }));
    }

    #[test]
    fn individual_takes_braced_reasoning_and_code() {
        let individual = parse_individual(RESPONSE);
        assert_eq!(individual.reasoning, "Use a sliding window over the tokens.");
        assert!(individual.code.starts_with("import re"));
    }

    #[test]
    fn individual_falls_back_to_prose_before_code() {
        let response = "Count words first.\n```python\ndef f(x):\n    return x\n```";
        let individual = parse_individual(response);
        assert_eq!(individual.reasoning, "Count words first.");
        assert_eq!(individual.code, "def f(x):\n    return x");
    }
}
