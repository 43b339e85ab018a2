//! Model-authored whole-task examples.

use anyhow::{Context, Result, anyhow};
use tracing::{info, instrument};

use crate::core::extract::extract_structured;
use crate::core::test_cases::parse_example_cases;
use crate::core::types::{TaskSignature, TestCase};
use crate::io::model::ModelClient;
use crate::io::prompt::PromptBuilder;

#[derive(Debug, Clone)]
pub struct ExampleAuthor {
    builder: PromptBuilder,
    num_cases: usize,
}

impl ExampleAuthor {
    pub fn new(prompt_budget_bytes: usize, num_cases: usize) -> Self {
        Self {
            builder: PromptBuilder::new(prompt_budget_bytes),
            num_cases,
        }
    }

    /// Ask for `num_cases` examples; entries not matching the signature are dropped.
    #[instrument(skip_all, fields(func = %signature.func_name, requested = self.num_cases))]
    pub fn author<M: ModelClient>(
        &self,
        model: &M,
        signature: &TaskSignature,
        feedback: Option<&str>,
    ) -> Result<Vec<TestCase>> {
        let prompt = self
            .builder
            .build_example_cases(signature, self.num_cases, feedback)
            .context("build example prompt")?;
        let response = model
            .complete(prompt.as_str())
            .context("request examples")?;
        let value = extract_structured(&response)?;
        let cases = parse_example_cases(&value, signature)?;
        if cases.is_empty() {
            return Err(anyhow!("model authored no usable examples"));
        }
        info!(authored = cases.len(), "examples authored");
        Ok(cases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedModel, signature};
    use serde_json::json;

    #[test]
    fn literal_style_examples_are_accepted() {
        let sig = signature(&["a", "b"], &["int", "int"], &["sum"], &["int"]);
        let model = ScriptedModel::new([
            "```json\n[{'input': {'a': 1, 'b': 2}, 'expected_output': {'sum': 3}},\n {'input': {'a': 0, 'b': 0}, 'expected_output': {'sum': 0}},]\n```",
        ]);
        let cases = ExampleAuthor::new(40_000, 2)
            .author(&model, &sig, None)
            .expect("author");
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].output["sum"], json!(3));
        assert!(model.prompts()[0].contains("Create 2 diverse test cases"));
    }

    #[test]
    fn no_usable_examples_is_an_error() {
        let sig = signature(&["a"], &["int"], &["b"], &["int"]);
        let model = ScriptedModel::new([r#"```json
[{"input": {"z": 1}, "expected_output": {"b": 2}}]
```"#]);
        let err = ExampleAuthor::new(40_000, 1)
            .author(&model, &sig, None)
            .unwrap_err();
        assert!(err.to_string().contains("no usable examples"));
    }
}
