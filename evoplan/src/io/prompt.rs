//! Prompt pack builder for model input.
//!
//! Prompt text lives in `prompts/*.md` minijinja templates. Rendered output is
//! split into sections by `<!-- section:KEY required|droppable -->` markers
//! and fitted to a byte budget.

use std::sync::LazyLock;

use minijinja::{Environment, context};
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::core::listing::plan_listing;
use crate::core::test_cases::render_skeleton;
use crate::core::types::{Individual, Mode, NodeTestSuite, Operator, Plan, TaskSignature};

const OPERATOR_TEMPLATE: &str = include_str!("prompts/operator.md");
const CONTRACT_CODE_TEMPLATE: &str = include_str!("prompts/contract_code.md");
const CONTRACT_PROMPT_TEMPLATE: &str = include_str!("prompts/contract_prompt.md");
const PLAN_SKETCH_TEMPLATE: &str = include_str!("prompts/plan_sketch.md");
const PLAN_GRAPH_TEMPLATE: &str = include_str!("prompts/plan_graph.md");
const EXAMPLE_CASES_TEMPLATE: &str = include_str!("prompts/example_cases.md");
const SPAWN_TESTS_TEMPLATE: &str = include_str!("prompts/spawn_tests.md");

/// Droppable sections, least important first.
const DROP_ORDER: [&str; 2] = ["feedback", "plan"];

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("{0} mode prompts are not supported")]
    NotSupported(Mode),
    #[error("operator {operator} takes {expected} parent individual(s), got {got}")]
    ArityMismatch {
        operator: Operator,
        expected: &'static str,
        got: usize,
    },
    #[error("render prompt template: {0}")]
    Render(#[from] minijinja::Error),
    #[error("{template} needs {needed} bytes of required content, budget is {budget}")]
    OverBudget {
        template: &'static str,
        needed: usize,
        budget: usize,
    },
}

/// Signature fields in the shapes the templates print them.
#[derive(Debug, Clone, Serialize)]
struct SignatureContext<'a> {
    task: &'a str,
    func_name: &'a str,
    inputs: &'a [String],
    input_types: &'a [String],
    outputs: &'a [String],
    output_types: &'a [String],
    joined_inputs: String,
    joined_outputs: String,
    inputs_json: String,
    input_types_json: String,
    outputs_json: String,
    output_types_json: String,
    input_schema: String,
    output_schema: String,
}

impl<'a> SignatureContext<'a> {
    fn from_signature(sig: &'a TaskSignature) -> Self {
        Self {
            task: sig.task.trim(),
            func_name: &sig.func_name,
            inputs: &sig.inputs,
            input_types: &sig.input_types,
            outputs: &sig.outputs,
            output_types: &sig.output_types,
            joined_inputs: quoted_list(&sig.inputs),
            joined_outputs: quoted_list(&sig.outputs),
            inputs_json: json_list(&sig.inputs),
            input_types_json: json_list(&sig.input_types),
            outputs_json: json_list(&sig.outputs),
            output_types_json: json_list(&sig.output_types),
            input_schema: typed_schema(&sig.inputs, &sig.input_types),
            output_schema: typed_schema(&sig.outputs, &sig.output_types),
        }
    }
}

fn quoted_list(names: &[String]) -> String {
    names
        .iter()
        .map(|name| format!("'{name}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn json_list(names: &[String]) -> String {
    serde_json::to_string(names).unwrap_or_else(|_| "[]".to_string())
}

/// `{'name': type(...), ...}`
fn typed_schema(names: &[String], types: &[String]) -> String {
    let fields = names
        .iter()
        .zip(types)
        .map(|(name, ty)| format!("'{name}': {ty}(...)"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{fields}}}")
}

fn non_empty(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|s| !s.is_empty())
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Result<Self, PromptError> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_template("operator.md", OPERATOR_TEMPLATE)?;
        env.add_template("contract_code.md", CONTRACT_CODE_TEMPLATE)?;
        env.add_template("contract_prompt.md", CONTRACT_PROMPT_TEMPLATE)?;
        env.add_template("plan_sketch.md", PLAN_SKETCH_TEMPLATE)?;
        env.add_template("plan_graph.md", PLAN_GRAPH_TEMPLATE)?;
        env.add_template("example_cases.md", EXAMPLE_CASES_TEMPLATE)?;
        env.add_template("spawn_tests.md", SPAWN_TESTS_TEMPLATE)?;
        Ok(Self { env })
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String, PromptError> {
        let template = self.env.get_template(name)?;
        Ok(template.render(ctx)?)
    }
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    /// Section identifier (e.g., "contract", "feedback").
    key: String,
    /// Whether this section is required (cannot be dropped).
    required: bool,
    content: String,
}

/// Parse sections from rendered template output using HTML comment markers.
///
/// Text before the first marker is discarded.
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
            .expect("section marker regex")
    });

    let markers: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::with_capacity(markers.len());

    for (i, caps) in markers.iter().enumerate() {
        let Some(marker) = caps.get(0) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |next| next.start());
        let content = rendered[marker.end()..end].trim().to_string();
        let required = &caps[2] == "required";
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key: caps[1].to_string(),
                required,
                content,
            });
        }
    }

    sections
}

fn total_len(sections: &[ParsedSection]) -> usize {
    sections.iter().map(|s| s.content.len()).sum()
}

/// Drop droppable sections in [`DROP_ORDER`] until the budget fits.
fn drop_sections_for_budget(sections: &mut Vec<ParsedSection>, budget: usize) {
    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }
}

/// Drop droppable sections in [`DROP_ORDER`] until the budget fits, then
/// truncate the last section.
fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {
    drop_sections_for_budget(sections, budget);

    let other_len: usize = sections
        .iter()
        .rev()
        .skip(1)
        .map(|s| s.content.len())
        .sum();
    let Some(last) = sections.last_mut() else {
        return;
    };
    let allowed = budget.saturating_sub(other_len);
    let before_len = last.content.len();
    if before_len <= allowed {
        return;
    }
    const MARKER: &str = "\n[truncated]";
    if allowed > MARKER.len() {
        truncate_at_char_boundary(&mut last.content, allowed - MARKER.len());
        last.content.push_str(MARKER);
    } else {
        truncate_at_char_boundary(&mut last.content, allowed);
    }
    debug!(
        section = last.key,
        before_len,
        after_len = last.content.len(),
        "truncated section for budget"
    );
}

fn truncate_at_char_boundary(text: &mut String, max: usize) {
    let mut cut = max.min(text.len());
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Builds prompt packs within a byte budget, dropping less critical sections first.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    /// Prompt for one evolutionary operator over `parents`.
    ///
    /// `i1` takes no parents, `e1`/`e2` take one or more, `m1`/`m2` exactly one.
    pub fn build_operator(
        &self,
        signature: &TaskSignature,
        operator: Operator,
        parents: &[Individual],
        feedback: Option<&str>,
    ) -> Result<PromptPack, PromptError> {
        if signature.mode == Mode::Tool {
            return Err(PromptError::NotSupported(signature.mode));
        }
        check_arity(operator, parents.len())?;
        let rendered = PromptEngine::new()?.render(
            "operator.md",
            context! {
                sig => SignatureContext::from_signature(signature),
                mode => signature.mode.as_str(),
                operator => operator.as_str(),
                parents => parents,
                feedback => non_empty(feedback),
            },
        )?;
        Ok(self.fit(&rendered))
    }

    /// Prompt asking for a pseudo-code decomposition of the task.
    pub fn build_plan_sketch(
        &self,
        signature: &TaskSignature,
        feedback: Option<&str>,
    ) -> Result<PromptPack, PromptError> {
        let rendered = PromptEngine::new()?.render(
            "plan_sketch.md",
            context! {
                sig => SignatureContext::from_signature(signature),
                feedback => non_empty(feedback),
            },
        )?;
        Ok(self.fit(&rendered))
    }

    /// Prompt asking for the plan graph that realizes `sketch`.
    pub fn build_plan_graph(
        &self,
        signature: &TaskSignature,
        sketch: &str,
    ) -> Result<PromptPack, PromptError> {
        let rendered = PromptEngine::new()?.render(
            "plan_graph.md",
            context! {
                sig => SignatureContext::from_signature(signature),
                sketch => sketch.trim(),
            },
        )?;
        Ok(self.fit(&rendered))
    }

    /// Prompt asking the model to author whole-task examples.
    pub fn build_example_cases(
        &self,
        signature: &TaskSignature,
        num_cases: usize,
        feedback: Option<&str>,
    ) -> Result<PromptPack, PromptError> {
        let rendered = PromptEngine::new()?.render(
            "example_cases.md",
            context! {
                sig => SignatureContext::from_signature(signature),
                num_cases => num_cases,
                feedback => non_empty(feedback),
            },
        )?;
        Ok(self.fit(&rendered))
    }

    /// Fill-in prompt for per-step test cases.
    pub fn build_spawn_tests(
        &self,
        plan: &Plan,
        skeleton: &[NodeTestSuite],
    ) -> Result<PromptPack, PromptError> {
        let rendered = PromptEngine::new()?.render(
            "spawn_tests.md",
            context! {
                listing => plan_listing(plan),
                skeleton => render_skeleton(skeleton),
            },
        )?;
        self.fit_untruncated("spawn_tests.md", &rendered)
    }

    /// Like [`Self::fit`], but required content is never cut: a skeleton
    /// with its literals missing would mislead the model.
    fn fit_untruncated(
        &self,
        template: &'static str,
        rendered: &str,
    ) -> Result<PromptPack, PromptError> {
        let mut sections = parse_sections(rendered);
        drop_sections_for_budget(&mut sections, self.budget_bytes);
        let needed = total_len(&sections);
        if needed > self.budget_bytes {
            return Err(PromptError::OverBudget {
                template,
                needed,
                budget: self.budget_bytes,
            });
        }
        Ok(PromptPack {
            content: render_sections(&sections),
        })
    }

    fn fit(&self, rendered: &str) -> PromptPack {
        let mut sections = parse_sections(rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes);
        PromptPack {
            content: render_sections(&sections),
        }
    }
}

fn check_arity(operator: Operator, got: usize) -> Result<(), PromptError> {
    let (ok, expected) = match operator {
        Operator::I1 => (got == 0, "no"),
        Operator::E1 | Operator::E2 => (got >= 1, "one or more"),
        Operator::M1 | Operator::M2 => (got == 1, "exactly one"),
    };
    if ok {
        Ok(())
    } else {
        Err(PromptError::ArityMismatch {
            operator,
            expected,
            got,
        })
    }
}

/// A rendered prompt ready to send to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPack {
    content: String,
}

impl PromptPack {
    pub fn render(&self) -> String {
        self.content.clone()
    }

    pub fn as_str(&self) -> &str {
        &self.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_cases::build_skeleton;
    use crate::core::types::{PlanEdge, TestCase};
    use crate::test_support::{individual, plan_node, signature};
    use serde_json::json;

    fn code_signature() -> TaskSignature {
        signature(&["text", "limit"], &["str", "int"], &["summary"], &["str"])
    }

    #[test]
    fn code_prompt_embeds_exact_contract() {
        let pack = PromptBuilder::new(40_000)
            .build_operator(&code_signature(), Operator::I1, &[], None)
            .expect("render");
        let content = pack.render();
        assert!(content.contains("function named main_task"));
        assert!(content.contains("accept 2 input(s): 'text', 'limit' with types str, int"));
        assert!(content.contains("return 1 output(s): 'summary' with types str"));
        assert!(content.contains("<contract>"));
        assert!(!content.contains("<!-- section:"));
    }

    #[test]
    fn prompt_mode_asks_for_json_and_one_code_block() {
        let mut sig = code_signature();
        sig.mode = Mode::Prompt;
        let parents = vec![individual("summarize each paragraph", "def generate_prompt(text, limit): ...")];
        let content = PromptBuilder::new(40_000)
            .build_operator(&sig, Operator::M1, &parents, None)
            .expect("render")
            .render();
        assert!(content.contains("generate_prompt"));
        assert!(content.contains("{'summary': str(...)}"));
        assert!(content.contains("exactly one code block"));
        assert!(content.contains("[APPROACH]: summarize each paragraph"));
    }

    #[test]
    fn crossover_lists_every_parent() {
        let parents = vec![individual("first", "def a(): pass"), individual("second", "def b(): pass")];
        let content = PromptBuilder::new(40_000)
            .build_operator(&code_signature(), Operator::E2, &parents, None)
            .expect("render")
            .render();
        assert!(content.contains("I have 2 existing algorithms"));
        assert!(content.contains("No.1:\n[ALGORITHM]: first"));
        assert!(content.contains("No.2:\n[ALGORITHM]: second"));
    }

    #[test]
    fn mutation_with_two_parents_is_a_contract_error() {
        let parents = vec![individual("a", "x"), individual("b", "y")];
        let err = PromptBuilder::new(40_000)
            .build_operator(&code_signature(), Operator::M2, &parents, None)
            .unwrap_err();
        assert!(matches!(err, PromptError::ArityMismatch { got: 2, .. }));
    }

    #[test]
    fn tool_mode_is_not_supported() {
        let mut sig = code_signature();
        sig.mode = Mode::Tool;
        let err = PromptBuilder::new(40_000)
            .build_operator(&sig, Operator::I1, &[], None)
            .unwrap_err();
        assert!(matches!(err, PromptError::NotSupported(Mode::Tool)));
    }

    #[test]
    fn budget_drops_feedback_before_truncating() {
        let feedback = "be more careful ".repeat(100);
        let builder = PromptBuilder::new(1_000);
        let content = builder
            .build_plan_sketch(&code_signature(), Some(&feedback))
            .expect("render")
            .render();
        assert!(!content.contains("be more careful"));
        assert!(content.contains("pseudo function named main_task"));

        let roomy = PromptBuilder::new(40_000)
            .build_plan_sketch(&code_signature(), Some(&feedback))
            .expect("render")
            .render();
        assert!(roomy.contains("Please incorporate this feedback"));
    }

    #[test]
    fn plan_graph_prompt_embeds_sketch_and_boundaries() {
        let content = PromptBuilder::new(40_000)
            .build_plan_graph(&code_signature(), "def main_task(text, limit): ...")
            .expect("render")
            .render();
        assert!(content.contains("Pseudo Code:\ndef main_task(text, limit): ..."));
        assert!(content.contains(r#""inputs": ["text","limit"]"#));
        assert!(content.contains(r#""output_types": ["str"]"#));
    }

    #[test]
    fn spawn_prompt_carries_listing_and_skeleton() {
        let plan = Plan {
            nodes: vec![
                plan_node("split", &["text"], &["str"], &["parts"], &["list"]),
                plan_node("join", &["parts"], &["list"], &["summary"], &["str"]),
            ],
            edges: vec![PlanEdge::new("split", "join")],
        };
        let skeleton = vec![NodeTestSuite {
            name: "split".to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }];
        let content = PromptBuilder::new(40_000)
            .build_spawn_tests(&plan, &skeleton)
            .expect("render")
            .render();
        let listing_pos = content.find("Execution Flow:\n- split → join").expect("listing");
        let skeleton_pos = content.find("```json").expect("skeleton");
        assert!(listing_pos < skeleton_pos);
    }

    fn wide_spawn_inputs(examples: usize) -> (Plan, Vec<NodeTestSuite>) {
        let plan = Plan {
            nodes: vec![plan_node("only", &["x"], &["int"], &["y"], &["int"])],
            edges: Vec::new(),
        };
        let cases: Vec<TestCase> = (0..examples as i64)
            .map(|x| {
                let input = json!({"x": x}).as_object().cloned().expect("object");
                let output = json!({"y": x * 10}).as_object().cloned().expect("object");
                TestCase::new(input, output)
            })
            .collect();
        let skeleton = build_skeleton(&plan, &cases);
        (plan, skeleton)
    }

    #[test]
    fn spawn_skeleton_is_never_truncated() {
        let (plan, skeleton) = wide_spawn_inputs(40);
        let err = PromptBuilder::new(1_000)
            .build_spawn_tests(&plan, &skeleton)
            .unwrap_err();
        assert!(matches!(
            err,
            PromptError::OverBudget { template: "spawn_tests.md", budget: 1_000, .. }
        ));
    }

    #[test]
    fn spawn_prompt_drops_listing_before_failing() {
        let (plan, skeleton) = wide_spawn_inputs(3);
        let full = PromptBuilder::new(40_000)
            .build_spawn_tests(&plan, &skeleton)
            .expect("render")
            .render();
        let listing_len = full.find("<contract>").expect("contract");
        let content = PromptBuilder::new(full.len() - listing_len)
            .build_spawn_tests(&plan, &skeleton)
            .expect("render")
            .render();
        assert!(!content.contains("Execution Flow:"));
        assert!(content.contains(r#""y": 20"#));
        assert!(!content.contains("[truncated]"));
    }

    #[test]
    fn example_case_prompt_shows_typed_shape() {
        let content = PromptBuilder::new(40_000)
            .build_example_cases(&code_signature(), 3, Some("cover empty text"))
            .expect("render")
            .render();
        assert!(content.contains("Create 3 diverse test cases"));
        assert!(content.contains("\"input\": {'text': str(...), 'limit': int(...)}"));
        assert!(content.contains("cover empty text"));
    }
}
