//! Human-readable plan listing embedded in prompts.

use std::fmt::Write as _;

use crate::core::types::Plan;

/// Render nodes and execution flow as plain text.
pub fn plan_listing(plan: &Plan) -> String {
    let mut out = String::from("Nodes:\n");
    for node in &plan.nodes {
        let _ = writeln!(out, "- Task: {}", node.task);
        let _ = writeln!(out, "  Name: {}", node.name);
        let _ = writeln!(
            out,
            "  Inputs: {} ({})",
            node.inputs.join(", "),
            node.input_types.join(", ")
        );
        let _ = writeln!(
            out,
            "  Outputs: {} ({})\n",
            node.outputs.join(", "),
            node.output_types.join(", ")
        );
    }
    out.push_str("Execution Flow:\n");
    for edge in &plan.edges {
        let _ = writeln!(out, "- {} → {}", edge.source, edge.target);
    }
    out
}
