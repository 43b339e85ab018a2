//! Plan-graph lifecycle for LLM-driven program and prompt synthesis.
//!
//! A task is decomposed into a dependency graph of smaller synthesizable
//! steps; each step gets test cases derived from whole-task examples. The
//! crate enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (extraction, plan validation and
//!   rectification, test case filtering and combination). No I/O.
//! - **[`io`]**: Prompt templates, the model seam, config and interchange files.
//! - **[`agents`]**: Model-driven orchestration that wires the two together.

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
