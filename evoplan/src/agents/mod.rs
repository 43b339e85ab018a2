//! Model-driven orchestration over the pure core.
//!
//! Each agent renders a prompt, calls a [`ModelClient`](crate::io::model::ModelClient),
//! and hands the response to the extraction and validation layers.

pub mod evolver;
pub mod examples;
pub mod planner;
pub mod spawner;
