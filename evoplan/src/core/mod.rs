//! Deterministic, pure logic for the plan-graph lifecycle.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod code;
pub mod edge_endpoints;
pub mod errors;
pub mod extract;
pub mod listing;
pub mod literal;
pub mod plan_schema;
pub mod plan_validator;
pub mod rectify;
pub mod test_cases;
pub mod types;
