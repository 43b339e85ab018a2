//! Stable exit codes for evoplan CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid input files, config or arguments, or any other error.
pub const INVALID: i32 = 1;
/// Model output was rejected (plan failed validation, no test cases spawned).
pub const REJECTED: i32 = 2;
