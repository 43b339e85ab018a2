//! Side-effecting helpers: prompt templates, the model seam, config and
//! on-disk interchange files.

pub mod config;
pub mod model;
pub mod prompt;
pub mod store;
