//! Model Output Validation
//!
//! Recovers structured JSON from raw generative-service text. Contract-level
//! checks on the recovered value live with the contract itself
//! (`agent::schema`).

mod json_repair;

pub use json_repair::{JsonRepairer, extract_json_object};
