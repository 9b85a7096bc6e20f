//! Configuration Management
//!
//! Unified configuration system with hierarchical resolution:
//! 1. Built-in defaults
//! 2. Global config (`<config_dir>/transitq/config.toml`)
//! 3. Project config (`.transitq/config.toml`)
//! 4. Environment variables (`TRANSITQ_*`, then legacy flat names)
//! 5. CLI arguments (highest priority)

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::*;
