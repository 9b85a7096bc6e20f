//! Config Command
//!
//! Manage transitq configuration.
//!
//! Usage:
//!   transitq config show [-f json]
//!   transitq config path
//!   transitq config init [-g] [--force]

use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, OutputFormat};
use crate::config::ConfigLoader;
use crate::types::Result;

/// Print the merged effective configuration
pub fn show(ctx: &CommandContext, format: OutputFormat) -> Result<()> {
    println!("{}", ConfigLoader::render(&ctx.config, format.is_json())?);
    Ok(())
}

pub fn path() -> Result<()> {
    ConfigLoader::show_path();
    Ok(())
}

pub fn init(global: bool, force: bool) -> Result<()> {
    let path = if global {
        ConfigLoader::init_global(force)?
    } else {
        ConfigLoader::init_project(force)?
    };
    Output::new().success(&format!("Configuration ready: {}", path.display()));
    Ok(())
}
