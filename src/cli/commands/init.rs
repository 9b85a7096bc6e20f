//! Init Command
//!
//! Create the GTFS tables in the configured SQLite file and, when missing,
//! the project configuration.

use tracing::debug;

use crate::cli::ui::Output;
use crate::cli::util::CommandContext;
use crate::config::ConfigLoader;
use crate::storage::{Database, PoolConfig};
use crate::types::Result;

pub fn run(ctx: &CommandContext, sample: bool) -> Result<()> {
    let output = Output::new();

    let config_path = ConfigLoader::init_project(false)?;
    debug!("Project config: {}", config_path.display());

    let path = ctx.db_path();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let db = Database::open_with_config(path, PoolConfig::from(&ctx.config.database))?;
    db.initialize()?;

    if sample {
        let populated = db.table_counts()?.iter().any(|(_, count)| *count > 0);
        if populated {
            output.warning("Database already has rows; sample feed not loaded");
        } else {
            db.load_sample_feed()?;
        }
    }

    output.success(&format!("Initialized {}", path.display()));
    for (table, count) in db.table_counts()? {
        println!("  {:<12} {}", table, count);
    }
    println!();
    println!("Next steps:");
    println!("  1. Load a GTFS feed into the four tables (or re-run with --sample)");
    println!("  2. Set GEMINI_API_KEY, or use llm.provider = \"builtin\"");
    println!("  3. transitq ask \"which routes stop at Central Station?\"");

    Ok(())
}
