//! Schema Command
//!
//! Generate the agent schema through the configured provider and print it.
//!
//! Usage:
//!   transitq schema [--refresh] [--format json]

use std::sync::Arc;

use console::style;

use crate::agent::{
    AgentSettings, CachedSchema, LlmSchemaGenerator, SchemaCache, SystemClock,
};
use crate::ai::{ProviderConfig, create_provider};
use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, OutputFormat};
use crate::types::Result;

pub async fn run(ctx: &CommandContext, refresh: bool, format: OutputFormat) -> Result<()> {
    let provider = create_provider(&ProviderConfig::from(&ctx.config.llm))?;
    let settings = AgentSettings::from(&ctx.config);
    let generator = Arc::new(LlmSchemaGenerator::new(provider, settings.generator()));
    let cache = SchemaCache::new(generator, Arc::new(SystemClock), settings.schema_ttl);

    let cached = if refresh {
        cache.refresh().await?
    } else {
        cache.get().await?
    };

    if format.is_json() {
        let body = serde_json::json!({
            "agent_status": cached.status,
            "schema": cached.schema.as_ref(),
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        print_summary(&cached);
    }
    Ok(())
}

fn print_summary(cached: &CachedSchema) {
    let output = Output::new();
    output.section(&format!(
        "Agent schema: {} query templates, {} display templates",
        cached.schema.query_templates.len(),
        cached.schema.display_templates.len()
    ));

    for template in &cached.schema.query_templates {
        let params: Vec<&str> = template.params.iter().map(|p| p.name.as_str()).collect();
        println!(
            "  {} {}",
            style(&template.key).cyan().bold(),
            style(format!("→ {}", template.display_key)).dim()
        );
        if !template.description.is_empty() {
            println!("      {}", template.description);
        }
        if !params.is_empty() {
            println!("      params: {}", params.join(", "));
        }
    }

    println!();
    output.agent_status(&cached.status);
}
