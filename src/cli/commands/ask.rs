//! Ask Command
//!
//! Run one chat turn against the configured schedule database.
//!
//! Usage:
//!   transitq ask "which routes stop at Central Station?"
//!   transitq ask "what about route 22" --history turns.json --format json

use std::path::Path;

use crate::agent::{ChatRequest, ChatService};
use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, OutputFormat, read_history};
use crate::types::Result;

pub async fn run(
    ctx: &CommandContext,
    message: &str,
    history: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    ctx.require_database()?;

    let history = match history {
        Some(path) => read_history(path)?,
        None => Vec::new(),
    };

    let service = ChatService::from_config(&ctx.config)?;
    let request = ChatRequest::new(message).with_history(history);
    let response = service.handle(&request).await;

    if format.is_json() {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        Output::new().chat_response(&response);
    }
    Ok(())
}
