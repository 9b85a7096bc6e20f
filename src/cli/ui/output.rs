use console::{Alignment, measure_text_width, pad_str, style};
use serde_json::Value;

use crate::agent::{AgentStatus, ChatResponse, DisplayPayload, SchemaOrigin};

/// Widest cell printed before truncation
const MAX_CELL_WIDTH: usize = 40;

pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", style("ℹ").blue(), message);
    }

    pub fn section(&self, message: &str) {
        println!("\n{}", style(message).bold());
        println!("{}", "─".repeat(40));
    }

    /// Human-readable chat turn: reply, table, plan, diagnostics
    pub fn chat_response(&self, response: &ChatResponse) {
        println!("{}", response.assistant_message);

        if let Some(display) = &response.display
            && display.row_count > 1
        {
            self.table(display);
        }

        if let Some(plan) = &response.query_plan {
            println!();
            println!(
                "{} {}",
                style("template:").dim(),
                style(&plan.template).cyan()
            );
            println!("{} {}", style("sql:").dim(), style(&plan.sql).dim());
        }

        if let Some(status) = &response.agent_status {
            self.agent_status(status);
        }

        if let Some(error) = &response.error {
            self.error(error);
        }
    }

    pub fn agent_status(&self, status: &AgentStatus) {
        let source = match status.source {
            SchemaOrigin::Fresh => style("fresh").green(),
            SchemaOrigin::Cached => style("cached").cyan(),
            SchemaOrigin::Fallback => style("fallback").yellow(),
        };
        println!(
            "{} {} (age {}s)",
            style("schema:").dim(),
            source,
            status.cache_age_seconds
        );
        if let Some(error) = &status.last_error {
            self.warning(&format!("last schema error: {}", error));
        }
    }

    pub fn table(&self, display: &DisplayPayload) {
        println!();
        println!("{}", style(&display.title).bold());

        let cells: Vec<Vec<String>> = display
            .rows
            .iter()
            .map(|row| {
                display
                    .columns
                    .iter()
                    .map(|c| cell(row.get(&c.name).unwrap_or(&Value::Null)))
                    .collect()
            })
            .collect();

        let widths: Vec<usize> = display
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                cells
                    .iter()
                    .map(|row| measure_text_width(&row[i]))
                    .chain(std::iter::once(measure_text_width(&c.label)))
                    .max()
                    .unwrap_or(0)
                    .min(MAX_CELL_WIDTH)
            })
            .collect();

        let header: Vec<String> = display
            .columns
            .iter()
            .zip(&widths)
            .map(|(c, w)| pad(&c.label, *w))
            .collect();
        println!("{}", style(header.join("  ")).bold());
        println!(
            "{}",
            style(
                widths
                    .iter()
                    .map(|w| "─".repeat(*w))
                    .collect::<Vec<_>>()
                    .join("  ")
            )
            .dim()
        );

        for row in &cells {
            let line: Vec<String> = row.iter().zip(&widths).map(|(v, w)| pad(v, *w)).collect();
            println!("{}", line.join("  "));
        }

        if display.truncated {
            println!(
                "{}",
                style(format!("(first {} rows shown)", display.row_count)).dim()
            );
        }
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn pad(text: &str, width: usize) -> String {
    pad_str(text, width, Alignment::Left, Some("…")).into_owned()
}
