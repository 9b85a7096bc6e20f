//! Display Mapper
//!
//! Turns an execution result into the payload the chat surface renders.
//! Pure: the same result and spec always produce the same payload.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::executor::ExecutionResult;
use super::schema::{ColumnType, DisplaySpec, Formatting};
use crate::constants::display;
use crate::storage::{BoundParam, ParamValue, Row};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayColumn {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayPayload {
    pub key: String,
    pub title: String,
    pub columns: Vec<DisplayColumn>,
    pub rows: Vec<Row>,
    /// Always present; zero means an empty result
    pub row_count: usize,
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_id_field: Option<String>,
    #[serde(default, skip_serializing_if = "Formatting::is_empty")]
    pub formatting: Formatting,
}

impl DisplayPayload {
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// The only cell of a one-row, one-column result
    pub fn single_value(&self) -> Option<&Value> {
        match (self.rows.as_slice(), self.columns.as_slice()) {
            ([row], [column]) => row.get(&column.name),
            _ => None,
        }
    }
}

/// Shape `result` with `spec`; without a spec, columns come from the first row
pub fn render(
    result: &ExecutionResult,
    spec: Option<&DisplaySpec>,
    display_key: &str,
    params: &[BoundParam],
) -> DisplayPayload {
    let columns: Vec<DisplayColumn> = match spec {
        Some(spec) => spec
            .columns
            .iter()
            .map(|c| DisplayColumn {
                name: c.name.clone(),
                label: c.label.clone(),
                column_type: c.column_type,
            })
            .collect(),
        None => infer_columns(result.rows.first()),
    };

    let rows: Vec<Row> = result
        .rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| (c.name.clone(), row.get(&c.name).cloned().unwrap_or(Value::Null)))
                .collect()
        })
        .collect();

    let title = match spec {
        Some(spec) => render_title(&spec.title_template, result, params),
        None => display::GENERIC_TITLE.to_string(),
    };

    DisplayPayload {
        key: spec.map_or_else(|| display_key.to_string(), |s| s.key.clone()),
        title,
        columns,
        row_count: rows.len(),
        rows,
        truncated: result.truncated,
        row_id_field: spec.and_then(|s| s.row_id_field.clone()),
        formatting: spec.map(formatting_for).unwrap_or_default(),
    }
}

/// Declared hints, or hints implied by the declared columns
fn formatting_for(spec: &DisplaySpec) -> Formatting {
    if spec.formatting.is_empty() {
        Formatting::infer(&spec.columns)
    } else {
        spec.formatting.clone()
    }
}

fn infer_columns(first: Option<&Row>) -> Vec<DisplayColumn> {
    first
        .map(|row| {
            row.iter()
                .map(|(name, value)| DisplayColumn {
                    name: name.clone(),
                    label: humanize(name),
                    column_type: match value {
                        Value::Number(n) if n.is_i64() || n.is_u64() => ColumnType::Integer,
                        Value::Number(_) => ColumnType::Number,
                        _ => ColumnType::String,
                    },
                })
                .collect()
        })
        .unwrap_or_default()
}

fn humanize(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fill `{name}` from row_count, then bound params, then the first row.
/// A name with no source anywhere keeps the template text unchanged.
fn render_title(template: &str, result: &ExecutionResult, params: &[BoundParam]) -> String {
    let mut unresolved = false;
    let rendered = PLACEHOLDER.replace_all(template, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        match lookup(name, result, params) {
            Some(value) => value,
            None => {
                unresolved = true;
                String::new()
            }
        }
    });

    if unresolved {
        return template.to_string();
    }
    rendered.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn lookup(name: &str, result: &ExecutionResult, params: &[BoundParam]) -> Option<String> {
    if name == "row_count" {
        return Some(result.row_count.to_string());
    }

    if let Some(param) = params.iter().find(|p| p.name == name)
        && !matches!(param.value, ParamValue::Null)
    {
        return Some(match &param.value {
            ParamValue::Text(s) => s.clone(),
            ParamValue::Integer(i) => i.to_string(),
            ParamValue::Real(f) => f.to_string(),
            ParamValue::Null => String::new(),
        });
    }

    let first = result.rows.first()?;
    match first.get(name)? {
        Value::Null => Some(String::new()),
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
