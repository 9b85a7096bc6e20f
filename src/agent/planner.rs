//! Query Planner
//!
//! Picks the best-matching template from one agent schema snapshot and
//! binds its parameters from entities found in the message.
//!
//! Scoring per template:
//! - +3 for each intent phrase present in the message
//! - +1 for each word of the template key present in the message
//! - +2 when one `required_inputs` group is fully bound
//! - +1 for each non-limit parameter bound from the message
//!
//! The highest score at or above `min_confidence` wins; ties keep the
//! template declared first.
//!
//! A `:limit` placeholder is bound one past the row limit so the store can
//! see that more rows exist and mark the result truncated.

use std::collections::HashSet;

use chrono::NaiveTime;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use super::chat::{ChatMessage, previous_user_message};
use super::extract::Entities;
use super::gate::{contains_phrase, is_follow_up, tokenize};
use super::safety::{self, LimitClause};
use super::schema::{AgentSchema, ParamType, QueryTemplate};
use crate::constants::query;
use crate::storage::{BoundParam, ParamValue};
use crate::types::{Result, TransitError};

const LIMIT_PARAM_NAMES: &[&str] = &["limit", "top_n", "n"];

const KEY_STOPWORDS: &[&str] = &["for", "on", "list", "of", "to", "at", "the"];

const START_OF_SERVICE_DAY: &str = "00:00:00";

const NO_TEMPLATE_REPLY: &str = "I could not match that to a schedule query. Try asking, for \
     example: \"list routes\", \"stops on route 10\", \"arrivals at Central Station after 08:00\", \
     or \"busiest stops\".";

/// A bound, ready-to-run statement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryPlan {
    pub template_key: String,
    pub sql: String,
    /// Declaration order of the template's params
    pub params: Vec<BoundParam>,
    pub display_key: String,
    pub row_limit: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Copy)]
pub struct PlannerSettings {
    pub max_rows: usize,
    pub min_confidence: u32,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            max_rows: query::DEFAULT_MAX_RESULT_ROWS,
            min_confidence: query::DEFAULT_MIN_CONFIDENCE,
        }
    }
}

struct Binding {
    params: Vec<BoundParam>,
    /// Params whose value came from the conversation
    from_message: HashSet<String>,
    row_limit: usize,
}

struct Candidate<'a> {
    template: &'a QueryTemplate,
    binding: Binding,
    score: u32,
    satisfied: bool,
}

#[derive(Debug, Clone, Default)]
pub struct QueryPlanner {
    settings: PlannerSettings,
}

impl QueryPlanner {
    pub fn new(settings: PlannerSettings) -> Self {
        Self { settings }
    }

    /// Choose and bind a template, or explain what is missing
    #[instrument(skip_all, fields(templates = schema.query_templates.len()))]
    pub fn propose(
        &self,
        message: &str,
        history: &[ChatMessage],
        schema: &AgentSchema,
        now: NaiveTime,
    ) -> Result<QueryPlan> {
        let current = Entities::extract(message);
        let (text, entities) = match previous_user_message(history) {
            Some(previous) if is_follow_up(message) => (
                format!("{} {}", previous, message),
                current.carry_over(&Entities::extract(previous)),
            ),
            _ => (message.to_string(), current),
        };

        let tokens = tokenize(&text.to_lowercase());
        let stems: HashSet<&str> = tokens.iter().map(|t| stem(t)).collect();

        let mut best: Option<Candidate<'_>> = None;
        for template in &schema.query_templates {
            let candidate = self.score(template, &tokens, &stems, &entities, now);
            debug!(template = %template.key, score = candidate.score, "Scored template");
            if best.as_ref().is_none_or(|b| candidate.score > b.score) {
                best = Some(candidate);
            }
        }

        let Some(best) = best.filter(|c| c.score >= self.settings.min_confidence) else {
            return Err(TransitError::no_match(NO_TEMPLATE_REPLY));
        };

        if !best.satisfied {
            return Err(TransitError::no_match(format!(
                "I need more detail before querying: {}",
                describe_required(&best.template.required_inputs)
            )));
        }

        let mut bound: Vec<&str> = best
            .binding
            .params
            .iter()
            .filter(|p| best.binding.from_message.contains(&p.name))
            .map(|p| p.name.as_str())
            .collect();
        bound.sort_unstable();
        let reason = if bound.is_empty() {
            format!("Selected '{}' (score {})", best.template.key, best.score)
        } else {
            format!(
                "Selected '{}' (score {}) with {}",
                best.template.key,
                best.score,
                bound.join(", ")
            )
        };

        Ok(QueryPlan {
            template_key: best.template.key.clone(),
            sql: best.template.sql.clone(),
            params: best.binding.params,
            display_key: best.template.display_key.clone(),
            row_limit: best.binding.row_limit,
            reason,
        })
    }

    fn score<'a>(
        &self,
        template: &'a QueryTemplate,
        tokens: &[String],
        stems: &HashSet<&str>,
        entities: &Entities,
        now: NaiveTime,
    ) -> Candidate<'a> {
        let mut score = 0;

        for phrase in &template.intent_keywords {
            if contains_phrase(tokens, phrase) {
                score += 3;
            }
        }

        for word in template.key.split('_') {
            if !KEY_STOPWORDS.contains(&word) && stems.contains(stem(word)) {
                score += 1;
            }
        }

        let binding = self.bind(template, entities, now);
        let satisfied = template.required_inputs.is_empty()
            || template.required_inputs.iter().any(|group| {
                group
                    .iter()
                    .all(|name| binding.from_message.contains(name))
            });
        if satisfied {
            score += 2;
        }
        score += binding.from_message.len() as u32;

        Candidate {
            template,
            binding,
            score,
            satisfied,
        }
    }

    fn bind(&self, template: &QueryTemplate, entities: &Entities, now: NaiveTime) -> Binding {
        let limit_param = match safety::limit_clause(&template.sql) {
            Some(LimitClause::Param(name)) => Some(name),
            _ => None,
        };
        let requested = entities
            .limit
            .unwrap_or(template.default_limit)
            .max(1) as usize;
        let row_limit = requested.min(self.settings.max_rows);

        let mut params = Vec::with_capacity(template.params.len());
        let mut from_message = HashSet::new();

        for param in &template.params {
            let is_limit = limit_param.as_deref() == Some(param.name.as_str())
                || LIMIT_PARAM_NAMES.contains(&param.name.as_str());
            if is_limit {
                params.push(BoundParam::new(
                    &param.name,
                    ParamValue::Integer(row_limit as i64 + 1),
                ));
                continue;
            }

            let extracted = match param.param_type {
                ParamType::Time => entities.time.clone().map(ParamValue::Text).or_else(|| {
                    entities
                        .now
                        .then(|| ParamValue::Text(now.format("%H:%M:%S").to_string()))
                }),
                ParamType::Enum => param
                    .values
                    .iter()
                    .find(|v| entities_mention(entities, v))
                    .map(|v| ParamValue::Text(v.clone())),
                _ => from_entities(&param.name, entities),
            };

            let value = match extracted {
                Some(value) => {
                    from_message.insert(param.name.clone());
                    value
                }
                None => match (&param.default, param.param_type) {
                    (Some(default), _) => from_json(default),
                    (None, ParamType::Time) => ParamValue::text(START_OF_SERVICE_DAY),
                    (None, _) => ParamValue::Null,
                },
            };
            params.push(BoundParam::new(&param.name, coerce(value, param.param_type)));
        }

        Binding {
            params,
            from_message,
            row_limit,
        }
    }
}

/// Plural `s` dropped so "stops" meets "stop"
fn stem(token: &str) -> &str {
    if token.len() > 3 {
        token.strip_suffix('s').unwrap_or(token)
    } else {
        token
    }
}

fn from_entities(name: &str, e: &Entities) -> Option<ParamValue> {
    let text = |v: &Option<String>| v.clone().map(ParamValue::Text);
    match name {
        "route_id" => text(&e.route_id).or_else(|| text(&e.route_ref)),
        "route_short_name" => text(&e.route_ref).or_else(|| text(&e.route_id)),
        "route_type" => e.route_type.map(ParamValue::Integer),
        "stop_id" => text(&e.stop_id),
        "stop_name" => text(&e.stop_name),
        "lat" => e.lat.map(ParamValue::Real),
        "lon" => e.lon.map(ParamValue::Real),
        "radius_km" => e
            .radius_km
            .or_else(|| e.has_coordinates().then_some(query::DEFAULT_RADIUS_KM))
            .map(ParamValue::Real),
        _ => None,
    }
}

fn entities_mention(entities: &Entities, value: &str) -> bool {
    let value = value.to_lowercase();
    [&entities.quoted, &entities.route_ref, &entities.stop_name]
        .into_iter()
        .flatten()
        .any(|v| v.to_lowercase() == value)
}

fn from_json(value: &Value) -> ParamValue {
    match value {
        Value::Null => ParamValue::Null,
        Value::Bool(b) => ParamValue::Integer(i64::from(*b)),
        Value::Number(n) => n
            .as_i64()
            .map(ParamValue::Integer)
            .or_else(|| n.as_f64().map(ParamValue::Real))
            .unwrap_or(ParamValue::Null),
        Value::String(s) => ParamValue::Text(s.clone()),
        other => ParamValue::Text(other.to_string()),
    }
}

fn coerce(value: ParamValue, param_type: ParamType) -> ParamValue {
    match (param_type, value) {
        (ParamType::Integer, ParamValue::Text(s)) => match s.trim().parse() {
            Ok(n) => ParamValue::Integer(n),
            Err(_) => ParamValue::Text(s),
        },
        (ParamType::Number, ParamValue::Integer(n)) => ParamValue::Real(n as f64),
        (ParamType::Number, ParamValue::Text(s)) => match s.trim().parse() {
            Ok(n) => ParamValue::Real(n),
            Err(_) => ParamValue::Text(s),
        },
        (_, value) => value,
    }
}

fn describe_required(groups: &[Vec<String>]) -> String {
    let mut alternatives: Vec<String> = groups.iter().map(|group| group.join(" and ")).collect();
    alternatives.sort();
    alternatives.join(" or ")
}
