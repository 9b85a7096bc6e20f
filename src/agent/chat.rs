//! Chat Boundary Types
//!
//! Request and response shapes exchanged with the transport layer.

use serde::{Deserialize, Serialize};

use super::cache::AgentStatus;
use super::display::DisplayPayload;
use super::planner::QueryPlan;
use crate::storage::BoundParam;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Most recent user turn in `history`
pub fn previous_user_message(history: &[ChatMessage]) -> Option<&str> {
    history
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            history: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }
}

/// The executed statement as shown to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub template: String,
    pub sql: String,
    pub params: Vec<BoundParam>,
    pub reason: String,
}

impl From<&QueryPlan> for PlanSummary {
    fn from(plan: &QueryPlan) -> Self {
        Self {
            template: plan.template_key.clone(),
            sql: plan.sql.clone(),
            params: plan.params.clone(),
            reason: plan.reason.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub assistant_message: String,
    pub query_executed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_plan: Option<PlanSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<DisplayPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_status: Option<AgentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatResponse {
    pub fn message(assistant_message: impl Into<String>) -> Self {
        Self {
            assistant_message: assistant_message.into(),
            query_executed: false,
            query_plan: None,
            display: None,
            agent_status: None,
            error: None,
        }
    }
}

/// Body of a non-2xx response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

impl ErrorResponse {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_history_defaults_empty() {
        let request: ChatRequest = serde_json::from_str(r#"{"message": "hi"}"#).unwrap();
        assert!(request.history.is_empty());

        let request: ChatRequest = serde_json::from_str(
            r#"{"message": "more", "history": [{"role": "user", "content": "list routes"}]}"#,
        )
        .unwrap();
        assert_eq!(previous_user_message(&request.history), Some("list routes"));
    }

    #[test]
    fn test_plain_reply_omits_optional_fields() {
        let json = serde_json::to_value(ChatResponse::message("Hello")).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert_eq!(json["query_executed"], false);
    }
}
