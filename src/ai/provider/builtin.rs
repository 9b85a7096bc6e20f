//! Builtin Provider
//!
//! Offline provider that answers every request with the bundled agent
//! schema. Selected with `llm.provider = "builtin"`; the answer still goes
//! through the same normalization and validation as a generated schema.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{LlmProvider, LlmResponse, ResponseMetadata};
use crate::agent::AgentSchema;
use crate::types::Result;

const PROVIDER: &str = "builtin";
const MODEL: &str = "bundled-templates";

#[derive(Debug, Default)]
pub struct BuiltinProvider;

impl BuiltinProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LlmProvider for BuiltinProvider {
    async fn generate(&self, _prompt: &str, _schema: &Value) -> Result<LlmResponse> {
        debug!("Serving bundled agent schema");
        let content = serde_json::to_value(AgentSchema::builtin())?;
        let mut response = LlmResponse::content_only(content);
        response.metadata = ResponseMetadata {
            model: MODEL.to_string(),
            provider: PROVIDER.to_string(),
        };
        Ok(response)
    }

    fn name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        MODEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_returns_schema_object() {
        let response = BuiltinProvider::new()
            .generate("ignored", &Value::Null)
            .await
            .unwrap();
        assert!(response.content["query_templates"].is_array());
        assert!(response.content["display_templates"].is_array());
    }
}
