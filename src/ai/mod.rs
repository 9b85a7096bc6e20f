//! AI Integration Layer
//!
//! Generative-service access for agent schema generation: provider
//! abstraction, prompt construction, timeouts, and JSON recovery.

pub mod prompt;
pub mod provider;
pub mod timeout;
pub mod validation;

pub use prompt::{PromptBuilder, PromptSection};
pub use provider::{
    BuiltinProvider, GeminiProvider, LlmProvider, LlmResponse, ProviderConfig, ResponseMetadata,
    ResponseTiming, SharedProvider, TokenUsage, create_provider,
};
pub use timeout::with_timeout;
pub use validation::{JsonRepairer, extract_json_object};
