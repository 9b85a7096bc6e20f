//! transitq - Natural-language questions over a GTFS schedule
//!
//! Decides whether a chat message asks about the transit data and, if so,
//! answers it with a safe, parameterized, read-only SQL query whose results
//! are shaped for display.
//!
//! ## Pipeline
//!
//! - **Question Gate**: offline lexical classifier, data question or chat
//! - **Schema Cache**: generated query/display templates with a TTL,
//!   single-flight regeneration and fallback to the previous schema
//! - **Query Planner**: template scoring and parameter binding
//! - **Safe Executor**: statement policy, row cap, statement timeout
//! - **Display Mapper**: column projection and titles
//!
//! ## Quick Start
//!
//! ```ignore
//! use transitq::{ChatRequest, ChatService, ConfigLoader};
//!
//! let config = ConfigLoader::load()?;
//! let service = ChatService::from_config(&config)?;
//! let response = service
//!     .handle(&ChatRequest::new("Which routes stop at Central Station?"))
//!     .await;
//! println!("{}", response.assistant_message);
//! ```
//!
//! ## Modules
//!
//! - [`agent`]: the chat-to-SQL pipeline
//! - [`ai`]: generative-service providers, prompts, JSON recovery
//! - [`storage`]: SQLite pool and the read-only data store
//! - [`config`]: layered configuration

pub mod agent;
pub mod ai;
pub mod cli;
pub mod config;
pub mod constants;
pub mod storage;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader};

// Error Types
pub use types::error::{ErrorCategory, Result, ResultExt, TransitError};

// Storage
pub use storage::{Database, DataStore, PoolConfig, SharedDatabase, SqliteStore};

// =============================================================================
// Agent Re-exports
// =============================================================================

pub use agent::{
    AgentSchema, AgentSettings, AgentStatus, ChatMessage, ChatRequest, ChatResponse, ChatService,
    DisplayPayload, ErrorResponse, QueryPlan, QuestionGate, SchemaCache, SchemaOrigin,
};

// =============================================================================
// AI Re-exports
// =============================================================================

pub use ai::{LlmProvider, LlmResponse, SharedProvider, create_provider, with_timeout};
