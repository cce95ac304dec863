//! LLM integration for the agent.
//!
//! The HTTP client is not part of this crate: anything implementing
//! [`LlmProvider`] can drive the orchestrator.

mod provider;
mod retry;

pub use provider::{
    ConversationMessage, FunctionCall, GenerateRequest, LlmProvider, LlmResponse, Part, Role,
    ToolDefinition,
};
pub use retry::{RetryConfig, generate_with_retry};
