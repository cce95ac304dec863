//! LLM provider trait and conversation types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Role of a message in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// One part of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text {
        text: String,
    },
    ToolCall {
        name: String,
        args: serde_json::Value,
    },
    ToolResult {
        name: String,
        payload: serde_json::Value,
    },
}

/// A message: a role and an ordered list of parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl ConversationMessage {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::Text { text: text.into() }])
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![Part::Text { text: text.into() }])
    }

    /// Assistant turn carrying tool calls (and any text that came with them).
    pub fn tool_calls(text: Option<String>, calls: &[FunctionCall]) -> Self {
        let mut parts: Vec<Part> = text
            .filter(|t| !t.is_empty())
            .map(|text| Part::Text { text })
            .into_iter()
            .collect();
        parts.extend(calls.iter().map(|call| Part::ToolCall {
            name: call.name.clone(),
            args: call.args.clone(),
        }));
        Self::new(Role::Assistant, parts)
    }

    /// One turn holding every tool result of a round.
    pub fn tool_results(results: Vec<(String, serde_json::Value)>) -> Self {
        Self::new(
            Role::Tool,
            results
                .into_iter()
                .map(|(name, payload)| Part::ToolResult { name, payload })
                .collect(),
        )
    }

    /// Concatenated text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn has_tool_results(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, Part::ToolResult { .. }))
    }
}

/// Definition of a tool exposed to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments.
    pub parameters: serde_json::Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub args: serde_json::Value,
}

/// Request to generate the next assistant turn.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub messages: Vec<ConversationMessage>,
    pub tools: Vec<ToolDefinition>,
    pub system_instruction: Option<String>,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ConversationMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            system_instruction: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_system_instruction(mut self, system: impl Into<String>) -> Self {
        self.system_instruction = Some(system.into());
        self
    }
}

/// Model output. Function calls take precedence over text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmResponse {
    pub text: Option<String>,
    pub function_calls: Vec<FunctionCall>,
}

impl LlmResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            function_calls: Vec::new(),
        }
    }

    pub fn calls(function_calls: Vec<FunctionCall>) -> Self {
        Self {
            text: None,
            function_calls,
        }
    }

    pub fn has_function_calls(&self) -> bool {
        !self.function_calls.is_empty()
    }
}

/// Trait for LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logs and errors.
    fn name(&self) -> &str;

    /// Generate the next turn. Rate limiting is reported as
    /// [`LlmError::RateLimited`].
    async fn generate(&self, request: GenerateRequest) -> Result<LlmResponse, LlmError>;
}
