//! Tool trait and types.

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::ToolDefinition;

/// Error type for tool dispatch.
///
/// Sandbox-level failures are not errors here: they come back inside the
/// tool's JSON result.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

/// Trait for tools that the agent can use.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name.
    fn name(&self) -> &str;

    /// Get a description of what the tool does.
    fn description(&self) -> &str;

    /// Get the JSON Schema for the tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given parameters.
    async fn execute(&self, params: serde_json::Value) -> Result<serde_json::Value, ToolError>;

    /// Get the tool definition for LLM function calling.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Pull a required string parameter.
pub(crate) fn require_str<'a>(
    params: &'a serde_json::Value,
    name: &str,
) -> Result<&'a str, ToolError> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidParameters(format!("missing '{}' parameter", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_require_str() {
        let params = json!({"command": "ls", "n": 3});
        assert_eq!(require_str(&params, "command").unwrap(), "ls");
        assert!(matches!(
            require_str(&params, "n"),
            Err(ToolError::InvalidParameters(_))
        ));
        assert!(require_str(&params, "missing").is_err());
    }
}
