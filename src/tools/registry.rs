//! Name-based tool dispatch.

use std::sync::Arc;

use crate::llm::ToolDefinition;
use crate::sandbox::{ExecutionResult, SandboxExecutor};
use crate::tools::builtin::{BashTool, EditorTool};
use crate::tools::tool::{Tool, ToolError};
use crate::tools::validation::{ValidationRunner, ValidationTool};

/// The set of tools offered to the model.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `bash`, `str_replace_editor` and `run_validation` on one sandbox.
    pub fn for_sandbox(executor: Arc<SandboxExecutor>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(BashTool::new(executor.clone())));
        registry.register(Arc::new(EditorTool::new(executor.clone())));
        registry.register(Arc::new(ValidationTool::new(
            executor,
            ValidationRunner::new(),
        )));
        registry
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    /// Run a tool by name. Failures become error payloads for the model.
    pub async fn dispatch(&self, name: &str, params: serde_json::Value) -> serde_json::Value {
        let result = match self.get(name) {
            Some(tool) => tool.execute(params).await,
            None => Err(ToolError::UnknownTool(name.to_string())),
        };
        result.unwrap_or_else(|e| {
            tracing::warn!("Tool {} failed: {}", name, e);
            ExecutionResult::failure(e.to_string()).to_payload()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::SandboxConfig;
    use crate::testing::HostShellRuntime;
    use serde_json::json;
    use tempfile::TempDir;

    fn registry() -> (TempDir, ToolRegistry) {
        let dir = TempDir::new().unwrap();
        let executor = SandboxExecutor::new(
            SandboxConfig::new(dir.path()),
            Arc::new(HostShellRuntime::new()),
        )
        .unwrap();
        (dir, ToolRegistry::for_sandbox(Arc::new(executor)))
    }

    #[test]
    fn test_definitions() {
        let (_dir, registry) = registry();
        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["bash", "str_replace_editor", "run_validation"]);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_payload() {
        let (_dir, registry) = registry();
        let payload = registry.dispatch("web_search", json!({})).await;
        assert_eq!(payload["status"], "error");
        assert!(payload["error"].as_str().unwrap().contains("web_search"));
    }

    #[tokio::test]
    async fn test_missing_parameter_is_error_payload() {
        let (_dir, registry) = registry();
        let payload = registry.dispatch("bash", json!({})).await;
        assert_eq!(payload["status"], "error");
        assert!(payload["error"].as_str().unwrap().contains("command"));
    }
}
