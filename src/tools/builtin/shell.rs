//! `bash` tool: run a validated command in the sandbox.

use std::sync::Arc;

use async_trait::async_trait;

use crate::sandbox::SandboxExecutor;
use crate::tools::tool::{Tool, ToolError, require_str};

pub struct BashTool {
    executor: Arc<SandboxExecutor>,
}

impl BashTool {
    pub fn new(executor: Arc<SandboxExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Run a shell command in the project workspace inside the sandbox container. \
         Use for builds, tests, git inspection and other CLI tasks. Commands run as a \
         non-root user with a timeout; pushing to remotes, sudo and container escapes \
         are blocked."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let command = require_str(&params, "command")?;
        Ok(self.executor.execute_bash(command).await.to_payload())
    }
}
