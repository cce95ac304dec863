//! `str_replace_editor` tool: view, create and edit workspace files.

use std::sync::Arc;

use async_trait::async_trait;

use crate::sandbox::SandboxExecutor;
use crate::tools::tool::{Tool, ToolError, require_str};

pub struct EditorTool {
    executor: Arc<SandboxExecutor>,
}

impl EditorTool {
    pub fn new(executor: Arc<SandboxExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Tool for EditorTool {
    fn name(&self) -> &str {
        "str_replace_editor"
    }

    fn description(&self) -> &str {
        "View, create and edit files in the workspace. `view` shows a file with line \
         numbers (optionally a [start, end] range, end -1 for end of file) or lists a \
         directory. `create` writes a whole file. `str_replace` replaces the first exact \
         occurrence of old_str with new_str."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "enum": ["view", "create", "str_replace"],
                    "description": "The editor operation"
                },
                "path": {
                    "type": "string",
                    "description": "File or directory path, relative to the workspace"
                },
                "view_range": {
                    "type": "array",
                    "items": {"type": "integer"},
                    "minItems": 2,
                    "maxItems": 2,
                    "description": "For view: 1-indexed inclusive line range"
                },
                "file_text": {
                    "type": "string",
                    "description": "For create: full file content"
                },
                "old_str": {
                    "type": "string",
                    "description": "For str_replace: exact text to replace"
                },
                "new_str": {
                    "type": "string",
                    "description": "For str_replace: replacement text"
                }
            },
            "required": ["command", "path"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        require_str(&params, "command")?;
        require_str(&params, "path")?;
        Ok(self.executor.execute_editor(&params).await.to_payload())
    }
}
