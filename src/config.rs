//! Agent configuration.
//!
//! Plain structs with defaults; the binary overrides fields from CLI flags.

use std::path::{Path, PathBuf};

use crate::llm::RetryConfig;
use crate::memory::CompressionConfig;
use crate::sandbox::{SandboxConfig, SandboxError};

pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a software engineering agent working in a \
sandboxed project workspace. Use the bash tool to inspect and run things, the \
str_replace_editor tool to read and change files, and run_validation to check your work \
before reporting back. Keep changes minimal and explain what you did.";

/// Everything needed to run an [`Orchestrator`](crate::agent::Orchestrator).
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub model: String,
    /// Where the synthesized memory document is persisted.
    pub memory_path: PathBuf,
    pub base_system_prompt: String,
    /// Tool rounds allowed in one turn.
    pub max_tool_rounds: usize,
    pub sandbox: SandboxConfig,
    pub compression: CompressionConfig,
    pub retry: RetryConfig,
}

impl AgentConfig {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        let workspace = workspace.into();
        Self {
            model: DEFAULT_MODEL.to_string(),
            memory_path: default_memory_path(&workspace),
            base_system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tool_rounds: 100,
            sandbox: SandboxConfig::new(workspace),
            compression: CompressionConfig::default(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_memory_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.memory_path = path.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.base_system_prompt = prompt.into();
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn with_sandbox(mut self, sandbox: SandboxConfig) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Check the sandbox limits, and that the memory document is out of the
    /// container's reach.
    pub fn validate(&self) -> Result<(), SandboxError> {
        self.sandbox.validate()?;
        let memory = absolute(&self.memory_path);
        let workspace = absolute(&self.sandbox.host_workspace);
        if memory.starts_with(&workspace) {
            return Err(SandboxError::Config {
                reason: format!(
                    "memory file {} is inside the mounted workspace {}",
                    memory.display(),
                    workspace.display()
                ),
            });
        }
        Ok(())
    }
}

/// `~/.sandcoder/memory/<workspace-slug>.md`, outside the mounted workspace.
pub fn default_memory_path(workspace: &Path) -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".sandcoder")
        .join("memory")
        .join(format!("{}.md", workspace_slug(workspace)))
}

/// File-name-safe rendering of a workspace path.
fn workspace_slug(workspace: &Path) -> String {
    let raw = absolute(workspace).to_string_lossy().into_owned();
    let mut slug = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "workspace".to_string()
    } else {
        slug.to_string()
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::new(".")
    }
}
