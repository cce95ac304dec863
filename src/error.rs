//! Error types shared across the agent.
//!
//! Sandbox errors live next to the sandbox (`crate::sandbox::SandboxError`);
//! everything the orchestrator can surface is collected in [`AgentError`].

use std::path::PathBuf;
use std::time::Duration;

use crate::sandbox::SandboxError;

/// Errors from an LLM provider.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// The provider asked us to slow down.
    #[error("Rate limited by {provider}{}", retry_after.map(|d| format!(", retry after {:?}", d)).unwrap_or_default())]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Request to {provider} failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for {provider}")]
    AuthFailed { provider: String },
}

impl LlmError {
    /// Whether this error belongs to the rate-limit class that is retried
    /// with backoff.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }

    /// Server-provided retry hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Errors from the memory subsystem.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Writing or reading the memory document failed. On a failed write the
    /// previous document is left intact.
    #[error("Memory persistence failed for {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The synthesis model call failed or produced nothing usable.
    #[error("Memory synthesis failed: {reason}")]
    Synthesis { reason: String },

    /// The persisted document could not be decoded.
    #[error("Memory document {} is not valid: {reason}", path.display())]
    Serialization { path: PathBuf, reason: String },
}

/// Top-level error for an agent turn.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// The model kept requesting tools past the configured ceiling.
    #[error("Turn aborted after {0} tool rounds without a final answer")]
    ToolRoundLimit(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_classification() {
        let err = LlmError::RateLimited {
            provider: "stub".to_string(),
            retry_after: Some(Duration::from_secs(3)),
        };
        assert!(err.is_rate_limit());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        assert!(err.to_string().contains("retry after"));

        let err = LlmError::RequestFailed {
            provider: "stub".to_string(),
            reason: "boom".to_string(),
        };
        assert!(!err.is_rate_limit());
        assert_eq!(err.retry_after(), None);
    }

    #[test]
    fn test_persistence_error_names_path() {
        let err = MemoryError::Persistence {
            path: PathBuf::from("/tmp/memory.md"),
            source: std::io::Error::other("disk full"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/tmp/memory.md"));
        assert!(msg.contains("disk full"));
    }
}
