//! Error types for the container sandbox.

use std::time::Duration;

/// Errors that can occur in the sandbox system.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// The container runtime is not reachable.
    #[error("Container runtime not available: {reason}. Is the Docker daemon running?")]
    RuntimeUnavailable { reason: String },

    /// The sandbox image is missing locally and could not be pulled.
    #[error("Image {image} unavailable: {reason}")]
    ImageUnavailable { image: String, reason: String },

    /// Failed to create or start the container.
    #[error("Container creation failed: {reason}")]
    ContainerCreationFailed { reason: String },

    /// Creating the non-root user or taking ownership of the workspace failed.
    #[error("User provisioning failed: {reason}")]
    ProvisioningFailed { reason: String },

    /// Command execution failed inside container.
    #[error("Execution failed: {reason}")]
    ExecutionFailed { reason: String },

    /// Command timed out.
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    /// Operation called in the wrong lifecycle state.
    #[error("Sandbox is {state}, cannot {operation}")]
    InvalidState {
        state: &'static str,
        operation: &'static str,
    },

    /// Docker API error.
    #[error("Docker API error: {0}")]
    Docker(#[from] bollard::errors::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {reason}")]
    Config { reason: String },
}

impl SandboxError {
    /// Fatal errors raised while bringing the sandbox up. These are never
    /// retried.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            SandboxError::RuntimeUnavailable { .. }
                | SandboxError::ImageUnavailable { .. }
                | SandboxError::ContainerCreationFailed { .. }
                | SandboxError::ProvisioningFailed { .. }
                | SandboxError::Config { .. }
        )
    }
}

/// Result type for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;
