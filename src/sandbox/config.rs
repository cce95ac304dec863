//! Configuration for the container sandbox.

use std::path::PathBuf;
use std::time::Duration;

use crate::sandbox::error::{Result, SandboxError};

/// Configuration for the sandbox.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Host directory bind-mounted into the container.
    pub host_workspace: PathBuf,
    /// Mount point inside the container.
    pub container_workspace: String,
    /// Image to run.
    pub image: String,
    /// Whether to pull the image if not found locally.
    pub auto_pull_image: bool,
    /// Name of the non-root user commands run as.
    pub user: String,
    pub uid: u32,
    pub gid: u32,
    /// Memory limit in megabytes.
    pub memory_limit_mb: u64,
    /// CPU quota in microseconds per 100ms period (100000 = one CPU).
    pub cpu_quota: i64,
    /// Timeout for a single command.
    pub timeout: Duration,
    /// Grace period given to the container on stop.
    pub stop_timeout: Duration,
    /// Maximum combined output returned to the model.
    pub max_output_bytes: usize,
}

/// CFS period paired with `cpu_quota`.
pub const CPU_PERIOD_US: i64 = 100_000;

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            host_workspace: PathBuf::from("."),
            container_workspace: "/workspace".to_string(),
            image: "python:3.11-slim".to_string(),
            auto_pull_image: true,
            user: "agent".to_string(),
            uid: 1000,
            gid: 1000,
            memory_limit_mb: 2048,
            cpu_quota: 100_000,
            timeout: Duration::from_secs(120),
            stop_timeout: Duration::from_secs(10),
            max_output_bytes: 64 * 1024,
        }
    }
}

impl SandboxConfig {
    /// Create a config for the given host workspace with defaults elsewhere.
    pub fn new(host_workspace: impl Into<PathBuf>) -> Self {
        Self {
            host_workspace: host_workspace.into(),
            ..Default::default()
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_user(mut self, user: impl Into<String>, uid: u32, gid: u32) -> Self {
        self.user = user.into();
        self.uid = uid;
        self.gid = gid;
        self
    }

    pub fn with_memory_limit_mb(mut self, mb: u64) -> Self {
        self.memory_limit_mb = mb;
        self
    }

    pub fn with_cpu_quota(mut self, quota: i64) -> Self {
        self.cpu_quota = quota;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_container_workspace(mut self, path: impl Into<String>) -> Self {
        self.container_workspace = path.into();
        self
    }

    /// Memory limit in bytes as passed to the runtime.
    pub fn memory_bytes(&self) -> i64 {
        (self.memory_limit_mb as i64).saturating_mul(1024 * 1024)
    }

    /// `uid:gid` string for exec calls.
    pub fn exec_user(&self) -> String {
        format!("{}:{}", self.uid, self.gid)
    }

    /// Reject settings that would defeat isolation or make every call fail.
    pub fn validate(&self) -> Result<()> {
        if self.uid == 0 || self.gid == 0 {
            return Err(SandboxError::Config {
                reason: "uid and gid must be non-zero; commands never run as root".to_string(),
            });
        }
        if self.user.is_empty()
            || !self
                .user
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(SandboxError::Config {
                reason: format!("invalid user name '{}'", self.user),
            });
        }
        if self.memory_limit_mb == 0 || self.cpu_quota <= 0 {
            return Err(SandboxError::Config {
                reason: "memory and CPU limits must be positive".to_string(),
            });
        }
        if self.timeout.is_zero() || self.max_output_bytes == 0 {
            return Err(SandboxError::Config {
                reason: "timeout and max output must be positive".to_string(),
            });
        }
        if !self.container_workspace.starts_with('/') {
            return Err(SandboxError::Config {
                reason: format!(
                    "container workspace must be absolute, got '{}'",
                    self.container_workspace
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SandboxConfig::default();
        assert_eq!(config.image, "python:3.11-slim");
        assert_eq!(config.container_workspace, "/workspace");
        assert_eq!(config.exec_user(), "1000:1000");
        assert_eq!(config.memory_bytes(), 2048 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_root_user_rejected() {
        let config = SandboxConfig::default().with_user("agent", 0, 1000);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_limits_rejected() {
        assert!(
            SandboxConfig::default()
                .with_memory_limit_mb(0)
                .validate()
                .is_err()
        );
        assert!(SandboxConfig::default().with_cpu_quota(0).validate().is_err());
        assert!(
            SandboxConfig::default()
                .with_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_user_name_must_be_shell_safe() {
        let config = SandboxConfig::default().with_user("agent; rm -rf /", 1000, 1000);
        assert!(config.validate().is_err());
    }
}
