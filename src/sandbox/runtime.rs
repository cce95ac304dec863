//! Container runtime abstraction.
//!
//! The executor talks to the runtime only through [`ContainerRuntime`], so the
//! lifecycle and editor logic can be exercised without a Docker daemon.

use std::time::Duration;

use async_trait::async_trait;

use crate::sandbox::error::{Result, SandboxError};

/// Everything needed to launch the long-lived sandbox container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// Keep-alive command; all real work happens through exec.
    pub cmd: Vec<String>,
    /// `host:container:mode` bind mounts.
    pub binds: Vec<String>,
    pub working_dir: String,
    pub memory_bytes: i64,
    pub cpu_quota: i64,
    pub cpu_period: i64,
    /// Environment passed to the container. Host secrets never go here.
    pub env: Vec<String>,
}

/// One command executed inside a running container.
#[derive(Debug, Clone)]
pub struct ExecSpec {
    pub cmd: Vec<String>,
    /// `uid:gid` or a user name.
    pub user: String,
    pub workdir: String,
}

impl ExecSpec {
    /// `sh -c <script>` as the given user.
    pub fn shell(script: impl Into<String>, user: impl Into<String>, workdir: impl Into<String>) -> Self {
        Self {
            cmd: vec!["sh".to_string(), "-c".to_string(), script.into()],
            user: user.into(),
            workdir: workdir.into(),
        }
    }

    /// Run under `timeout -s KILL` so the process dies in the container when
    /// `limit` passes, not just the client's wait for it. Exits 137 when
    /// killed.
    pub fn with_kill_after(mut self, limit: Duration) -> Self {
        let secs = limit.as_secs() + u64::from(limit.subsec_nanos() > 0);
        let mut cmd = vec![
            "timeout".to_string(),
            "-s".to_string(),
            "KILL".to_string(),
            secs.max(1).to_string(),
        ];
        cmd.append(&mut self.cmd);
        self.cmd = cmd;
        self
    }
}

/// Demultiplexed output of an exec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Operations the sandbox needs from a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Runtime name for logs.
    fn name(&self) -> &str;

    /// Connect (if needed) and check the runtime is reachable.
    async fn ping(&self) -> Result<()>;

    async fn image_exists(&self, image: &str) -> Result<bool>;

    async fn pull_image(&self, image: &str) -> Result<()>;

    /// Create and start a detached container, returning its id.
    async fn run(&self, spec: &ContainerSpec) -> Result<String>;

    /// Run a command in a running container. Output beyond `max_output`
    /// bytes per stream is dropped.
    async fn exec(&self, container_id: &str, spec: &ExecSpec, max_output: usize)
    -> Result<ExecOutput>;

    /// Stop a container. Already stopped or missing containers are not an
    /// error.
    async fn stop(&self, container_id: &str, timeout: Duration) -> Result<()>;

    /// Remove a container and, optionally, its anonymous volumes. Missing
    /// containers are not an error.
    async fn remove(&self, container_id: &str, remove_volumes: bool) -> Result<()>;

    /// Force-remove a container from synchronous code such as `Drop`.
    ///
    /// Runs on a scoped thread with its own current-thread runtime so it works
    /// both inside and outside a tokio context.
    fn remove_blocking(&self, container_id: &str, timeout: Duration) -> Result<()> {
        std::thread::scope(|scope| {
            scope
                .spawn(|| -> Result<()> {
                    let rt = tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()?;
                    rt.block_on(async {
                        tokio::time::timeout(timeout, self.remove(container_id, true))
                            .await
                            .map_err(|_| SandboxError::Timeout(timeout))?
                    })
                })
                .join()
                .map_err(|_| SandboxError::ExecutionFailed {
                    reason: "teardown thread panicked".to_string(),
                })?
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_kill_after_wraps_command() {
        let spec = ExecSpec::shell("sleep 5", "1000:1000", "/workspace")
            .with_kill_after(Duration::from_millis(1500));
        assert_eq!(spec.cmd, vec!["timeout", "-s", "KILL", "2", "sh", "-c", "sleep 5"]);
        assert_eq!(spec.user, "1000:1000");
    }
}
