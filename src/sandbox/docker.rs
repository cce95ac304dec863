//! Docker implementation of [`ContainerRuntime`].
//!
//! # Container Setup
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────────┐
//! │                          Sandbox Container                              │
//! │                                                                         │
//! │  Command: sleep infinity (work happens through exec)                    │
//! │  Environment: none from the host (no secrets or credentials)            │
//! │                                                                         │
//! │  Mounts:                                                                │
//! │    /workspace ─▶ Host working directory (rw)                           │
//! │                                                                         │
//! │  Limits:                                                                │
//! │    Memory: 2GB (default)                                                │
//! │    CPU: quota/period, 1 CPU by default                                  │
//! │    No privileged mode, no-new-privileges                                │
//! │    Exec as non-root user (UID 1000)                                     │
//! └────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::HostConfig;
use futures::StreamExt;
use tokio::sync::OnceCell;

use crate::sandbox::error::{Result, SandboxError};
use crate::sandbox::runtime::{ContainerRuntime, ContainerSpec, ExecOutput, ExecSpec};

/// Docker runtime backed by bollard. Connects lazily on the first `ping`.
#[derive(Default)]
pub struct DockerRuntime {
    docker: OnceCell<Docker>,
}

impl DockerRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&self) -> Result<&Docker> {
        self.docker
            .get()
            .ok_or_else(|| SandboxError::RuntimeUnavailable {
                reason: "not connected; call ping first".to_string(),
            })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &str {
        "docker"
    }

    async fn ping(&self) -> Result<()> {
        let docker = self.docker.get_or_try_init(connect_docker).await?;
        docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| SandboxError::RuntimeUnavailable {
                reason: e.to_string(),
            })
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.client()?.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        use bollard::image::CreateImageOptions;

        tracing::info!("Pulling sandbox image: {}", image);

        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        let mut stream = self.client()?.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        tracing::debug!("Pull status: {}", status);
                    }
                }
                Err(e) => {
                    return Err(SandboxError::ImageUnavailable {
                        image: image.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!("Successfully pulled image: {}", image);
        Ok(())
    }

    async fn run(&self, spec: &ContainerSpec) -> Result<String> {
        let docker = self.client()?;

        let host_config = HostConfig {
            binds: Some(spec.binds.clone()),
            memory: Some(spec.memory_bytes),
            cpu_quota: Some(spec.cpu_quota),
            cpu_period: Some(spec.cpu_period),
            network_mode: Some("bridge".to_string()),
            // Drop everything; keep only what user provisioning and chown need.
            cap_drop: Some(vec!["ALL".to_string()]),
            cap_add: Some(vec![
                "CHOWN".to_string(),
                "DAC_OVERRIDE".to_string(),
                "FOWNER".to_string(),
                "SETUID".to_string(),
                "SETGID".to_string(),
            ]),
            security_opt: Some(vec!["no-new-privileges:true".to_string()]),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.cmd.clone()),
            working_dir: Some(spec.working_dir.clone()),
            env: Some(spec.env.clone()),
            host_config: Some(host_config),
            tty: Some(false),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            ..Default::default()
        };

        let response = docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| SandboxError::ContainerCreationFailed {
                reason: e.to_string(),
            })?;

        if let Err(e) = docker
            .start_container(&response.id, None::<StartContainerOptions<String>>)
            .await
        {
            // Don't leave a created-but-never-started container behind.
            let _ = self.remove(&response.id, true).await;
            return Err(SandboxError::ContainerCreationFailed {
                reason: format!("start failed: {}", e),
            });
        }

        Ok(response.id)
    }

    async fn exec(
        &self,
        container_id: &str,
        spec: &ExecSpec,
        max_output: usize,
    ) -> Result<ExecOutput> {
        let docker = self.client()?;

        let exec = docker
            .create_exec(
                container_id,
                CreateExecOptions {
                    cmd: Some(spec.cmd.iter().map(String::as_str).collect()),
                    user: Some(spec.user.as_str()),
                    working_dir: Some(spec.workdir.as_str()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| SandboxError::ExecutionFailed {
                reason: format!("exec create failed: {}", e),
            })?;

        let start_result =
            docker
                .start_exec(&exec.id, None)
                .await
                .map_err(|e| SandboxError::ExecutionFailed {
                    reason: format!("exec start failed: {}", e),
                })?;

        // Raw bytes until the stream ends; a character may span frames.
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        if let StartExecResults::Attached { mut output, .. } = start_result {
            while let Some(result) = output.next().await {
                match result {
                    Ok(LogOutput::StdOut { message }) => {
                        append_capped(&mut stdout, &message, max_output)
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        append_capped(&mut stderr, &message, max_output)
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("Error reading exec output: {}", e);
                    }
                }
            }
        }

        let inspect =
            docker
                .inspect_exec(&exec.id)
                .await
                .map_err(|e| SandboxError::ExecutionFailed {
                    reason: format!("exec inspect failed: {}", e),
                })?;

        Ok(ExecOutput {
            exit_code: inspect.exit_code.unwrap_or(-1),
            stdout: decode_output(stdout),
            stderr: decode_output(stderr),
        })
    }

    async fn stop(&self, container_id: &str, timeout: Duration) -> Result<()> {
        let options = StopContainerOptions {
            t: timeout.as_secs() as i64,
        };
        match self
            .client()?
            .stop_container(container_id, Some(options))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) || is_not_modified(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, container_id: &str, remove_volumes: bool) -> Result<()> {
        let options = RemoveContainerOptions {
            v: remove_volumes,
            force: true,
            ..Default::default()
        };
        match self
            .client()?
            .remove_container(container_id, Some(options))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Uses a fresh client: the pooled connections of the main client belong
    /// to the runtime that created them.
    fn remove_blocking(&self, container_id: &str, timeout: Duration) -> Result<()> {
        std::thread::scope(|scope| {
            scope
                .spawn(|| -> Result<()> {
                    let rt = tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()?;
                    rt.block_on(async {
                        let fresh = DockerRuntime::new();
                        tokio::time::timeout(timeout, async {
                            fresh.ping().await?;
                            fresh.remove(container_id, true).await
                        })
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

/// Connect to the Docker daemon.
///
/// Tries these locations in order:
/// 1. `DOCKER_HOST` env var (bollard default)
/// 2. `/var/run/docker.sock` (Linux default)
/// 3. `~/.docker/run/docker.sock` (Docker Desktop on macOS)
pub async fn connect_docker() -> Result<Docker> {
    if let Ok(docker) = Docker::connect_with_local_defaults()
        && docker.ping().await.is_ok()
    {
        return Ok(docker);
    }

    if let Some(home) = std::env::var_os("HOME") {
        let desktop_sock = std::path::Path::new(&home).join(".docker/run/docker.sock");
        if desktop_sock.exists() {
            let sock_str = desktop_sock.to_string_lossy();
            if let Ok(docker) =
                Docker::connect_with_socket(&sock_str, 120, bollard::API_DEFAULT_VERSION)
                && docker.ping().await.is_ok()
            {
                return Ok(docker);
            }
        }
    }

    Err(SandboxError::RuntimeUnavailable {
        reason: "no reachable Docker socket (DOCKER_HOST, /var/run/docker.sock, ~/.docker/run/docker.sock)"
            .to_string(),
    })
}

fn is_not_found(e: &BollardError) -> bool {
    matches!(
        e,
        BollardError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

fn is_not_modified(e: &BollardError) -> bool {
    matches!(
        e,
        BollardError::DockerResponseServerError {
            status_code: 304,
            ..
        }
    )
}

/// Append `bytes` to `buf` without letting `buf` grow past `max` bytes.
fn append_capped(buf: &mut Vec<u8>, bytes: &[u8], max: usize) {
    let remaining = max.saturating_sub(buf.len());
    buf.extend_from_slice(&bytes[..bytes.len().min(remaining)]);
}

/// Decode a finished stream. A character cut by the output cap is dropped;
/// other invalid sequences become U+FFFD.
fn decode_output(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) if e.utf8_error().error_len().is_none() => {
            let valid = e.utf8_error().valid_up_to();
            let mut bytes = e.into_bytes();
            bytes.truncate(valid);
            String::from_utf8(bytes).unwrap_or_default()
        }
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_capped() {
        let mut buf = Vec::new();
        append_capped(&mut buf, b"hello", 8);
        append_capped(&mut buf, b" world", 8);
        assert_eq!(buf, b"hello wo");
        append_capped(&mut buf, b"more", 8);
        assert_eq!(buf, b"hello wo");

        let mut buf = Vec::new();
        append_capped(&mut buf, "aé".as_bytes(), 2);
        assert_eq!(decode_output(buf), "a");
    }

    #[test]
    fn test_character_split_across_frames() {
        let text = "café au lait";
        let bytes = text.as_bytes();
        let split = text.find('é').unwrap() + 1;

        let mut buf = Vec::new();
        append_capped(&mut buf, &bytes[..split], 1024);
        append_capped(&mut buf, &bytes[split..], 1024);
        assert_eq!(decode_output(buf), text);
    }

    #[test]
    fn test_invalid_bytes_replaced() {
        assert_eq!(decode_output(b"caf\xE9!".to_vec()), "caf\u{FFFD}!");
    }

    #[test]
    fn test_not_found_classification() {
        let err = BollardError::DockerResponseServerError {
            status_code: 404,
            message: "No such container".to_string(),
        };
        assert!(is_not_found(&err));
        assert!(!is_not_modified(&err));
    }

    #[tokio::test]
    async fn test_docker_connection() {
        // This test requires Docker to be running
        let runtime = DockerRuntime::new();
        if runtime.ping().await.is_err() {
            eprintln!("Skipping Docker test: Docker not available");
            return;
        }
        assert!(runtime.image_exists("sandcoder-definitely-missing:0").await.is_ok());
    }

    #[tokio::test]
    async fn test_client_requires_ping() {
        let runtime = DockerRuntime::new();
        let err = runtime.image_exists("alpine").await.unwrap_err();
        assert!(err.is_setup_failure());
    }
}
