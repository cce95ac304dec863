//! Sandbox executor: one hardened container per instance.
//!
//! ```text
//! Uninitialized ──start──▶ Connected ──create_container──▶ Running
//!       │                      │                              │
//!       └──────────────────────┴────────────cleanup───────────┴──▶ TornDown
//! ```
//!
//! Every bash command and editor path passes the [`SecurityValidator`] before
//! it reaches the container. Command-level failures come back as
//! [`ExecutionResult`]s; only setup failures are raised.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::safety::{SecurityValidator, ValidationResult, sanitize_output};
use crate::sandbox::config::{CPU_PERIOD_US, SandboxConfig};
use crate::sandbox::docker::DockerRuntime;
use crate::sandbox::editor::{self, EditorCommand, shell_quote};
use crate::sandbox::error::{Result, SandboxError};
use crate::sandbox::result::{ContainerSetupInfo, ExecutionResult};
use crate::sandbox::runtime::{ContainerRuntime, ContainerSpec, ExecOutput, ExecSpec};

/// Size of each base64 chunk written through exec. A multiple of 4 so every
/// chunk decodes on its own.
const WRITE_CHUNK: usize = 64 * 1024;

/// How long the client waits past the command timeout for the in-container
/// kill to land.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// `timeout -s KILL` exit status: 128 + SIGKILL.
const KILLED_EXIT_CODE: i64 = 137;

/// Lifecycle state of a sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    Uninitialized,
    Connected,
    Running,
    TornDown,
}

impl SandboxState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Connected => "connected",
            Self::Running => "running",
            Self::TornDown => "torn down",
        }
    }
}

#[derive(Debug)]
enum Lifecycle {
    Uninitialized,
    Connected,
    Running { container_id: String },
    TornDown,
}

impl Lifecycle {
    fn state(&self) -> SandboxState {
        match self {
            Lifecycle::Uninitialized => SandboxState::Uninitialized,
            Lifecycle::Connected => SandboxState::Connected,
            Lifecycle::Running { .. } => SandboxState::Running,
            Lifecycle::TornDown => SandboxState::TornDown,
        }
    }
}

/// Runs validated commands and file edits inside a single container.
pub struct SandboxExecutor {
    config: SandboxConfig,
    runtime: Arc<dyn ContainerRuntime>,
    validator: SecurityValidator,
    lifecycle: Mutex<Lifecycle>,
}

impl SandboxExecutor {
    /// Create an executor on the given runtime. Nothing is started yet.
    pub fn new(config: SandboxConfig, runtime: Arc<dyn ContainerRuntime>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            runtime,
            validator: SecurityValidator::new(),
            lifecycle: Mutex::new(Lifecycle::Uninitialized),
        })
    }

    /// Create an executor backed by the local Docker daemon.
    pub fn docker(config: SandboxConfig) -> Result<Self> {
        Self::new(config, Arc::new(DockerRuntime::new()))
    }

    pub fn with_validator(mut self, validator: SecurityValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn state(&self) -> SandboxState {
        self.lock().state()
    }

    /// Id of the live container, if any.
    pub fn container_id(&self) -> Option<String> {
        match &*self.lock() {
            Lifecycle::Running { container_id } => Some(container_id.clone()),
            _ => None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn invalid_state(&self, operation: &'static str) -> SandboxError {
        SandboxError::InvalidState {
            state: self.state().as_str(),
            operation,
        }
    }

    /// Connect to the runtime. Unreachable runtimes are a fatal setup
    /// failure and are not retried.
    pub async fn start(&self) -> Result<()> {
        match self.state() {
            SandboxState::Uninitialized => {}
            SandboxState::Connected | SandboxState::Running => return Ok(()),
            SandboxState::TornDown => return Err(self.invalid_state("start")),
        }

        self.runtime.ping().await.map_err(|e| match e {
            SandboxError::RuntimeUnavailable { .. } => e,
            other => SandboxError::RuntimeUnavailable {
                reason: other.to_string(),
            },
        })?;

        let mut state = self.lock();
        if matches!(*state, Lifecycle::Uninitialized) {
            *state = Lifecycle::Connected;
        }
        tracing::info!("Connected to {} runtime", self.runtime.name());
        Ok(())
    }

    /// Make sure the image is available locally, pulling it if allowed.
    pub async fn ensure_image(&self) -> Result<()> {
        if !matches!(self.state(), SandboxState::Connected | SandboxState::Running) {
            return Err(self.invalid_state("check the image"));
        }

        let image = &self.config.image;
        if self.runtime.image_exists(image).await? {
            tracing::debug!("Image {} present locally", image);
            return Ok(());
        }

        if !self.config.auto_pull_image {
            return Err(SandboxError::ImageUnavailable {
                image: image.clone(),
                reason: "not present locally and auto-pull is disabled".to_string(),
            });
        }

        self.runtime
            .pull_image(image)
            .await
            .map_err(|e| match e {
                SandboxError::ImageUnavailable { .. } => e,
                other => SandboxError::ImageUnavailable {
                    image: image.clone(),
                    reason: other.to_string(),
                },
            })
    }

    /// Launch the detached container with the workspace mounted read-write.
    pub async fn create_container(&self) -> Result<String> {
        if self.state() != SandboxState::Connected {
            return Err(self.invalid_state("create a container"));
        }

        let host_workspace = std::fs::canonicalize(&self.config.host_workspace).map_err(|e| {
            SandboxError::ContainerCreationFailed {
                reason: format!(
                    "workspace {} is not accessible: {}",
                    self.config.host_workspace.display(),
                    e
                ),
            }
        })?;

        let spec = ContainerSpec {
            name: format!("sandcoder-{}", uuid::Uuid::new_v4()),
            image: self.config.image.clone(),
            cmd: vec!["sleep".to_string(), "infinity".to_string()],
            binds: vec![format!(
                "{}:{}:rw",
                host_workspace.display(),
                self.config.container_workspace
            )],
            working_dir: self.config.container_workspace.clone(),
            memory_bytes: self.config.memory_bytes(),
            cpu_quota: self.config.cpu_quota,
            cpu_period: CPU_PERIOD_US,
            env: Vec::new(),
        };

        let container_id = self.runtime.run(&spec).await?;

        {
            let mut state = self.lock();
            if matches!(*state, Lifecycle::Connected) {
                *state = Lifecycle::Running {
                    container_id: container_id.clone(),
                };
                tracing::info!(
                    "Started container {} ({}) from {}",
                    spec.name,
                    short_id(&container_id),
                    spec.image
                );
                return Ok(container_id);
            }
        }

        // Torn down while the container was starting.
        let _ = self.runtime.remove(&container_id, true).await;
        Err(self.invalid_state("create a container"))
    }

    /// Create the non-root user (or reuse one with the same uid/gid) and
    /// hand it the workspace. Safe to run more than once.
    pub async fn provision_user(&self) -> Result<()> {
        let container_id = self
            .container_id()
            .ok_or_else(|| self.invalid_state("provision a user"))?;

        let config = &self.config;
        let script = format!(
            r#"set -e
if ! getent group {gid} >/dev/null 2>&1; then
  groupadd -g {gid} {user} 2>/dev/null || addgroup -g {gid} {user}
fi
if ! getent passwd {uid} >/dev/null 2>&1; then
  group=$(getent group {gid} | cut -d: -f1)
  useradd -m -u {uid} -g {gid} -s /bin/sh {user} 2>/dev/null || adduser -D -u {uid} -G "$group" {user}
fi
chown -R {uid}:{gid} {workspace}"#,
            uid = config.uid,
            gid = config.gid,
            user = config.user,
            workspace = shell_quote(&config.container_workspace),
        );

        let output = self
            .runtime
            .exec(
                &container_id,
                &ExecSpec::shell(script, "0:0", "/"),
                config.max_output_bytes,
            )
            .await?;

        if !output.success() {
            return Err(SandboxError::ProvisioningFailed {
                reason: format!(
                    "exit code {}: {}",
                    output.exit_code,
                    first_lines(&output.stderr, 5)
                ),
            });
        }

        tracing::info!(
            "Provisioned user {} ({}) in container {}",
            config.user,
            config.exec_user(),
            short_id(&container_id)
        );
        Ok(())
    }

    /// Collect user, mount and working directory as seen by the sandbox user.
    pub async fn verify_setup(&self) -> Result<ContainerSetupInfo> {
        let container_id = self
            .container_id()
            .ok_or_else(|| self.invalid_state("verify setup"))?;

        let ws = shell_quote(&self.config.container_workspace);
        let script = format!(
            r#"echo "user=$(whoami 2>/dev/null || echo unknown)"
echo "uid=$(id -u)"
echo "pwd=$(pwd)"
if [ -d {ws} ] && [ -w {ws} ]; then echo mounted=yes; else echo mounted=no; fi"#
        );

        let output = self.exec_as_user(&container_id, script).await?;
        let info = ContainerSetupInfo::parse(&output.stdout);

        if !info.is_non_root {
            tracing::warn!("Sandbox commands are running as root (uid {:?})", info.uid);
        }
        tracing::info!(
            "Sandbox verified: user={} mounted={} cwd={}",
            info.user,
            info.workspace_mounted,
            info.working_directory
        );
        Ok(info)
    }

    /// Bring the sandbox up: connect, image, container, user, verification.
    pub async fn initialize(&self) -> Result<ContainerSetupInfo> {
        self.start().await?;
        self.ensure_image().await?;
        self.create_container().await?;
        self.provision_user().await?;
        let info = self.verify_setup().await?;
        if !info.workspace_mounted {
            return Err(SandboxError::ProvisioningFailed {
                reason: format!(
                    "workspace {} is not writable by {}",
                    self.config.container_workspace, info.user
                ),
            });
        }
        Ok(info)
    }

    /// Run a shell command in the workspace as the sandbox user.
    pub async fn execute_bash(&self, command: &str) -> ExecutionResult {
        if let ValidationResult::Rejected { reason } = self.validator.validate_command(command) {
            return ExecutionResult::failure(reason);
        }

        let Some(container_id) = self.container_id() else {
            return ExecutionResult::failure(self.invalid_state("execute commands").to_string());
        };

        tracing::debug!("bash: {}", command);
        match self.exec_as_user(&container_id, command).await {
            Ok(output) => {
                let combined = combine_output(&output.stdout, &output.stderr);
                ExecutionResult::from_exit(
                    output.exit_code,
                    sanitize_output(&combined, self.config.max_output_bytes),
                )
            }
            Err(e) => ExecutionResult::failure(e.to_string()),
        }
    }

    /// Dispatch a `str_replace_editor` call.
    pub async fn execute_editor(&self, args: &serde_json::Value) -> ExecutionResult {
        match EditorCommand::parse(args) {
            Ok(EditorCommand::View { path, view_range }) => self.view(&path, view_range).await,
            Ok(EditorCommand::Create { path, file_text }) => self.create(&path, &file_text).await,
            Ok(EditorCommand::StrReplace {
                path,
                old_str,
                new_str,
            }) => self.str_replace(&path, &old_str, &new_str).await,
            Err(reason) => ExecutionResult::failure(reason),
        }
    }

    /// Show a file with line numbers, or list a directory two levels deep.
    pub async fn view(&self, path: &str, view_range: Option<(i64, i64)>) -> ExecutionResult {
        let (container_id, target) = match self.prepare_path(path) {
            Ok(prepared) => prepared,
            Err(result) => return result,
        };

        let quoted = shell_quote(&target);
        let is_dir = match self
            .exec_as_user(&container_id, format!("test -d {}", quoted))
            .await
        {
            Ok(output) => output.success(),
            Err(e) => return ExecutionResult::failure(e.to_string()),
        };

        if is_dir {
            let listing = format!(
                "cd {} && find . -mindepth 1 -maxdepth 2 -not -path '*/.*' | sort",
                quoted
            );
            return match self.exec_as_user(&container_id, listing).await {
                Ok(output) if output.success() => ExecutionResult::success(sanitize_output(
                    &format!(
                        "Files and directories up to 2 levels deep in {}, excluding hidden items:\n{}",
                        path,
                        output.stdout.trim_end()
                    ),
                    self.config.max_output_bytes,
                )),
                Ok(output) => ExecutionResult::failure(format!(
                    "Could not list {}: {}",
                    path,
                    first_lines(&output.stderr, 3)
                )),
                Err(e) => ExecutionResult::failure(e.to_string()),
            };
        }

        let content = match self.read_file(&container_id, &target).await {
            Ok(content) => content,
            Err(reason) => return ExecutionResult::failure(format!("{}: {}", path, reason)),
        };

        match editor::render_view(&content, view_range) {
            Ok(rendered) => {
                ExecutionResult::success(sanitize_output(&rendered, self.config.max_output_bytes))
            }
            Err(reason) => ExecutionResult::failure(reason),
        }
    }

    /// Create or overwrite a file, creating parent directories.
    pub async fn create(&self, path: &str, content: &str) -> ExecutionResult {
        let (container_id, target) = match self.prepare_path(path) {
            Ok(prepared) => prepared,
            Err(result) => return result,
        };

        if let Some(parent) = Path::new(&target).parent() {
            let mkdir = format!("mkdir -p -- {}", shell_quote(&parent.to_string_lossy()));
            match self.exec_as_user(&container_id, mkdir).await {
                Ok(output) if output.success() => {}
                Ok(output) => {
                    return ExecutionResult::failure(format!(
                        "Could not create parent directory for {}: {}",
                        path,
                        first_lines(&output.stderr, 3)
                    ));
                }
                Err(e) => return ExecutionResult::failure(e.to_string()),
            }
        }

        match self.write_file(&container_id, &target, content).await {
            Ok(()) => ExecutionResult::success(format!("File created successfully at: {}", path)),
            Err(reason) => ExecutionResult::failure(format!("Failed to write {}: {}", path, reason)),
        }
    }

    /// Replace the first occurrence of `old` with `new`.
    ///
    /// The presence check runs on the full `old` string against the full file
    /// content. When `old` is absent the file is left untouched.
    pub async fn str_replace(&self, path: &str, old: &str, new: &str) -> ExecutionResult {
        if old.is_empty() {
            return ExecutionResult::failure("old_str must not be empty");
        }

        let (container_id, target) = match self.prepare_path(path) {
            Ok(prepared) => prepared,
            Err(result) => return result,
        };

        let content = match self.read_file(&container_id, &target).await {
            Ok(content) => content,
            Err(reason) => return ExecutionResult::failure(format!("{}: {}", path, reason)),
        };

        let occurrences = content.matches(old).count();
        let Some((updated, line)) = editor::replace_first(&content, old, new) else {
            return ExecutionResult::failure(format!(
                "No replacement was performed: old_str did not appear verbatim in {}",
                path
            ));
        };

        if let Err(reason) = self.write_file(&container_id, &target, &updated).await {
            return ExecutionResult::failure(format!("Failed to write {}: {}", path, reason));
        }

        let mut message = format!("The file {} has been edited.", path);
        if occurrences > 1 {
            message.push_str(&format!(
                " Replaced the first of {} occurrences (line {}).",
                occurrences, line
            ));
        }
        message.push_str("\n\n");
        message.push_str(&editor::snippet(&updated, line, new.lines().count(), 4));
        ExecutionResult::success(sanitize_output(&message, self.config.max_output_bytes))
    }

    /// Stop and remove the container and its volumes. Idempotent; the
    /// executor is terminal afterwards.
    pub async fn cleanup(&self) -> Result<()> {
        let previous = std::mem::replace(&mut *self.lock(), Lifecycle::TornDown);
        let container_id = match previous {
            Lifecycle::Running { container_id } => container_id,
            Lifecycle::TornDown => return Ok(()),
            other => {
                tracing::debug!("Cleanup with no container ({})", other.state().as_str());
                return Ok(());
            }
        };

        tracing::info!("Tearing down container {}", short_id(&container_id));
        if let Err(e) = self
            .runtime
            .stop(&container_id, self.config.stop_timeout)
            .await
        {
            tracing::warn!("Failed to stop container {}: {}", short_id(&container_id), e);
        }
        self.runtime.remove(&container_id, true).await.inspect_err(|e| {
            tracing::error!("Failed to remove container {}: {}", short_id(&container_id), e)
        })
    }

    /// Validate an editor path and resolve it inside the container.
    fn prepare_path(&self, path: &str) -> std::result::Result<(String, String), ExecutionResult> {
        let workspace = Path::new(&self.config.container_workspace);
        if let ValidationResult::Rejected { reason } =
            self.validator.validate_file_path(path, workspace)
        {
            return Err(ExecutionResult::failure(reason));
        }

        let container_id = self.container_id().ok_or_else(|| {
            ExecutionResult::failure(self.invalid_state("edit files").to_string())
        })?;

        Ok((
            container_id,
            editor::resolve_in_workspace(&self.config.container_workspace, path),
        ))
    }

    async fn exec_as_user(
        &self,
        container_id: &str,
        script: impl Into<String>,
    ) -> Result<ExecOutput> {
        self.exec_limited(container_id, script, self.config.max_output_bytes)
            .await
    }

    /// Exec as the sandbox user. The command is killed inside the container
    /// once `timeout` passes; the client gives up a little later in case the
    /// runtime itself hangs.
    async fn exec_limited(
        &self,
        container_id: &str,
        script: impl Into<String>,
        max_output: usize,
    ) -> Result<ExecOutput> {
        let limit = self.config.timeout;
        let spec = ExecSpec::shell(
            script,
            self.config.exec_user(),
            self.config.container_workspace.clone(),
        )
        .with_kill_after(limit);

        let started = Instant::now();
        let output = tokio::time::timeout(
            limit + KILL_GRACE,
            self.runtime.exec(container_id, &spec, max_output),
        )
        .await
        .map_err(|_| SandboxError::Timeout(limit))??;

        if output.exit_code == KILLED_EXIT_CODE && started.elapsed() >= limit {
            return Err(SandboxError::Timeout(limit));
        }
        Ok(output)
    }

    /// Read a whole file. Not capped by `max_output_bytes`: edits need the
    /// complete content. The bytes travel base64-encoded and must be UTF-8.
    async fn read_file(
        &self,
        container_id: &str,
        target: &str,
    ) -> std::result::Result<String, String> {
        let output = self
            .exec_limited(
                container_id,
                format!("base64 < {}", shell_quote(target)),
                usize::MAX,
            )
            .await
            .map_err(|e| e.to_string())?;

        if !output.success() {
            return Err(format!(
                "file not found or unreadable ({})",
                first_lines(&output.stderr, 2)
            ));
        }

        let encoded: String = output
            .stdout
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| format!("could not decode file content: {}", e))?;
        String::from_utf8(bytes)
            .map_err(|_| "file is not valid UTF-8 text; refusing to edit it".to_string())
    }

    /// Write `content` to a temp file next to `target` in base64 chunks, then
    /// rename it into place.
    async fn write_file(
        &self,
        container_id: &str,
        target: &str,
        content: &str,
    ) -> std::result::Result<(), String> {
        let tmp = format!("{}.sandcoder-{}", target, &uuid::Uuid::new_v4().simple().to_string()[..8]);
        let quoted_tmp = shell_quote(&tmp);

        let encoded = BASE64.encode(content.as_bytes());
        let mut steps = vec![format!(": > {}", quoted_tmp)];
        let mut rest = encoded.as_str();
        while !rest.is_empty() {
            let (chunk, tail) = rest.split_at(rest.len().min(WRITE_CHUNK));
            steps.push(format!(
                "printf '%s' '{}' | base64 -d >> {}",
                chunk, quoted_tmp
            ));
            rest = tail;
        }
        steps.push(format!("mv -f -- {} {}", quoted_tmp, shell_quote(target)));

        for step in steps {
            let failure = match self.exec_as_user(container_id, step).await {
                Ok(output) if output.success() => continue,
                Ok(output) => first_lines(&output.stderr, 3),
                Err(e) => e.to_string(),
            };
            let _ = self
                .exec_as_user(container_id, format!("rm -f -- {}", quoted_tmp))
                .await;
            return Err(failure);
        }
        Ok(())
    }
}

impl Drop for SandboxExecutor {
    fn drop(&mut self) {
        let lifecycle = self
            .lifecycle
            .get_mut()
            .unwrap_or_else(|e| e.into_inner());
        if let Lifecycle::Running { container_id } =
            std::mem::replace(lifecycle, Lifecycle::TornDown)
        {
            tracing::warn!(
                "SandboxExecutor dropped with container {} still running, forcing removal",
                short_id(&container_id)
            );
            if let Err(e) = self
                .runtime
                .remove_blocking(&container_id, self.config.stop_timeout)
            {
                tracing::error!("Failed to remove container {}: {}", short_id(&container_id), e);
            }
        }
    }
}

/// Spawn a task that tears the sandbox down on Ctrl-C or SIGTERM and exits
/// with status 130.
pub fn install_exit_hook(executor: Arc<SandboxExecutor>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::warn!("Interrupted, tearing down sandbox");
        if let Err(e) = executor.cleanup().await {
            tracing::error!("Sandbox teardown failed: {}", e);
        }
        std::process::exit(130);
    })
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = sigterm.recv() => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        Err(e) => {
            tracing::warn!("Cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// stdout first, stderr appended with a tag when both are present.
fn combine_output(stdout: &str, stderr: &str) -> String {
    match (stdout.is_empty(), stderr.is_empty()) {
        (_, true) => stdout.to_string(),
        (true, false) => stderr.to_string(),
        (false, false) => format!("{}\n\n--- stderr ---\n{}", stdout, stderr),
    }
}

fn first_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().take(n).collect();
    if lines.is_empty() {
        "no error output".to_string()
    } else {
        lines.join(" | ")
    }
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::{Policy, PolicyRule, RuleCategory};
    use crate::sandbox::result::ExecutionStatus;
    use crate::testing::{HostShellRuntime, running_executor};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    async fn executor_with_timeout(timeout: Duration) -> (TempDir, Arc<HostShellRuntime>, SandboxExecutor) {
        let dir = TempDir::new().unwrap();
        let runtime = Arc::new(HostShellRuntime::new());
        let config = SandboxConfig::new(dir.path())
            .with_container_workspace(dir.path().canonicalize().unwrap().to_string_lossy())
            .with_timeout(timeout);
        let executor = SandboxExecutor::new(config, runtime.clone()).unwrap();
        executor.initialize().await.unwrap();
        (dir, runtime, executor)
    }

    #[tokio::test]
    async fn test_initialize_walks_lifecycle() {
        let (_dir, runtime, executor) = running_executor().await;
        assert_eq!(executor.state(), SandboxState::Running);
        assert_eq!(runtime.runs(), 1);
        assert_eq!(runtime.pulls(), 1);
        assert!(executor.container_id().unwrap().starts_with("host-"));
    }

    #[tokio::test]
    async fn test_verify_setup_reports_mount() {
        let (dir, _runtime, executor) = running_executor().await;
        let info = executor.verify_setup().await.unwrap();
        assert!(info.workspace_mounted);
        assert_eq!(
            Path::new(&info.working_directory),
            dir.path().canonicalize().unwrap()
        );
    }

    #[tokio::test]
    async fn test_cleanup_twice_never_raises() {
        let (_dir, runtime, executor) = running_executor().await;
        executor.cleanup().await.unwrap();
        executor.cleanup().await.unwrap();
        assert_eq!(executor.state(), SandboxState::TornDown);
        assert_eq!(runtime.stops(), 1);
        assert_eq!(runtime.removes(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_before_start_is_noop() {
        let dir = TempDir::new().unwrap();
        let runtime = Arc::new(HostShellRuntime::new());
        let executor = SandboxExecutor::new(SandboxConfig::new(dir.path()), runtime.clone()).unwrap();
        executor.cleanup().await.unwrap();
        assert_eq!(runtime.removes(), 0);
        assert!(executor.start().await.is_err());
    }

    #[tokio::test]
    async fn test_drop_removes_running_container() {
        let (_dir, runtime, executor) = running_executor().await;
        drop(executor);
        assert_eq!(runtime.removes(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_runtime_is_setup_failure() {
        let dir = TempDir::new().unwrap();
        let runtime = Arc::new(HostShellRuntime::unreachable());
        let executor = SandboxExecutor::new(SandboxConfig::new(dir.path()), runtime).unwrap();
        let err = executor.initialize().await.unwrap_err();
        assert!(err.is_setup_failure());
        assert_eq!(executor.state(), SandboxState::Uninitialized);
    }

    #[tokio::test]
    async fn test_blocked_command() {
        let (_dir, runtime, executor) = running_executor().await;
        let before = runtime.execs();
        let result = executor.execute_bash("sudo rm -rf /").await;
        assert_eq!(result.status, ExecutionStatus::Error);
        assert!(result.error.unwrap().contains("Blocked"));
        assert_eq!(runtime.execs(), before);
    }

    #[tokio::test]
    async fn test_bash_combines_output() {
        let (_dir, _runtime, executor) = running_executor().await;
        let result = executor.execute_bash("echo out; echo err >&2").await;
        assert!(result.is_success());
        assert_eq!(result.output, "out\n\n\n--- stderr ---\nerr\n");
        assert_eq!(result.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_captured() {
        let (_dir, _runtime, executor) = running_executor().await;
        let result = executor.execute_bash("echo partial; exit 3").await;
        assert_eq!(result.status, ExecutionStatus::Error);
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.output, "partial\n");
    }

    #[tokio::test]
    async fn test_command_timeout_is_captured() {
        let (_dir, _runtime, executor) = executor_with_timeout(Duration::from_millis(200)).await;
        let result = executor.execute_bash("sleep 5").await;
        assert_eq!(result.status, ExecutionStatus::Error);
        assert!(result.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_timeout_kills_command_in_container() {
        let (dir, runtime, executor) = executor_with_timeout(Duration::from_secs(1)).await;
        let started = Instant::now();
        let result = executor.execute_bash("sleep 3; touch late.txt").await;
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(result.error.unwrap().contains("timed out"));

        let cmd = runtime.last_command().unwrap();
        assert_eq!(cmd[..4], ["timeout", "-s", "KILL", "1"]);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!dir.path().join("late.txt").exists());
    }

    #[tokio::test]
    async fn test_quick_exit_137_is_not_a_timeout() {
        let (_dir, _runtime, executor) = running_executor().await;
        let result = executor.execute_bash("exit 137").await;
        assert_eq!(result.exit_code, Some(137));
        assert!(!result.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_bash_before_initialize_is_error_result() {
        let dir = TempDir::new().unwrap();
        let executor =
            SandboxExecutor::new(SandboxConfig::new(dir.path()), Arc::new(HostShellRuntime::new()))
                .unwrap();
        let result = executor.execute_bash("ls").await;
        assert_eq!(result.status, ExecutionStatus::Error);
    }

    #[tokio::test]
    async fn test_create_then_view() {
        let (dir, _runtime, executor) = running_executor().await;
        let result = executor
            .execute_editor(&json!({
                "command": "create",
                "path": "pkg/mod.py",
                "file_text": "a = 1\nb = 'it''s'\nc = 3\n",
            }))
            .await;
        assert!(result.is_success(), "{:?}", result);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("pkg/mod.py")).unwrap(),
            "a = 1\nb = 'it''s'\nc = 3\n"
        );

        let view = executor.view("pkg/mod.py", Some((2, -1))).await;
        assert_eq!(view.output, "     2│ b = 'it''s'\n     3│ c = 3");
    }

    #[tokio::test]
    async fn test_create_large_file_in_chunks() {
        let (dir, runtime, executor) = running_executor().await;
        let content = "x".repeat(200_000);
        let before = runtime.execs();
        let result = executor.create("big.txt", &content).await;
        assert!(result.is_success(), "{:?}", result);
        assert_eq!(std::fs::read_to_string(dir.path().join("big.txt")).unwrap(), content);
        // mkdir, truncate, 5 chunks, rename
        assert_eq!(runtime.execs() - before, 8);
    }

    #[tokio::test]
    async fn test_view_directory_skips_hidden() {
        let (dir, _runtime, executor) = running_executor().await;
        std::fs::create_dir_all(dir.path().join("src/nested/deep")).unwrap();
        std::fs::write(dir.path().join("src/main.py"), "").unwrap();
        std::fs::write(dir.path().join(".hidden"), "").unwrap();

        let result = executor.view(".", None).await;
        assert!(result.is_success());
        assert!(result.output.contains("./src/main.py"));
        assert!(result.output.contains("./src/nested"));
        assert!(!result.output.contains("nested/deep"));
        assert!(!result.output.contains(".hidden"));
    }

    #[tokio::test]
    async fn test_str_replace_absent_leaves_file_unmodified() {
        let (dir, _runtime, executor) = running_executor().await;
        let file = dir.path().join("app.py");
        std::fs::write(&file, "print('hello')\n").unwrap();

        let result = executor
            .execute_editor(&json!({
                "command": "str_replace",
                "path": "app.py",
                "old_str": "print('goodbye')",
                "new_str": "print('x')",
            }))
            .await;
        assert_eq!(result.status, ExecutionStatus::Error);
        assert!(result.error.unwrap().contains("did not appear"));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "print('hello')\n");
    }

    #[tokio::test]
    async fn test_str_replace_first_occurrence() {
        let (dir, _runtime, executor) = running_executor().await;
        let file = dir.path().join("app.py");
        std::fs::write(&file, "x = 1\nx = 1\n").unwrap();

        let result = executor.str_replace("app.py", "x = 1", "x = 2").await;
        assert!(result.is_success(), "{:?}", result);
        assert!(result.output.contains("first of 2"));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "x = 2\nx = 1\n");
    }

    #[tokio::test]
    async fn test_editor_rejects_sensitive_and_traversal_paths() {
        let (dir, _runtime, executor) = running_executor().await;
        let env = executor.create(".env", "SECRET=1").await;
        assert_eq!(env.status, ExecutionStatus::Error);
        assert!(!dir.path().join(".env").exists());

        let traversal = executor.view("../outside.txt", None).await;
        assert_eq!(traversal.status, ExecutionStatus::Error);
    }

    #[tokio::test]
    async fn test_str_replace_non_utf8_file_untouched() {
        let (dir, _runtime, executor) = running_executor().await;
        let file = dir.path().join("legacy.py");
        let original = b"# caf\xE9\nx = 1\n".to_vec();
        std::fs::write(&file, &original).unwrap();

        let result = executor.str_replace("legacy.py", "x = 1", "x = 2").await;
        assert_eq!(result.status, ExecutionStatus::Error);
        assert!(result.error.unwrap().contains("not valid UTF-8"));
        assert_eq!(std::fs::read(&file).unwrap(), original);
    }

    #[tokio::test]
    async fn test_str_replace_keeps_multibyte_text() {
        let (dir, _runtime, executor) = running_executor().await;
        let file = dir.path().join("menu.txt");
        std::fs::write(&file, "café = 1\nnaïve = 2\n").unwrap();

        let result = executor.str_replace("menu.txt", "naïve = 2", "naïve = 3").await;
        assert!(result.is_success(), "{:?}", result);
        assert_eq!(
            std::fs::read_to_string(&file).unwrap(),
            "café = 1\nnaïve = 3\n"
        );
    }

    #[tokio::test]
    async fn test_editor_rejects_memory_directory() {
        let (dir, _runtime, executor) = running_executor().await;
        let result = executor.create(".sandcoder/memory.md", "# injected").await;
        assert_eq!(result.status, ExecutionStatus::Error);
        assert!(!dir.path().join(".sandcoder").exists());
    }

    #[tokio::test]
    async fn test_custom_validator_policy() {
        let dir = TempDir::new().unwrap();
        let config = SandboxConfig::new(dir.path())
            .with_container_workspace(dir.path().canonicalize().unwrap().to_string_lossy());
        let mut policy = Policy::new();
        policy.add_rule(
            PolicyRule::new(
                "no_curl",
                "network fetches",
                RuleCategory::NetworkExfiltration,
                r"\bcurl\b",
            )
            .unwrap(),
        );
        let executor = SandboxExecutor::new(config, Arc::new(HostShellRuntime::new()))
            .unwrap()
            .with_validator(SecurityValidator::with_policy(policy));
        executor.initialize().await.unwrap();

        let blocked = executor.execute_bash("curl http://example.com").await;
        assert!(blocked.error.unwrap().contains("Blocked"));
        // Default rules are replaced, not extended.
        let allowed = executor.execute_bash("echo sudo").await;
        assert!(allowed.is_success(), "{:?}", allowed);
    }

    #[tokio::test]
    async fn test_view_missing_file() {
        let (_dir, _runtime, executor) = running_executor().await;
        let result = executor.view("nope.txt", None).await;
        assert_eq!(result.status, ExecutionStatus::Error);
        assert!(result.error.unwrap().contains("nope.txt"));
    }

    #[test]
    fn test_combine_output() {
        assert_eq!(combine_output("a", ""), "a");
        assert_eq!(combine_output("", "b"), "b");
        assert_eq!(combine_output("a", "b"), "a\n\n--- stderr ---\nb");
    }
}
