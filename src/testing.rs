//! Test doubles for the container runtime and the model.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::LlmError;
use crate::llm::{FunctionCall, GenerateRequest, LlmProvider, LlmResponse};
use crate::sandbox::{ContainerRuntime, ContainerSpec, ExecOutput, ExecSpec, Result, SandboxError};

/// Runs exec commands with `sh` on the host and records lifecycle calls.
///
/// Root execs (user provisioning) are skipped. Set the container workspace
/// to the host directory so paths line up.
pub struct HostShellRuntime {
    reachable: bool,
    image_present: AtomicBool,
    runs: AtomicUsize,
    pulls: AtomicUsize,
    execs: AtomicUsize,
    stops: AtomicUsize,
    removes: AtomicUsize,
    commands: Mutex<Vec<Vec<String>>>,
}

impl HostShellRuntime {
    pub fn new() -> Self {
        Self {
            reachable: true,
            image_present: AtomicBool::new(false),
            runs: AtomicUsize::new(0),
            pulls: AtomicUsize::new(0),
            execs: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            removes: AtomicUsize::new(0),
            commands: Mutex::new(Vec::new()),
        }
    }

    /// A runtime whose daemon cannot be reached.
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::new()
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }

    pub fn execs(&self) -> usize {
        self.execs.load(Ordering::SeqCst)
    }

    /// The most recent non-root exec command line.
    pub fn last_command(&self) -> Option<Vec<String>> {
        self.commands.lock().unwrap().last().cloned()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerRuntime for HostShellRuntime {
    fn name(&self) -> &str {
        "host-shell"
    }

    async fn ping(&self) -> Result<()> {
        if self.reachable {
            Ok(())
        } else {
            Err(SandboxError::RuntimeUnavailable {
                reason: "connection refused".to_string(),
            })
        }
    }

    async fn image_exists(&self, _image: &str) -> Result<bool> {
        Ok(self.image_present.load(Ordering::SeqCst))
    }

    async fn pull_image(&self, _image: &str) -> Result<()> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        self.image_present.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn run(&self, _spec: &ContainerSpec) -> Result<String> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(format!("host-{}", uuid::Uuid::new_v4().simple()))
    }

    async fn exec(
        &self,
        _container_id: &str,
        spec: &ExecSpec,
        max_output: usize,
    ) -> Result<ExecOutput> {
        self.execs.fetch_add(1, Ordering::SeqCst);
        if spec.user == "0:0" || spec.user == "root" {
            return Ok(ExecOutput::default());
        }
        self.commands.lock().unwrap().push(spec.cmd.clone());

        let (program, args) = spec.cmd.split_first().ok_or_else(|| SandboxError::ExecutionFailed {
            reason: "empty command".to_string(),
        })?;
        let output = tokio::process::Command::new(program)
            .args(args)
            .current_dir(&spec.workdir)
            .kill_on_drop(true)
            .output()
            .await?;

        let cap = |bytes: &[u8]| {
            let text = String::from_utf8_lossy(bytes).into_owned();
            if text.len() > max_output {
                crate::safety::sanitize_output(&text, max_output)
            } else {
                text
            }
        };

        Ok(ExecOutput {
            exit_code: output.status.code().map(i64::from).unwrap_or(-1),
            stdout: cap(&output.stdout),
            stderr: cap(&output.stderr),
        })
    }

    async fn stop(&self, _container_id: &str, _timeout: Duration) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, _container_id: &str, _remove_volumes: bool) -> Result<()> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Model double that replays queued responses and records every request.
pub struct ScriptedLlm {
    script: Mutex<VecDeque<std::result::Result<LlmResponse, LlmError>>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push_response(&self, response: LlmResponse) {
        self.script.lock().unwrap().push_back(Ok(response));
    }

    pub fn push_text(&self, text: &str) {
        self.push_response(LlmResponse::text(text));
    }

    pub fn push_call(&self, name: &str, args: serde_json::Value) {
        self.push_response(LlmResponse::calls(vec![FunctionCall {
            name: name.to_string(),
            args,
        }]));
    }

    pub fn push_error(&self, error: LlmError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> std::result::Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(LlmError::InvalidResponse {
                    provider: "scripted".to_string(),
                    reason: "script exhausted".to_string(),
                })
            })
    }
}

/// An initialized executor whose "container" is a fresh host temp dir.
pub async fn running_executor() -> (
    tempfile::TempDir,
    std::sync::Arc<HostShellRuntime>,
    std::sync::Arc<crate::sandbox::SandboxExecutor>,
) {
    let dir = tempfile::TempDir::new().unwrap();
    let runtime = std::sync::Arc::new(HostShellRuntime::new());
    let config = crate::sandbox::SandboxConfig::new(dir.path())
        .with_container_workspace(dir.path().canonicalize().unwrap().to_string_lossy());
    let executor = crate::sandbox::SandboxExecutor::new(config, runtime.clone()).unwrap();
    executor.initialize().await.unwrap();
    (dir, runtime, std::sync::Arc::new(executor))
}
