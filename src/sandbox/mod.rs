//! Container sandbox for command execution and file edits.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                          SandboxExecutor                           │
//! │                                                                    │
//! │   execute_bash / execute_editor                                    │
//! │        │                                                           │
//! │        ▼                                                           │
//! │   SecurityValidator ──reject──▶ ExecutionResult { error }          │
//! │        │ accept                                                    │
//! │        ▼                                                           │
//! │   ContainerRuntime::exec (uid:gid, workdir = /workspace, timeout)  │
//! │        │                                                           │
//! │        ▼                                                           │
//! │   ExecutionResult { status, output, exit_code }                    │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! One container per executor. It is removed by `cleanup()`, by `Drop`, or
//! by the exit hook on Ctrl-C / SIGTERM.

mod config;
mod docker;
mod editor;
mod error;
mod executor;
mod result;
mod runtime;

pub use config::{CPU_PERIOD_US, SandboxConfig};
pub use docker::{DockerRuntime, connect_docker};
pub use editor::EditorCommand;
pub use error::{Result, SandboxError};
pub use executor::{SandboxExecutor, SandboxState, install_exit_hook};
pub use result::{ContainerSetupInfo, ExecutionResult, ExecutionStatus};
pub use runtime::{ContainerRuntime, ContainerSpec, ExecOutput, ExecSpec};
