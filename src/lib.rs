//! Sandcoder: a coding agent that runs every command inside a hardened
//! container and keeps long conversations bounded with synthesized memory.
//!
//! - [`sandbox`] owns the container and executes validated commands and edits
//! - [`safety`] decides which commands and paths are allowed
//! - [`memory`] compresses old history into a persisted markdown document
//! - [`tools`] exposes the sandbox to the model
//! - [`agent`] runs the turn loop against any [`llm::LlmProvider`]

pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod safety;
pub mod sandbox;
pub mod tools;

#[cfg(test)]
mod testing;

pub use agent::{Orchestrator, TurnState};
pub use config::AgentConfig;
pub use error::{AgentError, LlmError, MemoryError};
pub use sandbox::{SandboxConfig, SandboxError, SandboxExecutor};
