//! Safety layer for commands and file paths.
//!
//! Every command the model asks for is checked against an ordered list of
//! case-insensitive rules before it reaches the container, and every editor
//! path is checked against the workspace root. This is a blocklist: it
//! catches the obvious abuse patterns but cannot recognize obfuscated or
//! multi-step escapes. The container is the isolation boundary.

mod policy;
mod validator;

pub use policy::{Policy, PolicyRule, RuleCategory};
pub use validator::{SecurityValidator, ValidationResult, sanitize_output};
