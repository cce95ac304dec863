//! Built-in tools backed by the sandbox.

mod file;
mod shell;

pub use file::EditorTool;
pub use shell::BashTool;
