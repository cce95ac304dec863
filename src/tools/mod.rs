//! Tools exposed to the model.

pub mod builtin;
mod registry;
mod tool;
pub mod validation;

pub use builtin::{BashTool, EditorTool};
pub use registry::ToolRegistry;
pub use tool::{Tool, ToolError};
pub use validation::{
    Check, CheckResult, ProjectType, ValidationReport, ValidationRunner, ValidationTool,
};
