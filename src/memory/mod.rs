//! Token-aware rolling memory.
//!
//! - [`TokenCounter`] prices messages and finds head/tail split points
//! - [`SynthesizedMemory`] is the four-section markdown document
//! - [`MemoryStorage`] persists it atomically
//! - [`MemoryCompressor`] folds old history into it and feeds it back through
//!   the system prompt

mod compressor;
mod document;
mod prompts;
mod storage;
mod tokens;

pub use compressor::{CompressionConfig, MemoryCompressor};
pub use document::{
    ADDITIONAL_NOTES, PENDING_TASKS, RESOLVED_ARCHITECTURE, SynthesizedMemory,
    TECHNICAL_CONSTRAINTS,
};
pub use storage::MemoryStorage;
pub use tokens::{MESSAGE_OVERHEAD, TOOL_RESULT_PREVIEW_CHARS, TokenCounter, Tokenizer};
