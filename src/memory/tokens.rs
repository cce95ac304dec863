//! Token accounting for conversation history.
//!
//! Counts are used to decide when to compress, so they only need to be
//! consistent, not exact. Without a tokenizer the estimate is
//! `max(1, chars / 4)`.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::llm::{ConversationMessage, Part};

/// Fixed per-message cost for role markers and framing.
pub const MESSAGE_OVERHEAD: usize = 4;

/// Tool result payloads are cut to this many characters before counting.
pub const TOOL_RESULT_PREVIEW_CHARS: usize = 500;

/// Exact tokenizer backend.
pub trait Tokenizer: Send + Sync {
    fn name(&self) -> &str;
    fn count(&self, text: &str) -> usize;
}

/// Counts tokens of text and messages.
pub struct TokenCounter {
    tokenizer: Option<Box<dyn Tokenizer>>,
    fallback_logged: AtomicBool,
}

impl TokenCounter {
    /// Use the exact tokenizer when compiled in, else the heuristic.
    pub fn new() -> Self {
        Self {
            tokenizer: default_tokenizer(),
            fallback_logged: AtomicBool::new(false),
        }
    }

    /// Always use the `chars / 4` heuristic.
    pub fn heuristic() -> Self {
        Self {
            tokenizer: None,
            fallback_logged: AtomicBool::new(false),
        }
    }

    pub fn with_tokenizer(tokenizer: Box<dyn Tokenizer>) -> Self {
        Self {
            tokenizer: Some(tokenizer),
            fallback_logged: AtomicBool::new(false),
        }
    }

    pub fn is_exact(&self) -> bool {
        self.tokenizer.is_some()
    }

    /// Name of the backend doing the counting.
    pub fn tokenizer_name(&self) -> &str {
        self.tokenizer
            .as_ref()
            .map(|t| t.name())
            .unwrap_or("heuristic")
    }

    /// Tokens in a piece of text.
    pub fn count_tokens_text(&self, text: &str) -> usize {
        match &self.tokenizer {
            Some(tokenizer) => tokenizer.count(text),
            None => {
                if !self.fallback_logged.swap(true, Ordering::Relaxed) {
                    tracing::warn!("No tokenizer available, estimating tokens as chars/4");
                }
                (text.chars().count() / 4).max(1)
            }
        }
    }

    /// Tokens in one message, overhead included.
    pub fn count_message(&self, message: &ConversationMessage) -> usize {
        let parts: usize = message
            .parts
            .iter()
            .map(|part| match part {
                Part::Text { text } => self.count_tokens_text(text),
                Part::ToolCall { name, args } => {
                    self.count_tokens_text(&format!("{}({})", name, args))
                }
                Part::ToolResult { name, payload } => {
                    let payload = payload.to_string();
                    let preview: String =
                        payload.chars().take(TOOL_RESULT_PREVIEW_CHARS).collect();
                    self.count_tokens_text(&format!("{}: {}", name, preview))
                }
            })
            .sum();
        MESSAGE_OVERHEAD + parts
    }

    /// Tokens in a list of messages.
    pub fn count_tokens(&self, messages: &[ConversationMessage]) -> usize {
        messages.iter().map(|m| self.count_message(m)).sum()
    }

    /// Number of leading messages whose total cost fits in `target`.
    pub fn split_index(&self, messages: &[ConversationMessage], target: usize) -> usize {
        let mut total = 0;
        for (i, message) in messages.iter().enumerate() {
            total += self.count_message(message);
            if total > target {
                return i;
            }
        }
        messages.len()
    }

    /// Split into `(head, tail)` at a message boundary so the head costs at
    /// most `target`. If everything fits, the tail is empty.
    pub fn split_at_token_boundary<'a>(
        &self,
        messages: &'a [ConversationMessage],
        target: usize,
    ) -> (&'a [ConversationMessage], &'a [ConversationMessage]) {
        messages.split_at(self.split_index(messages, target))
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "tiktoken")]
fn default_tokenizer() -> Option<Box<dyn Tokenizer>> {
    match tiktoken_rs::cl100k_base() {
        Ok(bpe) => Some(Box::new(Cl100k(bpe))),
        Err(e) => {
            tracing::warn!("Failed to load cl100k_base tokenizer: {}", e);
            None
        }
    }
}

#[cfg(not(feature = "tiktoken"))]
fn default_tokenizer() -> Option<Box<dyn Tokenizer>> {
    None
}

#[cfg(feature = "tiktoken")]
struct Cl100k(tiktoken_rs::CoreBPE);

#[cfg(feature = "tiktoken")]
impl Tokenizer for Cl100k {
    fn name(&self) -> &str {
        "cl100k_base"
    }

    fn count(&self, text: &str) -> usize {
        self.0.encode_with_special_tokens(text).len()
    }
}
