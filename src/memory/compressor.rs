//! Rolling compression of conversation history into persisted memory.
//!
//! When the history outgrows the token threshold, the oldest messages (the
//! head) are merged into the memory document by the model and dropped; the
//! rest (the tail) is kept verbatim. The document re-enters every later call
//! through the system prompt.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::MemoryError;
use crate::llm::{
    ConversationMessage, GenerateRequest, LlmProvider, RetryConfig, Role, generate_with_retry,
};
use crate::memory::document::SynthesizedMemory;
use crate::memory::prompts;
use crate::memory::storage::MemoryStorage;
use crate::memory::tokens::TokenCounter;

/// Compression tunables.
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    /// Compress once the history costs more than this many tokens.
    pub threshold_tokens: usize,
    /// Share of the threshold targeted for the head.
    pub head_ratio: f64,
    /// Word cap of the persisted document.
    pub max_words: usize,
    /// Condense rounds before falling back to hard truncation.
    pub max_condense_depth: usize,
    /// Model used for synthesis; the agent model when `None`.
    pub synthesis_model: Option<String>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            threshold_tokens: 100_000,
            head_ratio: 0.8,
            max_words: 5000,
            max_condense_depth: 3,
            synthesis_model: None,
        }
    }
}

impl CompressionConfig {
    pub fn with_threshold(mut self, tokens: usize) -> Self {
        self.threshold_tokens = tokens;
        self
    }

    pub fn with_head_ratio(mut self, ratio: f64) -> Self {
        self.head_ratio = ratio;
        self
    }

    pub fn with_max_words(mut self, words: usize) -> Self {
        self.max_words = words;
        self
    }

    pub fn with_max_condense_depth(mut self, depth: usize) -> Self {
        self.max_condense_depth = depth;
        self
    }

    /// Token budget for the head: `floor(threshold * ratio)`, ratio clamped
    /// to (0, 1).
    pub fn head_target(&self) -> usize {
        let ratio = if self.head_ratio.is_finite() {
            self.head_ratio.clamp(0.01, 0.99)
        } else {
            0.8
        };
        (self.threshold_tokens as f64 * ratio).floor() as usize
    }
}

/// Keeps conversation weight bounded by folding old messages into memory.
pub struct MemoryCompressor {
    config: CompressionConfig,
    counter: TokenCounter,
    storage: MemoryStorage,
    llm: Arc<dyn LlmProvider>,
    model: String,
    retry: RetryConfig,
    token_count: AtomicUsize,
}

impl MemoryCompressor {
    pub fn new(
        config: CompressionConfig,
        storage: MemoryStorage,
        llm: Arc<dyn LlmProvider>,
        model: impl Into<String>,
    ) -> Self {
        let model = config.synthesis_model.clone().unwrap_or_else(|| model.into());
        Self {
            config,
            counter: Self::log_counter(TokenCounter::new()),
            storage,
            llm,
            model,
            retry: RetryConfig::default(),
            token_count: AtomicUsize::new(0),
        }
    }

    pub fn with_counter(mut self, counter: TokenCounter) -> Self {
        self.counter = Self::log_counter(counter);
        self
    }

    fn log_counter(counter: TokenCounter) -> TokenCounter {
        tracing::debug!("Counting tokens with {}", counter.tokenizer_name());
        counter
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    pub fn counter(&self) -> &TokenCounter {
        &self.counter
    }

    pub fn storage(&self) -> &MemoryStorage {
        &self.storage
    }

    /// Token weight of the history as of the last check.
    pub fn token_count(&self) -> usize {
        self.token_count.load(Ordering::Relaxed)
    }

    /// Compress `history` if it is over the threshold.
    ///
    /// Returns the history unchanged when it fits, when there is nothing to
    /// compress, or when synthesis fails (retried on the next call).
    /// Persistence failures are returned as errors.
    pub async fn check_and_compress(
        &self,
        history: Vec<ConversationMessage>,
    ) -> Result<Vec<ConversationMessage>, MemoryError> {
        let total = self.counter.count_tokens(&history);
        self.token_count.store(total, Ordering::Relaxed);
        if total <= self.config.threshold_tokens {
            return Ok(history);
        }

        let split = self.choose_split(&history);
        if split == 0 {
            tracing::warn!(
                "History is {} tokens (threshold {}) but no head fits; skipping compression",
                total,
                self.config.threshold_tokens
            );
            return Ok(history);
        }

        let (head, tail) = history.split_at(split);
        tracing::info!(
            "Compressing {} of {} messages ({} tokens, threshold {})",
            head.len(),
            history.len(),
            total,
            self.config.threshold_tokens
        );

        let existing = self.storage.read()?;
        let prompt = prompts::merge_prompt(
            &existing.to_markdown(),
            &prompts::render_transcript(head),
            self.config.max_words,
        );

        let synthesized = match self.synthesize(prompt).await {
            Ok(memory) => memory,
            Err(e) => {
                tracing::warn!("{}; keeping full history for now", e);
                return Ok(history);
            }
        };

        let memory = self.enforce_word_cap(synthesized).await;
        self.storage.write(&memory)?;

        let tail = tail.to_vec();
        let remaining = self.counter.count_tokens(&tail);
        self.token_count.store(remaining, Ordering::Relaxed);
        if remaining > self.config.threshold_tokens {
            tracing::warn!(
                "Newest exchange alone is {} tokens, over the {} token threshold",
                remaining,
                self.config.threshold_tokens
            );
        }
        tracing::info!(
            "Compressed history to {} messages ({} tokens); memory is {} words",
            tail.len(),
            remaining,
            memory.word_count()
        );
        Ok(tail)
    }

    /// Index of the first tail message.
    ///
    /// Starts from the longest head within `head_target` and grows it until
    /// the tail is under the threshold. The newest exchange always stays in
    /// the tail: the latest message, plus the tool call that produced it when
    /// it is a tool result. That exchange alone may exceed the threshold.
    /// The tail never starts with orphaned tool results.
    fn choose_split(&self, history: &[ConversationMessage]) -> usize {
        if history.len() < 2 {
            return 0;
        }
        let newest = newest_exchange_start(history);

        let mut split = self
            .counter
            .split_index(history, self.config.head_target())
            .min(newest);
        while split < newest
            && self.counter.count_tokens(&history[split..]) > self.config.threshold_tokens
        {
            split += 1;
        }

        while split < newest && history[split].role == Role::Tool {
            split += 1;
        }
        while split > 0 && history[split].role == Role::Tool {
            split -= 1;
        }
        split
    }

    async fn synthesize(&self, prompt: String) -> Result<SynthesizedMemory, MemoryError> {
        let text = self.ask(prompt).await?;
        let memory = SynthesizedMemory::from_markdown(&text);
        if memory.is_empty() {
            return Err(MemoryError::Synthesis {
                reason: "model returned an empty document".to_string(),
            });
        }
        Ok(memory)
    }

    async fn ask(&self, prompt: String) -> Result<String, MemoryError> {
        let request = GenerateRequest::new(&self.model, vec![ConversationMessage::user(prompt)])
            .with_system_instruction(prompts::SYNTHESIS_SYSTEM);
        let response = generate_with_retry(self.llm.as_ref(), request, &self.retry)
            .await
            .map_err(|e| MemoryError::Synthesis {
                reason: e.to_string(),
            })?;
        response
            .text
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| MemoryError::Synthesis {
                reason: "model returned no text".to_string(),
            })
    }

    /// Bring `memory` under the word cap.
    ///
    /// Asks the model to condense up to `max_condense_depth` times, then hard
    /// truncates. Never fails.
    pub async fn enforce_word_cap(&self, memory: SynthesizedMemory) -> SynthesizedMemory {
        let max_words = self.config.max_words;
        let mut current = memory;

        for depth in 1..=self.config.max_condense_depth {
            let words = current.word_count();
            if words <= max_words {
                return current;
            }
            tracing::info!(
                "Memory is {} words (cap {}), condensing (round {}/{})",
                words,
                max_words,
                depth,
                self.config.max_condense_depth
            );
            let prompt = prompts::condense_prompt(&current.to_markdown(), words, max_words);
            match self.ask(prompt).await {
                Ok(text) => {
                    let condensed = SynthesizedMemory::from_markdown(&text);
                    if condensed.is_empty() {
                        tracing::warn!("Condense round {} returned nothing usable", depth);
                        break;
                    }
                    current = condensed;
                }
                Err(e) => {
                    tracing::warn!("Condense round {} failed: {}", depth, e);
                    break;
                }
            }
        }

        if current.word_count() > max_words {
            tracing::warn!(
                "Memory still {} words after condensing, truncating to {}",
                current.word_count(),
                max_words
            );
            current = current.truncate_to_words(max_words);
        }
        current
    }

    /// `base` prefixed with the persisted memory, or `base` alone when there
    /// is none.
    pub fn build_system_prompt(&self, base: &str) -> Result<String, MemoryError> {
        let memory = self.storage.read()?;
        if memory.is_empty() {
            return Ok(base.to_string());
        }
        Ok(format!(
            "=== PERSISTENT MEMORY (synthesized from earlier conversation) ===\n\
             {}\n\
             === END PERSISTENT MEMORY ===\n\n\
             {}",
            memory.to_markdown().trim_end(),
            base
        ))
    }
}

/// Index of the latest message, moved back over trailing tool results to
/// the call that produced them.
fn newest_exchange_start(history: &[ConversationMessage]) -> usize {
    let mut start = history.len().saturating_sub(1);
    while start > 0 && history[start].role == Role::Tool {
        start -= 1;
    }
    start
}
