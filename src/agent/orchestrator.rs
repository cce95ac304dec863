//! The agent turn loop.
//!
//! One turn: append the user message, compress if the history is over
//! budget, then alternate model calls and sequential tool execution until
//! the model answers with text.

use std::sync::Arc;

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::llm::{
    ConversationMessage, GenerateRequest, LlmProvider, RetryConfig, generate_with_retry,
};
use crate::memory::{MemoryCompressor, MemoryStorage};
use crate::tools::ToolRegistry;

/// Where the current turn is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    AwaitingModel,
    ToolExecuting,
}

pub struct Orchestrator {
    llm: Arc<dyn LlmProvider>,
    tools: ToolRegistry,
    compressor: MemoryCompressor,
    model: String,
    base_system_prompt: String,
    retry: RetryConfig,
    max_tool_rounds: usize,
    history: Vec<ConversationMessage>,
    state: TurnState,
}

impl Orchestrator {
    pub fn new(config: AgentConfig, llm: Arc<dyn LlmProvider>, tools: ToolRegistry) -> Self {
        let compressor = MemoryCompressor::new(
            config.compression,
            MemoryStorage::new(config.memory_path),
            llm.clone(),
            config.model.clone(),
        )
        .with_retry(config.retry.clone());

        Self {
            llm,
            tools,
            compressor,
            model: config.model,
            base_system_prompt: config.base_system_prompt,
            retry: config.retry,
            max_tool_rounds: config.max_tool_rounds,
            history: Vec::new(),
            state: TurnState::Idle,
        }
    }

    pub fn history(&self) -> &[ConversationMessage] {
        &self.history
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn compressor(&self) -> &MemoryCompressor {
        &self.compressor
    }

    /// Forget the in-memory conversation. The persisted memory stays.
    pub fn clear_history(&mut self) {
        tracing::info!("Clearing {} messages of history", self.history.len());
        self.history.clear();
    }

    /// Run one user turn and return the model's final text.
    pub async fn run(&mut self, prompt: &str) -> Result<String, AgentError> {
        let result = self.run_turn(prompt).await;
        self.state = TurnState::Idle;
        result
    }

    async fn run_turn(&mut self, prompt: &str) -> Result<String, AgentError> {
        self.history.push(ConversationMessage::user(prompt));
        // Assigned only on success so a memory failure leaves history intact.
        self.history = self
            .compressor
            .check_and_compress(self.history.clone())
            .await?;

        let mut rounds = 0;
        loop {
            self.state = TurnState::AwaitingModel;
            let system = self.compressor.build_system_prompt(&self.base_system_prompt)?;
            let request = GenerateRequest::new(&self.model, self.history.clone())
                .with_tools(self.tools.definitions())
                .with_system_instruction(system);
            let response = generate_with_retry(self.llm.as_ref(), request, &self.retry).await?;

            if !response.has_function_calls() {
                let text = response.text.unwrap_or_default();
                self.history.push(ConversationMessage::assistant(text.clone()));
                return Ok(text);
            }

            if rounds >= self.max_tool_rounds {
                tracing::warn!("Turn hit the tool round limit ({})", self.max_tool_rounds);
                return Err(AgentError::ToolRoundLimit(self.max_tool_rounds));
            }
            rounds += 1;

            self.history.push(ConversationMessage::tool_calls(
                response.text.clone(),
                &response.function_calls,
            ));

            self.state = TurnState::ToolExecuting;
            let mut results = Vec::with_capacity(response.function_calls.len());
            for call in &response.function_calls {
                tracing::info!("Tool call: {}", call.name);
                tracing::debug!("Tool args: {}", call.args);
                let payload = self.tools.dispatch(&call.name, call.args.clone()).await;
                results.push((call.name.clone(), payload));
            }
            self.history.push(ConversationMessage::tool_results(results));
        }
    }
}
