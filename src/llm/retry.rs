//! Retry with exponential backoff for rate-limited model calls.
//!
//! Only the rate-limit class is retried. Every other error propagates on the
//! first failure.

use std::time::Duration;

use crate::error::LlmError;
use crate::llm::provider::{GenerateRequest, LlmProvider, LlmResponse};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first call.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single delay, server hints included.
    pub max_delay: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate the delay after a failed attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(base.min(self.max_delay.as_secs_f64()))
    }

    /// Delay to wait after `error`, preferring the server's retry hint.
    pub fn delay_for_error(&self, error: &LlmError, attempt: u32) -> Duration {
        match error.retry_after() {
            Some(hint) => hint.min(self.max_delay),
            None => self.delay_for_attempt(attempt),
        }
    }
}

/// Call `provider.generate`, retrying rate-limit errors with backoff.
pub async fn generate_with_retry(
    provider: &dyn LlmProvider,
    request: GenerateRequest,
    config: &RetryConfig,
) -> Result<LlmResponse, LlmError> {
    let attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match provider.generate(request.clone()).await {
            Ok(response) => return Ok(response),
            Err(e) if e.is_rate_limit() && attempt + 1 < attempts => {
                let delay = config.delay_for_error(&e, attempt);
                tracing::warn!(
                    "{} (attempt {}/{}), retrying in {:?}",
                    e,
                    attempt + 1,
                    attempts,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_rate_limit() {
                    tracing::error!("Giving up after {} rate-limited attempts", attempts);
                }
                return Err(e);
            }
        }
    }
}
