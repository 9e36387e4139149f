//! Deterministic provider for tests and local development — no network calls.

use async_trait::async_trait;

use crate::provider::{LlmProvider, LlmRequest, LlmResponse, StopReason, Usage};
use crate::LlmError;

pub struct MockProvider {
    name: String,
    models: Vec<String>,
}

impl MockProvider {
    pub fn new(name: impl Into<String>, models: Vec<String>) -> Self {
        Self {
            name: name.into(),
            models,
        }
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn models(&self) -> Vec<String> {
        self.models.clone()
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let prompt_tokens = (request.prompt.split_whitespace().count() as i64).max(1);
        let text = format!("[mock:{}] {}", self.name, request.prompt);
        let completion_tokens = (text.split_whitespace().count() as i64).max(1);

        Ok(LlmResponse {
            text,
            usage: Usage {
                prompt_tokens,
                completion_tokens,
            },
            stop_reason: StopReason::EndTurn,
        })
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        Ok(())
    }
}
