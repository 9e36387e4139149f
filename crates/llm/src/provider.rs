//! The `LlmProvider` boundary: concrete providers build a prompt, call the
//! API, and map token/latency/error — they never implement pedagogy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::LlmError;

/// A single generation call. `feature` and `user_id` ride along only so the
/// worker can attach them to the `RegisterCallRequest` it sends the Budget
/// Gate before dispatch — providers themselves are budget-unaware.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub usage: Usage,
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    ContentFilter,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
}

impl Usage {
    pub fn total_tokens(&self) -> i64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Implemented by each backing model family (Anthropic, OpenAI, a local
/// model, ...). The worker dispatches through this trait only; it never
/// branches on provider identity itself.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Machine-readable name stored on `AICall.provider`, e.g. `"anthropic"`.
    fn name(&self) -> &str;

    fn models(&self) -> Vec<String>;

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    async fn health_check(&self) -> Result<(), LlmError>;
}
