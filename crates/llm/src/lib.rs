//! The LLM-provider boundary (§0 SUPPLEMENT, grounded on the retrieved
//! `claw-llm` provider trait). Concrete adapters only transport a prompt and
//! map token/latency/error; they never implement generation pedagogy.

pub mod http;
pub mod mock;
pub mod provider;

pub use http::HttpProvider;
pub use mock::MockProvider;
pub use provider::{LlmProvider, LlmRequest, LlmResponse, StopReason, Usage};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// `retriable` distinguishes a 5xx/429 (worker retries with backoff) from
    /// a 4xx (worker classifies as a permanent content/logic failure).
    #[error("provider error: {message}")]
    Provider { retriable: bool, message: String },
}

impl LlmError {
    pub fn is_retriable(&self) -> bool {
        match self {
            LlmError::Transport(_) => true,
            LlmError::Provider { retriable, .. } => *retriable,
        }
    }
}
