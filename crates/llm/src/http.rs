//! A provider adapter for OpenAI-compatible chat-completions endpoints.
//! Covers both OpenAI and Gemini's OpenAI-compatibility shim by varying
//! `base_url`; a genuinely different wire format gets its own adapter.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::provider::{LlmProvider, LlmRequest, LlmResponse, StopReason, Usage};
use crate::LlmError;

pub struct HttpProvider {
    name: String,
    models: Vec<String>,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(name: impl Into<String>, models: Vec<String>, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            models,
            base_url: base_url.into(),
            api_key: api_key.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("reqwest client"),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: ChatUsage,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: String,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: i64,
    completion_tokens: i64,
}

fn parse_stop_reason(s: &str) -> StopReason {
    match s {
        "length" => StopReason::MaxTokens,
        "content_filter" => StopReason::ContentFilter,
        _ => StopReason::EndTurn,
    }
}

#[async_trait]
impl LlmProvider for HttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn models(&self) -> Vec<String> {
        self.models.clone()
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatRequest {
            model: &request.model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(LlmError::Transport)?;

        if !response.status().is_success() {
            let status = response.status();
            let retriable = status.is_server_error() || status.as_u16() == 429;
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Provider { retriable, message: format!("{status}: {body}") });
        }

        let parsed: ChatResponse = response.json().await.map_err(LlmError::Transport)?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Provider {
                retriable: false,
                message: "empty choices array".to_string(),
            })?;

        Ok(LlmResponse {
            text: choice.message.content,
            usage: Usage {
                prompt_tokens: parsed.usage.prompt_tokens,
                completion_tokens: parsed.usage.completion_tokens,
            },
            stop_reason: parse_stop_reason(&choice.finish_reason),
        })
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(LlmError::Transport)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(LlmError::Provider {
                retriable: true,
                message: format!("health check returned {}", response.status()),
            })
        }
    }
}
