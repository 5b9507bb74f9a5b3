//! Messages-API client types and the `LlmClient` seam the runtime talks
//! through. The HTTP implementation targets an Anthropic-compatible
//! endpoint with tool-use content blocks; tests use [`ScriptedLlmClient`].

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use venuely_core::config::LlmConfig;

const API_BASE_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm configuration error: {0}")]
    Config(String),
    #[error("llm transport failure: {0}")]
    Transport(String),
    #[error("llm api error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("llm response decode failure: {0}")]
    Decode(String),
    #[error("no scripted reply left")]
    Exhausted,
}

/// A tool made available to the model, with a JSON Schema for its input.
#[derive(Clone, Debug, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Vec<ContentBlock>,
}

impl ChatMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: vec![ContentBlock::Text { text: text.into() }] }
    }

    pub fn user_blocks(content: Vec<ContentBlock>) -> Self {
        Self { role: "user".to_string(), content }
    }

    pub fn assistant_blocks(content: Vec<ContentBlock>) -> Self {
        Self { role: "assistant".to_string(), content }
    }
}

/// One model reply: the content blocks plus why generation stopped.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelReply {
    pub blocks: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
}

impl ModelReply {
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Tool invocations in the order the model requested them.
    pub fn tool_uses(&self) -> Vec<(&str, &str, &Value)> {
        self.blocks
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => {
                    Some((id.as_str(), name.as_str(), input))
                }
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelReply, LlmError>;
}

// --- wire types ---

#[derive(Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
}

#[derive(Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(rename = "type")]
    type_: String,
    message: String,
}

/// HTTP client for the reasoning model. Retries transient failures
/// (429, 500, 503) once per configured retry before giving up.
pub struct AnthropicClient {
    client: reqwest::Client,
    model: String,
    max_tokens: u32,
    max_retries: u32,
    base_url: String,
}

impl AnthropicClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .as_ref()
            .ok_or_else(|| LlmError::Config("llm.api_key is not configured".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key.expose_secret())
                .map_err(|e| LlmError::Config(format!("invalid API key header value: {e}")))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| LlmError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            base_url: config.base_url.clone().unwrap_or_else(|| API_BASE_URL.to_string()),
        })
    }
}

fn is_transient_status(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 503)
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelReply, LlmError> {
        let request = MessageRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages,
            tools: if tools.is_empty() { None } else { Some(tools) },
        };

        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, "retrying model request after transient error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }

            let response = self
                .client
                .post(&self.base_url)
                .json(&request)
                .send()
                .await
                .map_err(|e| LlmError::Transport(format!("HTTP request failed: {e}")))?;

            let status = response.status();
            debug!(status = %status, attempt, "model response received");

            if status.is_success() {
                let parsed: MessageResponse = response
                    .json()
                    .await
                    .map_err(|e| LlmError::Decode(e.to_string()))?;
                return Ok(ModelReply { blocks: parsed.content, stop_reason: parsed.stop_reason });
            }

            let body = response.text().await.unwrap_or_default();
            if is_transient_status(status) && attempt < self.max_retries {
                warn!(status = %status, body = %body, "transient model error, will retry");
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
                Ok(api_error) => {
                    format!("{}: {}", api_error.error.type_, api_error.error.message)
                }
                Err(_) => body,
            };
            return Err(LlmError::Api { status: status.as_u16(), message });
        }

        Err(last_error.unwrap_or_else(|| LlmError::Transport("retries exhausted".to_string())))
    }
}

/// Deterministic stand-in for the reasoning model: returns a queue of
/// pre-written replies in order. Used by the runtime tests and local demos.
#[derive(Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<ModelReply>>,
}

impl ScriptedLlmClient {
    pub fn with_replies(replies: Vec<ModelReply>) -> Self {
        Self { replies: Mutex::new(replies.into_iter().collect()) }
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().expect("reply lock").len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(
        &self,
        _system: &str,
        _messages: &[ChatMessage],
        _tools: &[ToolDefinition],
    ) -> Result<ModelReply, LlmError> {
        self.replies.lock().expect("reply lock").pop_front().ok_or(LlmError::Exhausted)
    }
}
