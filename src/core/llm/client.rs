use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::{Value, json};
use thiserror::Error;

use super::sse::{SseByteStream, reframe_sse};

/// Default OpenAI API base URL.
pub const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Model used when a streaming request does not name one.
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o";

/// System prompt appended to streaming requests.
pub const DEFAULT_SYSTEM_PROMPT: &str = "your name is DemoProductAgent\n\
You are a helpful assistant that can answer questions and help with tasks.\n\
You are given a prompt and you need to answer the question or help with the task.";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("OpenAI API key is not configured")]
    MissingApiKey,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Upstream API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

pub type LlmResult<T> = Result<T, LlmError>;

/// Upstream settings for the chat-completion proxy.
#[derive(Debug, Clone)]
pub struct ChatCompletionConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub default_model: String,
    pub system_prompt: String,
}

impl Default for ChatCompletionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: OPENAI_DEFAULT_BASE_URL.to_string(),
            default_model: DEFAULT_LLM_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// `stream` defaults to `true` when absent.
pub fn is_streaming_request(request: &Value) -> bool {
    request
        .get("stream")
        .and_then(Value::as_bool)
        .unwrap_or(true)
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct ChatCompletionClient {
    client: reqwest::Client,
    config: ChatCompletionConfig,
}

impl ChatCompletionClient {
    pub fn new(config: ChatCompletionConfig) -> LlmResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(Self {
            client,
            config: ChatCompletionConfig {
                base_url: config.base_url.trim_end_matches('/').to_string(),
                ..config
            },
        })
    }

    pub fn config(&self) -> &ChatCompletionConfig {
        &self.config
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    /// Build the upstream body for a streaming request: the caller's messages
    /// followed by the configured system prompt.
    pub fn build_streaming_body(&self, request: &Value) -> LlmResult<Value> {
        let mut messages = request
            .get("messages")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| LlmError::InvalidRequest("'messages' must be an array".to_string()))?;
        messages.push(json!({"role": "system", "content": self.config.system_prompt}));

        let model = request
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(&self.config.default_model);

        let mut body = json!({
            "model": model,
            "messages": messages,
            "stream": true,
        });
        for key in ["max_tokens", "temperature"] {
            if let Some(value) = request.get(key).filter(|v| !v.is_null()) {
                body[key] = value.clone();
            }
        }
        Ok(body)
    }

    async fn post(&self, body: &Value) -> LlmResult<reqwest::Response> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(LlmError::MissingApiKey)?;

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), body = %body, "Chat completion request failed");
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Start a streaming completion and return the re-framed event stream.
    pub async fn stream_completion(&self, request: &Value) -> LlmResult<SseByteStream> {
        let body = self.build_streaming_body(request)?;
        tracing::info!(model = %body["model"], "Streaming chat completion");

        let response = self.post(&body).await?;
        Ok(reframe_sse(response.bytes_stream().boxed()))
    }

    /// Forward a non-streaming request verbatim and return the upstream body.
    pub async fn complete(&self, request: &Value) -> LlmResult<Bytes> {
        tracing::info!("Forwarding chat completion request");
        let response = self.post(request).await?;
        response
            .bytes()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))
    }
}
