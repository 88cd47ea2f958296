//! Completion service client.
//!
//! Everything that talks to a chat model goes through [`CompletionClient`]:
//! citation resolution, batch grading, and grounded answers. The concrete
//! backend is chosen once by [`create_client`]; tests substitute scripted
//! implementations.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::config::LlmConfig;

/// One chat completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Completion service is disabled. Set [llm] provider in config.")]
    Disabled,

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Missing credentials: {0}")]
    Credentials(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    fn model_name(&self) -> &str;

    /// Return the model's text reply to one request.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

/// Client used when no completion service is configured. Every call fails.
pub struct DisabledClient;

#[async_trait]
impl CompletionClient for DisabledClient {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<String, LlmError> {
        Err(LlmError::Disabled)
    }
}

/// OpenAI-compatible `chat/completions` client.
///
/// Reads the key from `OPENAI_API_KEY`. 429 and 5xx responses are retried
/// with exponential backoff up to `max_retries` times.
pub struct OpenAIChatClient {
    model: String,
    base_url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIChatClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            LlmError::Credentials("OPENAI_API_KEY environment variable not set".to_string())
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            max_retries: config.max_retries,
            client,
        })
    }

    async fn send_once(&self, body: &serde_json::Value) -> Result<String, LlmError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimitExceeded);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response.json().await?;
        parse_chat_response(&json)
    }
}

#[async_trait]
impl CompletionClient for OpenAIChatClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        let mut attempt = 0;
        loop {
            match self.send_once(&body).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt < self.max_retries && is_transient(&e) => {
                    attempt += 1;
                    let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                    tracing::warn!(error = %e, attempt, "completion request failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_transient(error: &LlmError) -> bool {
    match error {
        LlmError::RateLimitExceeded | LlmError::Http(_) => true,
        LlmError::Api { status, .. } => *status >= 500,
        _ => false,
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String, LlmError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| LlmError::InvalidResponse("missing choices[0].message.content".to_string()))
}

/// Build the configured completion client.
pub fn create_client(config: &LlmConfig) -> anyhow::Result<Box<dyn CompletionClient>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledClient)),
        "openai" => Ok(Box::new(OpenAIChatClient::new(config)?)),
        other => anyhow::bail!("Unknown llm provider: {}", other),
    }
}
