//! HTTP client for OpenAI-compatible chat-completion endpoints
//!
//! Both the task model (through [`crate::adapters::DefaultAdapter`]) and the
//! reflection model can be served by this client. Retry/timeout policy lives
//! here, at the collaborator boundary; the engine never retries.

use crate::error::{GepaError, GepaResult};
use crate::reflection::ReflectionModel;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for an LM endpoint
///
/// Passed explicitly to the client constructor; nothing here is read from or
/// written to process-wide environment state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LmConfig {
    /// Base URL of the OpenAI-compatible API (no trailing slash)
    pub base_url: String,
    /// API key sent as a bearer token
    pub api_key: String,
    /// Model name to request
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Optional completion token cap
    pub max_tokens: Option<u32>,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Maximum retries for retryable failures
    pub max_retries: u32,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            max_tokens: None,
            timeout_seconds: 120,
            max_retries: 3,
        }
    }
}

impl LmConfig {
    /// Create a config for a model at a given endpoint
    pub fn new<U: Into<String>, K: Into<String>, M: Into<String>>(
        base_url: U,
        api_key: K,
        model: M,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the completion token cap
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> GepaResult<()> {
        if self.base_url.is_empty() {
            return Err(GepaError::configuration("base_url", "must not be empty"));
        }
        if self.model.is_empty() {
            return Err(GepaError::configuration("model", "must not be empty"));
        }
        if self.timeout_seconds == 0 {
            return Err(GepaError::configuration(
                "timeout_seconds",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// One chat message in a completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message role ("system", "user", "assistant")
    pub role: String,
    /// Message text
    pub content: String,
}

impl ChatMessage {
    /// Create a system message
    pub fn system<S: Into<String>>(content: S) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user<S: Into<String>>(content: S) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A chat model the adapter can run task examples through
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send messages and return the assistant's text response
    async fn complete(&self, messages: &[ChatMessage]) -> GepaResult<String>;
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// HTTP client for an OpenAI-compatible chat endpoint
#[derive(Debug, Clone)]
pub struct LmClient {
    client: Client,
    config: LmConfig,
}

impl LmClient {
    /// Create a new client from a validated config
    pub fn new(config: LmConfig) -> GepaResult<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| {
                GepaError::configuration("http_client", &format!("failed to build client: {}", e))
            })?;

        Ok(Self { client, config })
    }

    /// The client's configuration
    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    async fn send_request(&self, messages: &[ChatMessage]) -> GepaResult<String> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
        });
        if let Some(max_tokens) = self.config.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        debug!("Sending chat completion request to {}", url);

        let response = self
            .client
            .post(&url)
            .header("authorization", format!("Bearer {}", self.config.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GepaError::http(format!("request timed out after {}s", self.config.timeout_seconds))
                } else if e.is_connect() {
                    GepaError::http(format!("connection failed: {}", e))
                } else {
                    GepaError::from(e)
                }
            })?;

        let status = response.status();
        let text = response.text().await.map_err(GepaError::from)?;

        if !status.is_success() {
            let message = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| {
                    v.get("error")
                        .and_then(|e| e.get("message"))
                        .and_then(|m| m.as_str())
                        .map(|s| s.to_string())
                })
                .unwrap_or_else(|| text.clone());
            return Err(GepaError::http(format!("status {}: {}", status, message)));
        }

        let completion: CompletionResponse = serde_json::from_str(&text)
            .map_err(|e| GepaError::serialization("chat_completion", &e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GepaError::http("response contained no choices"))
    }

    fn is_retryable(error: &GepaError) -> bool {
        match error {
            GepaError::Http { message } => {
                message.contains("timed out")
                    || message.contains("connection failed")
                    || message.contains("status 429")
                    || message.contains("status 5")
            }
            _ => false,
        }
    }
}

#[async_trait]
impl ChatModel for LmClient {
    async fn complete(&self, messages: &[ChatMessage]) -> GepaResult<String> {
        let mut retries = 0;

        loop {
            match self.send_request(messages).await {
                Ok(response) => return Ok(response),
                Err(e) if retries < self.config.max_retries && Self::is_retryable(&e) => {
                    retries += 1;
                    let base_delay = 1000 * (2_u64.pow(retries - 1));
                    let jitter = rand::random::<u64>() % (base_delay / 4 + 1);
                    let delay = Duration::from_millis(base_delay + jitter);

                    warn!(
                        "LM request failed (attempt {}/{}), retrying in {:?}: {}",
                        retries, self.config.max_retries, delay, e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl ReflectionModel for LmClient {
    async fn reflect(&self, prompt: &str) -> GepaResult<String> {
        self.complete(&[ChatMessage::user(prompt)]).await
    }
}
