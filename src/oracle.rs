//! Scoring oracle abstraction and the OpenAI-compatible chat client.
//!
//! The grader only sees the [`OracleClient`] trait: hand it an ordered list
//! of chat messages, get the model's text back or a transport error.
//! [`ChatCompletionsClient`] implements it against any
//! `POST {base_url}/chat/completions` endpoint (Groq by default).
//!
//! # Retry Strategy
//!
//! Retries belong to the client, not the grader:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 1s, 2s, 4s, ... (capped at 2^5)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::OracleConfig;

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Transport-level failures. These abort a grading call.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("API key environment variable {0} is not set")]
    MissingApiKey(String),
    #[error("oracle returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("oracle request failed: {0}")]
    Network(String),
    #[error("oracle call timed out after {0:?}")]
    Timeout(Duration),
    #[error("oracle response is malformed: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for OracleError {
    fn from(e: reqwest::Error) -> Self {
        OracleError::Network(e.to_string())
    }
}

/// Something that answers a chat transcript with text.
#[async_trait]
pub trait OracleClient: Send + Sync {
    /// Model identifier, recorded with grading output.
    fn model_name(&self) -> &str;

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, OracleError>;
}

/// OpenAI-compatible chat-completions client.
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    max_retries: u32,
    timeout: Duration,
}

impl ChatCompletionsClient {
    /// Build a client, reading the bearer token from `config.api_key_env`.
    pub fn from_config(config: &OracleConfig) -> Result<Self, OracleError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| OracleError::MissingApiKey(config.api_key_env.clone()))?;
        Self::new(config, api_key)
    }

    pub fn new(config: &OracleConfig, api_key: String) -> Result<Self, OracleError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            timeout,
        })
    }

    fn request_body(&self, messages: &[ChatMessage]) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": false,
        })
    }
}

#[async_trait]
impl OracleClient for ChatCompletionsClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    #[tracing::instrument(skip(self, messages), fields(model = %self.model, messages = messages.len()))]
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, OracleError> {
        let body = self.request_body(messages);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(attempt);
                tracing::debug!(attempt, ?delay, "retrying oracle call");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .http
                .post(&self.endpoint)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_chat_response(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = OracleError::Status {
                        status: status.as_u16(),
                        body: body_text,
                    };
                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(status = status.as_u16(), attempt, "oracle call failed, will retry");
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) if e.is_timeout() => {
                    tracing::warn!(attempt, "oracle call timed out");
                    last_err = Some(OracleError::Timeout(self.timeout));
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "oracle request failed");
                    last_err = Some(e.into());
                }
            }
        }

        Err(last_err.unwrap_or_else(|| OracleError::Network("no attempts made".to_string())))
    }
}

/// Sleep before retry `attempt` (1-based): one second, doubling, capped at 32.
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.saturating_sub(1).min(5))
}

/// Longest a single `chat` call can take: every attempt running into the
/// request timeout plus every backoff sleep between them.
pub fn retry_budget(config: &OracleConfig) -> Duration {
    let retries = u64::from(config.max_retries);
    let requests = config.timeout_secs.saturating_mul(retries.saturating_add(1));
    let backoff = if retries <= 5 {
        (1u64 << retries) - 1
    } else {
        31u64.saturating_add((retries - 5).saturating_mul(32))
    };
    Duration::from_secs(requests.saturating_add(backoff))
}

/// Pull `choices[0].message.content` out of a chat-completions response.
pub fn parse_chat_response(json: &serde_json::Value) -> Result<String, OracleError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            OracleError::MalformedResponse("missing choices[0].message.content".to_string())
        })
}
