//! Text generation client and retry policy
//!
//! Generated text only ever becomes a replacement value; it never touches
//! template XML directly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("Rate limited by text generation service (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Text generation failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system_message: Option<String>,
    pub model: String,
    pub temperature: f32,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_message: None,
            model: model.into(),
            temperature: 0.2,
        }
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

/// Exponential backoff for rate-limited generation calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2,
        }
    }
}

/// Generated text and the number of calls it took
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub text: String,
    pub attempts: u32,
}

/// Call `generator`, retrying only `RateLimited` failures.
///
/// The delay starts at `initial_delay` and is multiplied after each retry; a
/// server-provided `retry_after` wins when it is longer.
pub async fn generate_with_retry(
    generator: &dyn TextGenerator,
    request: &GenerationRequest,
    policy: &RetryPolicy,
) -> Result<Generated, GenerationError> {
    let mut attempts = 0;
    let mut delay = policy.initial_delay;

    loop {
        attempts += 1;
        match generator.generate(request).await {
            Ok(text) => {
                debug!(attempts, "Text generated");
                return Ok(Generated { text, attempts });
            }
            Err(GenerationError::RateLimited { retry_after }) if attempts < policy.max_attempts => {
                let wait = retry_after.map_or(delay, |hint| hint.max(delay));
                warn!(
                    attempt = attempts,
                    wait_ms = wait.as_millis() as u64,
                    "Text generation rate limited, retrying"
                );
                tokio::time::sleep(wait).await;
                delay = delay.saturating_mul(policy.multiplier);
            }
            Err(err) => return Err(err),
        }
    }
}

const DEFAULT_CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Serialize)]
struct ChatPayload<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Debug, Deserialize)]
struct ChatContent {
    #[serde(default)]
    content: Option<String>,
}

/// Client for any OpenAI-compatible chat completions endpoint
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl OpenAiCompatibleClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_endpoint(api_key, DEFAULT_CHAT_COMPLETIONS_URL)
    }

    pub fn with_endpoint(api_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatibleClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system_message {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let payload = ChatPayload {
            model: &request.model,
            messages,
            temperature: request.temperature,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| GenerationError::Failed(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(GenerationError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Failed(format!("HTTP {}: {}", status, body)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Failed(format!("Invalid response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| GenerationError::Failed("Empty completion".to_string()))
    }
}
