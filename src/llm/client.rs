//! Generation-service client with credential rotation.
//!
//! Speaks an OpenAI-compatible chat-completions API. A pool of
//! equivalent credentials is rotated when the service reports a quota or
//! rate-limit condition; transient failures back off exponentially. The
//! rotation index lives on the client object so tests can inject
//! deterministic pools instead of reaching through ambient state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::LlmError;

/// A single prompt exchange with the generation service.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system_instruction: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_instruction: None,
            temperature: 0.7,
            max_tokens: 8192,
        }
    }

    pub fn with_system(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Anything that can turn a prompt into free text.
///
/// The pipeline only ever talks to this trait; production uses
/// [`HttpTextGenerator`], tests inject deterministic fakes.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError>;
}

// Wire types for the chat-completions API.

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// HTTP client for the generation service.
pub struct HttpTextGenerator {
    api_base: String,
    model: String,
    credentials: Vec<String>,
    current_key: AtomicUsize,
    max_retries: usize,
    backoff_base: Duration,
    http_client: reqwest::Client,
}

impl HttpTextGenerator {
    /// Creates a client over an OpenAI-compatible endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::MissingCredentials`] when the pool is empty.
    pub fn new(
        api_base: impl Into<String>,
        model: impl Into<String>,
        credentials: Vec<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        if credentials.is_empty() {
            return Err(LlmError::MissingCredentials);
        }
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;
        Ok(Self {
            api_base: api_base.into(),
            model: model.into(),
            credentials,
            current_key: AtomicUsize::new(0),
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
            http_client,
        })
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Index of the credential currently in use.
    pub fn current_credential(&self) -> usize {
        self.current_key.load(Ordering::SeqCst) % self.credentials.len()
    }

    /// Advances to the next credential in the pool.
    fn rotate_credential(&self) -> usize {
        let next = (self.current_key.fetch_add(1, Ordering::SeqCst) + 1) % self.credentials.len();
        warn!(key_index = next, "rotated generation-service credential");
        next
    }

    async fn attempt(&self, request: &GenerationRequest, key: &str) -> Result<String, LlmError> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system_instruction {
            messages.push(ChatMessage {
                role: "system",
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: request.prompt.clone(),
        });

        let body = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            let detail = response.text().await.unwrap_or_default();
            return Err(LlmError::RateLimited(detail));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            // Some providers report quota exhaustion as a 4xx with a
            // descriptive body rather than a 429.
            if message.to_lowercase().contains("quota") {
                return Err(LlmError::RateLimited(message));
            }
            return Err(LlmError::ApiError {
                code: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::StructuredContent("response had no choices".to_string()))
    }
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        let pool_size = self.credentials.len();
        let budget = self.max_retries * pool_size;
        let mut rate_limited_everywhere = true;

        for attempt in 0..budget {
            let key_index = self.current_credential();
            let key = &self.credentials[key_index];

            match self.attempt(request, key).await {
                Ok(text) => return Ok(text),
                Err(e @ LlmError::RateLimited(_)) => {
                    warn!(attempt, key_index, error = %e, "generation call rate limited");
                    self.rotate_credential();
                }
                Err(e) => {
                    rate_limited_everywhere = false;
                    warn!(attempt, key_index, error = %e, "generation call failed");
                }
            }

            if attempt + 1 < budget {
                // One backoff step per full trip around the pool.
                let exp = (attempt / pool_size) as u32;
                let delay = self.backoff_base * 2u32.saturating_pow(exp);
                debug!(delay_ms = delay.as_millis() as u64, "backing off before retry");
                tokio::time::sleep(delay).await;
            }
        }

        if rate_limited_everywhere {
            Err(LlmError::CredentialsExhausted {
                pool_size,
                attempts: budget,
            })
        } else {
            Err(LlmError::RequestFailed(format!(
                "generation failed after {budget} attempts"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = GenerationRequest::new("prompt")
            .with_system("system")
            .with_temperature(0.2)
            .with_max_tokens(256);
        assert_eq!(request.prompt, "prompt");
        assert_eq!(request.system_instruction.as_deref(), Some("system"));
        assert!((request.temperature - 0.2).abs() < f64::EPSILON);
        assert_eq!(request.max_tokens, 256);
    }

    #[test]
    fn test_empty_credential_pool_rejected() {
        let result = HttpTextGenerator::new(
            "https://api.example.com/v1",
            "model",
            Vec::new(),
            Duration::from_secs(5),
        );
        assert!(matches!(result, Err(LlmError::MissingCredentials)));
    }

    #[test]
    fn test_credential_rotation_wraps() {
        let client = HttpTextGenerator::new(
            "https://api.example.com/v1",
            "model",
            vec!["k0".to_string(), "k1".to_string(), "k2".to_string()],
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(client.current_credential(), 0);
        assert_eq!(client.rotate_credential(), 1);
        assert_eq!(client.rotate_credential(), 2);
        assert_eq!(client.rotate_credential(), 0);
        assert_eq!(client.current_credential(), 0);
    }

    #[test]
    fn test_max_retries_clamped() {
        let client = HttpTextGenerator::new(
            "https://api.example.com/v1",
            "model",
            vec!["k".to_string()],
            Duration::from_secs(5),
        )
        .unwrap()
        .with_max_retries(0);
        assert_eq!(client.max_retries, 1);
    }
}
