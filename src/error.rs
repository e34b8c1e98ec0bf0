//! Error types for synthforge operations.
//!
//! Defines error types for the major subsystems:
//! - Checkpoint store persistence
//! - Generation-service (LLM) interactions
//! - Web search and page retrieval
//! - Pipeline driver orchestration

use thiserror::Error;

/// Errors that can occur in the checkpoint store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Persisted state exists but could not be decoded. The engine never
    /// silently reinitializes over corrupt state; the operator decides.
    #[error("Corrupt persisted state for run '{run_id}': {message}")]
    CorruptState { run_id: String, message: String },

    #[error("Run '{0}' not found")]
    UnknownRun(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur during generation-service calls.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("No generation-service credentials configured")]
    MissingCredentials,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Rate limited or quota exceeded: {0}")]
    RateLimited(String),

    /// Every credential in the pool hit its quota. Fatal for the current
    /// stage invocation; partial output is persisted and the run resumes.
    #[error("All {pool_size} credentials exhausted after {attempts} attempts")]
    CredentialsExhausted { pool_size: usize, attempts: usize },

    /// The response parsed as text but contained no usable JSON payload.
    #[error("No structured content in response: {0}")]
    StructuredContent(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

impl LlmError {
    /// Whether the error indicates a quota or rate-limit condition that
    /// should trigger credential rotation before the next attempt.
    pub fn is_quota(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited(_) | LlmError::CredentialsExhausted { .. }
        )
    }
}

/// Errors that can occur during web-search calls.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Search for '{query}' failed after {attempts} attempts")]
    RetriesExhausted { query: String, attempts: usize },
}

/// Errors that can occur during page retrieval.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("HTTP status {code} for {url}")]
    HttpStatus { code: u16, url: String },

    #[error("Unsupported content type '{content_type}' for {url}")]
    UnsupportedContentType { url: String, content_type: String },

    #[error("No extractable text at {0}")]
    EmptyContent(String),
}

/// Failure of one unit of fan-out stage work (one chunk, one topic).
///
/// These surface as per-item outcomes from the executor; the driver only
/// escalates the fatal variants (store write failures, exhausted
/// credential pools).
#[derive(Debug, Error)]
pub enum StageError {
    #[error("generation: {0}")]
    Llm(#[from] LlmError),

    #[error("store: {0}")]
    Store(#[from] StoreError),
}

/// Errors that abort a pipeline run (as opposed to per-item failures,
/// which are absorbed and recorded by the fan-out executor).
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Generation service error: {0}")]
    Llm(#[from] LlmError),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_error_is_quota() {
        assert!(LlmError::RateLimited("429".to_string()).is_quota());
        assert!(LlmError::CredentialsExhausted {
            pool_size: 2,
            attempts: 6
        }
        .is_quota());
        assert!(!LlmError::RequestFailed("timeout".to_string()).is_quota());
        assert!(!LlmError::StructuredContent("no json".to_string()).is_quota());
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::CorruptState {
            run_id: "abc123".to_string(),
            message: "unexpected EOF".to_string(),
        };
        assert!(err.to_string().contains("abc123"));
        assert!(err.to_string().contains("unexpected EOF"));
    }

    #[test]
    fn test_credentials_exhausted_display() {
        let err = LlmError::CredentialsExhausted {
            pool_size: 3,
            attempts: 9,
        };
        let msg = err.to_string();
        assert!(msg.contains('3'));
        assert!(msg.contains('9'));
    }
}
