//! Pipeline configuration.
//!
//! Collects the tunables of the generation pipeline: per-stage counts,
//! worker bounds, retry budgets, and storage paths. Values come from
//! defaults, environment variables, or CLI overrides.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for the pipeline driver.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    // Stage sizing
    /// Number of refined search queries to derive per acquisition round.
    pub refined_query_count: usize,
    /// Maximum results requested per search query.
    pub results_per_query: usize,
    /// Records one topic is expected to yield; drives the required-topic count.
    pub records_per_topic: usize,
    /// Upper bound on acquisition rounds (search/scrape/extract loops)
    /// before the run finalizes with whatever it has.
    pub max_acquisition_rounds: usize,

    // Concurrency
    /// Worker bound for the fan-out stages (topic extraction, generation).
    pub max_workers: usize,

    // External-call policy
    /// Retry budget per external call (per credential for the LLM client).
    pub max_retries: usize,
    /// Timeout applied to every external HTTP call.
    pub request_timeout: Duration,

    // Generation service
    /// Base URL of the OpenAI-compatible generation endpoint.
    pub api_base: String,
    /// Model identifier passed to the generation service.
    pub model: String,
    /// Sampling temperature for generation calls.
    pub temperature: f64,
    /// Maximum output tokens per generation call.
    pub max_output_tokens: u32,

    // Content handling
    /// Character budget per content chunk fed to topic extraction.
    pub max_chunk_chars: usize,
    /// Pages with fewer words than this are discarded after scraping.
    pub min_page_words: usize,

    // Storage
    /// Root directory for per-run checkpoint state.
    pub state_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            refined_query_count: 5,
            results_per_query: 5,
            records_per_topic: 5,
            max_acquisition_rounds: 3,
            max_workers: 5,
            max_retries: 3,
            request_timeout: Duration::from_secs(30),
            api_base: "https://openrouter.ai/api/v1".to_string(),
            model: "google/gemini-2.5-flash".to_string(),
            temperature: 0.7,
            max_output_tokens: 8192,
            max_chunk_chars: 3000,
            min_page_words: 50,
            state_dir: PathBuf::from("./state"),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SYNTHFORGE_REFINED_QUERIES`: refined queries per round (default: 5)
    /// - `SYNTHFORGE_RESULTS_PER_QUERY`: search results per query (default: 5)
    /// - `SYNTHFORGE_RECORDS_PER_TOPIC`: records per topic (default: 5)
    /// - `SYNTHFORGE_MAX_ROUNDS`: acquisition round bound (default: 3)
    /// - `SYNTHFORGE_MAX_WORKERS`: fan-out worker bound (default: 5)
    /// - `SYNTHFORGE_MAX_RETRIES`: retry budget per call (default: 3)
    /// - `SYNTHFORGE_REQUEST_TIMEOUT_SECS`: HTTP timeout (default: 30)
    /// - `SYNTHFORGE_API_BASE`: generation endpoint base URL
    /// - `SYNTHFORGE_MODEL`: generation model identifier
    /// - `SYNTHFORGE_TEMPERATURE`: sampling temperature (default: 0.7)
    /// - `SYNTHFORGE_MAX_OUTPUT_TOKENS`: output token cap (default: 8192)
    /// - `SYNTHFORGE_CHUNK_CHARS`: chunk character budget (default: 3000)
    /// - `SYNTHFORGE_MIN_PAGE_WORDS`: minimum page word count (default: 50)
    /// - `SYNTHFORGE_STATE_DIR`: checkpoint state directory (default: ./state)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = env_parse("SYNTHFORGE_REFINED_QUERIES")? {
            config.refined_query_count = v;
        }
        if let Some(v) = env_parse("SYNTHFORGE_RESULTS_PER_QUERY")? {
            config.results_per_query = v;
        }
        if let Some(v) = env_parse("SYNTHFORGE_RECORDS_PER_TOPIC")? {
            config.records_per_topic = v;
        }
        if let Some(v) = env_parse("SYNTHFORGE_MAX_ROUNDS")? {
            config.max_acquisition_rounds = v;
        }
        if let Some(v) = env_parse("SYNTHFORGE_MAX_WORKERS")? {
            config.max_workers = v;
        }
        if let Some(v) = env_parse("SYNTHFORGE_MAX_RETRIES")? {
            config.max_retries = v;
        }
        if let Some(v) = env_parse::<u64>("SYNTHFORGE_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(v);
        }
        if let Ok(v) = std::env::var("SYNTHFORGE_API_BASE") {
            config.api_base = v;
        }
        if let Ok(v) = std::env::var("SYNTHFORGE_MODEL") {
            config.model = v;
        }
        if let Some(v) = env_parse("SYNTHFORGE_TEMPERATURE")? {
            config.temperature = v;
        }
        if let Some(v) = env_parse("SYNTHFORGE_MAX_OUTPUT_TOKENS")? {
            config.max_output_tokens = v;
        }
        if let Some(v) = env_parse("SYNTHFORGE_CHUNK_CHARS")? {
            config.max_chunk_chars = v;
        }
        if let Some(v) = env_parse("SYNTHFORGE_MIN_PAGE_WORDS")? {
            config.min_page_words = v;
        }
        if let Ok(v) = std::env::var("SYNTHFORGE_STATE_DIR") {
            config.state_dir = PathBuf::from(v);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_workers must be at least 1".to_string(),
            ));
        }
        if self.records_per_topic == 0 {
            return Err(ConfigError::ValidationFailed(
                "records_per_topic must be at least 1".to_string(),
            ));
        }
        if self.refined_query_count == 0 || self.results_per_query == 0 {
            return Err(ConfigError::ValidationFailed(
                "query and result counts must be at least 1".to_string(),
            ));
        }
        if self.max_acquisition_rounds == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_acquisition_rounds must be at least 1".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationFailed(format!(
                "temperature {} out of range [0.0, 2.0]",
                self.temperature
            )));
        }
        if self.max_chunk_chars < 200 {
            return Err(ConfigError::ValidationFailed(
                "max_chunk_chars must be at least 200".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parses an optional environment variable, mapping parse failures to
/// `ConfigError::InvalidValue`.
fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.refined_query_count, 5);
        assert_eq!(config.records_per_topic, 5);
        assert_eq!(config.max_workers, 5);
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = PipelineConfig {
            max_workers: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_records_per_topic() {
        let config = PipelineConfig {
            records_per_topic: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_temperature() {
        let config = PipelineConfig {
            temperature: 3.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_tiny_chunks() {
        let config = PipelineConfig {
            max_chunk_chars: 50,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
