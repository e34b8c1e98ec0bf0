//! Web-search client.
//!
//! Narrow contract: one query in, a ranked list of
//! url/title/snippet/score out. The production client speaks the Tavily
//! search API; the pipeline only depends on the [`SearchProvider`] trait.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::SearchError;
use crate::types::SearchHit;

/// Anything that can search the web.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize)
        -> Result<Vec<SearchHit>, SearchError>;
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'static str,
    include_answer: bool,
    include_raw_content: bool,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: f64,
}

/// Client for the Tavily search API.
pub struct TavilyClient {
    api_key: String,
    base_url: String,
    max_retries: usize,
    http_client: reqwest::Client,
}

impl TavilyClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, SearchError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;
        Ok(Self {
            api_key: api_key.into(),
            base_url: "https://api.tavily.com".to_string(),
            max_retries: 3,
            http_client,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    async fn attempt(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let body = TavilyRequest {
            api_key: &self.api_key,
            query,
            search_depth: "advanced",
            include_answer: false,
            include_raw_content: false,
            max_results,
        };

        let response = self
            .http_client
            .post(format!("{}/search", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::ApiError {
                code: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let parsed: TavilyResponse = response
            .json()
            .await
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;

        Ok(parsed
            .results
            .into_iter()
            .map(|r| {
                // Snippets are bounded; raw page text comes from scraping.
                let snippet = r.content.chars().take(500).collect();
                SearchHit {
                    url: r.url,
                    title: r.title,
                    snippet,
                    score: r.score,
                    source_query: query.to_string(),
                }
            })
            .collect())
    }
}

#[async_trait]
impl SearchProvider for TavilyClient {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        for attempt in 0..self.max_retries {
            match self.attempt(query, max_results).await {
                Ok(hits) => {
                    info!(query, count = hits.len(), "search completed");
                    return Ok(hits);
                }
                Err(e) if attempt + 1 < self.max_retries => {
                    warn!(query, attempt, error = %e, "search attempt failed");
                    tokio::time::sleep(Duration::from_millis(500) * 2u32.saturating_pow(attempt as u32))
                        .await;
                }
                Err(e) => {
                    warn!(query, error = %e, "search retries exhausted");
                    return Err(SearchError::RetriesExhausted {
                        query: query.to_string(),
                        attempts: self.max_retries,
                    });
                }
            }
        }
        unreachable!("retry loop always returns")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builders() {
        let client = TavilyClient::new("key", Duration::from_secs(5))
            .unwrap()
            .with_base_url("http://localhost:9000")
            .with_max_retries(5);
        assert_eq!(client.base_url, "http://localhost:9000");
        assert_eq!(client.max_retries, 5);
    }

    #[test]
    fn test_max_retries_clamped() {
        let client = TavilyClient::new("key", Duration::from_secs(5))
            .unwrap()
            .with_max_retries(0);
        assert_eq!(client.max_retries, 1);
    }

    #[test]
    fn test_response_deserialization_tolerates_missing_fields() {
        let parsed: TavilyResponse = serde_json::from_str(
            r#"{"results": [{"url": "https://example.com/a", "title": "A"}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.results.len(), 1);
        assert_eq!(parsed.results[0].score, 0.0);
        assert!(parsed.results[0].content.is_empty());

        let empty: TavilyResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.results.is_empty());
    }
}
