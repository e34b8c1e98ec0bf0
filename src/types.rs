//! Shared data model for the synthforge pipeline.
//!
//! These types flow between stages as checkpoint assets, so every one of
//! them is serde-serializable and stable across process restarts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A free-form user request parsed into structured generation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRequest {
    /// The original request text, verbatim.
    pub original_request: String,
    /// Domain the data should cover (e.g. "medical", "finance").
    pub domain: String,
    /// Kind of records to generate (e.g. "QA", "classification").
    pub data_type: String,
    /// Language for all generated text (ISO-ish code or name).
    pub language: String,
    /// Number of records the caller asked for.
    pub sample_count: usize,
    /// Optional free-form description of the desired record shape.
    pub description: Option<String>,
}

impl ParsedRequest {
    /// Number of unique topics needed to reach the sample target, given
    /// how many records one topic yields.
    pub fn required_topics(&self, records_per_topic: usize) -> usize {
        self.sample_count.div_ceil(records_per_topic.max(1))
    }
}

/// One ranked result from the web-search service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
    /// Relevance score as reported by the search service.
    pub score: f64,
    /// The refined query that produced this hit.
    pub source_query: String,
}

/// Extracted text of one successfully retrieved page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedPage {
    pub url: String,
    pub title: String,
    pub text: String,
    pub word_count: usize,
}

/// A bounded slice of page text fed to topic extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentChunk {
    pub source_url: String,
    pub chunk_index: usize,
    pub text: String,
}

impl ContentChunk {
    /// Stable identifier used to mark a chunk as processed across resumes.
    pub fn id(&self) -> String {
        format!("{}#{}", self.source_url, self.chunk_index)
    }
}

/// One generated record, before final collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticRecord {
    /// The record payload as returned by the generation service.
    pub content: serde_json::Value,
    /// Topics this record was generated from.
    pub source_topics: Vec<String>,
    pub quality_score: f64,
    pub generated_at: DateTime<Utc>,
}

impl SyntheticRecord {
    pub fn new(content: serde_json::Value, topic: impl Into<String>) -> Self {
        Self {
            content,
            source_topics: vec![topic.into()],
            quality_score: 1.0,
            generated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(count: usize) -> ParsedRequest {
        ParsedRequest {
            original_request: "req".to_string(),
            domain: "medical".to_string(),
            data_type: "QA".to_string(),
            language: "en".to_string(),
            sample_count: count,
            description: None,
        }
    }

    #[test]
    fn test_required_topics_rounds_up() {
        assert_eq!(parsed(12).required_topics(5), 3);
        assert_eq!(parsed(10).required_topics(5), 2);
        assert_eq!(parsed(1).required_topics(5), 1);
        assert_eq!(parsed(0).required_topics(5), 0);
    }

    #[test]
    fn test_required_topics_zero_divisor_clamped() {
        assert_eq!(parsed(10).required_topics(0), 10);
    }

    #[test]
    fn test_chunk_id_stable() {
        let chunk = ContentChunk {
            source_url: "https://example.com/a".to_string(),
            chunk_index: 2,
            text: "body".to_string(),
        };
        assert_eq!(chunk.id(), "https://example.com/a#2");
    }

    #[test]
    fn test_synthetic_record_roundtrip() {
        let record = SyntheticRecord::new(serde_json::json!({"q": "x", "a": "y"}), "topic");
        let json = serde_json::to_string(&record).unwrap();
        let back: SyntheticRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
