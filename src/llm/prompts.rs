//! Prompt construction and typed response parsing for the four
//! generation-service conversations: parse the user request, refine
//! search queries, extract topics, and generate records.
//!
//! Responses are free text; the first balanced JSON span is extracted
//! and parsed. A response with no usable payload is a
//! structured-content failure for that one call.

use serde_json::Value;
use tracing::warn;

use crate::error::LlmError;
use crate::types::ParsedRequest;
use crate::utils::json_extraction::{extract_array, extract_object};

use super::client::{GenerationRequest, TextGenerator};

const PARSE_SYSTEM: &str = "You are a dataset request parser. Extract from the user's request: \
domain_type (the field, e.g. medical, finance), data_type (e.g. QA, classification, \
summarization), sample_count (how many records), language (default \"en\"), and an optional \
description of the desired record shape. Return ONLY a JSON object with exactly these keys: \
domain_type, data_type, sample_count, language, description. No other text.";

const REFINE_SYSTEM: &str = "You generate diverse web search queries for a given domain and \
language. Each query targets a different subtopic so the gathered material covers the domain \
broadly. Return ONLY a JSON array of query strings, all written in the requested language.";

const EXTRACT_SYSTEM: &str = "You extract focused subtopics from content. Each subtopic must be \
specific enough to generate several high-quality synthetic records and relevant to the given \
domain. Return ONLY a JSON array of subtopic strings in the requested language.";

const GENERATE_SYSTEM: &str = "You are a synthetic data generation expert. Produce a JSON array \
of objects; each object is one unique record for the given topic, data type, and language. \
Return ONLY the JSON array, no explanations.";

/// Sampling settings applied to the generation conversations, taken from
/// the pipeline configuration.
///
/// Request parsing always runs at temperature zero regardless; only the
/// output-length cap applies there.
#[derive(Debug, Clone, Copy)]
pub struct SamplingParams {
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 8192,
        }
    }
}

/// Parses a free-form dataset request into structured parameters.
///
/// Missing fields fall back to the same defaults the service-side parser
/// applies: domain "general knowledge", data type "general_text",
/// 100 samples, language "en".
pub async fn parse_request(
    llm: &dyn TextGenerator,
    request: &str,
    sampling: SamplingParams,
) -> Result<ParsedRequest, LlmError> {
    let prompt = format!(
        "Parse this dataset request: \"{request}\"\n\n\
         Example: \"I want 1000 medical QA data points in English\" -> \
         {{\"domain_type\": \"medical\", \"data_type\": \"QA\", \"sample_count\": 1000, \
         \"language\": \"en\", \"description\": null}}"
    );
    let response = llm
        .generate(
            &GenerationRequest::new(prompt)
                .with_system(PARSE_SYSTEM)
                .with_temperature(0.0)
                .with_max_tokens(sampling.max_tokens),
        )
        .await?;

    let fields = extract_object(&response).ok_or_else(|| {
        LlmError::StructuredContent(format!(
            "request parse returned no JSON object: {}",
            preview(&response)
        ))
    })?;

    let str_field = |key: &str, default: &str| -> String {
        fields
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(default)
            .to_string()
    };

    Ok(ParsedRequest {
        original_request: request.to_string(),
        domain: str_field("domain_type", "general knowledge"),
        data_type: str_field("data_type", "general_text"),
        language: str_field("language", "en"),
        sample_count: fields
            .get("sample_count")
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .unwrap_or(100),
        description: fields
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// Derives `count` diverse search queries for the parsed request.
pub async fn refine_queries(
    llm: &dyn TextGenerator,
    parsed: &ParsedRequest,
    count: usize,
    sampling: SamplingParams,
) -> Result<Vec<String>, LlmError> {
    let prompt = format!(
        "Generate {count} diverse web search queries in {language} for the \"{domain}\" domain. \
         Cover distinct subtopics. Return a JSON array of {count} strings.",
        language = parsed.language,
        domain = parsed.domain,
    );
    let response = llm
        .generate(
            &GenerationRequest::new(prompt)
                .with_system(REFINE_SYSTEM)
                .with_temperature(sampling.temperature)
                .with_max_tokens(sampling.max_tokens),
        )
        .await?;

    let items = extract_array(&response).ok_or_else(|| {
        LlmError::StructuredContent(format!(
            "query refinement returned no JSON array: {}",
            preview(&response)
        ))
    })?;

    let mut queries: Vec<String> = items
        .into_iter()
        .filter_map(|v| v.as_str().map(str::trim).map(str::to_string))
        .filter(|q| q.len() > 3)
        .collect();

    // Pad with a generic query rather than under-delivering the round.
    while queries.len() < count {
        queries.push(format!("{} information", parsed.domain));
    }
    queries.truncate(count);
    Ok(queries)
}

/// Extracts subtopic names from one content chunk.
pub async fn extract_topics(
    llm: &dyn TextGenerator,
    chunk_text: &str,
    language: &str,
    domain: &str,
    sampling: SamplingParams,
) -> Result<Vec<String>, LlmError> {
    let prompt = format!(
        "Extract focused subtopics relevant to the \"{domain}\" domain from this content, \
         expressed in {language}:\n\n{chunk_text}\n\n\
         Return a JSON array of subtopic strings."
    );
    let response = llm
        .generate(
            &GenerationRequest::new(prompt)
                .with_system(EXTRACT_SYSTEM)
                .with_temperature(sampling.temperature)
                .with_max_tokens(sampling.max_tokens),
        )
        .await?;

    let items = extract_array(&response).ok_or_else(|| {
        LlmError::StructuredContent(format!(
            "topic extraction returned no JSON array: {}",
            preview(&response)
        ))
    })?;

    Ok(items
        .into_iter()
        .filter_map(|v| v.as_str().map(str::trim).map(str::to_string))
        .filter(|t| !t.is_empty())
        .collect())
}

/// Generates `count` candidate records for one topic.
///
/// Array entries that are not JSON objects are discarded with a warning;
/// they never abort the call.
pub async fn generate_records(
    llm: &dyn TextGenerator,
    topic: &str,
    parsed: &ParsedRequest,
    count: usize,
    sampling: SamplingParams,
) -> Result<Vec<Value>, LlmError> {
    let description = match &parsed.description {
        Some(d) => format!("\nThe desired record shape: {d}"),
        None => String::new(),
    };
    let prompt = format!(
        "Generate {count} synthetic data points for the topic \"{topic}\".\n\
         Data type: \"{data_type}\". All text in {language}.{description}\n\
         Return a JSON array of {count} objects.",
        data_type = parsed.data_type,
        language = parsed.language,
    );
    let response = llm
        .generate(
            &GenerationRequest::new(prompt)
                .with_system(GENERATE_SYSTEM)
                .with_temperature(sampling.temperature)
                .with_max_tokens(sampling.max_tokens),
        )
        .await?;

    let items = extract_array(&response).ok_or_else(|| {
        LlmError::StructuredContent(format!(
            "record generation returned no JSON array: {}",
            preview(&response)
        ))
    })?;

    let mut records = Vec::with_capacity(items.len());
    for item in items {
        if item.is_object() {
            records.push(item);
        } else {
            warn!(topic, "discarding non-object entry in generated records");
        }
    }
    Ok(records)
}

fn preview(response: &str) -> String {
    let trimmed = response.trim();
    let end = trimmed
        .char_indices()
        .nth(80)
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    trimmed[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays canned responses in order, recording each request.
    struct ScriptedLlm {
        responses: Mutex<Vec<String>>,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().rev().map(String::from).collect()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedLlm {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
            self.seen.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| LlmError::RequestFailed("script exhausted".to_string()))
        }
    }

    fn parsed() -> ParsedRequest {
        ParsedRequest {
            original_request: "req".to_string(),
            domain: "medical".to_string(),
            data_type: "QA".to_string(),
            language: "en".to_string(),
            sample_count: 10,
            description: None,
        }
    }

    #[tokio::test]
    async fn test_parse_request_happy_path() {
        let llm = ScriptedLlm::new(vec![
            r#"{"domain_type": "legal", "data_type": "QA", "sample_count": 300, "language": "ar", "description": "short answers"}"#,
        ]);
        let result = parse_request(
            &llm,
            "300 legal QA in Arabic, short answers",
            SamplingParams::default(),
        )
        .await
        .unwrap();
        assert_eq!(result.domain, "legal");
        assert_eq!(result.sample_count, 300);
        assert_eq!(result.language, "ar");
        assert_eq!(result.description.as_deref(), Some("short answers"));
    }

    #[tokio::test]
    async fn test_parse_request_defaults_for_missing_fields() {
        let llm = ScriptedLlm::new(vec![r#"{"sample_count": 50}"#]);
        let result = parse_request(&llm, "50 of something", SamplingParams::default())
            .await
            .unwrap();
        assert_eq!(result.domain, "general knowledge");
        assert_eq!(result.data_type, "general_text");
        assert_eq!(result.language, "en");
        assert_eq!(result.sample_count, 50);
    }

    #[tokio::test]
    async fn test_parse_request_without_json_fails() {
        let llm = ScriptedLlm::new(vec!["I cannot help with that."]);
        let err = parse_request(&llm, "whatever", SamplingParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::StructuredContent(_)));
    }

    #[tokio::test]
    async fn test_refine_queries_pads_short_responses() {
        let llm = ScriptedLlm::new(vec![r#"["diabetes treatment", "x", "cancer screening"]"#]);
        let queries = refine_queries(&llm, &parsed(), 4, SamplingParams::default())
            .await
            .unwrap();
        assert_eq!(queries.len(), 4);
        assert_eq!(queries[0], "diabetes treatment");
        // "x" is too short and is dropped; padding fills the rest.
        assert!(queries.contains(&"medical information".to_string()));
    }

    #[tokio::test]
    async fn test_extract_topics_from_fenced_response() {
        let llm = ScriptedLlm::new(vec![
            "Here you go:\n```json\n[\"insulin dosing\", \"HbA1c targets\"]\n```",
        ]);
        let topics = extract_topics(&llm, "chunk text", "en", "medical", SamplingParams::default())
            .await
            .unwrap();
        assert_eq!(topics, vec!["insulin dosing", "HbA1c targets"]);
    }

    #[tokio::test]
    async fn test_generate_records_discards_non_objects() {
        let llm = ScriptedLlm::new(vec![
            r#"[{"q": "a?", "a": "b"}, "stray string", {"q": "c?", "a": "d"}]"#,
        ]);
        let records = generate_records(&llm, "topic", &parsed(), 3, SamplingParams::default())
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.is_object()));
    }

    #[tokio::test]
    async fn test_generate_records_without_array_fails() {
        let llm = ScriptedLlm::new(vec!["no list here"]);
        let err = generate_records(&llm, "topic", &parsed(), 3, SamplingParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::StructuredContent(_)));
    }

    #[tokio::test]
    async fn test_sampling_settings_reach_the_request() {
        let llm = ScriptedLlm::new(vec![r#"["first query", "second query"]"#]);
        let sampling = SamplingParams {
            temperature: 0.2,
            max_tokens: 1024,
        };
        refine_queries(&llm, &parsed(), 2, sampling).await.unwrap();

        let seen = llm.seen.lock().unwrap();
        assert!((seen[0].temperature - 0.2).abs() < f64::EPSILON);
        assert_eq!(seen[0].max_tokens, 1024);
    }

    #[tokio::test]
    async fn test_parse_request_stays_deterministic() {
        let llm = ScriptedLlm::new(vec![r#"{"sample_count": 5}"#]);
        let sampling = SamplingParams {
            temperature: 0.9,
            max_tokens: 2048,
        };
        parse_request(&llm, "5 of something", sampling).await.unwrap();

        // Parsing pins temperature to zero; only the length cap follows
        // the configuration.
        let seen = llm.seen.lock().unwrap();
        assert!(seen[0].temperature.abs() < f64::EPSILON);
        assert_eq!(seen[0].max_tokens, 2048);
    }
}
