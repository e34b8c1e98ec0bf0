//! Final dataset assembly.
//!
//! Collects the unique generated records into the dataset artifact:
//! metadata describing the run plus the numbered records, truncated to
//! the requested count.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ParsedRequest, SyntheticRecord};

/// Metadata block of the final dataset artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub original_request: String,
    pub domain: String,
    pub data_type: String,
    pub language: String,
    pub requested_count: usize,
    pub actual_count: usize,
    /// Percentage of the target delivered, formatted with one decimal.
    pub completion_rate: String,
    /// Candidate records produced before deduplication.
    pub total_generated: usize,
    /// Unique records surviving deduplication.
    pub after_deduplication: usize,
    pub generation_timestamp: DateTime<Utc>,
}

/// One record of the final dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: usize,
    pub content: serde_json::Value,
    pub source_topics: Vec<String>,
    pub quality_score: f64,
    pub generated_at: DateTime<Utc>,
}

/// The final dataset artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalDataset {
    pub metadata: DatasetMetadata,
    pub data: Vec<DatasetRecord>,
}

/// Assembles the final dataset from the unique records accumulated by
/// the generation stage.
///
/// `records` has already been deduplicated by the admission filter;
/// `total_generated` counts every candidate seen, duplicates included.
pub fn assemble(
    parsed: &ParsedRequest,
    records: &[SyntheticRecord],
    total_generated: usize,
) -> FinalDataset {
    let after_deduplication = records.len();
    let actual_count = after_deduplication.min(parsed.sample_count);

    let completion_rate = if parsed.sample_count == 0 {
        "100.0%".to_string()
    } else {
        format!(
            "{:.1}%",
            (actual_count as f64 / parsed.sample_count as f64) * 100.0
        )
    };

    let data = records
        .iter()
        .take(actual_count)
        .enumerate()
        .map(|(i, record)| DatasetRecord {
            id: i + 1,
            content: record.content.clone(),
            source_topics: record.source_topics.clone(),
            quality_score: record.quality_score,
            generated_at: record.generated_at,
        })
        .collect();

    FinalDataset {
        metadata: DatasetMetadata {
            original_request: parsed.original_request.clone(),
            domain: parsed.domain.clone(),
            data_type: parsed.data_type.clone(),
            language: parsed.language.clone(),
            requested_count: parsed.sample_count,
            actual_count,
            completion_rate,
            total_generated,
            after_deduplication,
            generation_timestamp: Utc::now(),
        },
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parsed(count: usize) -> ParsedRequest {
        ParsedRequest {
            original_request: "12 medical QA pairs".to_string(),
            domain: "medical".to_string(),
            data_type: "QA".to_string(),
            language: "en".to_string(),
            sample_count: count,
            description: None,
        }
    }

    fn records(n: usize) -> Vec<SyntheticRecord> {
        (0..n)
            .map(|i| SyntheticRecord::new(json!({"q": format!("q{i}"), "a": "a"}), "topic"))
            .collect()
    }

    #[test]
    fn test_truncates_surplus_to_target() {
        // 13 unique records against a target of 12: delivered count is
        // the target and the rate reads 100.0%.
        let dataset = assemble(&parsed(12), &records(13), 15);
        assert_eq!(dataset.metadata.requested_count, 12);
        assert_eq!(dataset.metadata.actual_count, 12);
        assert_eq!(dataset.metadata.completion_rate, "100.0%");
        assert_eq!(dataset.metadata.total_generated, 15);
        assert_eq!(dataset.metadata.after_deduplication, 13);
        assert_eq!(dataset.data.len(), 12);
    }

    #[test]
    fn test_partial_delivery_rate() {
        let dataset = assemble(&parsed(10), &records(4), 4);
        assert_eq!(dataset.metadata.actual_count, 4);
        assert_eq!(dataset.metadata.completion_rate, "40.0%");
    }

    #[test]
    fn test_record_ids_are_one_based_and_sequential() {
        let dataset = assemble(&parsed(3), &records(3), 3);
        let ids: Vec<usize> = dataset.data.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_records() {
        let dataset = assemble(&parsed(5), &[], 0);
        assert_eq!(dataset.metadata.actual_count, 0);
        assert_eq!(dataset.metadata.completion_rate, "0.0%");
        assert!(dataset.data.is_empty());
    }

    #[test]
    fn test_roundtrip_serialization() {
        let dataset = assemble(&parsed(2), &records(2), 2);
        let json = serde_json::to_string(&dataset).unwrap();
        let back: FinalDataset = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dataset);
    }
}
