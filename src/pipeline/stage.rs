//! Pipeline stage status and transitions.
//!
//! The run status is an ordered enum rather than a table of integers;
//! backward movement happens only through the named [`Transition`] values
//! defined here, each of which bundles the status to fall back to with
//! the set of assets invalidated on the way.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered progress marker of a pipeline run.
///
/// A stage only executes when the run's status is below that stage's exit
/// level; completing the stage raises the status to at least that level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Initial,
    QueryParsed,
    QueryRefined,
    WebSearched,
    WebScraped,
    ContentGathered,
    TopicsExtracted,
    DataGenerated,
    Completed,
}

impl StageStatus {
    /// Whether the run has reached its terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Completed)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageStatus::Initial => "initial",
            StageStatus::QueryParsed => "query_parsed",
            StageStatus::QueryRefined => "query_refined",
            StageStatus::WebSearched => "web_searched",
            StageStatus::WebScraped => "web_scraped",
            StageStatus::ContentGathered => "content_gathered",
            StageStatus::TopicsExtracted => "topics_extracted",
            StageStatus::DataGenerated => "data_generated",
            StageStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Asset names, one per stage output.
pub mod assets {
    pub const PARSED_REQUEST: &str = "parsed_request";
    pub const REFINED_QUERIES: &str = "refined_queries";
    pub const SEARCH_RESULTS: &str = "search_results";
    pub const SCRAPED_CONTENT: &str = "scraped_content";
    pub const CONTENT_CHUNKS: &str = "content_chunks";
    pub const EXTRACTED_TOPICS: &str = "extracted_topics";
    pub const SYNTHETIC_DATA: &str = "synthetic_data";
    pub const FINAL_DATASET: &str = "final_dataset";
}

/// A named backward transition: where the run falls back to and which
/// assets are invalidated so the re-entered stages actually re-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub name: &'static str,
    pub next: StageStatus,
    pub invalidate: &'static [&'static str],
}

/// Assets cleared by both backward transitions: the whole search/scrape
/// round is invalidated, while accumulated topics and generated records
/// survive (the admission filter keeps already-processed units from
/// being counted twice).
const ACQUISITION_ASSETS: &[&str] = &[
    assets::REFINED_QUERIES,
    assets::SEARCH_RESULTS,
    assets::SCRAPED_CONTENT,
    assets::CONTENT_CHUNKS,
];

/// Taken when every available content chunk has been processed and the
/// unique-topic count is still below the requirement.
pub fn insufficient_topics() -> Transition {
    Transition {
        name: "insufficient_topics",
        next: StageStatus::QueryParsed,
        invalidate: ACQUISITION_ASSETS,
    }
}

/// Taken by the outer loop after record generation when the accumulated
/// unique-record count is still below the target.
pub fn insufficient_records() -> Transition {
    Transition {
        name: "insufficient_records",
        next: StageStatus::QueryParsed,
        invalidate: ACQUISITION_ASSETS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_ordering() {
        assert!(StageStatus::Initial < StageStatus::QueryParsed);
        assert!(StageStatus::QueryParsed < StageStatus::QueryRefined);
        assert!(StageStatus::QueryRefined < StageStatus::WebSearched);
        assert!(StageStatus::WebSearched < StageStatus::WebScraped);
        assert!(StageStatus::WebScraped < StageStatus::ContentGathered);
        assert!(StageStatus::ContentGathered < StageStatus::TopicsExtracted);
        assert!(StageStatus::TopicsExtracted < StageStatus::DataGenerated);
        assert!(StageStatus::DataGenerated < StageStatus::Completed);
    }

    #[test]
    fn test_terminal_state() {
        assert!(StageStatus::Completed.is_terminal());
        assert!(!StageStatus::DataGenerated.is_terminal());
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&StageStatus::TopicsExtracted).unwrap();
        assert_eq!(json, "\"topics_extracted\"");
        let back: StageStatus = serde_json::from_str("\"web_scraped\"").unwrap();
        assert_eq!(back, StageStatus::WebScraped);
    }

    #[test]
    fn test_display_matches_serde() {
        for status in [
            StageStatus::Initial,
            StageStatus::Completed,
            StageStatus::ContentGathered,
        ] {
            let display = status.to_string();
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{display}\""));
        }
    }

    #[test]
    fn test_backward_transitions_preserve_accumulated_output() {
        for transition in [insufficient_topics(), insufficient_records()] {
            assert_eq!(transition.next, StageStatus::QueryParsed);
            assert!(transition.invalidate.contains(&assets::REFINED_QUERIES));
            assert!(transition.invalidate.contains(&assets::SEARCH_RESULTS));
            assert!(!transition.invalidate.contains(&assets::EXTRACTED_TOPICS));
            assert!(!transition.invalidate.contains(&assets::SYNTHETIC_DATA));
            assert!(!transition.invalidate.contains(&assets::PARSED_REQUEST));
        }
    }
}
