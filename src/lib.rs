//! synthforge: web-grounded synthetic dataset generator.
//!
//! Turns a single free-form request into a target-sized synthetic
//! dataset by running a resumable staged pipeline: parse request →
//! refine search queries → web search → scrape → chunk → extract topics
//! → generate records → collect and finalize. Progress is checkpointed
//! after every unit of work, so a crashed or rate-limited run picks up
//! where it left off instead of redoing completed stages.

// Core modules
pub mod admission;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod content;
pub mod error;
pub mod export;
pub mod llm;
pub mod pipeline;
pub mod scrape;
pub mod search;
pub mod types;
pub mod utils;

// Re-export commonly used error types
pub use error::{DriverError, LlmError, ScrapeError, SearchError, StageError, StoreError};
