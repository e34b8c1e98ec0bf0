//! Generation-service client and prompt construction.

pub mod client;
pub mod prompts;

pub use client::{GenerationRequest, HttpTextGenerator, TextGenerator};
pub use prompts::SamplingParams;
