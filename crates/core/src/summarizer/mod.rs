//! Item summarization.
//!
//! `Summarizer` is the narrow contract over an LLM backend; the
//! `SummarizerAdapter` wraps it with per-attempt timeouts and bounded retries.

mod adapter;
mod config;
mod llm;

use async_trait::async_trait;
use thiserror::Error;

pub use adapter::{SummarizerAdapter, MAX_SUMMARY_CHARS};
pub use config::{LlmProvider, SummarizerConfig};
pub use llm::{build_prompt, LlmSummarizer};

/// Errors from a summarization attempt.
#[derive(Debug, Clone, Error)]
pub enum SummarizerError {
    #[error("transient summarizer error: {0}")]
    Transient(String),

    #[error("summarizer rejected request: {0}")]
    Permanent(String),
}

/// Produces a short summary of an item.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, title: &str, description: &str) -> Result<String, SummarizerError>;
}
