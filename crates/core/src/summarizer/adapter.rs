use std::sync::Arc;

use tracing::debug;

use super::{Summarizer, SummarizerError};
use crate::metrics;
use crate::retry::{run_stage, Attempt, RetryPolicy, StageOutcome};

/// Summaries longer than this are truncated.
pub const MAX_SUMMARY_CHARS: usize = 500;

/// Retrying wrapper around a [`Summarizer`].
pub struct SummarizerAdapter {
    summarizer: Arc<dyn Summarizer>,
    retry: RetryPolicy,
}

impl SummarizerAdapter {
    pub fn new(summarizer: Arc<dyn Summarizer>, retry: RetryPolicy) -> Self {
        Self { summarizer, retry }
    }

    /// Summarize an item. Empty completions count as retryable failures.
    pub async fn summarize(&self, title: &str, description: &str) -> StageOutcome<String> {
        let summarizer = &self.summarizer;

        run_stage("summarizer", &self.retry, |attempt| async move {
            debug!(attempt = attempt, title = %title, "Summarizing item");
            let result = match summarizer.summarize(title, description).await {
                Ok(text) if text.trim().is_empty() => Attempt::retryable("empty summary"),
                Ok(text) => Attempt::Success(truncate_summary(text.trim())),
                Err(SummarizerError::Transient(reason)) => Attempt::retryable(reason),
                Err(SummarizerError::Permanent(reason)) => Attempt::Terminal(reason),
            };

            let label = match &result {
                Attempt::Success(_) => "success",
                Attempt::Retryable { .. } => "retryable",
                Attempt::Terminal(_) => "terminal",
            };
            metrics::SUMMARIZER_ATTEMPTS.with_label_values(&[label]).inc();

            result
        })
        .await
    }
}

fn truncate_summary(text: &str) -> String {
    if text.chars().count() <= MAX_SUMMARY_CHARS {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(MAX_SUMMARY_CHARS - 3).collect();
    truncated.push_str("...");
    truncated
}
