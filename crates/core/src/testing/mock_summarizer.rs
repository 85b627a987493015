//! Mock summarizer for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::summarizer::{Summarizer, SummarizerError};

/// Mock implementation of the Summarizer trait.
///
/// Returns the configured default summary for every title except those set
/// up to fail, which fail on every call.
pub struct MockSummarizer {
    default_summary: Arc<RwLock<String>>,
    failures: Arc<RwLock<HashMap<String, SummarizerError>>>,
    calls: Arc<RwLock<Vec<String>>>,
}

impl Default for MockSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSummarizer {
    pub fn new() -> Self {
        Self {
            default_summary: Arc::new(RwLock::new("A short summary.".to_string())),
            failures: Arc::new(RwLock::new(HashMap::new())),
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn set_default_summary(&self, summary: &str) {
        *self.default_summary.write().await = summary.to_string();
    }

    /// Fail every summarization of `title` with `error`.
    pub async fn fail_title(&self, title: &str, error: SummarizerError) {
        self.failures.write().await.insert(title.to_string(), error);
    }

    pub async fn clear_failures(&self) {
        self.failures.write().await.clear();
    }

    /// Titles summarized so far, in call order.
    pub async fn calls(&self) -> Vec<String> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn summarize(&self, title: &str, _description: &str) -> Result<String, SummarizerError> {
        self.calls.write().await.push(title.to_string());
        if let Some(error) = self.failures.read().await.get(title) {
            return Err(error.clone());
        }
        Ok(self.default_summary.read().await.clone())
    }
}
