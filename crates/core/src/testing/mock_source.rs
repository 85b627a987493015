//! Mock content source for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::source::{ContentSource, SourceError, SourcePage};
use crate::store::ItemCandidate;

/// A recorded `list_new_items` call.
#[derive(Debug, Clone)]
pub struct RecordedListCall {
    pub channel_id: String,
    pub published_after: DateTime<Utc>,
    pub page_token: Option<String>,
}

/// Mock implementation of the ContentSource trait.
///
/// Items are served oldest first in pages of `page_size`; page tokens are
/// offsets. Queued errors are returned, one per call, before any page.
pub struct MockContentSource {
    items: Arc<RwLock<HashMap<String, Vec<ItemCandidate>>>>,
    names: Arc<RwLock<HashMap<String, String>>>,
    errors: Arc<RwLock<VecDeque<SourceError>>>,
    calls: Arc<RwLock<Vec<RecordedListCall>>>,
    delay: Arc<RwLock<Option<Duration>>>,
    page_size: usize,
}

impl Default for MockContentSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockContentSource {
    pub fn new() -> Self {
        Self {
            items: Arc::new(RwLock::new(HashMap::new())),
            names: Arc::new(RwLock::new(HashMap::new())),
            errors: Arc::new(RwLock::new(VecDeque::new())),
            calls: Arc::new(RwLock::new(Vec::new())),
            delay: Arc::new(RwLock::new(None)),
            page_size: 50,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Replace a channel's items. Also makes the channel known to
    /// `get_channel_meta`.
    pub async fn set_items(&self, channel_id: &str, items: Vec<ItemCandidate>) {
        self.items.write().await.insert(channel_id.to_string(), items);
        self.names
            .write()
            .await
            .entry(channel_id.to_string())
            .or_insert_with(|| format!("Channel {}", channel_id));
    }

    /// Append items to a channel.
    pub async fn add_items(&self, channel_id: &str, items: Vec<ItemCandidate>) {
        self.items
            .write()
            .await
            .entry(channel_id.to_string())
            .or_default()
            .extend(items);
    }

    pub async fn set_channel_name(&self, channel_id: &str, name: &str) {
        self.names
            .write()
            .await
            .insert(channel_id.to_string(), name.to_string());
    }

    /// Queue an error for the next call.
    pub async fn push_error(&self, error: SourceError) {
        self.errors.write().await.push_back(error);
    }

    /// Delay every `list_new_items` call.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    pub async fn list_calls(&self) -> Vec<RecordedListCall> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl ContentSource for MockContentSource {
    async fn list_new_items(
        &self,
        channel_id: &str,
        published_after: DateTime<Utc>,
        page_token: Option<&str>,
    ) -> Result<SourcePage, SourceError> {
        self.calls.write().await.push(RecordedListCall {
            channel_id: channel_id.to_string(),
            published_after,
            page_token: page_token.map(str::to_string),
        });

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.errors.write().await.pop_front() {
            return Err(error);
        }

        let mut items: Vec<ItemCandidate> = self
            .items
            .read()
            .await
            .get(channel_id)
            .map(|items| {
                items
                    .iter()
                    .filter(|i| i.published_at >= published_after)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        items.sort_by_key(|i| i.position());

        let offset: usize = page_token.and_then(|t| t.parse().ok()).unwrap_or(0);
        let end = (offset + self.page_size).min(items.len());
        let page = items.get(offset..end).map(<[_]>::to_vec).unwrap_or_default();
        let next_page_token = (end < items.len()).then(|| end.to_string());

        Ok(SourcePage {
            items: page,
            next_page_token,
            quota_cost: 1,
        })
    }

    async fn get_channel_meta(&self, channel_id: &str) -> Result<String, SourceError> {
        if let Some(error) = self.errors.write().await.pop_front() {
            return Err(error);
        }
        self.names
            .read()
            .await
            .get(channel_id)
            .cloned()
            .ok_or_else(|| SourceError::ChannelNotFound(channel_id.to_string()))
    }
}
