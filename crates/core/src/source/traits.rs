//! Content source contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::store::ItemCandidate;

/// Errors reported by a content source.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// The upstream API refused the call for quota reasons.
    #[error("source quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The channel no longer exists upstream.
    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    /// The request itself is invalid (bad key, malformed id); retrying won't help.
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("transient source error: {0}")]
    Transient(String),
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Transient(_))
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        SourceError::Transient(e.to_string())
    }
}

/// One page of items returned by a content source.
#[derive(Debug, Clone, Default)]
pub struct SourcePage {
    /// Items in publish order, oldest first.
    pub items: Vec<ItemCandidate>,
    /// Token for the next page, if more qualifying items may remain.
    pub next_page_token: Option<String>,
    /// Quota units the source spent producing this page.
    pub quota_cost: u64,
}

/// A source of channel content.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// List items published at or after `published_after`.
    ///
    /// Each call makes one upstream request. Passing a page's
    /// `next_page_token` continues the listing; the direction it continues
    /// in is up to the source, so callers read every page before relying on
    /// the order.
    async fn list_new_items(
        &self,
        channel_id: &str,
        published_after: DateTime<Utc>,
        page_token: Option<&str>,
    ) -> Result<SourcePage, SourceError>;

    /// Display name of a channel. Called when a channel is added.
    async fn get_channel_meta(&self, channel_id: &str) -> Result<String, SourceError>;
}
