//! State store trait, filters and errors.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::circuit::CircuitSnapshot;

use super::types::{
    Channel, ChannelStats, Item, ItemCandidate, ItemStatus, NewChannel, NewReceipt,
    NotificationReceipt, ResetSummary,
};

/// Error type for state store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    #[error("item not found: {channel_id}/{item_id}")]
    ItemNotFound { channel_id: String, item_id: String },

    #[error("invalid transition for item {item_id}: {from} -> {to}")]
    InvalidTransition {
        item_id: String,
        from: ItemStatus,
        to: ItemStatus,
    },

    #[error("successful receipt already recorded for item {item_id} at endpoint {endpoint_id}")]
    DuplicateReceipt {
        item_id: String,
        endpoint_id: String,
    },

    #[error("database error: {0}")]
    Database(String),
}

/// Filter for listing channels.
#[derive(Debug, Clone, Default)]
pub struct ChannelFilter {
    pub active: Option<bool>,
}

impl ChannelFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_only() -> Self {
        Self { active: Some(true) }
    }
}

/// Filter for querying items.
#[derive(Debug, Clone)]
pub struct ItemFilter {
    pub channel_id: Option<String>,
    pub statuses: Vec<ItemStatus>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ItemFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemFilter {
    pub fn new() -> Self {
        Self {
            channel_id: None,
            statuses: Vec::new(),
            limit: 100,
            offset: 0,
        }
    }

    pub fn for_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    /// Match any of the given statuses (may be called repeatedly).
    pub fn with_status(mut self, status: ItemStatus) -> Self {
        self.statuses.push(status);
        self
    }

    /// Items still in the pipeline.
    pub fn in_flight(self) -> Self {
        self.with_status(ItemStatus::Discovered)
            .with_status(ItemStatus::Summarized)
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Transactional persistence for channels, items and receipts.
///
/// Every component reads and writes pipeline state through this trait; no
/// component keeps a mutable copy across stages.
pub trait StateStore: Send + Sync {
    /// Start monitoring a channel, or reactivate a deactivated one.
    ///
    /// Reactivation keeps the watermark and resets the circuit.
    fn add_channel(&self, channel: NewChannel) -> Result<Channel, StoreError>;

    fn get_channel(&self, id: &str) -> Result<Option<Channel>, StoreError>;

    fn list_channels(&self, filter: &ChannelFilter) -> Result<Vec<Channel>, StoreError>;

    /// Stop monitoring without deleting any history.
    fn deactivate_channel(&self, id: &str, reason: Option<&str>) -> Result<Channel, StoreError>;

    fn set_poll_interval(&self, id: &str, interval_secs: u64) -> Result<Channel, StoreError>;

    fn record_check(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Persist circuit breaker state; `last_error` replaces the stored summary.
    fn save_circuit(
        &self,
        id: &str,
        circuit: &CircuitSnapshot,
        last_error: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Insert a newly observed item as `discovered`, or return the existing row.
    fn upsert_item(&self, candidate: &ItemCandidate) -> Result<Item, StoreError>;

    fn get_item(&self, channel_id: &str, item_id: &str) -> Result<Option<Item>, StoreError>;

    /// Items ordered by publish position, oldest first.
    fn list_items(&self, filter: &ItemFilter) -> Result<Vec<Item>, StoreError>;

    fn count_items(&self, filter: &ItemFilter) -> Result<i64, StoreError>;

    /// Store the summary and move the item to `summarized`.
    fn set_item_summary(
        &self,
        channel_id: &str,
        item_id: &str,
        summary: &str,
    ) -> Result<Item, StoreError>;

    /// Note that the summary is unavailable; the status is left unchanged.
    fn record_summary_failure(
        &self,
        channel_id: &str,
        item_id: &str,
        reason: &str,
    ) -> Result<Item, StoreError>;

    fn find_successful_receipt(
        &self,
        channel_id: &str,
        item_id: &str,
        endpoint_id: &str,
    ) -> Result<Option<NotificationReceipt>, StoreError>;

    /// Durably record a delivery attempt.
    ///
    /// Fails with [`StoreError::DuplicateReceipt`] if a successful receipt
    /// already exists for the same item and endpoint.
    fn record_receipt(&self, receipt: NewReceipt) -> Result<NotificationReceipt, StoreError>;

    fn list_receipts(
        &self,
        channel_id: &str,
        item_id: &str,
    ) -> Result<Vec<NotificationReceipt>, StoreError>;

    /// Move an item to a terminal status and advance the channel watermark
    /// to it, in one transaction. The watermark never moves backwards.
    fn commit_item(
        &self,
        channel_id: &str,
        item_id: &str,
        status: ItemStatus,
        reason: Option<&str>,
    ) -> Result<Channel, StoreError>;

    /// Delete a channel's items (and receipts unless kept) and clear its
    /// watermark so the channel is re-processed from scratch.
    fn reset_history(&self, channel_id: &str, keep_receipts: bool)
        -> Result<ResetSummary, StoreError>;

    fn channel_stats(&self, channel_id: &str) -> Result<ChannelStats, StoreError>;

    /// Cheap query confirming the store is reachable.
    fn ping(&self) -> Result<(), StoreError>;
}
