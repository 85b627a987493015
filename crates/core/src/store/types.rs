//! Durable entities owned by the state store.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::circuit::{CircuitSnapshot, CircuitState};

/// Position of an item in a channel's publish order.
///
/// Ordered by publish time first and item id second, so two items published
/// in the same instant still have a total order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Watermark {
    pub published_at: DateTime<Utc>,
    pub item_id: String,
}

impl Watermark {
    pub fn new(published_at: DateTime<Utc>, item_id: impl Into<String>) -> Self {
        Self {
            published_at,
            item_id: item_id.into(),
        }
    }
}

/// Operator-facing channel health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelHealth {
    Active,
    CircuitOpen,
    Deactivated,
}

impl ChannelHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelHealth::Active => "active",
            ChannelHealth::CircuitOpen => "circuit-open",
            ChannelHealth::Deactivated => "deactivated",
        }
    }
}

/// A monitored content channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Source-side channel identifier (immutable).
    pub id: String,
    /// Display name resolved when the channel was added.
    pub name: String,
    pub poll_interval_secs: u64,
    /// Messaging endpoint that receives this channel's notifications.
    pub endpoint_id: String,
    pub active: bool,
    /// Last fully processed position, `None` until the first item commits.
    pub watermark: Option<Watermark>,
    pub last_check: Option<DateTime<Utc>>,
    pub circuit: CircuitSnapshot,
    pub last_error: Option<String>,
    pub deactivated_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Channel {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.circuit.consecutive_failures
    }

    pub fn health(&self) -> ChannelHealth {
        if !self.active {
            ChannelHealth::Deactivated
        } else if self.circuit.state != CircuitState::Closed {
            ChannelHealth::CircuitOpen
        } else {
            ChannelHealth::Active
        }
    }

    /// Whether a position lies strictly after this channel's watermark.
    pub fn is_after_watermark(&self, position: &Watermark) -> bool {
        match &self.watermark {
            Some(watermark) => position > watermark,
            None => true,
        }
    }
}

/// Request to start monitoring a channel.
#[derive(Debug, Clone)]
pub struct NewChannel {
    pub id: String,
    pub name: String,
    pub poll_interval_secs: u64,
    pub endpoint_id: String,
}

/// Processing status of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Discovered,
    Summarized,
    Notified,
    Failed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Discovered => "discovered",
            ItemStatus::Summarized => "summarized",
            ItemStatus::Notified => "notified",
            ItemStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "discovered" => Some(ItemStatus::Discovered),
            "summarized" => Some(ItemStatus::Summarized),
            "notified" => Some(ItemStatus::Notified),
            "failed" => Some(ItemStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Notified | ItemStatus::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            ItemStatus::Discovered => 0,
            ItemStatus::Summarized => 1,
            ItemStatus::Notified | ItemStatus::Failed => 2,
        }
    }

    /// Status only moves forward and never leaves a terminal state.
    pub fn can_transition_to(&self, next: ItemStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An item as reported by the content source, before it is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemCandidate {
    pub channel_id: String,
    pub id: String,
    pub title: String,
    pub description: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub thumbnail_url: Option<String>,
}

impl ItemCandidate {
    pub fn position(&self) -> Watermark {
        Watermark::new(self.published_at, self.id.clone())
    }
}

/// A persisted item and its pipeline progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub channel_id: String,
    pub id: String,
    pub title: String,
    pub description: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub thumbnail_url: Option<String>,
    pub summary: Option<String>,
    pub status: ItemStatus,
    /// Why the item failed, or why its summary is unavailable.
    pub failure_reason: Option<String>,
    pub discovered_at: DateTime<Utc>,
    pub summarized_at: Option<DateTime<Utc>>,
    pub notified_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl Item {
    pub fn position(&self) -> Watermark {
        Watermark::new(self.published_at, self.id.clone())
    }
}

/// Record of one delivery attempt for an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationReceipt {
    pub id: String,
    pub channel_id: String,
    pub item_id: String,
    pub endpoint_id: String,
    pub sent_at: DateTime<Utc>,
    /// Provider id of the first delivered chunk.
    pub provider_message_id: Option<String>,
    pub chunks_sent: u32,
    pub success: bool,
    pub error: Option<String>,
}

/// Receipt to be written by the dispatcher.
#[derive(Debug, Clone)]
pub struct NewReceipt {
    pub channel_id: String,
    pub item_id: String,
    pub endpoint_id: String,
    pub provider_message_id: Option<String>,
    pub chunks_sent: u32,
    pub success: bool,
    pub error: Option<String>,
}

/// Per-channel item and delivery counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub total_items: i64,
    pub discovered: i64,
    pub summarized: i64,
    pub notified: i64,
    pub failed: i64,
    pub receipts_delivered: i64,
    pub receipts_failed: i64,
    pub last_notified_at: Option<DateTime<Utc>>,
}

/// Outcome of clearing a channel's history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetSummary {
    pub items_deleted: usize,
    pub receipts_deleted: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_watermark_orders_by_time_then_id() {
        let a = Watermark::new(ts(100), "b");
        let b = Watermark::new(ts(100), "c");
        let c = Watermark::new(ts(101), "a");
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_item_status_transitions() {
        use ItemStatus::*;
        assert!(Discovered.can_transition_to(Summarized));
        assert!(Discovered.can_transition_to(Notified));
        assert!(Discovered.can_transition_to(Failed));
        assert!(Summarized.can_transition_to(Notified));
        assert!(Summarized.can_transition_to(Failed));

        assert!(!Summarized.can_transition_to(Discovered));
        assert!(!Summarized.can_transition_to(Summarized));
        assert!(!Notified.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Notified));
    }

    #[test]
    fn test_item_status_round_trip_names() {
        for status in [
            ItemStatus::Discovered,
            ItemStatus::Summarized,
            ItemStatus::Notified,
            ItemStatus::Failed,
        ] {
            assert_eq!(ItemStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ItemStatus::parse("sent"), None);
    }

    #[test]
    fn test_channel_health_serializes_kebab_case() {
        let json = serde_json::to_string(&ChannelHealth::CircuitOpen).unwrap();
        assert_eq!(json, "\"circuit-open\"");
    }
}
