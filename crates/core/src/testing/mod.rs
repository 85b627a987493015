//! Testing utilities and mock implementations of the collaborator traits.
//!
//! # Example
//!
//! ```rust,ignore
//! use herald_core::testing::{fixtures, MockContentSource, MockNotifier, MockSummarizer};
//!
//! let source = MockContentSource::new();
//! source.set_items("UC1", vec![fixtures::candidate("UC1", "v1", 60)]).await;
//!
//! let summarizer = MockSummarizer::new();
//! summarizer.fail_title("Video v1", SummarizerError::Permanent("nope".into())).await;
//! ```

mod mock_notifier;
mod mock_source;
mod mock_summarizer;
mod pipeline;

pub use mock_notifier::{MockNotifier, SentMessage};
pub use mock_source::{MockContentSource, RecordedListCall};
pub use mock_summarizer::MockSummarizer;
pub use pipeline::{TestPipeline, TestPipelineBuilder};

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::{DateTime, TimeZone, Utc};
    use tokio::time::Duration;

    use crate::circuit::CircuitSnapshot;
    use crate::orchestrator::TrackerConfig;
    use crate::retry::RetryPolicy;
    use crate::store::{Channel, ItemCandidate, NewChannel, Watermark};

    /// Reference instant fixture timestamps are offset from.
    pub const BASE_TIMESTAMP: i64 = 1_700_000_000;

    pub const ENDPOINT: &str = "chat-1";

    /// `BASE_TIMESTAMP + secs`.
    pub fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(BASE_TIMESTAMP + secs, 0)
            .single()
            .unwrap_or_default()
    }

    /// Retry policy with millisecond backoff.
    pub fn fast_retry_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            attempt_timeout: Duration::from_secs(5),
        }
    }

    /// Tracker settings whose initial lookback reaches fixture timestamps
    /// from channels created now.
    pub fn tracker_config() -> TrackerConfig {
        TrackerConfig {
            min_poll_interval_secs: 60,
            max_poll_interval_secs: 86_400,
            default_poll_interval_secs: 3600,
            max_items_per_cycle: 10,
            initial_lookback_hours: 24 * 365 * 20,
            default_endpoint: Some(ENDPOINT.to_string()),
        }
    }

    pub fn new_channel(id: &str) -> NewChannel {
        NewChannel {
            id: id.to_string(),
            name: format!("Channel {}", id),
            poll_interval_secs: 3600,
            endpoint_id: ENDPOINT.to_string(),
        }
    }

    /// An unsaved channel created one hour after the base timestamp.
    pub fn channel(id: &str) -> Channel {
        Channel {
            id: id.to_string(),
            name: format!("Channel {}", id),
            poll_interval_secs: 3600,
            endpoint_id: ENDPOINT.to_string(),
            active: true,
            watermark: None,
            last_check: None,
            circuit: CircuitSnapshot::default(),
            last_error: None,
            deactivated_reason: None,
            created_at: ts(3600),
            updated_at: ts(3600),
        }
    }

    pub fn channel_with_watermark(id: &str, secs: i64, item_id: &str) -> Channel {
        let mut channel = channel(id);
        channel.watermark = Some(Watermark::new(ts(secs), item_id));
        channel
    }

    /// A candidate titled `Video {id}` published `secs` after the base.
    pub fn candidate(channel_id: &str, id: &str, secs: i64) -> ItemCandidate {
        ItemCandidate {
            channel_id: channel_id.to_string(),
            id: id.to_string(),
            title: format!("Video {}", id),
            description: format!("Description of {}.", id),
            url: format!("https://www.youtube.com/watch?v={}", id),
            published_at: ts(secs),
            thumbnail_url: None,
        }
    }
}
