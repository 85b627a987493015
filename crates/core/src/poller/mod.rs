//! Fetches items published after a channel's watermark.
//!
//! Every source request first reserves quota from the shared budget. A
//! reservation that does not fit ends the fetch with `PollError::QuotaExceeded`
//! before anything is written, which the orchestrator treats as a deferral.
//!
//! Sources may page in either direction, so a fetch reads every page before
//! returning. Capping a batch only ever drops the newest items.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::quota::{QuotaBudget, QuotaExceeded};
use crate::retry::{run_stage, Attempt, RetryPolicy, StageOutcome};
use crate::source::{ContentSource, SourceError, SourcePage};
use crate::store::{Channel, ItemCandidate};

/// Safety bound on source pages walked in one fetch.
const MAX_PAGES_PER_FETCH: u32 = 20;

/// Errors from a channel fetch.
#[derive(Debug, Error)]
pub enum PollError {
    /// Deferral: not enough quota. Not a channel failure.
    #[error(transparent)]
    QuotaExceeded(#[from] QuotaExceeded),

    /// The channel is gone upstream.
    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    #[error("source failed after {attempts} attempt(s): {reason}")]
    Source { attempts: u32, reason: String },

    /// The listing did not end within the page bound. Nothing is returned
    /// since the unread pages may hold items older than the ones read.
    #[error("listing still had more pages after {pages} page(s)")]
    Incomplete { pages: u32 },
}

/// Items to process in this cycle.
#[derive(Debug, Clone, Default)]
pub struct PollBatch {
    /// Candidates strictly after the watermark, oldest first.
    pub items: Vec<ItemCandidate>,
    /// More qualifying items remain beyond the per-cycle cap.
    pub capped: bool,
    pub pages: u32,
}

enum PageFetch {
    Page(SourcePage),
    Deferred(QuotaExceeded),
    Gone(String),
}

/// Channel poller.
pub struct ChannelPoller {
    source: Arc<dyn ContentSource>,
    quota: Arc<QuotaBudget>,
    retry: RetryPolicy,
    page_cost: u64,
    max_items: usize,
    initial_lookback: Duration,
}

impl ChannelPoller {
    pub fn new(
        source: Arc<dyn ContentSource>,
        quota: Arc<QuotaBudget>,
        retry: RetryPolicy,
        page_cost: u64,
        max_items: usize,
        initial_lookback_hours: u64,
    ) -> Self {
        Self {
            source,
            quota,
            retry,
            page_cost,
            max_items: max_items.max(1),
            initial_lookback: Duration::hours(initial_lookback_hours as i64),
        }
    }

    /// Lower publish-time bound for a channel's next fetch.
    ///
    /// A channel that has never committed an item looks back a fixed
    /// period from when it was added.
    pub fn lower_bound(&self, channel: &Channel) -> DateTime<Utc> {
        match &channel.watermark {
            Some(watermark) => watermark.published_at,
            None => channel.created_at - self.initial_lookback,
        }
    }

    /// Fetch candidates for a channel, oldest first.
    pub async fn fetch(&self, channel: &Channel) -> Result<PollBatch, PollError> {
        let since = self.lower_bound(channel);
        let mut seen = HashSet::new();
        let mut items = Vec::new();
        let mut token: Option<String> = None;
        let mut pages = 0;

        loop {
            let page = self.fetch_page(&channel.id, since, token.as_deref()).await?;
            pages += 1;

            for candidate in page.items {
                if candidate.channel_id != channel.id || candidate.published_at < since {
                    continue;
                }
                if !channel.is_after_watermark(&candidate.position()) {
                    continue;
                }
                if seen.insert(candidate.id.clone()) {
                    items.push(candidate);
                }
            }

            token = page.next_page_token;
            if token.is_none() {
                break;
            }
            if pages >= MAX_PAGES_PER_FETCH {
                warn!(channel_id = %channel.id, pages = pages, "Listing exceeds page bound");
                return Err(PollError::Incomplete { pages });
            }
        }

        items.sort_by(|a, b| a.position().cmp(&b.position()));

        let capped = items.len() > self.max_items;
        items.truncate(self.max_items);

        if capped {
            info!(
                channel_id = %channel.id,
                items = items.len(),
                "Per-cycle item cap reached, backlog remains"
            );
        }
        debug!(channel_id = %channel.id, items = items.len(), pages = pages, "Poll complete");

        Ok(PollBatch {
            items,
            capped,
            pages,
        })
    }

    async fn fetch_page(
        &self,
        channel_id: &str,
        since: DateTime<Utc>,
        token: Option<&str>,
    ) -> Result<SourcePage, PollError> {
        let source = &self.source;
        let quota = &self.quota;
        let page_cost = self.page_cost;

        let outcome = run_stage("source", &self.retry, |_| async move {
            if let Err(e) = quota.try_consume(page_cost) {
                return Attempt::Success(PageFetch::Deferred(e));
            }
            match source.list_new_items(channel_id, since, token).await {
                Ok(page) => {
                    quota.charge(page.quota_cost.saturating_sub(page_cost));
                    Attempt::Success(PageFetch::Page(page))
                }
                Err(SourceError::QuotaExceeded(message)) => {
                    info!(channel_id = %channel_id, "Source reported quota exhaustion: {}", message);
                    quota.exhaust();
                    let status = quota.status();
                    Attempt::Success(PageFetch::Deferred(QuotaExceeded {
                        requested: page_cost,
                        remaining: 0,
                        resets_in: std::time::Duration::from_secs(status.resets_in_secs),
                    }))
                }
                Err(SourceError::ChannelNotFound(id)) => Attempt::Success(PageFetch::Gone(id)),
                Err(e @ SourceError::Rejected(_)) => Attempt::Terminal(e.to_string()),
                Err(e @ SourceError::Transient(_)) => Attempt::retryable(e.to_string()),
            }
        })
        .await;

        match outcome {
            StageOutcome::Completed { value, .. } => match value {
                PageFetch::Page(page) => Ok(page),
                PageFetch::Deferred(e) => {
                    info!(channel_id = %channel_id, "Poll deferred: {}", e);
                    Err(PollError::QuotaExceeded(e))
                }
                PageFetch::Gone(id) => Err(PollError::ChannelNotFound(id)),
            },
            StageOutcome::Exhausted {
                attempts,
                last_error,
            } => Err(PollError::Source {
                attempts,
                reason: last_error,
            }),
            StageOutcome::Terminal { attempts, reason } => Err(PollError::Source { attempts, reason }),
        }
    }
}
