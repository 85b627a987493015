//! A fully wired pipeline over mocks and an SQLite store.

use std::sync::Arc;

use crate::circuit::{CircuitBreaker, CircuitConfig};
use crate::notifier::NotificationDispatcher;
use crate::orchestrator::{ChannelOrchestrator, TrackerConfig};
use crate::poller::ChannelPoller;
use crate::quota::{QuotaBudget, QuotaConfig};
use crate::store::{Channel, SqliteStateStore, StateStore, StoreError};
use crate::summarizer::SummarizerAdapter;

use super::{fixtures, MockContentSource, MockNotifier, MockSummarizer};

/// Orchestrator plus handles on every collaborator.
pub struct TestPipeline {
    pub store: Arc<SqliteStateStore>,
    pub source: Arc<MockContentSource>,
    pub summarizer: Arc<MockSummarizer>,
    pub notifier: Arc<MockNotifier>,
    pub quota: Arc<QuotaBudget>,
    pub breaker: Arc<CircuitBreaker>,
    pub orchestrator: Arc<ChannelOrchestrator>,
    pub tracker: TrackerConfig,
}

/// Builder for [`TestPipeline`].
pub struct TestPipelineBuilder {
    store: Option<Arc<SqliteStateStore>>,
    source: Option<Arc<MockContentSource>>,
    tracker: TrackerConfig,
    quota_limit: u64,
    failure_threshold: u32,
    max_attempts: u32,
    max_message_chars: usize,
}

impl TestPipeline {
    pub fn builder() -> TestPipelineBuilder {
        TestPipelineBuilder {
            store: None,
            source: None,
            tracker: fixtures::tracker_config(),
            quota_limit: 10_000,
            failure_threshold: 3,
            max_attempts: 3,
            max_message_chars: 4096,
        }
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Add a channel with the fixture defaults.
    pub fn add_channel(&self, id: &str) -> Result<Channel, StoreError> {
        self.store.add_channel(fixtures::new_channel(id))
    }

    pub fn channel(&self, id: &str) -> Option<Channel> {
        self.store.get_channel(id).ok().flatten()
    }
}

impl Default for TestPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl TestPipelineBuilder {
    /// Reuse an existing store, e.g. to simulate a process restart.
    pub fn store(mut self, store: Arc<SqliteStateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn source(mut self, source: Arc<MockContentSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn max_items(mut self, max_items: usize) -> Self {
        self.tracker.max_items_per_cycle = max_items;
        self
    }

    pub fn quota_limit(mut self, limit: u64) -> Self {
        self.quota_limit = limit;
        self
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn max_message_chars(mut self, chars: usize) -> Self {
        self.max_message_chars = chars;
        self
    }

    pub fn build(self) -> TestPipeline {
        let store = match self.store {
            Some(store) => store,
            None => Arc::new(
                SqliteStateStore::in_memory().unwrap_or_else(|e| panic!("in-memory store: {}", e)),
            ),
        };
        let source = self.source.unwrap_or_else(|| Arc::new(MockContentSource::new()));
        let summarizer = Arc::new(MockSummarizer::new());
        let notifier = Arc::new(MockNotifier::new());
        let quota = Arc::new(QuotaBudget::new(&QuotaConfig {
            limit_per_window: self.quota_limit,
            window_secs: 3600,
            page_cost: 1,
        }));
        let breaker = Arc::new(CircuitBreaker::new(CircuitConfig {
            failure_threshold: self.failure_threshold,
            base_cooldown_secs: 300,
            max_cooldown_secs: 3600,
        }));
        let retry = fixtures::fast_retry_policy(self.max_attempts);

        let poller = ChannelPoller::new(
            source.clone(),
            quota.clone(),
            retry.clone(),
            1,
            self.tracker.max_items_per_cycle,
            self.tracker.initial_lookback_hours,
        );
        let adapter = SummarizerAdapter::new(summarizer.clone(), retry.clone());
        let dispatcher = NotificationDispatcher::new(
            notifier.clone(),
            store.clone(),
            retry,
            self.max_message_chars,
            true,
        );
        let orchestrator = Arc::new(ChannelOrchestrator::new(
            store.clone(),
            breaker.clone(),
            poller,
            adapter,
            dispatcher,
        ));

        TestPipeline {
            store,
            source,
            summarizer,
            notifier,
            quota,
            breaker,
            orchestrator,
            tracker: self.tracker,
        }
    }
}
