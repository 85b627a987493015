//! Builds the tracker from configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use herald_core::{
    notifier::Notifier, summarizer::Summarizer, ChannelOrchestrator, ChannelPoller, CircuitBreaker,
    Config, ContentSource, LlmSummarizer, NotificationDispatcher, NotifierBackend, QuotaBudget,
    RetryPolicy, Scheduler, SourceBackend, StateStore, SummarizerAdapter, TelegramNotifier,
    TrackerService, YouTubeSource,
};

/// The three external services the pipeline talks to.
pub struct Collaborators {
    pub source: Arc<dyn ContentSource>,
    pub summarizer: Arc<dyn Summarizer>,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    /// Create the configured backends.
    pub fn from_config(config: &Config) -> Result<Self> {
        let source: Arc<dyn ContentSource> = match config.source.backend {
            SourceBackend::Youtube => {
                info!("Initializing YouTube content source");
                Arc::new(
                    YouTubeSource::new(&config.source.youtube)
                        .context("Failed to create YouTube source")?,
                )
            }
        };

        let summarizer = LlmSummarizer::new(&config.summarizer)
            .context("Failed to create summarizer")?;
        info!(
            "Initializing {} summarizer (model {})",
            summarizer.provider().as_str(),
            summarizer.model()
        );

        let notifier: Arc<dyn Notifier> = match config.notifier.backend {
            NotifierBackend::Telegram => {
                info!("Initializing Telegram notifier");
                Arc::new(
                    TelegramNotifier::new(&config.notifier.telegram)
                        .context("Failed to create Telegram notifier")?,
                )
            }
        };

        Ok(Self {
            source,
            summarizer: Arc::new(summarizer),
            notifier,
        })
    }
}

/// Wire the pipeline components around a store and the collaborators.
///
/// The returned service owns a scheduler that has not been started.
pub fn build_tracker(
    config: &Config,
    store: Arc<dyn StateStore>,
    collaborators: Collaborators,
) -> Arc<TrackerService> {
    let quota = Arc::new(QuotaBudget::new(&config.quota));
    let breaker = Arc::new(CircuitBreaker::new(config.circuit.clone()));

    let poller = ChannelPoller::new(
        Arc::clone(&collaborators.source),
        Arc::clone(&quota),
        RetryPolicy::from(&config.retry.source),
        config.quota.page_cost,
        config.tracker.max_items_per_cycle,
        config.tracker.initial_lookback_hours,
    );
    let summarizer = SummarizerAdapter::new(
        collaborators.summarizer,
        RetryPolicy::from(&config.retry.summarizer),
    );
    let dispatcher = NotificationDispatcher::new(
        Arc::clone(&collaborators.notifier),
        Arc::clone(&store),
        RetryPolicy::from(&config.retry.notifier),
        config.notifier.telegram.max_message_chars,
        config.notifier.telegram.send_thumbnail,
    );

    let orchestrator = Arc::new(ChannelOrchestrator::new(
        Arc::clone(&store),
        Arc::clone(&breaker),
        poller,
        summarizer,
        dispatcher,
    ));
    let scheduler = Arc::new(Scheduler::new(
        config.scheduler.clone(),
        orchestrator,
        Arc::clone(&store),
    ));

    Arc::new(TrackerService::new(
        config.tracker.clone(),
        store,
        collaborators.source,
        collaborators.notifier,
        quota,
        config.quota.page_cost,
        breaker,
        scheduler,
    ))
}
