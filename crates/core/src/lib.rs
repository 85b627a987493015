pub mod circuit;
pub mod config;
pub mod metrics;
pub mod notifier;
pub mod orchestrator;
pub mod poller;
pub mod quota;
pub mod retry;
pub mod scheduler;
pub mod service;
pub mod source;
pub mod store;
pub mod summarizer;
pub mod testing;

pub use circuit::{CircuitBreaker, CircuitConfig, CircuitSnapshot, CircuitState};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use notifier::{
    NotificationDispatcher, Notifier, NotifierBackend, NotifierConfig, NotifierError,
    TelegramNotifier,
};
pub use orchestrator::{
    ChannelOrchestrator, CycleOutcome, CycleReport, OrchestratorError, TrackerConfig,
};
pub use poller::{ChannelPoller, PollBatch, PollError};
pub use quota::{QuotaBudget, QuotaConfig, QuotaExceeded, QuotaStatus};
pub use retry::{RetryConfig, RetryPolicy};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerError, SchedulerStatus};
pub use service::{
    AddChannelRequest, ChannelStatus, DependencyCheck, HealthReport, ServiceError,
    TrackerOverview, TrackerService,
};
pub use source::{ContentSource, SourceBackend, SourceConfig, SourceError, YouTubeSource};
pub use store::{
    Channel, ChannelFilter, ChannelHealth, Item, ItemStatus, NotificationReceipt,
    SqliteStateStore, StateStore, StoreError,
};
pub use summarizer::{LlmProvider, LlmSummarizer, Summarizer, SummarizerAdapter, SummarizerConfig};
