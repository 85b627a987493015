//! Operator-facing channel management.
//!
//! Thin calls into the store and scheduler; no pipeline logic lives here.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::circuit::CircuitBreaker;
use crate::notifier::Notifier;
use crate::orchestrator::{CycleReport, OrchestratorError, TrackerConfig};
use crate::quota::{QuotaBudget, QuotaExceeded, QuotaStatus};
use crate::scheduler::{ChannelTimerStatus, Scheduler, SchedulerError, SchedulerStatus};
use crate::source::{ContentSource, SourceError};
use crate::store::{
    Channel, ChannelFilter, ChannelHealth, ChannelStats, NewChannel, ResetSummary, StateStore,
    StoreError,
};

/// Errors returned by [`TrackerService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    #[error("channel is deactivated: {0}")]
    ChannelInactive(String),

    #[error("channel is already tracked: {0}")]
    AlreadyTracked(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Quota(#[from] QuotaExceeded),

    #[error("content source error: {0}")]
    Source(#[from] SourceError),

    #[error("scheduler error: {0}")]
    Scheduler(SchedulerError),

    #[error("state store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ChannelNotFound(id) => ServiceError::ChannelNotFound(id),
            other => ServiceError::Store(other),
        }
    }
}

impl From<SchedulerError> for ServiceError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::Cycle(OrchestratorError::ChannelNotFound(id)) => {
                ServiceError::ChannelNotFound(id)
            }
            SchedulerError::Cycle(OrchestratorError::ChannelInactive(id)) => {
                ServiceError::ChannelInactive(id)
            }
            SchedulerError::Cycle(OrchestratorError::Store(e)) => e.into(),
            other => ServiceError::Scheduler(other),
        }
    }
}

/// Request to start tracking a channel.
#[derive(Debug, Clone, Deserialize)]
pub struct AddChannelRequest {
    pub channel_id: String,
    #[serde(default)]
    pub endpoint_id: Option<String>,
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
}

/// A channel with its statistics and timer state.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelStatus {
    #[serde(flatten)]
    pub channel: Channel,
    pub health: ChannelHealth,
    pub stats: ChannelStats,
    pub timer: Option<ChannelTimerStatus>,
}

/// Process-wide tracker status.
#[derive(Debug, Clone, Serialize)]
pub struct TrackerOverview {
    pub channels_total: usize,
    pub channels_active: usize,
    pub channels_circuit_open: usize,
    pub channels_deactivated: usize,
    pub scheduler: SchedulerStatus,
    pub quota: QuotaStatus,
}

/// Bound on the notifier credentials check.
const NOTIFIER_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of checking one dependency.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyCheck {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl DependencyCheck {
    fn passed(detail: Option<String>) -> Self {
        Self { ok: true, detail }
    }

    fn failed(detail: String) -> Self {
        Self {
            ok: false,
            detail: Some(detail),
        }
    }
}

/// Health of the tracker and the services it depends on.
///
/// `healthy` only considers the store, the notifier and the scheduler.
/// Exhausted quota and open circuits are listed in `issues` without
/// making the tracker unhealthy.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub database: DependencyCheck,
    pub notifier: DependencyCheck,
    pub scheduler_running: bool,
    pub quota: QuotaStatus,
    pub channels_circuit_open: usize,
    pub issues: Vec<String>,
}

/// Channel management for operator tooling.
pub struct TrackerService {
    tracker: TrackerConfig,
    store: Arc<dyn StateStore>,
    source: Arc<dyn ContentSource>,
    notifier: Arc<dyn Notifier>,
    quota: Arc<QuotaBudget>,
    page_cost: u64,
    breaker: Arc<CircuitBreaker>,
    scheduler: Arc<Scheduler>,
}

impl TrackerService {
    pub fn new(
        tracker: TrackerConfig,
        store: Arc<dyn StateStore>,
        source: Arc<dyn ContentSource>,
        notifier: Arc<dyn Notifier>,
        quota: Arc<QuotaBudget>,
        page_cost: u64,
        breaker: Arc<CircuitBreaker>,
        scheduler: Arc<Scheduler>,
    ) -> Self {
        Self {
            tracker,
            store,
            source,
            notifier,
            quota,
            page_cost,
            breaker,
            scheduler,
        }
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Start tracking a channel, or reactivate a deactivated one.
    ///
    /// The display name is looked up at the source, which costs quota.
    pub async fn add_channel(&self, request: AddChannelRequest) -> Result<Channel, ServiceError> {
        let channel_id = request.channel_id.trim().to_string();
        if channel_id.is_empty() {
            return Err(ServiceError::InvalidRequest(
                "channel_id must not be empty".to_string(),
            ));
        }

        let interval = request
            .poll_interval_secs
            .unwrap_or(self.tracker.default_poll_interval_secs);
        self.check_interval(interval)?;

        let endpoint_id = request
            .endpoint_id
            .filter(|e| !e.trim().is_empty())
            .or_else(|| self.tracker.default_endpoint.clone())
            .ok_or_else(|| {
                ServiceError::InvalidRequest(
                    "endpoint_id is required when no default endpoint is configured".to_string(),
                )
            })?;

        if let Some(existing) = self.store.get_channel(&channel_id)? {
            if existing.active {
                return Err(ServiceError::AlreadyTracked(channel_id));
            }
        }

        self.quota.try_consume(self.page_cost)?;
        let name = self.source.get_channel_meta(&channel_id).await?;

        let channel = self.store.add_channel(NewChannel {
            id: channel_id,
            name,
            poll_interval_secs: interval,
            endpoint_id,
        })?;

        self.breaker.forget(&channel.id);
        let scheduled = self.scheduler.schedule(&channel);

        info!(
            channel_id = %channel.id,
            name = %channel.name,
            interval_secs = channel.poll_interval_secs,
            scheduled = scheduled,
            "Channel tracked"
        );
        Ok(channel)
    }

    /// Stop tracking a channel. History is kept.
    pub fn remove_channel(&self, channel_id: &str) -> Result<Channel, ServiceError> {
        let channel = self
            .store
            .deactivate_channel(channel_id, Some("removed by operator"))?;
        self.scheduler.cancel(channel_id);
        self.breaker.forget(channel_id);

        info!(channel_id = %channel_id, "Channel deactivated by operator");
        Ok(channel)
    }

    /// Run a cycle now, even if the channel's circuit is open.
    pub async fn check_now(&self, channel_id: &str) -> Result<CycleReport, ServiceError> {
        let channel = self.require_channel(channel_id)?;
        if !channel.active {
            return Err(ServiceError::ChannelInactive(channel.id));
        }
        Ok(self.scheduler.check_now(channel_id).await?)
    }

    pub fn set_interval(&self, channel_id: &str, interval_secs: u64) -> Result<Channel, ServiceError> {
        self.check_interval(interval_secs)?;
        let channel = self.store.set_poll_interval(channel_id, interval_secs)?;
        self.scheduler.reschedule(channel_id, interval_secs);

        info!(channel_id = %channel_id, interval_secs = interval_secs, "Poll interval changed");
        Ok(channel)
    }

    /// Clear a channel's item history and watermark.
    ///
    /// With `keep_receipts` the successful receipts still guard against
    /// notifying an item a second time.
    pub fn reset_history(
        &self,
        channel_id: &str,
        keep_receipts: bool,
    ) -> Result<ResetSummary, ServiceError> {
        let summary = self.store.reset_history(channel_id, keep_receipts)?;
        info!(
            channel_id = %channel_id,
            items_deleted = summary.items_deleted,
            receipts_deleted = summary.receipts_deleted,
            "Channel history reset"
        );
        Ok(summary)
    }

    pub fn channel_status(&self, channel_id: &str) -> Result<ChannelStatus, ServiceError> {
        let channel = self.require_channel(channel_id)?;
        self.status_for(channel)
    }

    pub fn list_channels(&self, filter: &ChannelFilter) -> Result<Vec<ChannelStatus>, ServiceError> {
        self.store
            .list_channels(filter)?
            .into_iter()
            .map(|channel| self.status_for(channel))
            .collect()
    }

    pub fn overview(&self) -> Result<TrackerOverview, ServiceError> {
        let channels = self.store.list_channels(&ChannelFilter::new())?;
        let count = |health: ChannelHealth| channels.iter().filter(|c| c.health() == health).count();

        Ok(TrackerOverview {
            channels_total: channels.len(),
            channels_active: count(ChannelHealth::Active),
            channels_circuit_open: count(ChannelHealth::CircuitOpen),
            channels_deactivated: count(ChannelHealth::Deactivated),
            scheduler: self.scheduler.status(),
            quota: self.quota.status(),
        })
    }

    /// Check the store, the notifier credentials, the scheduler and quota.
    pub async fn health(&self) -> HealthReport {
        let mut issues = Vec::new();

        let database = match self.store.ping() {
            Ok(()) => DependencyCheck::passed(None),
            Err(e) => {
                issues.push(format!("database unavailable: {}", e));
                DependencyCheck::failed(e.to_string())
            }
        };

        let notifier = match timeout(NOTIFIER_CHECK_TIMEOUT, self.notifier.check()).await {
            Ok(Ok(account)) => DependencyCheck::passed(Some(account)),
            Ok(Err(e)) => {
                issues.push(format!("notifier unavailable: {}", e));
                DependencyCheck::failed(e.to_string())
            }
            Err(_) => {
                issues.push("notifier check timed out".to_string());
                DependencyCheck::failed("timed out".to_string())
            }
        };

        let scheduler_running = self.scheduler.status().running;
        if !scheduler_running {
            issues.push("scheduler not running".to_string());
        }

        let quota = self.quota.status();
        if quota.remaining < self.page_cost {
            issues.push(format!(
                "source quota exhausted, resets in {}s",
                quota.resets_in_secs
            ));
        }

        let channels_circuit_open = self
            .store
            .list_channels(&ChannelFilter::new())
            .map(|channels| {
                channels
                    .iter()
                    .filter(|c| c.health() == ChannelHealth::CircuitOpen)
                    .count()
            })
            .unwrap_or(0);
        if channels_circuit_open > 0 {
            issues.push(format!(
                "{} channel(s) paused by the circuit breaker",
                channels_circuit_open
            ));
        }

        let healthy = database.ok && notifier.ok && scheduler_running;
        if !healthy {
            warn!(issues = ?issues, "Health check failed");
        }

        HealthReport {
            healthy,
            database,
            notifier,
            scheduler_running,
            quota,
            channels_circuit_open,
            issues,
        }
    }

    fn require_channel(&self, channel_id: &str) -> Result<Channel, ServiceError> {
        self.store
            .get_channel(channel_id)?
            .ok_or_else(|| ServiceError::ChannelNotFound(channel_id.to_string()))
    }

    fn status_for(&self, channel: Channel) -> Result<ChannelStatus, ServiceError> {
        let stats = self.store.channel_stats(&channel.id)?;
        let timer = self
            .scheduler
            .status()
            .channels
            .into_iter()
            .find(|t| t.channel_id == channel.id);

        Ok(ChannelStatus {
            health: channel.health(),
            channel,
            stats,
            timer,
        })
    }

    fn check_interval(&self, secs: u64) -> Result<(), ServiceError> {
        if self.tracker.interval_in_range(secs) {
            Ok(())
        } else {
            Err(ServiceError::InvalidRequest(format!(
                "poll interval {}s outside [{}, {}]",
                secs, self.tracker.min_poll_interval_secs, self.tracker.max_poll_interval_secs
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::NotifierError;
    use crate::scheduler::SchedulerConfig;
    use crate::testing::{fixtures, TestPipeline};

    struct Harness {
        pipeline: TestPipeline,
        service: TrackerService,
    }

    fn harness(quota_limit: u64) -> Harness {
        let pipeline = TestPipeline::builder().quota_limit(quota_limit).build();
        let scheduler = Arc::new(Scheduler::new(
            SchedulerConfig {
                worker_pool_size: 2,
                jitter_max_ms: 0,
            },
            pipeline.orchestrator.clone(),
            pipeline.store.clone(),
        ));
        let service = TrackerService::new(
            pipeline.tracker.clone(),
            pipeline.store.clone(),
            pipeline.source.clone(),
            pipeline.notifier.clone(),
            pipeline.quota.clone(),
            1,
            pipeline.breaker.clone(),
            scheduler,
        );
        Harness { pipeline, service }
    }

    fn request(id: &str) -> AddChannelRequest {
        AddChannelRequest {
            channel_id: id.to_string(),
            endpoint_id: None,
            poll_interval_secs: None,
        }
    }

    #[tokio::test]
    async fn test_add_channel_resolves_name_and_defaults() {
        let h = harness(100);
        h.pipeline.source.set_channel_name("UC1", "Rust Talks").await;

        let channel = h.service.add_channel(request("UC1")).await.unwrap();
        assert_eq!(channel.name, "Rust Talks");
        assert_eq!(channel.endpoint_id, fixtures::ENDPOINT);
        assert_eq!(channel.poll_interval_secs, 3600);
        assert_eq!(h.pipeline.quota.status().used, 1);
    }

    #[tokio::test]
    async fn test_add_channel_rejects_out_of_range_interval() {
        let h = harness(100);
        let mut req = request("UC1");
        req.poll_interval_secs = Some(10);

        let result = h.service.add_channel(req).await;
        assert!(matches!(result, Err(ServiceError::InvalidRequest(_))));
        assert!(h.pipeline.channel("UC1").is_none());
    }

    #[tokio::test]
    async fn test_add_unknown_channel_fails() {
        let h = harness(100);
        let result = h.service.add_channel(request("missing")).await;
        assert!(matches!(
            result,
            Err(ServiceError::Source(SourceError::ChannelNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_add_channel_without_quota_is_refused() {
        let h = harness(0);
        h.pipeline.source.set_channel_name("UC1", "Rust Talks").await;
        let result = h.service.add_channel(request("UC1")).await;
        assert!(matches!(result, Err(ServiceError::Quota(_))));
    }

    #[tokio::test]
    async fn test_add_tracked_channel_conflicts_and_reactivates_after_removal() {
        let h = harness(100);
        h.pipeline.source.set_channel_name("UC1", "Rust Talks").await;
        h.service.add_channel(request("UC1")).await.unwrap();

        assert!(matches!(
            h.service.add_channel(request("UC1")).await,
            Err(ServiceError::AlreadyTracked(_))
        ));

        let removed = h.service.remove_channel("UC1").unwrap();
        assert!(!removed.active);
        assert_eq!(
            h.service.channel_status("UC1").unwrap().health,
            ChannelHealth::Deactivated
        );

        let readded = h.service.add_channel(request("UC1")).await.unwrap();
        assert!(readded.active);
    }

    #[tokio::test]
    async fn test_check_now_runs_cycle() {
        let h = harness(100);
        h.pipeline.add_channel("UC1").unwrap();
        h.pipeline
            .source
            .set_items("UC1", vec![fixtures::candidate("UC1", "v1", 1)])
            .await;

        let report = h.service.check_now("UC1").await.unwrap();
        assert_eq!(report.items_notified, 1);

        h.service.remove_channel("UC1").unwrap();
        assert!(matches!(
            h.service.check_now("UC1").await,
            Err(ServiceError::ChannelInactive(_))
        ));
        assert!(matches!(
            h.service.check_now("nope").await,
            Err(ServiceError::ChannelNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_set_interval_validates_and_persists() {
        let h = harness(100);
        h.pipeline.add_channel("UC1").unwrap();

        assert!(matches!(
            h.service.set_interval("UC1", 1),
            Err(ServiceError::InvalidRequest(_))
        ));
        let channel = h.service.set_interval("UC1", 600).unwrap();
        assert_eq!(channel.poll_interval_secs, 600);
        assert!(matches!(
            h.service.set_interval("nope", 600),
            Err(ServiceError::ChannelNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reset_history_keeping_receipts_prevents_resend() {
        let h = harness(100);
        h.pipeline.add_channel("UC1").unwrap();
        h.pipeline
            .source
            .set_items("UC1", vec![fixtures::candidate("UC1", "v1", 1)])
            .await;
        h.service.check_now("UC1").await.unwrap();

        let summary = h.service.reset_history("UC1", true).unwrap();
        assert_eq!(summary.items_deleted, 1);
        assert_eq!(summary.receipts_deleted, 0);
        assert!(h.pipeline.channel("UC1").unwrap().watermark.is_none());

        h.service.check_now("UC1").await.unwrap();
        assert_eq!(h.pipeline.notifier.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn test_status_and_overview() {
        let h = harness(100);
        h.pipeline.add_channel("UC1").unwrap();
        h.pipeline.add_channel("UC2").unwrap();
        h.service.remove_channel("UC2").unwrap();

        let listed = h.service.list_channels(&ChannelFilter::new()).unwrap();
        assert_eq!(listed.len(), 2);

        let overview = h.service.overview().unwrap();
        assert_eq!(overview.channels_total, 2);
        assert_eq!(overview.channels_active, 1);
        assert_eq!(overview.channels_deactivated, 1);
        assert!(!overview.scheduler.running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_added_channel_is_scheduled_when_running() {
        let h = harness(100);
        h.service.scheduler().start().await.unwrap();
        h.pipeline.source.set_channel_name("UC1", "Rust Talks").await;

        h.service.add_channel(request("UC1")).await.unwrap();
        assert!(h.service.scheduler().is_scheduled("UC1"));
        assert!(h.service.channel_status("UC1").unwrap().timer.is_some());

        h.service.remove_channel("UC1").unwrap();
        assert!(!h.service.scheduler().is_scheduled("UC1"));
        h.service.scheduler().stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_checks_dependencies() {
        let h = harness(100);

        let report = h.service.health().await;
        assert!(!report.healthy);
        assert!(report.database.ok);
        assert_eq!(report.notifier.detail.as_deref(), Some("mock-bot"));
        assert!(report.issues.iter().any(|i| i == "scheduler not running"));

        h.service.scheduler().start().await.unwrap();
        let report = h.service.health().await;
        assert!(report.healthy);
        assert!(report.issues.is_empty());

        h.pipeline
            .notifier
            .fail_check(NotifierError::Permanent("Unauthorized".to_string()))
            .await;
        let report = h.service.health().await;
        assert!(!report.healthy);
        assert!(!report.notifier.ok);
        assert!(report.issues.iter().any(|i| i.contains("Unauthorized")));
        h.service.scheduler().stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_quota_is_reported_without_failing_health() {
        let h = harness(0);
        h.service.scheduler().start().await.unwrap();

        let report = h.service.health().await;
        assert!(report.healthy);
        assert_eq!(report.quota.remaining, 0);
        assert!(report.issues.iter().any(|i| i.contains("quota exhausted")));
        h.service.scheduler().stop().await;
    }
}
