//! Channel cycle driver.
//!
//! One cycle: consult the circuit breaker, finish items an interrupted cycle
//! left in flight, poll, then take each candidate through
//! summarize -> notify -> commit before starting the next. The receipt
//! written by the dispatcher is checked before any send, so an item whose
//! delivery was recorded is committed without being sent again.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::circuit::{CircuitBreaker, CircuitState};
use crate::metrics;
use crate::notifier::{DispatchError, NotificationDispatcher};
use crate::poller::{ChannelPoller, PollError};
use crate::retry::StageOutcome;
use crate::store::{Channel, Item, ItemFilter, ItemStatus, StateStore, StoreError};
use crate::summarizer::SummarizerAdapter;

use super::types::{CycleOutcome, CycleReport, OrchestratorError};

/// How an item left the pipeline.
struct ItemResult {
    status: ItemStatus,
    /// Delivery had already been recorded; only the commit was missing.
    recovered: bool,
    reason: Option<String>,
}

/// Drives polling cycles for channels.
pub struct ChannelOrchestrator {
    store: Arc<dyn StateStore>,
    breaker: Arc<CircuitBreaker>,
    poller: ChannelPoller,
    summarizer: SummarizerAdapter,
    dispatcher: NotificationDispatcher,
}

impl ChannelOrchestrator {
    pub fn new(
        store: Arc<dyn StateStore>,
        breaker: Arc<CircuitBreaker>,
        poller: ChannelPoller,
        summarizer: SummarizerAdapter,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            store,
            breaker,
            poller,
            summarizer,
            dispatcher,
        }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Run one cycle for a channel.
    ///
    /// `force` runs the cycle even while the circuit is open. Errors are
    /// returned only when the cycle had to be aborted; everything a
    /// collaborator can throw is folded into the report.
    pub async fn run_cycle(
        &self,
        channel_id: &str,
        force: bool,
    ) -> Result<CycleReport, OrchestratorError> {
        let started = Instant::now();
        let mut report = CycleReport::new(channel_id, Utc::now());

        let result = self.drive(channel_id, force, &mut report).await;

        let label = match &result {
            Ok(()) => report.outcome.as_str(),
            Err(_) => "aborted",
        };
        metrics::CYCLES_TOTAL.with_label_values(&[label]).inc();
        metrics::CYCLE_DURATION
            .with_label_values(&[label])
            .observe(started.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                report.finished_at = Utc::now();
                debug!(
                    channel_id = %channel_id,
                    outcome = report.outcome.as_str(),
                    notified = report.items_notified,
                    failed = report.items_failed,
                    "Cycle finished"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(channel_id = %channel_id, error = %e, "Cycle aborted");
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        channel_id: &str,
        force: bool,
        report: &mut CycleReport,
    ) -> Result<(), OrchestratorError> {
        let mut channel = self
            .store
            .get_channel(channel_id)?
            .ok_or_else(|| OrchestratorError::ChannelNotFound(channel_id.to_string()))?;
        if !channel.active {
            return Err(OrchestratorError::ChannelInactive(channel_id.to_string()));
        }

        self.breaker.hydrate(channel_id, &channel.circuit);
        if !self.breaker.allow(channel_id) && !force {
            debug!(channel_id = %channel_id, "Circuit open, skipping cycle");
            report.outcome = CycleOutcome::CircuitOpen;
            report.circuit = self.breaker.snapshot(channel_id).state;
            return Ok(());
        }

        let result = self.process_channel(&mut channel, report).await;
        if result.is_err() {
            self.breaker.release_trial(channel_id);
        }
        result.map_err(OrchestratorError::from)
    }

    async fn process_channel(
        &self,
        channel: &mut Channel,
        report: &mut CycleReport,
    ) -> Result<(), StoreError> {
        let channel_id = channel.id.clone();

        let pending = self
            .store
            .list_items(&ItemFilter::new().for_channel(&channel_id).in_flight())?;
        if !pending.is_empty() {
            info!(
                channel_id = %channel_id,
                items = pending.len(),
                "Resuming items left in flight"
            );
        }
        for item in pending {
            self.handle_item(channel, item, report).await?;
        }

        let batch = match self.poller.fetch(channel).await {
            Ok(batch) => batch,
            Err(PollError::QuotaExceeded(e)) => {
                info!(channel_id = %channel_id, "Cycle deferred: {}", e);
                self.breaker.release_trial(&channel_id);
                self.store.record_check(&channel_id, Utc::now())?;
                report.outcome = CycleOutcome::Deferred;
                report.circuit = self.breaker.snapshot(&channel_id).state;
                report.error = Some(e.to_string());
                return Ok(());
            }
            Err(PollError::ChannelNotFound(_)) => {
                let reason = "channel no longer exists at the source".to_string();
                warn!(channel_id = %channel_id, "Deactivating channel: {}", reason);
                self.store.deactivate_channel(&channel_id, Some(&reason))?;
                self.breaker.forget(&channel_id);
                report.outcome = CycleOutcome::Deactivated;
                report.error = Some(reason);
                return Ok(());
            }
            Err(e @ (PollError::Source { .. } | PollError::Incomplete { .. })) => {
                let reason = e.to_string();
                report.outcome = CycleOutcome::Failed;
                report.error = Some(reason.clone());
                return self.finish(&channel_id, false, Some(&reason), report);
            }
        };

        for candidate in &batch.items {
            let item = self.store.upsert_item(candidate)?;
            self.handle_item(channel, item, report).await?;
        }

        let success = report.items_failed == 0;
        let error = if success {
            None
        } else {
            Some(format!(
                "{} item(s) failed, last: {}",
                report.items_failed,
                report.error.as_deref().unwrap_or("unknown error")
            ))
        };
        report.outcome = if success {
            CycleOutcome::Completed
        } else {
            CycleOutcome::Failed
        };
        report.error = error.clone();

        self.finish(&channel_id, success, error.as_deref(), report)?;
        report.follow_up = batch.capped && report.circuit == CircuitState::Closed;
        Ok(())
    }

    /// Record the cycle outcome with the breaker and persist it.
    fn finish(
        &self,
        channel_id: &str,
        success: bool,
        error: Option<&str>,
        report: &mut CycleReport,
    ) -> Result<(), StoreError> {
        let transition = self.breaker.record_outcome(channel_id, success);
        self.store
            .save_circuit(channel_id, &transition.snapshot, error)?;
        self.store.record_check(channel_id, Utc::now())?;
        report.circuit = transition.snapshot.state;
        Ok(())
    }

    async fn handle_item(
        &self,
        channel: &mut Channel,
        item: Item,
        report: &mut CycleReport,
    ) -> Result<(), StoreError> {
        let Some(result) = self.process_item(channel, item).await? else {
            return Ok(());
        };

        if result.recovered {
            report.items_recovered += 1;
        }
        match result.status {
            ItemStatus::Notified => report.items_notified += 1,
            _ => {
                report.items_failed += 1;
                report.error = result.reason;
            }
        }
        Ok(())
    }

    /// Take one item to a terminal status and advance the watermark to it.
    async fn process_item(
        &self,
        channel: &mut Channel,
        mut item: Item,
    ) -> Result<Option<ItemResult>, StoreError> {
        if item.status.is_terminal() {
            return Ok(None);
        }

        let delivered = self.store.find_successful_receipt(
            &channel.id,
            &item.id,
            &channel.endpoint_id,
        )?;
        if delivered.is_some() {
            info!(
                channel_id = %channel.id,
                item_id = %item.id,
                "Item already delivered, committing without re-sending"
            );
            metrics::NOTIFICATIONS_TOTAL
                .with_label_values(&["already_delivered"])
                .inc();
            let (status, reason) = delivered_status(&item);
            self.commit(channel, &item, status, reason.as_deref())?;
            return Ok(Some(ItemResult {
                status,
                recovered: true,
                reason,
            }));
        }

        if item.status == ItemStatus::Discovered {
            item = match self.summarizer.summarize(&item.title, &item.description).await {
                StageOutcome::Completed { value, .. } => {
                    self.store.set_item_summary(&channel.id, &item.id, &value)?
                }
                outcome => {
                    let reason = format!(
                        "summary unavailable: {}",
                        outcome.error().unwrap_or("unknown error")
                    );
                    warn!(
                        channel_id = %channel.id,
                        item_id = %item.id,
                        "Summarization failed, delivering with placeholder"
                    );
                    self.store
                        .record_summary_failure(&channel.id, &item.id, &reason)?
                }
            };
        }

        let (status, reason) = match self.dispatcher.deliver(&item, channel).await {
            Ok(_) => delivered_status(&item),
            Err(DispatchError::Failed { reason, .. }) => (
                ItemStatus::Failed,
                Some(format!("notification failed: {}", reason)),
            ),
            Err(DispatchError::Store(e)) => return Err(e),
        };

        self.commit(channel, &item, status, reason.as_deref())?;
        Ok(Some(ItemResult {
            status,
            recovered: false,
            reason,
        }))
    }

    fn commit(
        &self,
        channel: &mut Channel,
        item: &Item,
        status: ItemStatus,
        reason: Option<&str>,
    ) -> Result<(), StoreError> {
        *channel = self
            .store
            .commit_item(&channel.id, &item.id, status, reason)?;
        metrics::ITEMS_PROCESSED
            .with_label_values(&[status.as_str()])
            .inc();
        debug!(
            channel_id = %channel.id,
            item_id = %item.id,
            status = status.as_str(),
            "Item committed"
        );
        Ok(())
    }
}

/// Terminal status of a delivered item: `failed` when it went out with the
/// summary placeholder.
fn delivered_status(item: &Item) -> (ItemStatus, Option<String>) {
    match (&item.summary, &item.failure_reason) {
        (None, Some(reason)) => (ItemStatus::Failed, Some(reason.clone())),
        _ => (ItemStatus::Notified, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::{NotifierError, SUMMARY_PLACEHOLDER};
    use crate::source::SourceError;
    use crate::store::NewReceipt;
    use crate::summarizer::SummarizerError;
    use crate::testing::{fixtures, TestPipeline};

    fn harness(max_items: usize, quota_limit: u64) -> TestPipeline {
        let pipeline = TestPipeline::builder()
            .max_items(max_items)
            .quota_limit(quota_limit)
            .failure_threshold(2)
            .build();
        pipeline.add_channel("UC1").unwrap();
        pipeline
    }

    fn status_of(h: &TestPipeline, id: &str) -> ItemStatus {
        h.store.get_item("UC1", id).unwrap().unwrap().status
    }

    #[tokio::test]
    async fn test_cycle_notifies_items_in_publish_order() {
        let h = harness(10, 100);
        h.source
            .set_items(
                "UC1",
                vec![
                    fixtures::candidate("UC1", "v2", 20),
                    fixtures::candidate("UC1", "v1", 10),
                    fixtures::candidate("UC1", "v3", 30),
                ],
            )
            .await;

        let report = h.orchestrator.run_cycle("UC1", false).await.unwrap();
        assert_eq!(report.outcome, CycleOutcome::Completed);
        assert_eq!(report.items_notified, 3);
        assert!(!report.follow_up);

        let sent = h.notifier.sent().await;
        assert_eq!(sent.len(), 3);
        assert!(sent[0].text.contains("Video v1"));
        assert!(sent[1].text.contains("Video v2"));
        assert!(sent[2].text.contains("Video v3"));

        let channel = h.store.get_channel("UC1").unwrap().unwrap();
        assert_eq!(channel.watermark.unwrap().item_id, "v3");
        assert!(channel.last_check.is_some());
        assert_eq!(status_of(&h, "v2"), ItemStatus::Notified);
    }

    #[tokio::test]
    async fn test_summary_failure_delivers_placeholder_and_advances() {
        let h = harness(10, 100);
        h.source
            .set_items("UC1", vec![fixtures::candidate("UC1", "v0", 0)])
            .await;
        h.orchestrator.run_cycle("UC1", false).await.unwrap();

        h.source
            .add_items(
                "UC1",
                vec![
                    fixtures::candidate("UC1", "v1", 1),
                    fixtures::candidate("UC1", "v2", 2),
                    fixtures::candidate("UC1", "v3", 3),
                ],
            )
            .await;
        h.summarizer
            .fail_title("Video v2", SummarizerError::Permanent("refused".to_string()))
            .await;

        let report = h.orchestrator.run_cycle("UC1", false).await.unwrap();
        assert_eq!(report.outcome, CycleOutcome::Failed);
        assert_eq!(report.items_notified, 2);
        assert_eq!(report.items_failed, 1);

        assert_eq!(status_of(&h, "v1"), ItemStatus::Notified);
        assert_eq!(status_of(&h, "v2"), ItemStatus::Failed);
        assert_eq!(status_of(&h, "v3"), ItemStatus::Notified);

        let sent = h.notifier.sent().await;
        let v2 = sent.iter().find(|m| m.text.contains("Video v2")).unwrap();
        assert!(v2.text.contains(SUMMARY_PLACEHOLDER));
        let v3 = sent.iter().find(|m| m.text.contains("Video v3")).unwrap();
        assert!(!v3.text.contains(SUMMARY_PLACEHOLDER));

        let channel = h.store.get_channel("UC1").unwrap().unwrap();
        assert_eq!(channel.watermark.as_ref().unwrap().item_id, "v3");
        assert_eq!(channel.consecutive_failures(), 1);
        assert!(channel
            .last_error
            .as_deref()
            .unwrap()
            .contains("summary unavailable"));
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_block_later_items() {
        let h = harness(10, 100);
        h.source
            .set_items(
                "UC1",
                vec![
                    fixtures::candidate("UC1", "v1", 1),
                    fixtures::candidate("UC1", "v2", 2),
                    fixtures::candidate("UC1", "v3", 3),
                ],
            )
            .await;
        h.notifier
            .fail_matching("Video v2", NotifierError::Permanent("message is too long".to_string()))
            .await;

        let report = h.orchestrator.run_cycle("UC1", false).await.unwrap();
        assert_eq!(report.items_notified, 2);
        assert_eq!(report.items_failed, 1);
        assert_eq!(status_of(&h, "v2"), ItemStatus::Failed);
        assert_eq!(status_of(&h, "v3"), ItemStatus::Notified);

        let receipts = h.store.list_receipts("UC1", "v2").unwrap();
        assert_eq!(receipts.len(), 1);
        assert!(!receipts[0].success);

        let channel = h.store.get_channel("UC1").unwrap().unwrap();
        assert_eq!(channel.watermark.unwrap().item_id, "v3");
    }

    #[tokio::test]
    async fn test_recorded_delivery_is_committed_without_resend() {
        let h = harness(10, 100);
        let candidate = fixtures::candidate("UC1", "v1", 1);
        h.store.upsert_item(&candidate).unwrap();
        h.store
            .record_receipt(NewReceipt {
                channel_id: "UC1".to_string(),
                item_id: "v1".to_string(),
                endpoint_id: fixtures::ENDPOINT.to_string(),
                provider_message_id: Some("msg-earlier".to_string()),
                chunks_sent: 1,
                success: true,
                error: None,
            })
            .unwrap();
        h.source.set_items("UC1", vec![candidate]).await;

        let report = h.orchestrator.run_cycle("UC1", false).await.unwrap();
        assert_eq!(report.items_recovered, 1);
        assert_eq!(report.items_notified, 1);
        assert!(h.notifier.sent().await.is_empty());
        assert!(h.summarizer.calls().await.is_empty());
        assert_eq!(status_of(&h, "v1"), ItemStatus::Notified);
        assert_eq!(h.store.list_receipts("UC1", "v1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_in_flight_item_resumes_with_stored_summary() {
        let h = harness(10, 100);
        h.store
            .upsert_item(&fixtures::candidate("UC1", "v1", 1))
            .unwrap();
        h.store
            .set_item_summary("UC1", "v1", "Stored summary.")
            .unwrap();

        let report = h.orchestrator.run_cycle("UC1", false).await.unwrap();
        assert_eq!(report.items_notified, 1);
        assert!(h.summarizer.calls().await.is_empty());

        let sent = h.notifier.sent().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.contains("Stored summary."));
        assert_eq!(status_of(&h, "v1"), ItemStatus::Notified);
    }

    #[tokio::test]
    async fn test_quota_deferral_is_not_a_failure() {
        let h = harness(10, 0);
        h.source
            .set_items("UC1", vec![fixtures::candidate("UC1", "v1", 1)])
            .await;

        let report = h.orchestrator.run_cycle("UC1", false).await.unwrap();
        assert_eq!(report.outcome, CycleOutcome::Deferred);
        assert!(h.source.list_calls().await.is_empty());

        let channel = h.store.get_channel("UC1").unwrap().unwrap();
        assert_eq!(channel.consecutive_failures(), 0);
        assert!(channel.watermark.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_opens_after_consecutive_failures() {
        let h = harness(10, 100);
        for _ in 0..6 {
            h.source
                .push_error(SourceError::Transient("503".to_string()))
                .await;
        }

        for _ in 0..2 {
            let report = h.orchestrator.run_cycle("UC1", false).await.unwrap();
            assert_eq!(report.outcome, CycleOutcome::Failed);
        }

        let channel = h.store.get_channel("UC1").unwrap().unwrap();
        assert_eq!(channel.circuit.state, CircuitState::Open);
        assert_eq!(channel.consecutive_failures(), 2);
        assert!(channel.last_error.is_some());

        let calls_before = h.source.list_calls().await.len();
        let report = h.orchestrator.run_cycle("UC1", false).await.unwrap();
        assert_eq!(report.outcome, CycleOutcome::CircuitOpen);
        assert_eq!(h.source.list_calls().await.len(), calls_before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_check_runs_while_open_and_closes_on_success() {
        let h = harness(10, 100);
        for _ in 0..6 {
            h.source
                .push_error(SourceError::Transient("503".to_string()))
                .await;
        }
        for _ in 0..2 {
            h.orchestrator.run_cycle("UC1", false).await.unwrap();
        }
        h.source
            .set_items("UC1", vec![fixtures::candidate("UC1", "v1", 1)])
            .await;

        let report = h.orchestrator.run_cycle("UC1", true).await.unwrap();
        assert_eq!(report.outcome, CycleOutcome::Completed);
        assert_eq!(report.circuit, CircuitState::Closed);

        let channel = h.store.get_channel("UC1").unwrap().unwrap();
        assert_eq!(channel.circuit.state, CircuitState::Closed);
        assert!(channel.last_error.is_none());
    }

    #[tokio::test]
    async fn test_missing_channel_is_deactivated() {
        let h = harness(10, 100);
        h.source
            .push_error(SourceError::ChannelNotFound("UC1".to_string()))
            .await;

        let report = h.orchestrator.run_cycle("UC1", false).await.unwrap();
        assert_eq!(report.outcome, CycleOutcome::Deactivated);

        let channel = h.store.get_channel("UC1").unwrap().unwrap();
        assert!(!channel.active);
        assert!(channel.deactivated_reason.is_some());

        let result = h.orchestrator.run_cycle("UC1", false).await;
        assert!(matches!(result, Err(OrchestratorError::ChannelInactive(_))));
    }

    #[tokio::test]
    async fn test_capped_batch_requests_follow_up() {
        let h = harness(2, 100);
        h.source
            .set_items(
                "UC1",
                vec![
                    fixtures::candidate("UC1", "v1", 1),
                    fixtures::candidate("UC1", "v2", 2),
                    fixtures::candidate("UC1", "v3", 3),
                ],
            )
            .await;

        let first = h.orchestrator.run_cycle("UC1", false).await.unwrap();
        assert_eq!(first.items_notified, 2);
        assert!(first.follow_up);

        let second = h.orchestrator.run_cycle("UC1", false).await.unwrap();
        assert_eq!(second.items_notified, 1);
        assert!(!second.follow_up);
        assert_eq!(status_of(&h, "v3"), ItemStatus::Notified);
    }

    #[tokio::test]
    async fn test_unknown_channel() {
        let h = harness(10, 100);
        let result = h.orchestrator.run_cycle("nope", false).await;
        assert!(matches!(result, Err(OrchestratorError::ChannelNotFound(_))));
    }
}
