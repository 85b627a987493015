use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::{format_message, split_message, Notifier, NotifierError};
use crate::metrics;
use crate::retry::{run_stage, Attempt, RetryPolicy, StageOutcome};
use crate::store::{Channel, Item, NewReceipt, NotificationReceipt, StateStore, StoreError};

/// Errors from delivering an item.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Delivery gave up; a failed receipt has been recorded.
    #[error("delivery failed after {attempts} attempt(s), {chunks_sent}/{chunks_total} chunk(s) sent: {reason}")]
    Failed {
        attempts: u32,
        chunks_sent: u32,
        chunks_total: u32,
        reason: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Formats, splits and delivers item notifications.
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn StateStore>,
    retry: RetryPolicy,
    max_message_chars: usize,
    send_thumbnail: bool,
}

impl NotificationDispatcher {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn StateStore>,
        retry: RetryPolicy,
        max_message_chars: usize,
        send_thumbnail: bool,
    ) -> Self {
        Self {
            notifier,
            store,
            retry,
            max_message_chars,
            send_thumbnail,
        }
    }

    /// Deliver an item to its channel's endpoint and record the receipt.
    ///
    /// Chunks go out in order. A retry resumes at the first chunk that has
    /// not been sent. The success receipt is written only after every chunk
    /// went through; on failure a receipt with `success = false` is written
    /// instead.
    pub async fn deliver(
        &self,
        item: &Item,
        channel: &Channel,
    ) -> Result<NotificationReceipt, DispatchError> {
        let body = format_message(item);
        let chunks = split_message(&body, self.max_message_chars);
        let thumbnail = if self.send_thumbnail {
            item.thumbnail_url.as_deref()
        } else {
            None
        };

        debug!(
            channel_id = %channel.id,
            item_id = %item.id,
            chunks = chunks.len(),
            "Delivering notification"
        );

        let next = AtomicUsize::new(0);
        let first_message_id: Mutex<Option<String>> = Mutex::new(None);
        let notifier = &self.notifier;
        let endpoint_id = channel.endpoint_id.as_str();
        let chunks_ref = &chunks;
        let next_ref = &next;
        let first_ref = &first_message_id;

        let outcome = run_stage("notifier", &self.retry, |_| async move {
            while let Some(chunk) = chunks_ref.get(next_ref.load(Ordering::SeqCst)) {
                let index = next_ref.load(Ordering::SeqCst);
                let thumb = if index == 0 { thumbnail } else { None };
                match notifier.send(endpoint_id, chunk, thumb).await {
                    Ok(message_id) => {
                        metrics::MESSAGE_CHUNKS_SENT.inc();
                        if index == 0 {
                            *first_ref.lock().unwrap_or_else(|e| e.into_inner()) =
                                Some(message_id);
                        }
                        next_ref.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(NotifierError::Permanent(reason)) => return Attempt::Terminal(reason),
                    Err(NotifierError::RateLimited { retry_after }) => {
                        return Attempt::Retryable {
                            reason: format!("rate limited at chunk {}", index + 1),
                            retry_after: Some(retry_after),
                        }
                    }
                    Err(NotifierError::Transient(reason)) => {
                        return Attempt::retryable(format!("chunk {}: {}", index + 1, reason))
                    }
                }
            }
            Attempt::Success(())
        })
        .await;

        let chunks_sent = next.load(Ordering::SeqCst) as u32;
        let chunks_total = chunks.len() as u32;
        let provider_message_id = first_message_id
            .into_inner()
            .unwrap_or_else(|e| e.into_inner());

        let (attempts, error) = match outcome {
            StageOutcome::Completed { attempts, .. } => (attempts, None),
            StageOutcome::Exhausted {
                attempts,
                last_error,
            } => (attempts, Some(last_error)),
            StageOutcome::Terminal { attempts, reason } => (attempts, Some(reason)),
        };

        let receipt = self.store.record_receipt(NewReceipt {
            channel_id: channel.id.clone(),
            item_id: item.id.clone(),
            endpoint_id: channel.endpoint_id.clone(),
            provider_message_id,
            chunks_sent,
            success: error.is_none(),
            error: error.clone(),
        })?;

        match error {
            None => {
                metrics::NOTIFICATIONS_TOTAL
                    .with_label_values(&["delivered"])
                    .inc();
                info!(
                    channel_id = %channel.id,
                    item_id = %item.id,
                    chunks = chunks_total,
                    attempts = attempts,
                    "Notification delivered"
                );
                Ok(receipt)
            }
            Some(reason) => {
                metrics::NOTIFICATIONS_TOTAL.with_label_values(&["failed"]).inc();
                warn!(
                    channel_id = %channel.id,
                    item_id = %item.id,
                    chunks_sent = chunks_sent,
                    chunks_total = chunks_total,
                    error = %reason,
                    "Notification failed"
                );
                Err(DispatchError::Failed {
                    attempts,
                    chunks_sent,
                    chunks_total,
                    reason,
                })
            }
        }
    }
}
