//! Notification delivery.
//!
//! A `Notifier` sends one message chunk to an endpoint. The
//! `NotificationDispatcher` formats an item into a message, splits it to the
//! endpoint's size limit and delivers the chunks in order with bounded
//! retries, resuming from the first chunk that failed.

mod config;
mod dispatcher;
mod format;
mod split;
mod telegram;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use config::{NotifierBackend, NotifierConfig, TelegramConfig};
pub use dispatcher::{DispatchError, NotificationDispatcher};
pub use format::{format_message, MIN_MESSAGE_CHARS, SUMMARY_PLACEHOLDER};
pub use split::split_message;
pub use telegram::TelegramNotifier;

/// Errors from sending one chunk.
#[derive(Debug, Clone, Error)]
pub enum NotifierError {
    #[error("transient notifier error: {0}")]
    Transient(String),

    /// The endpoint asked us to slow down.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// The endpoint rejected the message; retrying won't help.
    #[error("notifier rejected message: {0}")]
    Permanent(String),
}

/// Sends message chunks to a messaging endpoint.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send one chunk, returning the provider's message id.
    async fn send(
        &self,
        endpoint_id: &str,
        chunk: &str,
        thumbnail: Option<&str>,
    ) -> Result<String, NotifierError>;

    /// Confirm the credentials are accepted, returning the account name.
    async fn check(&self) -> Result<String, NotifierError>;
}
