//! Mock notifier for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::notifier::{Notifier, NotifierError};

/// A chunk the mock accepted.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub endpoint_id: String,
    pub text: String,
    pub thumbnail: Option<String>,
    pub message_id: String,
}

/// Mock implementation of the Notifier trait.
///
/// Failures can be injected for a specific call number (once), for an
/// endpoint, or for any chunk containing a given text (until cleared).
pub struct MockNotifier {
    sent: Arc<RwLock<Vec<SentMessage>>>,
    attempts: Arc<RwLock<usize>>,
    call_failures: Arc<RwLock<HashMap<usize, NotifierError>>>,
    endpoint_failures: Arc<RwLock<HashMap<String, NotifierError>>>,
    text_failures: Arc<RwLock<Vec<(String, NotifierError)>>>,
    check_failure: Arc<RwLock<Option<NotifierError>>>,
}

impl Default for MockNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNotifier {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(RwLock::new(Vec::new())),
            attempts: Arc::new(RwLock::new(0)),
            call_failures: Arc::new(RwLock::new(HashMap::new())),
            endpoint_failures: Arc::new(RwLock::new(HashMap::new())),
            text_failures: Arc::new(RwLock::new(Vec::new())),
            check_failure: Arc::new(RwLock::new(None)),
        }
    }

    /// Fail the `n`th send call (1-based) once.
    pub async fn fail_at_call(&self, n: usize, error: NotifierError) {
        self.call_failures.write().await.insert(n, error);
    }

    pub async fn fail_endpoint(&self, endpoint_id: &str, error: NotifierError) {
        self.endpoint_failures
            .write()
            .await
            .insert(endpoint_id.to_string(), error);
    }

    /// Fail every chunk containing `needle`.
    pub async fn fail_matching(&self, needle: &str, error: NotifierError) {
        self.text_failures
            .write()
            .await
            .push((needle.to_string(), error));
    }

    /// Make `check` fail until cleared.
    pub async fn fail_check(&self, error: NotifierError) {
        *self.check_failure.write().await = Some(error);
    }

    pub async fn clear_failures(&self) {
        self.call_failures.write().await.clear();
        self.endpoint_failures.write().await.clear();
        self.text_failures.write().await.clear();
        *self.check_failure.write().await = None;
    }

    /// Chunks delivered, in order.
    pub async fn sent(&self) -> Vec<SentMessage> {
        self.sent.read().await.clone()
    }

    /// Send calls made, failed ones included.
    pub async fn attempts(&self) -> usize {
        *self.attempts.read().await
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(
        &self,
        endpoint_id: &str,
        chunk: &str,
        thumbnail: Option<&str>,
    ) -> Result<String, NotifierError> {
        let call = {
            let mut attempts = self.attempts.write().await;
            *attempts += 1;
            *attempts
        };

        if let Some(error) = self.call_failures.write().await.remove(&call) {
            return Err(error);
        }
        if let Some(error) = self.endpoint_failures.read().await.get(endpoint_id) {
            return Err(error.clone());
        }
        if let Some((_, error)) = self
            .text_failures
            .read()
            .await
            .iter()
            .find(|(needle, _)| chunk.contains(needle.as_str()))
        {
            return Err(error.clone());
        }

        let message_id = format!("msg-{}", call);
        self.sent.write().await.push(SentMessage {
            endpoint_id: endpoint_id.to_string(),
            text: chunk.to_string(),
            thumbnail: thumbnail.map(str::to_string),
            message_id: message_id.clone(),
        });
        Ok(message_id)
    }

    async fn check(&self) -> Result<String, NotifierError> {
        match self.check_failure.read().await.clone() {
            Some(error) => Err(error),
            None => Ok("mock-bot".to_string()),
        }
    }
}
