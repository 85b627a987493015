//! Bounded retries with exponential backoff for pipeline stages.
//!
//! Every stage attempt reports an [`Attempt`]; [`run_stage`] drives attempts
//! under a [`RetryPolicy`] and hands the orchestrator a [`StageOutcome`].

use std::future::Future;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;
use tracing::{error, warn};

/// Retry settings for one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Timeout applied to each attempt independently.
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_attempt_timeout() -> u64 {
    30
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            attempt_timeout_secs: default_attempt_timeout(),
        }
    }
}

/// Retry settings per external collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub source: RetrySettings,
    #[serde(default)]
    pub summarizer: RetrySettings,
    #[serde(default)]
    pub notifier: RetrySettings,
}

/// Runtime form of [`RetrySettings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub attempt_timeout: Duration,
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            attempt_timeout: Duration::from_secs(settings.attempt_timeout_secs),
        }
    }
}

impl RetryPolicy {
    /// Upper bound of the delay after the `attempt`-th failure (1-based).
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Jittered delay in `[ceiling / 2, ceiling]`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter: f64 = rand::rng().random_range(0.5..=1.0);
        self.ceiling(attempt).mul_f64(jitter)
    }
}

/// Result of a single stage attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt<T> {
    Success(T),
    /// Worth retrying; `retry_after` is a lower bound hinted by the provider.
    Retryable {
        reason: String,
        retry_after: Option<Duration>,
    },
    /// Retrying cannot help.
    Terminal(String),
}

impl<T> Attempt<T> {
    pub fn retryable(reason: impl Into<String>) -> Self {
        Attempt::Retryable {
            reason: reason.into(),
            retry_after: None,
        }
    }
}

/// Final result of a stage after all attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    Completed { value: T, attempts: u32 },
    Exhausted { attempts: u32, last_error: String },
    Terminal { attempts: u32, reason: String },
}

impl<T> StageOutcome<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            StageOutcome::Completed { attempts, .. }
            | StageOutcome::Exhausted { attempts, .. }
            | StageOutcome::Terminal { attempts, .. } => *attempts,
        }
    }

    /// Failure reason for outcomes that did not complete.
    pub fn error(&self) -> Option<&str> {
        match self {
            StageOutcome::Completed { .. } => None,
            StageOutcome::Exhausted { last_error, .. } => Some(last_error),
            StageOutcome::Terminal { reason, .. } => Some(reason),
        }
    }
}

/// Run `attempt` until it succeeds, fails terminally, or the policy's
/// attempt budget is spent. An attempt that exceeds the per-attempt timeout
/// counts as retryable.
pub async fn run_stage<T, F, Fut>(stage: &str, policy: &RetryPolicy, mut attempt: F) -> StageOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();

    for n in 1..=max_attempts {
        let result = match tokio::time::timeout(policy.attempt_timeout, attempt(n)).await {
            Ok(result) => result,
            Err(_) => Attempt::retryable(format!(
                "attempt timed out after {}s",
                policy.attempt_timeout.as_secs_f32()
            )),
        };

        match result {
            Attempt::Success(value) => {
                return StageOutcome::Completed { value, attempts: n };
            }
            Attempt::Terminal(reason) => {
                warn!(stage = stage, attempt = n, error = %reason, "Stage failed permanently");
                return StageOutcome::Terminal { attempts: n, reason };
            }
            Attempt::Retryable {
                reason,
                retry_after,
            } => {
                if n < max_attempts {
                    let mut delay = policy.delay_for(n);
                    if let Some(hint) = retry_after {
                        delay = delay.max(hint.min(policy.max_delay));
                    }
                    warn!(
                        stage = stage,
                        attempt = n,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %reason,
                        "Stage attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                last_error = reason;
            }
        }
    }

    error!(stage = stage, attempts = max_attempts, error = %last_error, "Stage retries exhausted");
    StageOutcome::Exhausted {
        attempts: max_attempts,
        last_error,
    }
}
