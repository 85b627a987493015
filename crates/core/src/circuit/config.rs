//! Circuit breaker configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the per-channel circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitConfig {
    /// Consecutive failed cycles before a channel's circuit opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Cooldown after the first opening (seconds).
    /// Doubles on every reopening from half-open.
    #[serde(default = "default_base_cooldown")]
    pub base_cooldown_secs: u64,

    /// Upper bound for the cooldown (seconds).
    #[serde(default = "default_max_cooldown")]
    pub max_cooldown_secs: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_base_cooldown() -> u64 {
    300 // 5 minutes
}

fn default_max_cooldown() -> u64 {
    21600 // 6 hours
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            base_cooldown_secs: default_base_cooldown(),
            max_cooldown_secs: default_max_cooldown(),
        }
    }
}

impl CircuitConfig {
    /// Cooldown applied after `reopen_count` reopenings.
    pub fn cooldown_for(&self, reopen_count: u32) -> u64 {
        self.base_cooldown_secs
            .saturating_mul(2u64.saturating_pow(reopen_count))
            .min(self.max_cooldown_secs)
    }
}
