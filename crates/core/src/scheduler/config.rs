//! Scheduler configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Channels processed at the same time.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    /// Upper bound of the random delay added to first fires (milliseconds).
    #[serde(default = "default_jitter_max_ms")]
    pub jitter_max_ms: u64,
}

fn default_worker_pool_size() -> usize {
    4
}

fn default_jitter_max_ms() -> u64 {
    5000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            jitter_max_ms: default_jitter_max_ms(),
        }
    }
}
