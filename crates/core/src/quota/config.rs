use serde::{Deserialize, Serialize};

/// Content source call budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Units available per window, shared by all channels.
    #[serde(default = "default_limit")]
    pub limit_per_window: u64,

    /// Window length (seconds). The counter resets when a window ends.
    #[serde(default = "default_window")]
    pub window_secs: u64,

    /// Units reserved before each source request.
    #[serde(default = "default_page_cost")]
    pub page_cost: u64,
}

fn default_limit() -> u64 {
    10_000
}

fn default_window() -> u64 {
    86_400 // 1 day
}

fn default_page_cost() -> u64 {
    1
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            limit_per_window: default_limit(),
            window_secs: default_window(),
            page_cost: default_page_cost(),
        }
    }
}
