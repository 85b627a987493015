//! Tracker configuration.

use serde::{Deserialize, Serialize};

/// Channel tracking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Shortest poll interval a channel may be given (seconds).
    #[serde(default = "default_min_interval")]
    pub min_poll_interval_secs: u64,

    /// Longest poll interval a channel may be given (seconds).
    #[serde(default = "default_max_interval")]
    pub max_poll_interval_secs: u64,

    /// Interval for channels added without one (seconds).
    #[serde(default = "default_interval")]
    pub default_poll_interval_secs: u64,

    /// Most items processed in one cycle. A larger backlog drains over
    /// immediate follow-up cycles.
    #[serde(default = "default_max_items")]
    pub max_items_per_cycle: usize,

    /// How far back a new channel looks for items on its first poll.
    #[serde(default = "default_lookback")]
    pub initial_lookback_hours: u64,

    /// Endpoint for channels added without one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_endpoint: Option<String>,
}

fn default_min_interval() -> u64 {
    300
}

fn default_max_interval() -> u64 {
    86_400
}

fn default_interval() -> u64 {
    3600
}

fn default_max_items() -> usize {
    10
}

fn default_lookback() -> u64 {
    24
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_poll_interval_secs: default_min_interval(),
            max_poll_interval_secs: default_max_interval(),
            default_poll_interval_secs: default_interval(),
            max_items_per_cycle: default_max_items(),
            initial_lookback_hours: default_lookback(),
            default_endpoint: None,
        }
    }
}

impl TrackerConfig {
    pub fn interval_in_range(&self, secs: u64) -> bool {
        (self.min_poll_interval_secs..=self.max_poll_interval_secs).contains(&secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrackerConfig::default();
        assert_eq!(config.min_poll_interval_secs, 300);
        assert_eq!(config.max_poll_interval_secs, 86_400);
        assert_eq!(config.default_poll_interval_secs, 3600);
        assert_eq!(config.max_items_per_cycle, 10);
        assert_eq!(config.initial_lookback_hours, 24);
        assert!(config.default_endpoint.is_none());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: TrackerConfig = toml::from_str(
            r#"
            min_poll_interval_secs = 600
            default_endpoint = "@alerts"
            "#,
        )
        .unwrap();
        assert_eq!(config.min_poll_interval_secs, 600);
        assert_eq!(config.max_items_per_cycle, 10);
        assert_eq!(config.default_endpoint.as_deref(), Some("@alerts"));
    }

    #[test]
    fn test_interval_in_range() {
        let config = TrackerConfig::default();
        assert!(config.interval_in_range(300));
        assert!(config.interval_in_range(86_400));
        assert!(!config.interval_in_range(299));
        assert!(!config.interval_in_range(86_401));
    }
}
