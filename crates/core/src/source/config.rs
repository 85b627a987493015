//! Content source configuration.

use serde::{Deserialize, Serialize};

/// Which content source backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceBackend {
    #[default]
    Youtube,
}

impl SourceBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceBackend::Youtube => "youtube",
        }
    }
}

/// Content source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub backend: SourceBackend,
    pub youtube: YouTubeConfig,
}

/// YouTube Data API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YouTubeConfig {
    /// API key for the YouTube Data API v3.
    pub api_key: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// HTTP timeout per request (seconds).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://www.googleapis.com/youtube/v3".to_string()
}

fn default_timeout() -> u64 {
    30
}
