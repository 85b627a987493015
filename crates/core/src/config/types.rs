use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::circuit::CircuitConfig;
use crate::notifier::NotifierConfig;
use crate::orchestrator::TrackerConfig;
use crate::quota::QuotaConfig;
use crate::retry::RetryConfig;
use crate::scheduler::SchedulerConfig;
use crate::source::SourceConfig;
use crate::summarizer::SummarizerConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub circuit: CircuitConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    pub source: SourceConfig,
    pub summarizer: SummarizerConfig,
    pub notifier: NotifierConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("herald.db")
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub tracker: TrackerConfig,
    pub scheduler: SchedulerConfig,
    pub quota: QuotaConfig,
    pub circuit: CircuitConfig,
    pub retry: RetryConfig,
    pub source: SanitizedSourceConfig,
    pub summarizer: SanitizedSummarizerConfig,
    pub notifier: SanitizedNotifierConfig,
}

/// Content source config with the API key hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedSourceConfig {
    pub backend: String,
    pub api_base: String,
    pub api_key_configured: bool,
}

/// Summarizer config with the API key hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedSummarizerConfig {
    pub provider: String,
    pub model: String,
    pub api_key_configured: bool,
}

/// Notifier config with the bot token hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedNotifierConfig {
    pub backend: String,
    pub bot_token_configured: bool,
    pub max_message_chars: usize,
    pub send_thumbnail: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        let youtube = &config.source.youtube;
        let telegram = &config.notifier.telegram;
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            tracker: config.tracker.clone(),
            scheduler: config.scheduler.clone(),
            quota: config.quota.clone(),
            circuit: config.circuit.clone(),
            retry: config.retry.clone(),
            source: SanitizedSourceConfig {
                backend: config.source.backend.as_str().to_string(),
                api_base: youtube.api_base.clone(),
                api_key_configured: !youtube.api_key.is_empty(),
            },
            summarizer: SanitizedSummarizerConfig {
                provider: config.summarizer.provider.as_str().to_string(),
                model: config.summarizer.model_name().to_string(),
                api_key_configured: !config.summarizer.api_key.is_empty(),
            },
            notifier: SanitizedNotifierConfig {
                backend: config.notifier.backend.as_str().to_string(),
                bot_token_configured: !telegram.bot_token.is_empty(),
                max_message_chars: telegram.max_message_chars,
                send_thumbnail: telegram.send_thumbnail,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    #[test]
    fn test_sanitized_config_hides_secrets() {
        let config = load_config_from_str(
            r#"
[source.youtube]
api_key = "super-secret-yt"

[summarizer]
provider = "openai"
api_key = "super-secret-llm"

[notifier.telegram]
bot_token = "super-secret-bot"
"#,
        )
        .unwrap();

        let sanitized = SanitizedConfig::from(&config);
        let json = serde_json::to_string(&sanitized).unwrap();

        assert!(!json.contains("super-secret"));
        assert!(sanitized.source.api_key_configured);
        assert!(sanitized.summarizer.api_key_configured);
        assert!(sanitized.notifier.bot_token_configured);
        assert_eq!(sanitized.summarizer.provider, "openai");
    }
}
