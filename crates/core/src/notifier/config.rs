//! Notifier configuration.

use serde::{Deserialize, Serialize};

/// Which messaging backend to deliver through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierBackend {
    #[default]
    Telegram,
}

impl NotifierBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifierBackend::Telegram => "telegram",
        }
    }
}

/// Notifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    #[serde(default)]
    pub backend: NotifierBackend,
    pub telegram: TelegramConfig,
}

/// Telegram Bot API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Longest message body the endpoint accepts, in characters.
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,

    /// Attach the item thumbnail to the first chunk.
    #[serde(default = "default_send_thumbnail")]
    pub send_thumbnail: bool,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_max_message_chars() -> usize {
    4096
}

fn default_send_thumbnail() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_defaults() {
        let config: NotifierConfig = toml::from_str(
            r#"
            [telegram]
            bot_token = "123:abc"
            "#,
        )
        .unwrap();
        assert_eq!(config.backend, NotifierBackend::Telegram);
        assert_eq!(config.telegram.api_base, "https://api.telegram.org");
        assert_eq!(config.telegram.max_message_chars, 4096);
        assert!(config.telegram.send_thumbnail);
    }

    #[test]
    fn test_missing_token_fails() {
        let result: Result<NotifierConfig, _> = toml::from_str("[telegram]\nsend_thumbnail = false");
        assert!(result.is_err());
    }
}
