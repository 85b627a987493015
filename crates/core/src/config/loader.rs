use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides.
///
/// Nested keys are addressed with a double underscore, e.g.
/// `HERALD_NOTIFIER__TELEGRAM__BOT_TOKEN`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("HERALD_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::NotifierBackend;
    use crate::summarizer::LlmProvider;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
[source.youtube]
api_key = "yt-key"

[summarizer]
provider = "anthropic"
api_key = "llm-key"

[notifier.telegram]
bot_token = "123:abc"
"#;

    #[test]
    fn test_load_config_from_str_minimal() {
        let config = load_config_from_str(MINIMAL).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.tracker.max_items_per_cycle, 10);
        assert_eq!(config.circuit.failure_threshold, 5);
        assert_eq!(config.summarizer.provider, LlmProvider::Anthropic);
        assert_eq!(config.notifier.backend, NotifierBackend::Telegram);
        assert_eq!(config.notifier.telegram.max_message_chars, 4096);
    }

    #[test]
    fn test_load_config_from_str_missing_summarizer() {
        let toml = r#"
[source.youtube]
api_key = "yt-key"

[notifier.telegram]
bot_token = "123:abc"
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_from_str_overrides() {
        let toml = format!(
            r#"{MINIMAL}
[scheduler]
worker_pool_size = 8

[retry.notifier]
max_attempts = 6
"#
        );
        let config = load_config_from_str(&toml).unwrap();
        assert_eq!(config.scheduler.worker_pool_size, 8);
        assert_eq!(config.retry.notifier.max_attempts, 6);
        // Untouched sections keep their defaults
        assert_eq!(config.retry.summarizer.max_attempts, 3);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"{MINIMAL}
[server]
host = "127.0.0.1"
port = 3000
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
    }
}
