use super::{types::Config, ConfigError};
use crate::notifier::MIN_MESSAGE_CHARS;
use crate::retry::RetrySettings;

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(msg.into())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    let tracker = &config.tracker;
    if tracker.min_poll_interval_secs == 0 {
        return Err(invalid("tracker.min_poll_interval_secs must be positive"));
    }
    if tracker.min_poll_interval_secs > tracker.max_poll_interval_secs {
        return Err(invalid(
            "tracker.min_poll_interval_secs cannot exceed tracker.max_poll_interval_secs",
        ));
    }
    if tracker.default_poll_interval_secs < tracker.min_poll_interval_secs
        || tracker.default_poll_interval_secs > tracker.max_poll_interval_secs
    {
        return Err(invalid(
            "tracker.default_poll_interval_secs must be within [min, max] poll interval",
        ));
    }
    if tracker.max_items_per_cycle == 0 {
        return Err(invalid("tracker.max_items_per_cycle must be positive"));
    }

    if config.scheduler.worker_pool_size == 0 {
        return Err(invalid("scheduler.worker_pool_size must be positive"));
    }

    if config.quota.limit_per_window < config.quota.page_cost {
        return Err(invalid("quota.limit_per_window cannot be below quota.page_cost"));
    }
    if config.quota.window_secs == 0 {
        return Err(invalid("quota.window_secs must be positive"));
    }

    let circuit = &config.circuit;
    if circuit.failure_threshold == 0 {
        return Err(invalid("circuit.failure_threshold must be positive"));
    }
    if circuit.base_cooldown_secs == 0 || circuit.base_cooldown_secs > circuit.max_cooldown_secs {
        return Err(invalid(
            "circuit.base_cooldown_secs must be positive and not exceed circuit.max_cooldown_secs",
        ));
    }

    validate_retry("retry.source", &config.retry.source)?;
    validate_retry("retry.summarizer", &config.retry.summarizer)?;
    validate_retry("retry.notifier", &config.retry.notifier)?;

    if config.notifier.telegram.max_message_chars < MIN_MESSAGE_CHARS {
        return Err(invalid(format!(
            "notifier.telegram.max_message_chars must be at least {}",
            MIN_MESSAGE_CHARS
        )));
    }

    Ok(())
}

fn validate_retry(section: &str, settings: &RetrySettings) -> Result<(), ConfigError> {
    if settings.max_attempts == 0 {
        return Err(invalid(format!("{}.max_attempts must be positive", section)));
    }
    if settings.attempt_timeout_secs == 0 {
        return Err(invalid(format!(
            "{}.attempt_timeout_secs must be positive",
            section
        )));
    }
    Ok(())
}
