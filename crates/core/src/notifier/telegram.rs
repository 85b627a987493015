//! Telegram Bot API notifier.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{Notifier, NotifierError, TelegramConfig};
use crate::metrics;

/// Photo captions are limited far below message bodies.
const CAPTION_LIMIT: usize = 1024;

/// Used when a 429 response carries no `retry_after`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Notifier posting to Telegram chats.
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    bot_token: String,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Serialize)]
struct SendPhoto<'a> {
    chat_id: &'a str,
    photo: &'a str,
    caption: &'a str,
    parse_mode: &'static str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct BotUser {
    first_name: String,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Result<Self, NotifierError> {
        if config.bot_token.is_empty() {
            return Err(NotifierError::Permanent(
                "Telegram bot token is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NotifierError::Permanent(e.to_string()))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    async fn call(&self, chat_id: &str, chunk: &str, photo: Option<&str>) -> Result<String, NotifierError> {
        let request = match photo {
            Some(photo) => self.client.post(self.method_url("sendPhoto")).json(&SendPhoto {
                chat_id,
                photo,
                caption: chunk,
                parse_mode: "HTML",
            }),
            None => self.client.post(self.method_url("sendMessage")).json(&SendMessage {
                chat_id,
                text: chunk,
                parse_mode: "HTML",
                disable_web_page_preview: false,
            }),
        };

        let response = request
            .send()
            .await
            .map_err(|e| NotifierError::Transient(e.without_url().to_string()))?;
        let message: SentMessage = read_result(response).await?;
        Ok(message.message_id.to_string())
    }

    async fn get_me(&self) -> Result<BotUser, NotifierError> {
        let response = self
            .client
            .get(self.method_url("getMe"))
            .send()
            .await
            .map_err(|e| NotifierError::Transient(e.without_url().to_string()))?;
        read_result(response).await
    }
}

/// Unwrap the `result` of a Bot API response.
async fn read_result<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, NotifierError> {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| NotifierError::Transient(e.without_url().to_string()))?;

    let parsed: ApiResponse<T> = serde_json::from_str(&body).map_err(|_| {
        classify(status, format!("unexpected response body (HTTP {})", status), None)
    })?;

    if parsed.ok {
        return parsed
            .result
            .ok_or_else(|| NotifierError::Transient("response missing result".to_string()));
    }

    let description = parsed
        .description
        .unwrap_or_else(|| format!("HTTP {}", status));
    let retry_after = parsed.parameters.and_then(|p| p.retry_after);
    Err(classify(status, description, retry_after))
}

/// Map a failed Bot API call to a notifier error.
fn classify(status: u16, description: String, retry_after: Option<u64>) -> NotifierError {
    match status {
        429 => NotifierError::RateLimited {
            retry_after: Duration::from_secs(retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS)),
        },
        500..=599 => NotifierError::Transient(description),
        // 400 covers "chat not found" and malformed markup.
        400 | 401 | 403 | 404 => NotifierError::Permanent(description),
        _ => NotifierError::Transient(description),
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(
        &self,
        endpoint_id: &str,
        chunk: &str,
        thumbnail: Option<&str>,
    ) -> Result<String, NotifierError> {
        // A chunk too long for a caption goes out as text without the photo.
        let photo = thumbnail.filter(|_| chunk.chars().count() <= CAPTION_LIMIT);
        let operation = if photo.is_some() { "send_photo" } else { "send_message" };

        let started = Instant::now();
        let result = self.call(endpoint_id, chunk, photo).await;
        metrics::observe_external("telegram", operation, started, result.is_ok());
        result
    }

    async fn check(&self) -> Result<String, NotifierError> {
        let started = Instant::now();
        let result = self.get_me().await;
        metrics::observe_external("telegram", "get_me", started, result.is_ok());
        result.map(|bot| match bot.username {
            Some(username) => format!("{} (@{})", bot.first_name, username),
            None => bot.first_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TelegramConfig {
        TelegramConfig {
            bot_token: "123:abc".to_string(),
            api_base: "https://api.telegram.org/".to_string(),
            max_message_chars: 4096,
            send_thumbnail: true,
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_method_url() {
        let notifier = TelegramNotifier::new(&config()).unwrap();
        assert_eq!(
            notifier.method_url("sendMessage"),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn test_new_requires_token() {
        let mut config = config();
        config.bot_token.clear();
        assert!(matches!(
            TelegramNotifier::new(&config),
            Err(NotifierError::Permanent(_))
        ));
    }

    #[test]
    fn test_classify_rate_limit_uses_retry_after() {
        match classify(429, "Too Many Requests".to_string(), Some(17)) {
            NotifierError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(17))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_classify_permanent_and_transient() {
        assert!(matches!(
            classify(400, "Bad Request: chat not found".to_string(), None),
            NotifierError::Permanent(_)
        ));
        assert!(matches!(
            classify(403, "Forbidden: bot was blocked by the user".to_string(), None),
            NotifierError::Permanent(_)
        ));
        assert!(matches!(
            classify(502, "Bad Gateway".to_string(), None),
            NotifierError::Transient(_)
        ));
    }

    #[test]
    fn test_parse_error_response() {
        let body = r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 3","parameters":{"retry_after":3}}"#;
        let parsed: ApiResponse<SentMessage> = serde_json::from_str(body).unwrap();
        assert!(!parsed.ok);
        assert!(parsed.result.is_none());
        assert_eq!(parsed.parameters.unwrap().retry_after, Some(3));
    }

    #[test]
    fn test_parse_get_me_response() {
        let body = r#"{"ok":true,"result":{"id":42,"is_bot":true,"first_name":"Herald","username":"herald_bot"}}"#;
        let parsed: ApiResponse<BotUser> = serde_json::from_str(body).unwrap();
        let bot = parsed.result.unwrap();
        assert_eq!(bot.first_name, "Herald");
        assert_eq!(bot.username.as_deref(), Some("herald_bot"));
    }

    #[test]
    fn test_send_message_serialization() {
        let json = serde_json::to_value(SendMessage {
            chat_id: "@chan",
            text: "<b>hi</b>",
            parse_mode: "HTML",
            disable_web_page_preview: false,
        })
        .unwrap();
        assert_eq!(json["parse_mode"], "HTML");
        assert_eq!(json["chat_id"], "@chan");
    }
}
