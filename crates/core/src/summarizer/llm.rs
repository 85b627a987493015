//! LLM-backed summarizer (Anthropic Messages or OpenAI Chat Completions).

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{LlmProvider, Summarizer, SummarizerConfig, SummarizerError};
use crate::metrics;

/// Description characters included in the prompt.
const PROMPT_DESCRIPTION_CHARS: usize = 800;

const SYSTEM_PROMPT: &str = "You write short, factual summaries of newly published videos \
for chat notifications. Answer with the summary text only.";

/// Build the user prompt for an item.
pub fn build_prompt(title: &str, description: &str) -> String {
    let description = description.trim();
    let description = if description.is_empty() {
        "No description available".to_string()
    } else if description.chars().count() > PROMPT_DESCRIPTION_CHARS {
        let mut truncated: String = description.chars().take(PROMPT_DESCRIPTION_CHARS).collect();
        truncated.push_str("...");
        truncated
    } else {
        description.to_string()
    };

    format!(
        "Summarize this video in 2-3 sentences focusing on key insights and main value.\n\n\
         Title: {}\n\
         Description: {}\n\n\
         Requirements:\n\
         - Highlight the main topics and key takeaways\n\
         - Keep the response under 500 characters\n\
         - Do not include promotional language\n\n\
         Summary:",
        title, description
    )
}

/// Summarizer calling a hosted LLM.
pub struct LlmSummarizer {
    client: reqwest::Client,
    provider: LlmProvider,
    api_key: String,
    model: String,
    api_base: String,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl LlmSummarizer {
    pub fn new(config: &SummarizerConfig) -> Result<Self, SummarizerError> {
        if config.api_key.is_empty() {
            return Err(SummarizerError::Permanent(format!(
                "{} API key is required",
                config.provider.as_str()
            )));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            provider: config.provider,
            api_key: config.api_key.clone(),
            model: config.model_name().to_string(),
            api_base: config.api_base_url().trim_end_matches('/').to_string(),
            max_tokens: config.max_tokens,
        })
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send(&self, prompt: &str) -> Result<String, SummarizerError> {
        let messages = vec![ChatMessage {
            role: "user",
            content: prompt,
        }];

        let request = match self.provider {
            LlmProvider::Anthropic => self
                .client
                .post(format!("{}/v1/messages", self.api_base))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .json(&AnthropicRequest {
                    model: &self.model,
                    max_tokens: self.max_tokens,
                    system: SYSTEM_PROMPT,
                    messages,
                }),
            LlmProvider::Openai => {
                let mut with_system = vec![ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                }];
                with_system.extend(messages);
                self.client
                    .post(format!("{}/v1/chat/completions", self.api_base))
                    .bearer_auth(&self.api_key)
                    .json(&OpenAiRequest {
                        model: &self.model,
                        max_tokens: self.max_tokens,
                        messages: with_system,
                    })
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| SummarizerError::Transient(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(classify_status(status, message));
        }

        let text = match self.provider {
            LlmProvider::Anthropic => {
                let parsed: AnthropicResponse = response
                    .json()
                    .await
                    .map_err(|e| SummarizerError::Transient(e.to_string()))?;
                parsed
                    .content
                    .into_iter()
                    .filter(|c| c.content_type == "text")
                    .map(|c| c.text)
                    .collect::<Vec<_>>()
                    .join("")
            }
            LlmProvider::Openai => {
                let parsed: OpenAiResponse = response
                    .json()
                    .await
                    .map_err(|e| SummarizerError::Transient(e.to_string()))?;
                parsed
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .unwrap_or_default()
            }
        };

        Ok(text)
    }
}

/// Rate limits and server errors are worth retrying; other 4xx are not.
fn classify_status(status: u16, message: String) -> SummarizerError {
    match status {
        408 | 409 | 429 | 500..=599 => {
            SummarizerError::Transient(format!("HTTP {}: {}", status, message))
        }
        _ => SummarizerError::Permanent(format!("HTTP {}: {}", status, message)),
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, title: &str, description: &str) -> Result<String, SummarizerError> {
        let prompt = build_prompt(title, description);
        let started = Instant::now();
        let result = self.send(&prompt).await;
        metrics::observe_external(self.provider.as_str(), "summarize", started, result.is_ok());
        result
    }
}
