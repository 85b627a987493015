//! YouTube Data API v3 content source.
//!
//! Items come from a channel's uploads playlist. The playlist is ordered
//! newest first, so each call returns one page and its token points at
//! older uploads. The token is dropped once a page reaches back past
//! `published_after`. Every API request costs one quota unit.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use super::{ContentSource, SourceError, SourcePage, YouTubeConfig};
use crate::metrics;
use crate::store::ItemCandidate;

const PAGE_SIZE: &str = "50";

/// YouTube content source.
pub struct YouTubeSource {
    client: Client,
    api_base: String,
    api_key: String,
    /// channel id -> uploads playlist id
    uploads: RwLock<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelResource {
    snippet: ChannelSnippet,
    content_details: ChannelContentDetails,
}

#[derive(Debug, Deserialize)]
struct ChannelSnippet {
    title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelContentDetails {
    related_playlists: RelatedPlaylists,
}

#[derive(Debug, Deserialize)]
struct RelatedPlaylists {
    uploads: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItem {
    snippet: PlaylistSnippet,
    content_details: Option<PlaylistContentDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistSnippet {
    published_at: DateTime<Utc>,
    title: String,
    #[serde(default)]
    description: String,
    resource_id: ResourceId,
    #[serde(default)]
    thumbnails: HashMap<String, Thumbnail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistContentDetails {
    video_published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorReason>,
}

#[derive(Debug, Deserialize)]
struct ErrorReason {
    #[serde(default)]
    reason: String,
}

impl YouTubeSource {
    pub fn new(config: &YouTubeConfig) -> Result<Self, SourceError> {
        if config.api_key.is_empty() {
            return Err(SourceError::Rejected(
                "YouTube API key is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            uploads: RwLock::new(HashMap::new()),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        channel_id: &str,
    ) -> Result<T, SourceError> {
        let started = Instant::now();
        let response = self
            .client
            .get(format!("{}/{}", self.api_base, endpoint))
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                metrics::observe_external("youtube", endpoint, started, false);
                return Err(e.into());
            }
        };

        let status = response.status();
        if !status.is_success() {
            metrics::observe_external("youtube", endpoint, started, false);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status.as_u16(), &body, channel_id));
        }

        let parsed = response.json::<T>().await.map_err(|e| {
            SourceError::Transient(format!("failed to parse {} response: {}", endpoint, e))
        });
        metrics::observe_external("youtube", endpoint, started, parsed.is_ok());
        parsed
    }

    async fn fetch_channel(&self, channel_id: &str) -> Result<ChannelResource, SourceError> {
        let response: ListResponse<ChannelResource> = self
            .get(
                "channels",
                &[("part", "snippet,contentDetails"), ("id", channel_id)],
                channel_id,
            )
            .await?;

        let channel = response
            .items
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::ChannelNotFound(channel_id.to_string()))?;

        self.uploads.write().await.insert(
            channel_id.to_string(),
            channel.content_details.related_playlists.uploads.clone(),
        );

        Ok(channel)
    }

    /// Uploads playlist id, and the quota spent resolving it.
    async fn uploads_playlist(&self, channel_id: &str) -> Result<(String, u64), SourceError> {
        if let Some(playlist) = self.uploads.read().await.get(channel_id) {
            return Ok((playlist.clone(), 0));
        }
        let channel = self.fetch_channel(channel_id).await?;
        Ok((channel.content_details.related_playlists.uploads, 1))
    }
}

#[async_trait]
impl ContentSource for YouTubeSource {
    async fn list_new_items(
        &self,
        channel_id: &str,
        published_after: DateTime<Utc>,
        page_token: Option<&str>,
    ) -> Result<SourcePage, SourceError> {
        let (playlist_id, mut quota_cost) = self.uploads_playlist(channel_id).await?;

        let mut params = vec![
            ("part", "snippet,contentDetails"),
            ("playlistId", playlist_id.as_str()),
            ("maxResults", PAGE_SIZE),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        let page: ListResponse<PlaylistItem> =
            self.get("playlistItems", &params, channel_id).await?;
        quota_cost += 1;

        let mut items = Vec::new();
        let mut reached_older = false;
        for entry in page.items {
            match to_candidate(channel_id, entry) {
                Some(candidate) if candidate.published_at >= published_after => {
                    items.push(candidate)
                }
                Some(_) => reached_older = true,
                None => {}
            }
        }
        items.sort_by(|a, b| a.position().cmp(&b.position()));

        // Older pages can only hold items before the bound.
        let next_page_token = if reached_older {
            None
        } else {
            page.next_page_token
        };

        debug!(
            channel_id = %channel_id,
            items = items.len(),
            more = next_page_token.is_some(),
            quota_cost = quota_cost,
            "Fetched uploads playlist page"
        );

        Ok(SourcePage {
            items,
            next_page_token,
            quota_cost,
        })
    }

    async fn get_channel_meta(&self, channel_id: &str) -> Result<String, SourceError> {
        let channel = self.fetch_channel(channel_id).await?;
        Ok(channel.snippet.title)
    }
}

/// Convert a playlist entry, skipping private and deleted videos.
fn to_candidate(channel_id: &str, entry: PlaylistItem) -> Option<ItemCandidate> {
    let video_id = entry.snippet.resource_id.video_id?;
    // Private/deleted uploads have no video publish time.
    let published_at = entry.content_details?.video_published_at?;
    let thumbnail_url = ["maxres", "high", "medium", "default"]
        .iter()
        .find_map(|size| entry.snippet.thumbnails.get(*size))
        .map(|t| t.url.clone());

    Some(ItemCandidate {
        channel_id: channel_id.to_string(),
        url: format!("https://www.youtube.com/watch?v={}", video_id),
        id: video_id,
        title: entry.snippet.title,
        description: entry.snippet.description,
        published_at,
        thumbnail_url,
    })
}

/// Map an API error response onto the source error taxonomy.
fn classify_error(status: u16, body: &str, channel_id: &str) -> SourceError {
    let (message, reasons) = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => (
            envelope.error.message,
            envelope
                .error
                .errors
                .into_iter()
                .map(|e| e.reason)
                .collect::<Vec<_>>(),
        ),
        Err(_) => (body.to_string(), Vec::new()),
    };
    let has_reason = |r: &str| reasons.iter().any(|reason| reason == r);

    match status {
        403 if has_reason("quotaExceeded") || has_reason("dailyLimitExceeded") => {
            SourceError::QuotaExceeded(message)
        }
        403 if has_reason("rateLimitExceeded") || has_reason("userRateLimitExceeded") => {
            SourceError::Transient(format!("rate limited: {}", message))
        }
        404 => SourceError::ChannelNotFound(channel_id.to_string()),
        429 | 500..=599 => SourceError::Transient(format!("HTTP {}: {}", status, message)),
        400..=499 => SourceError::Rejected(format!("HTTP {}: {}", status, message)),
        _ => SourceError::Transient(format!("HTTP {}: {}", status, message)),
    }
}
