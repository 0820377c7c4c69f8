//! YouTube Data API v3 channel resolver.

use super::{parse_channel_url, ChannelRef, ChannelResolver, VideoRef};
use crate::error::{KbError, Result};
use crate::http::{build_client, status_error, transport_error, DEFAULT_TIMEOUT_SECS};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, instrument};

const PROVIDER: &str = "youtube";
const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// The search endpoint returns at most 50 items per page.
const PAGE_SIZE: usize = 50;

/// Channel resolver backed by the YouTube Data API.
pub struct YoutubeDataApi {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    /// `videoDuration` filter: `long` (> 20 min) or `medium` (4-20 min).
    video_duration: String,
}

impl YoutubeDataApi {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_timeout(api_key, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(api_key: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            video_duration: "long".to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Set the duration filter. Anything but `medium` falls back to `long` so
    /// short-form videos never qualify.
    pub fn with_video_duration(mut self, video_duration: &str) -> Self {
        self.video_duration = match video_duration {
            "medium" => "medium".to_string(),
            _ => "long".to_string(),
        };
        self
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .query(query)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        if !status.is_success() {
            return Err(status_error(PROVIDER, status, &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| KbError::provider(PROVIDER, format!("Malformed {} response: {}", endpoint, e)))
    }

    /// `channels.list` by handle or legacy username.
    async fn lookup_channel(&self, filter: &str, value: &str) -> Result<Option<String>> {
        let response: ChannelListResponse = self
            .get("channels", &[("part", "id"), (filter, value)])
            .await?;
        Ok(response.items.into_iter().next().map(|item| item.id))
    }

    /// `search.list type=channel`, taking the best match.
    async fn search_channel(&self, query: &str) -> Result<Option<String>> {
        let response: SearchListResponse = self
            .get(
                "search",
                &[("part", "snippet"), ("q", query), ("type", "channel"), ("maxResults", "1")],
            )
            .await?;
        Ok(response
            .items
            .into_iter()
            .next()
            .and_then(|item| item.id.channel_id.or(item.snippet.and_then(|s| s.channel_id))))
    }
}

#[derive(Deserialize)]
struct ChannelListResponse {
    #[serde(default)]
    items: Vec<ChannelItem>,
}

#[derive(Deserialize)]
struct ChannelItem {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchListResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: Option<SearchSnippet>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    video_id: Option<String>,
    channel_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchSnippet {
    title: Option<String>,
    channel_id: Option<String>,
}

#[async_trait]
impl ChannelResolver for YoutubeDataApi {
    #[instrument(skip(self))]
    async fn resolve_channel(&self, channel_url: &str) -> Result<String> {
        let channel = parse_channel_url(channel_url).ok_or_else(|| {
            KbError::InvalidInput(format!("Not a YouTube channel URL: {}", channel_url))
        })?;

        let resolved = match &channel {
            ChannelRef::Id(id) => Some(id.clone()),
            ChannelRef::Handle(handle) => match self.lookup_channel("forHandle", handle).await? {
                Some(id) => Some(id),
                None => self.search_channel(handle).await?,
            },
            ChannelRef::User(user) => match self.lookup_channel("forUsername", user).await? {
                Some(id) => Some(id),
                None => self.search_channel(user).await?,
            },
            ChannelRef::Custom(name) => self.search_channel(name).await?,
        };

        let id = resolved.ok_or_else(|| KbError::NotFound(format!("Channel not found: {}", channel_url)))?;
        debug!("Resolved {} to channel {}", channel_url, id);
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn list_top_videos(&self, channel_id: &str, max_count: usize) -> Result<Vec<VideoRef>> {
        let mut videos: Vec<VideoRef> = Vec::new();
        let mut seen = HashSet::new();
        let mut page_token: Option<String> = None;

        while videos.len() < max_count {
            let page_size = (max_count - videos.len()).min(PAGE_SIZE).to_string();
            let mut query = vec![
                ("part", "snippet"),
                ("channelId", channel_id),
                ("order", "viewCount"),
                ("type", "video"),
                ("videoDuration", self.video_duration.as_str()),
                ("maxResults", page_size.as_str()),
            ];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }

            let page: SearchListResponse = self.get("search", &query).await?;

            for item in page.items {
                let Some(id) = item.id.video_id else { continue };
                if seen.insert(id.clone()) {
                    videos.push(VideoRef {
                        id,
                        title: item.snippet.and_then(|s| s.title),
                    });
                }
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        videos.truncate(max_count);
        info!("Found {} long-form videos for channel {}", videos.len(), channel_id);
        Ok(videos)
    }
}
