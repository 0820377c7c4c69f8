//! Video and channel identifiers, and channel listing.

mod youtube;

pub use youtube::YoutubeDataApi;

use crate::error::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A video selected from a channel listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRef {
    pub id: String,
    pub title: Option<String>,
}

/// How a channel URL names its channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRef {
    /// `/channel/UC...`, already provider-native.
    Id(String),
    /// `/@handle`
    Handle(String),
    /// `/c/name`
    Custom(String),
    /// `/user/name`
    User(String),
}

/// Resolves channels and lists their most popular long-form videos.
#[async_trait]
pub trait ChannelResolver: Send + Sync {
    /// Resolve a channel URL or handle to the provider's channel id.
    ///
    /// Fails with `KbError::InvalidInput` for non-channel input and
    /// `KbError::NotFound` when the channel does not exist.
    async fn resolve_channel(&self, channel_url: &str) -> Result<String>;

    /// Long-form videos of a channel, most viewed first, at most `max_count`.
    async fn list_top_videos(&self, channel_id: &str, max_count: usize) -> Result<Vec<VideoRef>>;
}

/// Canonical watch URL for a video id.
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

fn video_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)
            (?:
                # Full YouTube URLs
                (?:https?://)?
                (?:www\.|m\.)?
                (?:youtube\.com/watch\?(?:.*&)?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/v/|youtube\.com/shorts/)
                ([a-zA-Z0-9_-]{11})
            )
            |
            # Bare video ID (11 characters)
            ^([a-zA-Z0-9_-]{11})$
        ",
        )
        .expect("video id pattern is valid")
    })
}

fn channel_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)
            ^(?:https?://)?(?:www\.|m\.)?youtube\.com/
            (?:
                channel/(?P<id>[^/?\#&]+)
                | @(?P<handle>[^/?\#&]+)
                | c/(?P<custom>[^/?\#&]+)
                | user/(?P<user>[^/?\#&]+)
            )
            | ^@(?P<bare>[A-Za-z0-9._-]+)$
        ",
        )
        .expect("channel pattern is valid")
    })
}

/// Extract a video ID from a YouTube URL or bare ID.
pub fn extract_video_id(input: &str) -> Option<String> {
    let caps = video_id_regex().captures(input.trim())?;

    // Try group 1 (URL format) then group 2 (bare ID)
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
}

/// Parse a channel URL (or bare `@handle`).
pub fn parse_channel_url(input: &str) -> Option<ChannelRef> {
    let caps = channel_regex().captures(input.trim())?;

    if let Some(m) = caps.name("id") {
        Some(ChannelRef::Id(m.as_str().to_string()))
    } else if let Some(m) = caps.name("handle").or_else(|| caps.name("bare")) {
        Some(ChannelRef::Handle(m.as_str().to_string()))
    } else if let Some(m) = caps.name("custom") {
        Some(ChannelRef::Custom(m.as_str().to_string()))
    } else {
        caps.name("user").map(|m| ChannelRef::User(m.as_str().to_string()))
    }
}
