//! TranscriptAPI-compatible HTTP fetcher.

use super::{TranscriptFetcher, TranscriptSegment};
use crate::error::{KbError, Result};
use crate::http::{build_client, status_error, transport_error, DEFAULT_TIMEOUT_SECS};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

const PROVIDER: &str = "transcript";

/// Fetches transcripts from `{base_url}/youtube/transcript`.
pub struct TranscriptApiFetcher {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl TranscriptApiFetcher {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        Self::with_timeout(base_url, api_key, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn parse_body(video_id: &str, body: &str) -> Result<Vec<TranscriptSegment>> {
        let parsed: TranscriptResponse = serde_json::from_str(body).map_err(|e| {
            KbError::provider(PROVIDER, format!("Malformed transcript response: {}", e))
        })?;

        let mut segments: Vec<TranscriptSegment> = parsed
            .transcript
            .into_iter()
            .map(|line| TranscriptSegment {
                text: line.text,
                start_seconds: line.start,
                duration_seconds: line.duration,
            })
            .collect();

        if segments.is_empty() {
            return Err(KbError::NotAvailable(video_id.to_string()));
        }

        segments.sort_by(|a, b| a.start_seconds.total_cmp(&b.start_seconds));
        Ok(segments)
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptResponse {
    #[serde(default)]
    transcript: Vec<TranscriptLine>,
}

#[derive(Debug, Deserialize)]
struct TranscriptLine {
    text: String,
    start: f64,
    #[serde(default)]
    duration: Option<f64>,
}

#[async_trait]
impl TranscriptFetcher for TranscriptApiFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, video_id: &str) -> Result<Vec<TranscriptSegment>> {
        let url = format!("{}/youtube/transcript", self.base_url);

        let mut request = self.client.get(&url).query(&[
            ("video_url", video_id),
            ("format", "json"),
            ("include_timestamp", "true"),
        ]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(KbError::NotAvailable(video_id.to_string()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        if !status.is_success() {
            return Err(status_error(PROVIDER, status, &body));
        }

        let segments = Self::parse_body(video_id, &body)?;
        debug!("Fetched {} transcript segments for {}", segments.len(), video_id);
        Ok(segments)
    }
}
