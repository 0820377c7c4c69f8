//! Time-coded transcripts from an external captioning provider.

mod transcriptapi;

pub use transcriptapi::TranscriptApiFetcher;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One caption line with its offset into the video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    pub start_seconds: f64,
    /// Present when the provider reports it.
    pub duration_seconds: Option<f64>,
}

impl TranscriptSegment {
    pub fn new(start_seconds: f64, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            start_seconds,
            duration_seconds: None,
        }
    }

    pub fn with_duration(mut self, duration_seconds: f64) -> Self {
        self.duration_seconds = Some(duration_seconds);
        self
    }
}

/// Source of transcripts.
///
/// Implementations return `KbError::NotAvailable` when the video has no captions
/// (including an empty caption list) and `KbError::Provider` for everything else.
#[async_trait]
pub trait TranscriptFetcher: Send + Sync {
    /// Fetch the transcript for a video, ordered by start time.
    async fn fetch(&self, video_id: &str) -> Result<Vec<TranscriptSegment>>;
}
