//! Transcript chunking for embedding.
//!
//! Segments are grouped into bounded windows so every chunk stays within the
//! embedding model's useful context while keeping neighbouring sentences together.

mod window;

pub use window::WindowChunker;

use crate::config::ChunkingSettings;
use serde::{Deserialize, Serialize};

/// A span of transcript text ready for embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Whitespace-joined text of the segments in this chunk.
    pub text: String,
    /// Start offset of the first segment in the chunk.
    pub start_seconds: f64,
}

impl TextChunk {
    /// Number of whitespace-separated words.
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Window limits. A chunk closes as soon as either is reached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkingConfig {
    pub max_words: usize,
    pub max_seconds: f64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_words: 200,
            max_seconds: 30.0,
        }
    }
}

impl From<&ChunkingSettings> for ChunkingConfig {
    fn from(settings: &ChunkingSettings) -> Self {
        Self {
            max_words: settings.max_words.max(1),
            max_seconds: settings.max_seconds,
        }
    }
}

/// Format seconds as MM:SS or HH:MM:SS.
pub fn format_timestamp(seconds: f64) -> String {
    let total_seconds = seconds.max(0.0) as u32;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}
