//! Word/time window chunking.

use super::{ChunkingConfig, TextChunk};
use crate::transcript::TranscriptSegment;

/// Groups consecutive segments into chunks.
///
/// A chunk closes after the segment that brings it to `max_words` words, or
/// after the first segment starting `max_seconds` or more past the chunk start,
/// whichever happens first. Any remainder is flushed as a final chunk.
#[derive(Debug, Clone, Default)]
pub struct WindowChunker {
    config: ChunkingConfig,
}

impl WindowChunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// Split segments into chunks. Empty input yields no chunks.
    pub fn chunk(&self, segments: &[TranscriptSegment]) -> Vec<TextChunk> {
        let mut chunks = Vec::new();
        let mut buffer = String::new();
        let mut words = 0usize;
        let mut chunk_start = 0.0;

        for segment in segments {
            let text = segment.text.trim();
            if text.is_empty() {
                continue;
            }

            if buffer.is_empty() {
                chunk_start = segment.start_seconds;
            } else {
                buffer.push(' ');
            }
            buffer.push_str(text);
            words += text.split_whitespace().count();

            let elapsed = segment.start_seconds - chunk_start;
            if words >= self.config.max_words || elapsed >= self.config.max_seconds {
                chunks.push(TextChunk {
                    text: std::mem::take(&mut buffer),
                    start_seconds: chunk_start,
                });
                words = 0;
            }
        }

        if !buffer.is_empty() {
            chunks.push(TextChunk {
                text: buffer,
                start_seconds: chunk_start,
            });
        }

        chunks
    }
}
