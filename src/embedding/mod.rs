//! Embedding generation for ingestion and retrieval.
//!
//! Chunks and queries must go through the same embedder, otherwise their vectors
//! do not share a space and similarity scores are meaningless.

mod gemini;
mod openai;

pub use gemini::GeminiEmbedder;
pub use openai::OpenAIEmbedder;

use crate::config::{EmbeddingProvider, Settings};
use crate::error::{KbError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Trait for embedding generation.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimensions.
    fn dimensions(&self) -> usize;
}

/// Build the configured embedder.
pub fn create_embedder(settings: &Settings) -> Result<Arc<dyn Embedder>> {
    let timeout = Duration::from_secs(settings.http.timeout_secs);
    let dimensions = settings.embedding.dimensions as usize;
    let api_key = settings.embedding_api_key();

    let embedder: Arc<dyn Embedder> = match settings.embedding.provider {
        EmbeddingProvider::Gemini => {
            let api_key = api_key.ok_or_else(|| {
                KbError::Config("Gemini API key missing (set embedding.api_key or GEMINI_API_KEY)".to_string())
            })?;
            let mut embedder =
                GeminiEmbedder::with_timeout(&settings.embedding.model, dimensions, api_key, timeout)?;
            if let Some(base_url) = &settings.embedding.base_url {
                embedder = embedder.with_base_url(base_url);
            }
            Arc::new(embedder)
        }
        EmbeddingProvider::OpenAI => Arc::new(OpenAIEmbedder::with_config(
            &settings.embedding.model,
            dimensions,
            api_key.as_deref(),
            timeout,
        )?),
    };

    Ok(embedder)
}

/// Reject vectors whose length does not match the configured dimensionality.
pub(crate) fn check_dimensions(
    provider: &'static str,
    expected: usize,
    embedding: &[f32],
) -> Result<()> {
    if embedding.len() != expected {
        return Err(KbError::provider(
            provider,
            format!(
                "Embedding has {} dimensions, expected {}",
                embedding.len(),
                expected
            ),
        ));
    }
    Ok(())
}
