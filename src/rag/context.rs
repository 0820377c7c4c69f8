//! Context retrieval for coach responses.

use crate::channel::watch_url;
use crate::config::RetrievalSettings;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::knowledge_store::{KnowledgeChunk, KnowledgeStore, ScoredChunk};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Finds an owner's chunks most similar to a query.
///
/// Must share its embedder with ingestion so query and chunk vectors are comparable.
#[derive(Clone)]
pub struct ContextRetriever {
    store: Arc<dyn KnowledgeStore>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
    threshold: f32,
}

impl ContextRetriever {
    /// Create a retriever with top-K 3 and threshold 0.5.
    pub fn new(store: Arc<dyn KnowledgeStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            top_k: 3,
            threshold: 0.5,
        }
    }

    pub fn from_settings(
        settings: &RetrievalSettings,
        store: Arc<dyn KnowledgeStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self::new(store, embedder)
            .with_top_k(settings.top_k)
            .with_threshold(settings.threshold)
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Minimum cosine similarity for a chunk to count as relevant.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Contents of the owner's best matching chunks, most similar first.
    ///
    /// An empty result is normal: the owner has no knowledge or nothing clears
    /// the threshold.
    pub async fn retrieve(&self, owner_id: &str, query: &str, top_k: usize) -> Result<Vec<String>> {
        let hits = self.retrieve_scored(owner_id, query, top_k).await?;
        Ok(hits.into_iter().map(|hit| hit.chunk.content).collect())
    }

    /// Like [`retrieve`](Self::retrieve) but keeps scores and provenance.
    #[instrument(skip(self, query))]
    pub async fn retrieve_scored(&self, owner_id: &str, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>> {
        if top_k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query).await?;
        let hits = self
            .store
            .search(owner_id, &query_embedding, self.threshold, top_k)
            .await?;

        debug!("Retrieved {} chunks for {}", hits.len(), owner_id);
        Ok(hits)
    }
}

/// Watch link that opens a chunk's video at the chunk's start.
pub fn source_url(chunk: &KnowledgeChunk) -> String {
    let meta = &chunk.metadata;
    format!(
        "{}&t={}s",
        watch_url(&meta.source_id),
        meta.start_offset_seconds.max(0.0) as u64
    )
}
