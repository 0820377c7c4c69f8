//! Owner-scoped knowledge storage with similarity search.
//!
//! Every chunk belongs to exactly one knowledge owner (a coach persona). Searches
//! only ever consider the requested owner's chunks.

mod memory;
mod sqlite;

pub use memory::MemoryKnowledgeStore;
pub use sqlite::SqliteKnowledgeStore;

use crate::config::Settings;
use crate::error::{KbError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Provenance of a chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Video id the chunk was cut from.
    pub source_id: String,
    pub source_title: String,
    pub start_offset_seconds: f64,
}

/// A stored span of transcript text with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub id: Uuid,
    pub owner_id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
    pub indexed_at: DateTime<Utc>,
}

impl KnowledgeChunk {
    pub fn new(
        owner_id: impl Into<String>,
        content: impl Into<String>,
        embedding: Vec<f32>,
        metadata: ChunkMetadata,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            content: content.into(),
            embedding,
            metadata,
            indexed_at: Utc::now(),
        }
    }
}

/// A search hit with its cosine similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: KnowledgeChunk,
    pub score: f32,
}

/// Per-source summary of an owner's knowledge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSummary {
    pub source_id: String,
    pub source_title: String,
    pub chunk_count: usize,
    pub last_indexed_at: DateTime<Utc>,
}

/// Trait for knowledge store implementations.
///
/// The store's dimensionality is fixed by the first chunk it accepts; chunks of
/// any other length are rejected.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Append one chunk.
    async fn insert(&self, chunk: &KnowledgeChunk) -> Result<()>;

    /// Chunks of `owner_id` scoring at least `threshold`, best first, at most `top_k`.
    async fn search(
        &self,
        owner_id: &str,
        query_embedding: &[f32],
        threshold: f32,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>>;

    /// Whether a chunk already exists for this (owner, source, start offset).
    async fn contains(
        &self,
        owner_id: &str,
        source_id: &str,
        start_offset_seconds: f64,
    ) -> Result<bool>;

    /// Delete every chunk of one source for one owner.
    async fn delete_source(&self, owner_id: &str, source_id: &str) -> Result<usize>;

    /// Delete every chunk of an owner. Called when the owner itself is deleted.
    async fn delete_owner(&self, owner_id: &str) -> Result<usize>;

    /// Number of chunks stored for an owner.
    async fn count(&self, owner_id: &str) -> Result<usize>;

    /// Sources ingested for an owner, most recently indexed first.
    async fn list_sources(&self, owner_id: &str) -> Result<Vec<SourceSummary>>;
}

/// Build the configured store.
pub fn create_store(settings: &Settings) -> Result<Arc<dyn KnowledgeStore>> {
    match settings.knowledge_store.provider.to_lowercase().as_str() {
        "sqlite" => Ok(Arc::new(SqliteKnowledgeStore::new(&settings.sqlite_path())?)),
        "memory" => Ok(Arc::new(MemoryKnowledgeStore::new())),
        other => Err(KbError::Config(format!("Unknown knowledge store provider: {}", other))),
    }
}

/// Offsets closer than this are the same dedupe key.
pub(crate) const OFFSET_EPSILON: f64 = 1e-6;

/// Check the invariants every stored chunk must satisfy.
pub(crate) fn validate_chunk(chunk: &KnowledgeChunk, fixed_dimensions: Option<usize>) -> Result<()> {
    if chunk.content.trim().is_empty() {
        return Err(KbError::Store("Refusing to store a chunk with empty content".to_string()));
    }
    if chunk.embedding.is_empty() {
        return Err(KbError::Store("Refusing to store a chunk without an embedding".to_string()));
    }
    if let Some(dims) = fixed_dimensions {
        if chunk.embedding.len() != dims {
            return Err(KbError::Store(format!(
                "Embedding has {} dimensions but the store holds {}-dimensional vectors",
                chunk.embedding.len(),
                dims
            )));
        }
    }
    Ok(())
}

/// Reject a query embedding from a different embedding space than the stored chunks.
pub(crate) fn validate_query(query_embedding: &[f32], fixed_dimensions: Option<usize>) -> Result<()> {
    match fixed_dimensions {
        Some(dims) if query_embedding.len() != dims => Err(KbError::Store(format!(
            "Query embedding has {} dimensions but the store holds {}-dimensional vectors",
            query_embedding.len(),
            dims
        ))),
        _ => Ok(()),
    }
}

/// Sort hits best first and keep the top `top_k`.
pub(crate) fn rank(mut results: Vec<ScoredChunk>, top_k: usize) -> Vec<ScoredChunk> {
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(top_k);
    results
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
