//! In-memory knowledge store.
//!
//! Useful for testing and small datasets.

use super::{
    cosine_similarity, rank, validate_chunk, validate_query, KnowledgeChunk, KnowledgeStore, ScoredChunk,
    SourceSummary, OFFSET_EPSILON,
};
use crate::error::{KbError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Inner {
    /// Chunks per owner, in insertion order.
    owners: HashMap<String, Vec<KnowledgeChunk>>,
    dimensions: Option<usize>,
}

/// In-memory knowledge store.
#[derive(Default)]
pub struct MemoryKnowledgeStore {
    inner: RwLock<Inner>,
}

impl MemoryKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|e| KbError::Store(format!("Failed to acquire lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|e| KbError::Store(format!("Failed to acquire lock: {}", e)))
    }
}

#[async_trait]
impl KnowledgeStore for MemoryKnowledgeStore {
    async fn insert(&self, chunk: &KnowledgeChunk) -> Result<()> {
        let mut inner = self.write()?;
        validate_chunk(chunk, inner.dimensions)?;

        inner.dimensions.get_or_insert(chunk.embedding.len());
        inner
            .owners
            .entry(chunk.owner_id.clone())
            .or_default()
            .push(chunk.clone());
        Ok(())
    }

    async fn search(
        &self,
        owner_id: &str,
        query_embedding: &[f32],
        threshold: f32,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let inner = self.read()?;
        validate_query(query_embedding, inner.dimensions)?;

        let results = inner
            .owners
            .get(owner_id)
            .map(|chunks| {
                chunks
                    .iter()
                    .map(|chunk| ScoredChunk {
                        score: cosine_similarity(query_embedding, &chunk.embedding),
                        chunk: chunk.clone(),
                    })
                    .filter(|hit| hit.score >= threshold)
                    .collect()
            })
            .unwrap_or_default();

        Ok(rank(results, top_k))
    }

    async fn contains(
        &self,
        owner_id: &str,
        source_id: &str,
        start_offset_seconds: f64,
    ) -> Result<bool> {
        let inner = self.read()?;
        Ok(inner.owners.get(owner_id).is_some_and(|chunks| {
            chunks.iter().any(|c| {
                c.metadata.source_id == source_id
                    && (c.metadata.start_offset_seconds - start_offset_seconds).abs() < OFFSET_EPSILON
            })
        }))
    }

    async fn delete_source(&self, owner_id: &str, source_id: &str) -> Result<usize> {
        let mut inner = self.write()?;
        let Some(chunks) = inner.owners.get_mut(owner_id) else {
            return Ok(0);
        };
        let before = chunks.len();
        chunks.retain(|c| c.metadata.source_id != source_id);
        Ok(before - chunks.len())
    }

    async fn delete_owner(&self, owner_id: &str) -> Result<usize> {
        let mut inner = self.write()?;
        Ok(inner.owners.remove(owner_id).map(|c| c.len()).unwrap_or(0))
    }

    async fn count(&self, owner_id: &str) -> Result<usize> {
        let inner = self.read()?;
        Ok(inner.owners.get(owner_id).map(|c| c.len()).unwrap_or(0))
    }

    async fn list_sources(&self, owner_id: &str) -> Result<Vec<SourceSummary>> {
        let inner = self.read()?;
        let mut by_source: HashMap<&str, SourceSummary> = HashMap::new();

        for chunk in inner.owners.get(owner_id).into_iter().flatten() {
            let entry = by_source
                .entry(chunk.metadata.source_id.as_str())
                .or_insert_with(|| SourceSummary {
                    source_id: chunk.metadata.source_id.clone(),
                    source_title: chunk.metadata.source_title.clone(),
                    chunk_count: 0,
                    last_indexed_at: chunk.indexed_at,
                });
            entry.chunk_count += 1;
            if chunk.indexed_at > entry.last_indexed_at {
                entry.last_indexed_at = chunk.indexed_at;
            }
        }

        let mut sources: Vec<SourceSummary> = by_source.into_values().collect();
        sources.sort_by(|a, b| b.last_indexed_at.cmp(&a.last_indexed_at));
        Ok(sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge_store::ChunkMetadata;

    fn chunk(owner: &str, source: &str, offset: f64, content: &str, embedding: Vec<f32>) -> KnowledgeChunk {
        KnowledgeChunk::new(
            owner,
            content,
            embedding,
            ChunkMetadata {
                source_id: source.to_string(),
                source_title: format!("Title {}", source),
                start_offset_seconds: offset,
            },
        )
    }

    #[tokio::test]
    async fn test_owner_isolation() {
        let store = MemoryKnowledgeStore::new();
        store.insert(&chunk("x", "v1", 0.0, "x knowledge", vec![1.0, 0.0])).await.unwrap();
        store.insert(&chunk("y", "v2", 0.0, "y knowledge", vec![1.0, 0.0])).await.unwrap();

        let hits = store.search("x", &[1.0, 0.0], 0.0, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits.iter().all(|h| h.chunk.owner_id == "x"));

        assert!(store.search("nobody", &[1.0, 0.0], 0.0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_threshold_and_top_k() {
        let store = MemoryKnowledgeStore::new();
        store.insert(&chunk("x", "v", 0.0, "exact", vec![1.0, 0.0])).await.unwrap();
        store.insert(&chunk("x", "v", 30.0, "close", vec![0.9, 0.1])).await.unwrap();
        store.insert(&chunk("x", "v", 60.0, "far", vec![0.0, 1.0])).await.unwrap();

        let hits = store.search("x", &[1.0, 0.0], 0.5, 10).await.unwrap();
        let contents: Vec<&str> = hits.iter().map(|h| h.chunk.content.as_str()).collect();
        assert_eq!(contents, vec!["exact", "close"]);

        let hits = store.search("x", &[1.0, 0.0], 0.0, 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.content, "exact");

        assert!(store.search("x", &[-1.0, 0.0], 0.99, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dimension_is_fixed_by_first_insert() {
        let store = MemoryKnowledgeStore::new();
        store.insert(&chunk("x", "v", 0.0, "a", vec![1.0, 0.0])).await.unwrap();

        let err = store.insert(&chunk("y", "v", 0.0, "b", vec![1.0, 0.0, 0.0])).await.unwrap_err();
        assert!(err.is_store());
        assert_eq!(store.count("y").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_rejects_foreign_query_dimensions() {
        let store = MemoryKnowledgeStore::new();
        store.insert(&chunk("x", "v", 0.0, "stored", vec![1.0, 0.0, 0.0])).await.unwrap();

        for threshold in [0.5, 0.0] {
            let err = store.search("x", &[1.0, 0.0], threshold, 3).await.unwrap_err();
            assert!(err.is_store());
        }
        assert_eq!(store.search("x", &[0.0, 0.0, 1.0], 0.0, 3).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_contains_and_delete() {
        let store = MemoryKnowledgeStore::new();
        store.insert(&chunk("x", "v1", 0.0, "a", vec![1.0])).await.unwrap();
        store.insert(&chunk("x", "v1", 30.0, "b", vec![1.0])).await.unwrap();
        store.insert(&chunk("x", "v2", 0.0, "c", vec![1.0])).await.unwrap();

        assert!(store.contains("x", "v1", 30.0).await.unwrap());
        assert!(!store.contains("x", "v1", 45.0).await.unwrap());
        assert!(!store.contains("y", "v1", 0.0).await.unwrap());

        assert_eq!(store.delete_source("x", "v1").await.unwrap(), 2);
        assert_eq!(store.count("x").await.unwrap(), 1);

        let sources = store.list_sources("x").await.unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].source_id, "v2");

        assert_eq!(store.delete_owner("x").await.unwrap(), 1);
        assert_eq!(store.count("x").await.unwrap(), 0);
    }
}
