//! SQLite-based knowledge store.
//!
//! Cosine similarity is computed in Rust over the owner's rows. Owners hold tens
//! to a few thousand chunks, so a full owner scan stays cheap.

use super::{
    cosine_similarity, rank, validate_chunk, validate_query, ChunkMetadata, KnowledgeChunk, KnowledgeStore,
    ScoredChunk, SourceSummary, OFFSET_EPSILON,
};
use crate::error::{KbError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS knowledge_chunks (
        id TEXT PRIMARY KEY,
        owner_id TEXT NOT NULL,
        content TEXT NOT NULL,
        embedding BLOB NOT NULL,
        source_id TEXT NOT NULL,
        source_title TEXT NOT NULL,
        start_offset_seconds REAL NOT NULL,
        indexed_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_chunks_owner ON knowledge_chunks(owner_id);
    CREATE INDEX IF NOT EXISTS idx_chunks_owner_source ON knowledge_chunks(owner_id, source_id);

    CREATE TABLE IF NOT EXISTS store_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
"#;

const SELECT_COLUMNS: &str = "id, owner_id, content, embedding, source_id, source_title, \
                              start_offset_seconds, indexed_at";

/// SQLite-based knowledge store.
pub struct SqliteKnowledgeStore {
    conn: Mutex<Connection>,
}

impl SqliteKnowledgeStore {
    /// Open (or create) a store at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized SQLite knowledge store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| KbError::Store(format!("Failed to acquire lock: {}", e)))
    }

    /// Dimensionality of stored vectors, if any chunk has been stored yet.
    pub fn dimensions(&self) -> Result<Option<usize>> {
        let conn = self.lock()?;
        Self::stored_dimensions(&conn)
    }

    fn stored_dimensions(conn: &Connection) -> Result<Option<usize>> {
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM store_meta WHERE key = 'dimensions'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        value
            .map(|v| {
                v.parse::<usize>()
                    .map_err(|e| KbError::Store(format!("Corrupt dimensions marker '{}': {}", v, e)))
            })
            .transpose()
    }

    /// Serialize embedding to bytes.
    fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize embedding from bytes.
    fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| {
                let arr: [u8; 4] = chunk.try_into().unwrap_or_default();
                f32::from_le_bytes(arr)
            })
            .collect()
    }

    fn row_to_chunk(row: &Row<'_>) -> rusqlite::Result<KnowledgeChunk> {
        let id_str: String = row.get(0)?;
        let embedding_bytes: Vec<u8> = row.get(3)?;
        let indexed_at_str: String = row.get(7)?;

        Ok(KnowledgeChunk {
            id: uuid::Uuid::parse_str(&id_str).unwrap_or_default(),
            owner_id: row.get(1)?,
            content: row.get(2)?,
            embedding: Self::bytes_to_embedding(&embedding_bytes),
            metadata: ChunkMetadata {
                source_id: row.get(4)?,
                source_title: row.get(5)?,
                start_offset_seconds: row.get(6)?,
            },
            indexed_at: parse_timestamp(&indexed_at_str),
        })
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl KnowledgeStore for SqliteKnowledgeStore {
    #[instrument(skip(self, chunk), fields(owner = %chunk.owner_id, source = %chunk.metadata.source_id))]
    async fn insert(&self, chunk: &KnowledgeChunk) -> Result<()> {
        let conn = self.lock()?;
        let fixed = Self::stored_dimensions(&conn)?;
        validate_chunk(chunk, fixed)?;

        let tx = conn.unchecked_transaction()?;
        if fixed.is_none() {
            tx.execute(
                "INSERT INTO store_meta (key, value) VALUES ('dimensions', ?1)",
                params![chunk.embedding.len().to_string()],
            )?;
        }

        tx.execute(
            r#"
            INSERT INTO knowledge_chunks
            (id, owner_id, content, embedding, source_id, source_title,
             start_offset_seconds, indexed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                chunk.id.to_string(),
                chunk.owner_id,
                chunk.content,
                Self::embedding_to_bytes(&chunk.embedding),
                chunk.metadata.source_id,
                chunk.metadata.source_title,
                chunk.metadata.start_offset_seconds,
                chunk.indexed_at.to_rfc3339(),
            ],
        )?;
        tx.commit()?;

        debug!("Inserted chunk {}", chunk.id);
        Ok(())
    }

    #[instrument(skip(self, query_embedding))]
    async fn search(
        &self,
        owner_id: &str,
        query_embedding: &[f32],
        threshold: f32,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let conn = self.lock()?;
        validate_query(query_embedding, Self::stored_dimensions(&conn)?)?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM knowledge_chunks WHERE owner_id = ?1",
            SELECT_COLUMNS
        ))?;

        let results: Vec<ScoredChunk> = stmt
            .query_map(params![owner_id], Self::row_to_chunk)?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(|chunk| ScoredChunk {
                score: cosine_similarity(query_embedding, &chunk.embedding),
                chunk,
            })
            .filter(|hit| hit.score >= threshold)
            .collect();

        let ranked = rank(results, top_k);
        debug!("Found {} matching chunks", ranked.len());
        Ok(ranked)
    }

    async fn contains(
        &self,
        owner_id: &str,
        source_id: &str,
        start_offset_seconds: f64,
    ) -> Result<bool> {
        let conn = self.lock()?;
        let exists: bool = conn.query_row(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM knowledge_chunks
                WHERE owner_id = ?1 AND source_id = ?2
                  AND ABS(start_offset_seconds - ?3) < ?4
            )
            "#,
            params![owner_id, source_id, start_offset_seconds, OFFSET_EPSILON],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    #[instrument(skip(self))]
    async fn delete_source(&self, owner_id: &str, source_id: &str) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM knowledge_chunks WHERE owner_id = ?1 AND source_id = ?2",
            params![owner_id, source_id],
        )?;

        info!("Deleted {} chunks of {} for owner {}", deleted, source_id, owner_id);
        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn delete_owner(&self, owner_id: &str) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM knowledge_chunks WHERE owner_id = ?1",
            params![owner_id],
        )?;

        info!("Deleted {} chunks for owner {}", deleted, owner_id);
        Ok(deleted)
    }

    async fn count(&self, owner_id: &str) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM knowledge_chunks WHERE owner_id = ?1",
            params![owner_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    #[instrument(skip(self))]
    async fn list_sources(&self, owner_id: &str) -> Result<Vec<SourceSummary>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT source_id, MAX(source_title), COUNT(*), MAX(indexed_at) AS last_indexed
            FROM knowledge_chunks
            WHERE owner_id = ?1
            GROUP BY source_id
            ORDER BY last_indexed DESC
            "#,
        )?;

        let sources = stmt
            .query_map(params![owner_id], |row| {
                let count: i64 = row.get(2)?;
                let indexed_at_str: String = row.get(3)?;
                Ok(SourceSummary {
                    source_id: row.get(0)?,
                    source_title: row.get(1)?,
                    chunk_count: count as usize,
                    last_indexed_at: parse_timestamp(&indexed_at_str),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(sources)
    }
}
