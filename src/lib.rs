//! coachkb - knowledge bases for coach personas
//!
//! Turns a coach's long-form videos into a searchable knowledge base and uses it
//! to ground the coach's conversational answers.
//!
//! # Overview
//!
//! coachkb allows you to:
//! - Ingest a single video, a list of videos or a channel's most viewed long-form videos
//! - Keep every coach's knowledge isolated from every other coach's
//! - Retrieve the passages most relevant to a user's message
//! - Compose an in-character prompt from a persona, its knowledge and the conversation
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration management
//! - `transcript` - Time-coded transcript fetching
//! - `chunking` - Word/time window chunking
//! - `embedding` - Embedding generation
//! - `knowledge_store` - Owner-scoped chunk storage and similarity search
//! - `channel` - Video ids, channel resolution and listing
//! - `orchestrator` - Ingestion pipeline coordination
//! - `persona` - Coach profiles, system prompts and the persona directory
//! - `rag` - Context retrieval and prompt composition
//!
//! # Example
//!
//! ```rust,no_run
//! use coachkb::config::Settings;
//! use coachkb::embedding::create_embedder;
//! use coachkb::knowledge_store::create_store;
//! use coachkb::orchestrator::Orchestrator;
//! use coachkb::rag::ContextRetriever;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let embedder = create_embedder(&settings)?;
//!     let store = create_store(&settings)?;
//!
//!     let orchestrator = Orchestrator::from_settings(&settings, embedder.clone(), store.clone())?;
//!     orchestrator.ingest_video("u4ZoJKF_VuA", "simon").await?;
//!
//!     let retriever = ContextRetriever::new(store, embedder);
//!     for passage in retriever.retrieve("simon", "How do I inspire my team?", 3).await? {
//!         println!("{}", passage);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod http;
pub mod knowledge_store;
pub mod openai;
pub mod orchestrator;
pub mod persona;
pub mod rag;
pub mod transcript;

pub use error::{KbError, Result};
