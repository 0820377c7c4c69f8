//! CLI command implementations.

mod config;
mod ingest;
mod prompt;
mod retrieve;
mod serve;
mod sources;

pub use config::run_config;
pub use ingest::{run_ingest_batch, run_ingest_channel, run_ingest_video};
pub use prompt::run_prompt;
pub use retrieve::run_retrieve;
pub use serve::run_serve;
pub use sources::{run_purge, run_sources};

use crate::config::Settings;
use crate::embedding::{create_embedder, Embedder};
use crate::knowledge_store::{create_store, KnowledgeStore};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Open the store and the embedder shared by ingestion and retrieval.
pub(crate) fn open_knowledge_base(
    settings: &Settings,
) -> anyhow::Result<(Arc<dyn Embedder>, Arc<dyn KnowledgeStore>)> {
    let embedder = create_embedder(settings)?;
    let store = create_store(settings)?;
    Ok((embedder, store))
}

/// A token cancelled on Ctrl+C.
pub(crate) fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, finishing the current video");
            child.cancel();
        }
    });
    token
}
