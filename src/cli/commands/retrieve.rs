//! Retrieve command implementation.

use super::open_knowledge_base;
use crate::chunking::format_timestamp;
use crate::cli::Output;
use crate::config::Settings;
use crate::rag::{source_url, ContextRetriever};
use anyhow::Result;

/// Run the retrieve command.
pub async fn run_retrieve(
    owner: &str,
    query: &str,
    top_k: Option<usize>,
    threshold: Option<f32>,
    settings: Settings,
) -> Result<()> {
    let (embedder, store) = open_knowledge_base(&settings)?;

    let mut retriever = ContextRetriever::from_settings(&settings.retrieval, store, embedder);
    if let Some(threshold) = threshold {
        retriever = retriever.with_threshold(threshold);
    }
    let top_k = top_k.unwrap_or(retriever.top_k());

    let spinner = Output::spinner("Searching...");
    let results = retriever.retrieve_scored(owner, query, top_k).await;
    spinner.finish_and_clear();

    match results {
        Ok(hits) if hits.is_empty() => {
            Output::warning("No passages above the similarity threshold.");
        }
        Ok(hits) => {
            Output::success(&format!("Found {} passages", hits.len()));
            for hit in &hits {
                let meta = &hit.chunk.metadata;
                let url = source_url(&hit.chunk);
                Output::search_result(
                    &meta.source_title,
                    &format_timestamp(meta.start_offset_seconds),
                    hit.score,
                    &hit.chunk.content,
                    Some(&url),
                );
            }
        }
        Err(e) => {
            Output::error(&format!("Retrieval failed: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
