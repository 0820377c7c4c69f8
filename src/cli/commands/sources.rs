//! Sources and purge command implementations.

use crate::cli::Output;
use crate::config::Settings;
use crate::knowledge_store::create_store;
use anyhow::Result;

/// Run the sources command.
pub async fn run_sources(owner: &str, settings: Settings) -> Result<()> {
    let store = create_store(&settings)?;
    let sources = store.list_sources(owner).await?;

    if sources.is_empty() {
        Output::info(&format!(
            "No knowledge for {} yet. Use 'coachkb ingest-channel <url> --owner {}' to add some.",
            owner, owner
        ));
        return Ok(());
    }

    Output::header(&format!("Sources for {} ({})", owner, sources.len()));
    println!();
    for source in &sources {
        Output::source_info(source);
    }

    let total: usize = sources.iter().map(|s| s.chunk_count).sum();
    println!();
    Output::kv("Total videos", &sources.len().to_string());
    Output::kv("Total chunks", &total.to_string());
    Ok(())
}

/// Run the purge command.
pub async fn run_purge(owner: &str, source: Option<&str>, settings: Settings) -> Result<()> {
    let store = create_store(&settings)?;

    let deleted = match source {
        Some(source_id) => store.delete_source(owner, source_id).await?,
        None => store.delete_owner(owner).await?,
    };

    if deleted == 0 {
        Output::warning("Nothing to delete.");
    } else {
        Output::success(&format!("Deleted {} chunks", deleted));
    }
    Ok(())
}
