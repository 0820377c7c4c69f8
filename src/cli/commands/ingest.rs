//! Ingest command implementations.

use super::{cancel_on_ctrl_c, open_knowledge_base};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::{BatchReport, Orchestrator, VideoOutcome};
use anyhow::{Context, Result};

/// Run the ingest-video command.
pub async fn run_ingest_video(url: &str, owner: &str, replace: bool, settings: Settings) -> Result<()> {
    let (embedder, store) = open_knowledge_base(&settings)?;
    let orchestrator = Orchestrator::from_settings(&settings, embedder, store)?;

    let spinner = Output::spinner(&format!("Ingesting {}...", url));
    let result = if replace {
        orchestrator.ingest_video_replacing(url, owner).await
    } else {
        orchestrator.ingest_video(url, owner).await
    };
    spinner.finish_and_clear();

    match result {
        Ok(VideoOutcome::Ingested { chunks }) => {
            Output::success(&format!("Stored {} chunks for {}", chunks, owner));
            if chunks == 0 {
                Output::info("All chunks were already stored. Use --replace to re-ingest.");
            }
        }
        Ok(VideoOutcome::Skipped { reason }) => {
            Output::warning(&format!("Skipped: {}", reason));
        }
        Err(e) => {
            Output::error(&format!("Ingestion failed: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}

/// Run the ingest-channel command.
pub async fn run_ingest_channel(
    channel_url: &str,
    owner: &str,
    max_videos: Option<usize>,
    settings: Settings,
) -> Result<()> {
    let (embedder, store) = open_knowledge_base(&settings)?;
    let orchestrator = Orchestrator::from_settings(&settings, embedder, store)?;
    let cancel = cancel_on_ctrl_c();

    let spinner = Output::spinner(&format!("Ingesting channel {}...", channel_url));
    let result = orchestrator
        .ingest_channel(channel_url, owner, max_videos, &cancel)
        .await;
    spinner.finish_and_clear();

    let report = result.map_err(|e| {
        Output::error(&format!("Channel ingestion failed: {}", e));
        e
    })?;
    print_report(owner, &report);
    Ok(())
}

/// Run the ingest-batch command.
pub async fn run_ingest_batch(
    owner: &str,
    urls: &[String],
    file: Option<&str>,
    settings: Settings,
) -> Result<()> {
    let mut inputs = urls.to_vec();
    if let Some(path) = file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read video list {}", path))?;
        inputs.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(String::from),
        );
    }
    if inputs.is_empty() {
        anyhow::bail!("No videos given. Pass URLs or --file.");
    }

    let (embedder, store) = open_knowledge_base(&settings)?;
    let orchestrator = Orchestrator::from_settings(&settings, embedder, store)?;
    let cancel = cancel_on_ctrl_c();

    let spinner = Output::spinner(&format!("Ingesting {} videos...", inputs.len()));
    let result = orchestrator.ingest_batch(&inputs, owner, &cancel).await;
    spinner.finish_and_clear();

    print_report(owner, &result?);
    Ok(())
}

fn print_report(owner: &str, report: &BatchReport) {
    Output::header(&format!("Ingestion for {}", owner));
    Output::batch_report(report);
    if report.failed.is_empty() {
        Output::success("Done.");
    } else {
        Output::warning(&format!("{} videos failed; re-run to retry them.", report.failed.len()));
    }
}
