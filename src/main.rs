//! coachkb CLI entry point.

use anyhow::Result;
use clap::Parser;
use coachkb::cli::{commands, Cli, Commands};
use coachkb::config::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("coachkb={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let settings = match &cli.config {
        Some(path) => Settings::load_from(Some(&std::path::PathBuf::from(path)))?,
        None => Settings::load()?,
    };

    std::fs::create_dir_all(settings.data_dir())?;

    match &cli.command {
        Commands::IngestVideo { url, owner, replace } => {
            commands::run_ingest_video(url, owner, *replace, settings).await?;
        }

        Commands::IngestChannel {
            channel_url,
            owner,
            max_videos,
        } => {
            commands::run_ingest_channel(channel_url, owner, *max_videos, settings).await?;
        }

        Commands::IngestBatch { owner, urls, file } => {
            commands::run_ingest_batch(owner, urls, file.as_deref(), settings).await?;
        }

        Commands::Retrieve {
            owner,
            query,
            top_k,
            threshold,
        } => {
            commands::run_retrieve(owner, query, *top_k, *threshold, settings).await?;
        }

        Commands::Sources { owner } => {
            commands::run_sources(owner, settings).await?;
        }

        Commands::Purge { owner, source } => {
            commands::run_purge(owner, source.as_deref(), settings).await?;
        }

        Commands::Prompt {
            profile,
            message,
            reply,
        } => {
            commands::run_prompt(profile, message.as_deref(), *reply, settings).await?;
        }

        Commands::Serve { host, port, personas } => {
            commands::run_serve(host, *port, personas.as_deref(), settings).await?;
        }

        Commands::Config { action } => {
            commands::run_config(action, cli.config.as_deref(), settings)?;
        }
    }

    Ok(())
}
