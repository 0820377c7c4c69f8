//! CLI module for coachkb.

pub mod commands;
mod output;

pub use output::Output;

use clap::{Parser, Subcommand};

/// coachkb - knowledge bases for coach personas
///
/// Ingests video transcripts into per-coach knowledge bases and retrieves the
/// passages that ground a coach's answers.
#[derive(Parser, Debug)]
#[command(name = "coachkb")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest one video into a coach's knowledge base
    IngestVideo {
        /// YouTube URL or video ID
        url: String,

        /// Knowledge owner (coach id)
        #[arg(short, long)]
        owner: String,

        /// Delete this video's existing chunks first
        #[arg(long)]
        replace: bool,
    },

    /// Ingest the most viewed long-form videos of a channel
    IngestChannel {
        /// Channel URL (/channel/UC..., /@handle, /c/name, /user/name) or @handle
        channel_url: String,

        /// Knowledge owner (coach id)
        #[arg(short, long)]
        owner: String,

        /// Maximum number of videos (default from config)
        #[arg(short = 'n', long)]
        max_videos: Option<usize>,
    },

    /// Ingest a list of videos
    IngestBatch {
        /// Knowledge owner (coach id)
        #[arg(short, long)]
        owner: String,

        /// YouTube URLs or video IDs
        urls: Vec<String>,

        /// File with one URL or ID per line
        #[arg(short, long)]
        file: Option<String>,
    },

    /// Retrieve the most relevant passages for a query
    Retrieve {
        /// Knowledge owner (coach id)
        #[arg(short, long)]
        owner: String,

        /// The query
        query: String,

        /// Maximum number of passages (default from config)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Minimum similarity score, 0.0-1.0 (default from config)
        #[arg(short, long)]
        threshold: Option<f32>,
    },

    /// List the videos ingested for a coach
    Sources {
        /// Knowledge owner (coach id)
        owner: String,
    },

    /// Delete a coach's knowledge, or one video of it
    Purge {
        /// Knowledge owner (coach id)
        owner: String,

        /// Only delete chunks of this video ID
        #[arg(long)]
        source: Option<String>,
    },

    /// Print a coach's system prompt from a TOML profile
    Prompt {
        /// Path to the persona profile
        profile: String,

        /// Compose the full prompt for this user message, with retrieved knowledge
        #[arg(short, long)]
        message: Option<String>,

        /// Send the composed prompt to the chat model and print the reply
        #[arg(long, requires = "message")]
        reply: bool,
    },

    /// Start the HTTP API server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Directory of persona profiles; coaches without knowledge are ingested at startup
        #[arg(long)]
        personas: Option<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "retrieval.top_k")
        key: String,
        /// Configuration value
        value: String,
    },

    /// Show configuration file path
    Path,
}
