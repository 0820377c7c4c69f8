//! Configuration module for coachkb.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{ComposerPrompts, PersonaPrompts, Prompts};
pub use settings::{
    ChunkingSettings, EmbeddingProvider, EmbeddingSettings, GeneralSettings, HttpSettings,
    IngestionSettings, KnowledgeStoreSettings, PromptSettings, ResponderSettings, RetrySettings,
    RetrievalSettings, Settings, TranscriptSettings, YoutubeSettings,
};
