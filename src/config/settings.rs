//! Configuration settings for coachkb.

use crate::error::{KbError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub http: HttpSettings,
    pub retry: RetrySettings,
    pub transcript: TranscriptSettings,
    pub youtube: YoutubeSettings,
    pub embedding: EmbeddingSettings,
    pub chunking: ChunkingSettings,
    pub knowledge_store: KnowledgeStoreSettings,
    pub ingestion: IngestionSettings,
    pub retrieval: RetrievalSettings,
    pub responder: ResponderSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.coachkb".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Outbound HTTP settings shared by every provider client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

/// Bounded retry for transient provider failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry, doubled on every further attempt.
    pub base_delay_ms: u64,
    /// Upper bound for a single delay.
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

/// Captioning provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptSettings {
    /// Base URL of the TranscriptAPI-compatible service.
    pub base_url: String,
    /// API key (falls back to TRANSCRIPT_API_KEY).
    pub api_key: Option<String>,
}

impl Default for TranscriptSettings {
    fn default() -> Self {
        Self {
            base_url: "https://transcriptapi.com/api/v2".to_string(),
            api_key: None,
        }
    }
}

/// YouTube Data API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeSettings {
    /// YouTube Data API key (falls back to YOUTUBE_API_KEY).
    pub api_key: Option<String>,
    /// Base URL of the Data API.
    pub base_url: String,
    /// Duration filter for channel listings (`long` or `medium`). Shorts never qualify.
    pub video_duration: String,
}

impl Default for YoutubeSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://www.googleapis.com/youtube/v3".to_string(),
            video_duration: "long".to_string(),
        }
    }
}

/// Embedding provider type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    Gemini,
    OpenAI,
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" => Ok(EmbeddingProvider::Gemini),
            "openai" => Ok(EmbeddingProvider::OpenAI),
            _ => Err(format!("Unknown embedding provider: {}", s)),
        }
    }
}

impl std::fmt::Display for EmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingProvider::Gemini => write!(f, "gemini"),
            EmbeddingProvider::OpenAI => write!(f, "openai"),
        }
    }
}

/// Embedding generation settings.
///
/// Changing the model or dimensions requires re-ingesting every owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub dimensions: u32,
    /// Base URL override (Gemini only).
    pub base_url: Option<String>,
    /// API key (falls back to GEMINI_API_KEY or OPENAI_API_KEY).
    pub api_key: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Gemini,
            model: "gemini-embedding-001".to_string(),
            dimensions: 3072,
            base_url: None,
            api_key: None,
        }
    }
}

/// Transcript chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Close a chunk once it holds this many words.
    pub max_words: usize,
    /// Close a chunk once this many seconds have elapsed since its start.
    pub max_seconds: f64,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            max_words: 200,
            max_seconds: 30.0,
        }
    }
}

/// Knowledge store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeStoreSettings {
    /// Store backend (sqlite, memory).
    pub provider: String,
    /// Path to the SQLite database (for sqlite provider).
    pub sqlite_path: String,
}

impl Default for KnowledgeStoreSettings {
    fn default() -> Self {
        Self {
            provider: "sqlite".to_string(),
            sqlite_path: "~/.coachkb/knowledge.db".to_string(),
        }
    }
}

/// Ingestion pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionSettings {
    /// Default cap on videos ingested per channel.
    pub max_videos: usize,
    /// Videos processed at once in a channel or batch run. 1 means sequential.
    pub max_concurrent_videos: usize,
    /// Skip chunks already stored for the same (owner, source, start offset).
    pub dedupe: bool,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            max_videos: 50,
            max_concurrent_videos: 1,
            dedupe: true,
        }
    }
}

/// Retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    /// Minimum cosine similarity for a chunk to be returned.
    pub threshold: f32,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 3,
            threshold: 0.5,
        }
    }
}

/// Chat response settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponderSettings {
    pub model: String,
    /// Number of most recent conversation turns included in the prompt.
    pub history_turns: usize,
}

impl Default for ResponderSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            history_turns: 10,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| KbError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Set a dotted key (e.g. `retrieval.top_k`) from its string form.
    ///
    /// The value is parsed as TOML first so numbers and booleans keep their type.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let (section, field) = key
            .split_once('.')
            .ok_or_else(|| KbError::Config(format!("Key must be section.field: {}", key)))?;

        let mut root = toml::Value::try_from(&*self).map_err(|e| KbError::Config(e.to_string()))?;

        let parsed = toml::from_str::<toml::Table>(&format!("v = {}", value))
            .ok()
            .and_then(|mut t| t.remove("v"))
            .unwrap_or_else(|| toml::Value::String(value.to_string()));

        let table = root
            .get_mut(section)
            .and_then(|s| s.as_table_mut())
            .ok_or_else(|| KbError::Config(format!("Unknown section: {}", section)))?;
        table.insert(field.to_string(), parsed);

        *self = root
            .try_into()
            .map_err(|e: toml::de::Error| KbError::Config(e.to_string()))?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("coachkb")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.knowledge_store.sqlite_path)
    }

    pub fn transcript_api_key(&self) -> Option<String> {
        key_or_env(&self.transcript.api_key, "TRANSCRIPT_API_KEY")
    }

    pub fn youtube_api_key(&self) -> Option<String> {
        key_or_env(&self.youtube.api_key, "YOUTUBE_API_KEY")
    }

    pub fn embedding_api_key(&self) -> Option<String> {
        let var = match self.embedding.provider {
            EmbeddingProvider::Gemini => "GEMINI_API_KEY",
            EmbeddingProvider::OpenAI => "OPENAI_API_KEY",
        };
        key_or_env(&self.embedding.api_key, var)
    }

    /// A copy safe to print: configured API keys are masked.
    pub fn redacted(&self) -> Settings {
        let mut settings = self.clone();
        for key in [
            &mut settings.transcript.api_key,
            &mut settings.youtube.api_key,
            &mut settings.embedding.api_key,
        ] {
            if let Some(value) = key.as_mut() {
                *value = mask_secret(value);
            }
        }
        settings
    }
}

/// Keep the last four characters of long secrets, hide everything else.
fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}

fn key_or_env(configured: &Option<String>, var: &str) -> Option<String> {
    configured
        .clone()
        .filter(|k| !k.is_empty())
        .or_else(|| std::env::var(var).ok().filter(|k| !k.is_empty()))
}
