//! Error types for coachkb.

use thiserror::Error;

/// Library-level error type for knowledge base operations.
#[derive(Error, Debug)]
pub enum KbError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The source has no transcript. Expected, and never fatal for a batch.
    #[error("Transcript not available: {0}")]
    NotAvailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{provider} error: {message}")]
    Provider {
        provider: &'static str,
        message: String,
        retryable: bool,
    },

    #[error("Knowledge store error: {0}")]
    Store(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl KbError {
    /// A provider failure that should not be retried (auth, bad request, malformed body).
    pub fn provider(provider: &'static str, message: impl Into<String>) -> Self {
        KbError::Provider {
            provider,
            message: message.into(),
            retryable: false,
        }
    }

    /// A transient provider failure (timeout, connect error, 429, 5xx).
    pub fn transient(provider: &'static str, message: impl Into<String>) -> Self {
        KbError::Provider {
            provider,
            message: message.into(),
            retryable: true,
        }
    }

    /// Whether a bounded retry may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, KbError::Provider { retryable: true, .. })
    }

    /// Whether this is a persistence failure.
    pub fn is_store(&self) -> bool {
        matches!(self, KbError::Store(_) | KbError::Database(_))
    }
}

/// Result type alias for knowledge base operations.
pub type Result<T> = std::result::Result<T, KbError>;
