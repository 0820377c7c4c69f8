//! OpenAI client configuration with sensible defaults.

use crate::error::{KbError, Result};
use crate::http::build_client;
use async_openai::{config::OpenAIConfig, error::OpenAIError, Client};
use std::time::Duration;

/// Default timeout for OpenAI API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Create an OpenAI client with the default timeout.
pub fn create_client() -> Result<Client<OpenAIConfig>> {
    create_client_with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS), None)
}

/// Create an OpenAI client with a custom timeout and optional explicit API key.
///
/// Without a key the client reads OPENAI_API_KEY.
pub fn create_client_with_timeout(
    timeout: Duration,
    api_key: Option<&str>,
) -> Result<Client<OpenAIConfig>> {
    let http_client = build_client(timeout)?;

    let mut config = OpenAIConfig::default();
    if let Some(key) = api_key {
        config = config.with_api_key(key);
    }

    Ok(Client::with_config(config).with_http_client(http_client))
}

/// Map an OpenAI error to a provider error. 429 and server-side failures are
/// worth retrying; everything else is not.
pub fn map_openai_error(err: OpenAIError) -> KbError {
    const PROVIDER: &str = "openai";

    match &err {
        OpenAIError::Reqwest(e) if e.is_timeout() || e.is_connect() => {
            KbError::transient(PROVIDER, err.to_string())
        }
        OpenAIError::ApiError(api) if api.r#type.as_deref() == Some("server_error") => {
            KbError::transient(PROVIDER, err.to_string())
        }
        OpenAIError::ApiError(api) if api.code.as_deref() == Some("rate_limit_exceeded") => {
            KbError::transient(PROVIDER, err.to_string())
        }
        _ => KbError::provider(PROVIDER, err.to_string()),
    }
}
