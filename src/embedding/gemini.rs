//! Gemini embeddings over the Generative Language REST API.

use super::{check_dimensions, Embedder};
use crate::error::{KbError, Result};
use crate::http::{build_client, status_error, transport_error, DEFAULT_TIMEOUT_SECS};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

const PROVIDER: &str = "gemini";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini's batch endpoint accepts at most 100 requests.
const BATCH_SIZE: usize = 100;

/// Gemini-based embedder.
pub struct GeminiEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimensions: usize,
    api_key: String,
}

impl GeminiEmbedder {
    pub fn new(model: &str, dimensions: usize, api_key: String) -> Result<Self> {
        Self::with_timeout(model, dimensions, api_key, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(
        model: &str,
        dimensions: usize,
        api_key: String,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.to_string(),
            dimensions,
            api_key,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn model_path(&self) -> String {
        format!("models/{}", self.model)
    }

    fn request_for<'a>(&'a self, text: &'a str) -> EmbedContentRequest<'a> {
        EmbedContentRequest {
            model: None,
            content: Content {
                parts: vec![Part { text }],
            },
            output_dimensionality: self.dimensions,
        }
    }

    async fn post<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<String> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        if !status.is_success() {
            // Gemini reports the reason in {"error": {"message": ...}}
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(status_error(PROVIDER, status, &message));
        }

        Ok(text)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    content: Content<'a>,
    output_dimensionality: usize,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    #[instrument(skip(self, text), fields(len = text.len()))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/{}:embedContent", self.base_url, self.model_path());
        let body = self.post(&url, &self.request_for(text)).await?;

        let parsed: EmbedContentResponse = serde_json::from_str(&body)
            .map_err(|e| KbError::provider(PROVIDER, format!("Malformed embedding response: {}", e)))?;

        check_dimensions(PROVIDER, self.dimensions, &parsed.embedding.values)?;
        Ok(parsed.embedding.values)
    }

    #[instrument(skip(self, texts), fields(count = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/{}:batchEmbedContents", self.base_url, self.model_path());
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(BATCH_SIZE) {
            let request = BatchEmbedRequest {
                requests: batch
                    .iter()
                    .map(|text| EmbedContentRequest {
                        model: Some(self.model_path()),
                        ..self.request_for(text)
                    })
                    .collect(),
            };

            let body = self.post(&url, &request).await?;
            let parsed: BatchEmbedResponse = serde_json::from_str(&body).map_err(|e| {
                KbError::provider(PROVIDER, format!("Malformed batch embedding response: {}", e))
            })?;

            if parsed.embeddings.len() != batch.len() {
                return Err(KbError::provider(
                    PROVIDER,
                    format!(
                        "Gemini returned {} embeddings for {} inputs",
                        parsed.embeddings.len(),
                        batch.len()
                    ),
                ));
            }

            for embedding in parsed.embeddings {
                check_dimensions(PROVIDER, self.dimensions, &embedding.values)?;
                all_embeddings.push(embedding.values);
            }
        }

        debug!("Generated {} embeddings", all_embeddings.len());
        Ok(all_embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
