//! HTTP API server for integration with the coach backend.
//!
//! Provides REST endpoints for ingestion, retrieval and per-coach knowledge management.

use super::open_knowledge_base;
use crate::cli::Output;
use crate::config::Settings;
use crate::error::KbError;
use crate::knowledge_store::KnowledgeStore;
use crate::orchestrator::Orchestrator;
use crate::persona::{PersonaChange, PersonaDirectory, PersonaProfile, TomlPersonaSource};
use crate::rag::{source_url, ContextRetriever};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info, warn};

/// How long shutdown waits for background ingestion to stop.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Shared application state.
struct AppState {
    orchestrator: Arc<Orchestrator>,
    retriever: ContextRetriever,
    store: Arc<dyn KnowledgeStore>,
    directory: Arc<PersonaDirectory>,
    persona_tx: mpsc::Sender<PersonaChange>,
    tasks: TaskTracker,
    shutdown: CancellationToken,
}

impl AppState {
    fn new(orchestrator: Orchestrator, retriever: ContextRetriever) -> Self {
        let store = orchestrator.store();
        let directory = Arc::new(PersonaDirectory::new());
        let (persona_tx, persona_rx) = mpsc::channel(64);
        directory.clone().spawn_sync(persona_rx);

        Self {
            orchestrator: Arc::new(orchestrator),
            retriever,
            store,
            directory,
            persona_tx,
            tasks: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Run an ingestion job in the background, tied to server shutdown.
    fn spawn_job<F, Fut>(&self, what: String, job: F)
    where
        F: FnOnce(Arc<Orchestrator>, CancellationToken) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<String, KbError>> + Send + 'static,
    {
        let orchestrator = self.orchestrator.clone();
        let cancel = self.shutdown.child_token();
        self.tasks.spawn(async move {
            match job(orchestrator, cancel).await {
                Ok(summary) => info!("Background job {} finished: {}", what, summary),
                Err(e) => error!("Background job {} failed: {}", what, e),
            }
        });
    }
}

/// Run the HTTP API server.
pub async fn run_serve(host: &str, port: u16, personas: Option<&str>, settings: Settings) -> anyhow::Result<()> {
    let (embedder, store) = open_knowledge_base(&settings)?;
    let retriever = ContextRetriever::from_settings(&settings.retrieval, store.clone(), embedder.clone());
    let orchestrator = Orchestrator::from_settings(&settings, embedder, store)?;

    let state = Arc::new(AppState::new(orchestrator, retriever));

    if let Some(dir) = personas {
        let source = TomlPersonaSource::new(Settings::expand_path(dir));
        state.directory.refresh(&source).await?;
        seed_missing_knowledge(&state);
    }

    let app = router(state.clone());

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("coachkb API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET    /health");
    Output::kv("Ingest video", "POST   /ingest/video");
    Output::kv("Ingest channel", "POST   /ingest/channel");
    Output::kv("Ingest batch", "POST   /ingest/batch");
    Output::kv("Retrieve", "POST   /retrieve");
    Output::kv("Sources", "GET    /owners/{owner_id}/sources");
    Output::kv("Delete owner", "DELETE /owners/{owner_id}");
    Output::kv("Personas", "GET|POST /personas");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    let shutdown = state.shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
            shutdown.cancel();
        })
        .await?;

    state.tasks.close();
    if tokio::time::timeout(SHUTDOWN_GRACE, state.tasks.wait()).await.is_err() {
        warn!("Background ingestion did not stop within {:?}", SHUTDOWN_GRACE);
    }

    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/ingest/video", post(ingest_video))
        .route("/ingest/channel", post(ingest_channel))
        .route("/ingest/batch", post(ingest_batch))
        .route("/retrieve", post(retrieve))
        .route("/owners/{owner_id}/sources", get(list_sources))
        .route("/owners/{owner_id}", delete(delete_owner))
        .route("/personas", get(list_personas).post(upsert_persona))
        .layer(cors)
        .with_state(state)
}

/// Ingest the channel of every persona that has no knowledge yet, one at a time.
fn seed_missing_knowledge(state: &AppState) {
    let personas = state.directory.all();
    state.spawn_job("startup seeding".to_string(), move |orchestrator, cancel| async move {
        let mut seeded = 0;
        for profile in &personas {
            if cancel.is_cancelled() {
                break;
            }
            match orchestrator.ensure_owner_knowledge(profile, &cancel).await {
                Ok(Some(report)) => {
                    seeded += 1;
                    info!("Seeded {}: {} chunks", profile.id, report.chunks_written());
                }
                Ok(None) => {}
                Err(e) => warn!("Could not seed {}: {}", profile.id, e),
            }
        }
        Ok::<_, KbError>(format!("{} personas seeded", seeded))
    });
}

// === Request/Response Types ===

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestVideoRequest {
    coach_id: String,
    video_url: String,
    /// Delete this video's chunks first.
    #[serde(default)]
    replace: bool,
    /// Return 202 immediately and ingest in the background.
    #[serde(default)]
    background: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestChannelRequest {
    coach_id: String,
    channel_url: String,
    max_videos: Option<usize>,
    #[serde(default)]
    background: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestBatchRequest {
    coach_id: String,
    video_urls: Vec<String>,
    #[serde(default)]
    background: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveRequest {
    coach_id: String,
    query: String,
    top_k: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveResponse {
    results: Vec<RetrievedChunk>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrievedChunk {
    content: String,
    score: f32,
    source_id: String,
    source_title: String,
    start_offset_seconds: f64,
    /// Watch link opening the video at this chunk.
    url: String,
}

#[derive(Serialize)]
struct Accepted {
    accepted: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// === Handlers ===

fn error_response(e: KbError) -> Response {
    let status = match &e {
        KbError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        KbError::NotFound(_) | KbError::NotAvailable(_) => StatusCode::NOT_FOUND,
        KbError::Provider { .. } => StatusCode::BAD_GATEWAY,
        KbError::Config(_) | KbError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse { error: e.to_string() })).into_response()
}

/// Unwrap a JSON body, or answer 400 naming the fields the endpoint requires.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>, required: &str) -> Result<T, Response> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        debug!("Rejected request body: {}", rejection.body_text());
        error_response(KbError::InvalidInput(format!("{} required", required)))
    })
}

fn accepted() -> Response {
    (StatusCode::ACCEPTED, Json(Accepted { accepted: true })).into_response()
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn ingest_video(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<IngestVideoRequest>, JsonRejection>,
) -> Response {
    let req = match json_body(payload, "coachId and videoUrl") {
        Ok(req) => req,
        Err(response) => return response,
    };
    if req.background {
        let what = format!("video {} for {}", req.video_url, req.coach_id);
        state.spawn_job(what, move |orchestrator, _cancel| async move {
            let outcome = if req.replace {
                orchestrator.ingest_video_replacing(&req.video_url, &req.coach_id).await?
            } else {
                orchestrator.ingest_video(&req.video_url, &req.coach_id).await?
            };
            Ok::<_, KbError>(format!("{:?}", outcome))
        });
        return accepted();
    }

    let result = if req.replace {
        state.orchestrator.ingest_video_replacing(&req.video_url, &req.coach_id).await
    } else {
        state.orchestrator.ingest_video(&req.video_url, &req.coach_id).await
    };

    match result {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => error_response(e),
    }
}

async fn ingest_channel(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<IngestChannelRequest>, JsonRejection>,
) -> Response {
    let req = match json_body(payload, "coachId and channelUrl") {
        Ok(req) => req,
        Err(response) => return response,
    };
    if req.background {
        let what = format!("channel {} for {}", req.channel_url, req.coach_id);
        state.spawn_job(what, move |orchestrator, cancel| async move {
            let report = orchestrator
                .ingest_channel(&req.channel_url, &req.coach_id, req.max_videos, &cancel)
                .await?;
            Ok::<_, KbError>(format!("{} chunks written", report.chunks_written()))
        });
        return accepted();
    }

    let cancel = state.shutdown.child_token();
    match state
        .orchestrator
        .ingest_channel(&req.channel_url, &req.coach_id, req.max_videos, &cancel)
        .await
    {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(e),
    }
}

async fn ingest_batch(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<IngestBatchRequest>, JsonRejection>,
) -> Response {
    let req = match json_body(payload, "coachId and videoUrls") {
        Ok(req) => req,
        Err(response) => return response,
    };
    if req.background {
        let what = format!("batch of {} for {}", req.video_urls.len(), req.coach_id);
        state.spawn_job(what, move |orchestrator, cancel| async move {
            let report = orchestrator.ingest_batch(&req.video_urls, &req.coach_id, &cancel).await?;
            Ok::<_, KbError>(format!("{} chunks written", report.chunks_written()))
        });
        return accepted();
    }

    let cancel = state.shutdown.child_token();
    match state
        .orchestrator
        .ingest_batch(&req.video_urls, &req.coach_id, &cancel)
        .await
    {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(e),
    }
}

async fn retrieve(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RetrieveRequest>, JsonRejection>,
) -> Response {
    let req = match json_body(payload, "coachId and query") {
        Ok(req) => req,
        Err(response) => return response,
    };
    let top_k = req.top_k.unwrap_or(state.retriever.top_k());
    match state.retriever.retrieve_scored(&req.coach_id, &req.query, top_k).await {
        Ok(hits) => Json(RetrieveResponse {
            results: hits
                .into_iter()
                .map(|hit| RetrievedChunk {
                    url: source_url(&hit.chunk),
                    content: hit.chunk.content,
                    score: hit.score,
                    source_id: hit.chunk.metadata.source_id,
                    source_title: hit.chunk.metadata.source_title,
                    start_offset_seconds: hit.chunk.metadata.start_offset_seconds,
                })
                .collect(),
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn list_sources(State(state): State<Arc<AppState>>, Path(owner_id): Path<String>) -> Response {
    match state.store.list_sources(&owner_id).await {
        Ok(sources) => Json(serde_json::json!({
            "total": sources.len(),
            "sources": sources,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn delete_owner(State(state): State<Arc<AppState>>, Path(owner_id): Path<String>) -> Response {
    match state.store.delete_owner(&owner_id).await {
        Ok(deleted) => {
            if state.persona_tx.send(PersonaChange::Deleted(owner_id)).await.is_err() {
                warn!("Persona sync task is gone");
            }
            Json(serde_json::json!({ "deleted": deleted })).into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn list_personas(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.directory.all())
}

/// Register or update a persona. A persona with a channel but no knowledge
/// gets its channel ingested in the background.
async fn upsert_persona(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PersonaProfile>, JsonRejection>,
) -> Response {
    let profile = match json_body(payload, "id and name") {
        Ok(profile) => profile,
        Err(response) => return response,
    };
    if profile.id.trim().is_empty() {
        return error_response(KbError::InvalidInput("Persona id must not be empty".to_string()));
    }

    let seed = profile.channel_url.is_some().then(|| profile.clone());
    if state.persona_tx.send(PersonaChange::Upserted(profile)).await.is_err() {
        return error_response(KbError::Config("Persona sync task is gone".to_string()));
    }

    if let Some(profile) = seed {
        let what = format!("seeding {}", profile.id);
        state.spawn_job(what, move |orchestrator, cancel| async move {
            let summary = match orchestrator.ensure_owner_knowledge(&profile, &cancel).await? {
                Some(report) => format!("{} chunks written", report.chunks_written()),
                None => "knowledge already present".to_string(),
            };
            Ok::<_, KbError>(summary)
        });
    }
    accepted()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelResolver, VideoRef};
    use crate::embedding::Embedder;
    use crate::knowledge_store::MemoryKnowledgeStore;
    use crate::transcript::{TranscriptFetcher, TranscriptSegment};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct OneVideoFetcher;

    #[async_trait]
    impl TranscriptFetcher for OneVideoFetcher {
        async fn fetch(&self, video_id: &str) -> crate::error::Result<Vec<TranscriptSegment>> {
            if video_id == "aaaaaaaaaaa" {
                Ok(vec![
                    TranscriptSegment::new(0.0, "Lead with why."),
                    TranscriptSegment::new(35.0, "People buy why you do it."),
                ])
            } else {
                Err(KbError::NotAvailable(video_id.to_string()))
            }
        }
    }

    struct FlatEmbedder;

    #[async_trait]
    impl Embedder for FlatEmbedder {
        async fn embed(&self, _text: &str) -> crate::error::Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
        async fn embed_batch(&self, texts: &[String]) -> crate::error::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
        fn dimensions(&self) -> usize {
            2
        }
    }

    /// Every channel lists the one video `OneVideoFetcher` has a transcript for.
    struct OneVideoChannel;

    #[async_trait]
    impl ChannelResolver for OneVideoChannel {
        async fn resolve_channel(&self, _channel_url: &str) -> crate::error::Result<String> {
            Ok("UCone".to_string())
        }

        async fn list_top_videos(&self, _channel_id: &str, _max_count: usize) -> crate::error::Result<Vec<VideoRef>> {
            Ok(vec![VideoRef {
                id: "aaaaaaaaaaa".to_string(),
                title: Some("Start with why".to_string()),
            }])
        }
    }

    async fn spawn_server() -> String {
        serve_with(|orchestrator| orchestrator).await
    }

    async fn serve_with(configure: impl FnOnce(Orchestrator) -> Orchestrator) -> String {
        let store: Arc<dyn KnowledgeStore> = Arc::new(MemoryKnowledgeStore::new());
        let embedder: Arc<dyn Embedder> = Arc::new(FlatEmbedder);
        let retriever = ContextRetriever::new(store.clone(), embedder.clone());
        let orchestrator = configure(Orchestrator::with_components(Arc::new(OneVideoFetcher), embedder, store));

        let app = router(Arc::new(AppState::new(orchestrator, retriever)));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_ingest_retrieve_delete_flow() {
        let base = spawn_server().await;
        let client = reqwest::Client::new();

        let res = client
            .post(format!("{}/ingest/video", base))
            .json(&json!({"coachId": "sinek", "videoUrl": "https://youtu.be/aaaaaaaaaaa"}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["status"], "ingested");
        assert_eq!(body["chunks"], 1);

        let body: Value = client
            .post(format!("{}/retrieve", base))
            .json(&json!({"coachId": "sinek", "query": "why"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["results"].as_array().unwrap().len(), 1);
        assert_eq!(body["results"][0]["sourceId"], "aaaaaaaaaaa");
        assert_eq!(body["results"][0]["url"], "https://www.youtube.com/watch?v=aaaaaaaaaaa&t=0s");

        let body: Value = client
            .get(format!("{}/owners/sinek/sources", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["total"], 1);

        let body: Value = client
            .delete(format!("{}/owners/sinek", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["deleted"], 1);
    }

    #[tokio::test]
    async fn test_batch_reports_skips() {
        let base = spawn_server().await;
        let body: Value = reqwest::Client::new()
            .post(format!("{}/ingest/batch", base))
            .json(&json!({"coachId": "sinek", "videoUrls": ["aaaaaaaaaaa", "bbbbbbbbbbb"]}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["succeeded"][0][0], "aaaaaaaaaaa");
        assert_eq!(body["skipped"][0], "bbbbbbbbbbb");
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let base = spawn_server().await;
        let client = reqwest::Client::new();

        let res = client
            .post(format!("{}/ingest/video", base))
            .json(&json!({"coachId": "sinek", "videoUrl": "not a video"}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 400);

        // No resolver configured.
        let res = client
            .post(format!("{}/ingest/channel", base))
            .json(&json!({"coachId": "sinek", "channelUrl": "https://www.youtube.com/@x"}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 503);
    }

    #[tokio::test]
    async fn test_missing_fields_are_bad_requests() {
        let base = spawn_server().await;
        let client = reqwest::Client::new();

        let res = client
            .post(format!("{}/ingest/video", base))
            .json(&json!({"coachId": "sinek"}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 400);
        let body: Value = res.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("coachId and videoUrl required"));

        let res = client
            .post(format!("{}/ingest/channel", base))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 400);

        let res = client
            .post(format!("{}/retrieve", base))
            .json(&json!({"query": "why"}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 400);
    }

    #[tokio::test]
    async fn test_new_persona_channel_is_ingested() {
        let base = serve_with(|orchestrator| orchestrator.with_resolver(Arc::new(OneVideoChannel))).await;
        let client = reqwest::Client::new();

        let res = client
            .post(format!("{}/personas", base))
            .json(&json!({
                "id": "sinek",
                "name": "Simon",
                "channel_url": "https://www.youtube.com/@simonsinek"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 202);

        let mut total = 0;
        for _ in 0..100 {
            let body: Value = client
                .get(format!("{}/owners/sinek/sources", base))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            total = body["total"].as_u64().unwrap_or_default();
            if total > 0 {
                assert_eq!(body["sources"][0]["source_title"], "Start with why");
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_background_ingest_is_accepted() {
        let base = spawn_server().await;
        let res = reqwest::Client::new()
            .post(format!("{}/ingest/video", base))
            .json(&json!({"coachId": "sinek", "videoUrl": "aaaaaaaaaaa", "background": true}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 202);
    }

    #[tokio::test]
    async fn test_persona_upsert_is_eventually_visible() {
        let base = spawn_server().await;
        let client = reqwest::Client::new();

        let res = client
            .post(format!("{}/personas", base))
            .json(&json!({"id": "sinek", "name": "Simon"}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 202);

        let mut names = Vec::new();
        for _ in 0..50 {
            let body: Value = client
                .get(format!("{}/personas", base))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            names = body
                .as_array()
                .unwrap()
                .iter()
                .map(|p| p["name"].as_str().unwrap_or_default().to_string())
                .collect();
            if !names.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(names, vec!["Simon"]);
    }
}
