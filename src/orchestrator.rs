//! Ingestion orchestrator.
//!
//! Coordinates transcript fetch, chunking, embedding and storage for single
//! videos, explicit URL batches and whole channels.

use crate::channel::{extract_video_id, ChannelResolver, VideoRef, YoutubeDataApi};
use crate::chunking::{ChunkingConfig, WindowChunker};
use crate::config::Settings;
use crate::embedding::Embedder;
use crate::error::{KbError, Result};
use crate::http::RetryPolicy;
use crate::knowledge_store::{ChunkMetadata, KnowledgeChunk, KnowledgeStore};
use crate::persona::PersonaProfile;
use crate::transcript::{TranscriptApiFetcher, TranscriptFetcher};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Result of ingesting one video.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VideoOutcome {
    /// Chunks newly written for this video.
    Ingested { chunks: usize },
    /// Nothing to ingest (no transcript).
    Skipped { reason: String },
}

/// A video that failed inside a batch.
#[derive(Debug, Clone, Serialize)]
pub struct FailedVideo {
    pub video_id: String,
    pub error: String,
}

/// Per-video results of a channel or batch ingestion, in input order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub succeeded: Vec<(String, usize)>,
    pub skipped: Vec<String>,
    pub failed: Vec<FailedVideo>,
    /// Never started because the job was cancelled.
    pub cancelled: Vec<String>,
}

impl BatchReport {
    pub fn chunks_written(&self) -> usize {
        self.succeeded.iter().map(|(_, chunks)| chunks).sum()
    }

    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.skipped.len() + self.failed.len()
    }
}

/// One unit of batch work.
struct BatchItem {
    input: String,
    title: Option<String>,
}

/// The main orchestrator for the ingestion pipeline.
pub struct Orchestrator {
    fetcher: Arc<dyn TranscriptFetcher>,
    chunker: WindowChunker,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn KnowledgeStore>,
    resolver: Option<Arc<dyn ChannelResolver>>,
    retry: RetryPolicy,
    dedupe: bool,
    max_concurrent_videos: usize,
    max_videos: usize,
}

impl Orchestrator {
    /// Create an orchestrator from settings.
    ///
    /// The embedder and store are passed in so retrieval can share them.
    pub fn from_settings(
        settings: &Settings,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn KnowledgeStore>,
    ) -> Result<Self> {
        let timeout = Duration::from_secs(settings.http.timeout_secs);

        let fetcher = Arc::new(TranscriptApiFetcher::with_timeout(
            &settings.transcript.base_url,
            settings.transcript_api_key(),
            timeout,
        )?);

        let resolver: Option<Arc<dyn ChannelResolver>> = match settings.youtube_api_key() {
            Some(key) => Some(Arc::new(
                YoutubeDataApi::with_timeout(key, timeout)?
                    .with_base_url(&settings.youtube.base_url)
                    .with_video_duration(&settings.youtube.video_duration),
            )),
            None => {
                debug!("No YouTube API key configured, channel ingestion disabled");
                None
            }
        };

        let mut orchestrator = Self::with_components(fetcher, embedder, store)
            .with_chunking(ChunkingConfig::from(&settings.chunking))
            .with_retry(RetryPolicy::from_settings(&settings.retry))
            .with_dedupe(settings.ingestion.dedupe)
            .with_concurrency(settings.ingestion.max_concurrent_videos)
            .with_max_videos(settings.ingestion.max_videos);
        orchestrator.resolver = resolver;

        Ok(orchestrator)
    }

    /// Create an orchestrator with custom components and default settings.
    pub fn with_components(
        fetcher: Arc<dyn TranscriptFetcher>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn KnowledgeStore>,
    ) -> Self {
        Self {
            fetcher,
            chunker: WindowChunker::default(),
            embedder,
            store,
            resolver: None,
            retry: RetryPolicy::default(),
            dedupe: true,
            max_concurrent_videos: 1,
            max_videos: 50,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ChannelResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_chunking(mut self, config: ChunkingConfig) -> Self {
        self.chunker = WindowChunker::new(config);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Skip chunks whose (owner, source, start offset) is already stored.
    pub fn with_dedupe(mut self, dedupe: bool) -> Self {
        self.dedupe = dedupe;
        self
    }

    /// Number of videos processed at once in a batch. 1 is sequential.
    pub fn with_concurrency(mut self, max_concurrent_videos: usize) -> Self {
        self.max_concurrent_videos = max_concurrent_videos.max(1);
        self
    }

    /// Default video cap for channel ingestion.
    pub fn with_max_videos(mut self, max_videos: usize) -> Self {
        self.max_videos = max_videos;
        self
    }

    pub fn store(&self) -> Arc<dyn KnowledgeStore> {
        self.store.clone()
    }

    /// Ingest one video for an owner.
    ///
    /// A video without a transcript is `Skipped`, not an error. Any embedding
    /// or storage failure aborts the video; chunks already written stay.
    #[instrument(skip(self))]
    pub async fn ingest_video(&self, video_url: &str, owner_id: &str) -> Result<VideoOutcome> {
        let video_id = parse_video(video_url)?;
        validate_owner(owner_id)?;
        self.ingest_source(&video_id, None, owner_id).await
    }

    /// Purge an owner's chunks of this video, then ingest it again.
    #[instrument(skip(self))]
    pub async fn ingest_video_replacing(&self, video_url: &str, owner_id: &str) -> Result<VideoOutcome> {
        let video_id = parse_video(video_url)?;
        validate_owner(owner_id)?;

        let removed = self.store.delete_source(owner_id, &video_id).await?;
        if removed > 0 {
            info!("Removed {} existing chunks of {} before re-ingesting", removed, video_id);
        }
        self.ingest_source(&video_id, None, owner_id).await
    }

    /// Ingest the most viewed long-form videos of a channel.
    ///
    /// Resolution and listing errors fail the call, as does a token that is
    /// already cancelled. Per-video errors are recorded in the report and
    /// never stop the remaining videos.
    #[instrument(skip(self, cancel))]
    pub async fn ingest_channel(
        &self,
        channel_url: &str,
        owner_id: &str,
        max_videos: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<BatchReport> {
        validate_owner(owner_id)?;
        let resolver = self.resolver.as_ref().ok_or_else(|| {
            KbError::Config(
                "Channel ingestion needs a YouTube API key (youtube.api_key or YOUTUBE_API_KEY)".to_string(),
            )
        })?;
        let max_videos = max_videos.unwrap_or(self.max_videos);
        if cancel.is_cancelled() {
            return Err(KbError::Cancelled);
        }

        let channel_id = self
            .retry
            .run("channel resolution", || resolver.resolve_channel(channel_url))
            .await?;
        let videos = self
            .retry
            .run("video listing", || resolver.list_top_videos(&channel_id, max_videos))
            .await?;

        info!("Ingesting {} videos from channel {} for {}", videos.len(), channel_id, owner_id);

        let items = videos
            .into_iter()
            .map(|VideoRef { id, title }| BatchItem { input: id, title })
            .collect();
        let report = self.run_batch(items, owner_id, cancel).await;
        log_report(owner_id, &report);
        Ok(report)
    }

    /// Ingest an explicit list of video URLs or ids.
    #[instrument(skip(self, video_urls, cancel), fields(videos = video_urls.len()))]
    pub async fn ingest_batch(
        &self,
        video_urls: &[String],
        owner_id: &str,
        cancel: &CancellationToken,
    ) -> Result<BatchReport> {
        validate_owner(owner_id)?;

        let items = video_urls
            .iter()
            .map(|url| BatchItem {
                input: url.clone(),
                title: None,
            })
            .collect();
        let report = self.run_batch(items, owner_id, cancel).await;
        log_report(owner_id, &report);
        Ok(report)
    }

    /// Seed a persona's knowledge from its channel if it has none yet.
    ///
    /// Returns `None` when nothing needed doing.
    pub async fn ensure_owner_knowledge(
        &self,
        profile: &PersonaProfile,
        cancel: &CancellationToken,
    ) -> Result<Option<BatchReport>> {
        let Some(channel_url) = profile.channel_url.as_deref() else {
            return Ok(None);
        };
        if self.store.count(&profile.id).await? > 0 {
            debug!("{} already has knowledge", profile.id);
            return Ok(None);
        }

        info!("No knowledge for {}, ingesting {}", profile.name, channel_url);
        self.ingest_channel(channel_url, &profile.id, None, cancel)
            .await
            .map(Some)
    }

    async fn run_batch(&self, items: Vec<BatchItem>, owner_id: &str, cancel: &CancellationToken) -> BatchReport {
        // A video listed twice would race its own dedupe checks when run concurrently.
        let mut seen = HashSet::new();
        let items: Vec<BatchItem> = items
            .into_iter()
            .filter(|item| {
                let Some(id) = extract_video_id(&item.input) else {
                    return true;
                };
                let first = seen.insert(id);
                if !first {
                    debug!("Dropping duplicate batch entry {}", item.input);
                }
                first
            })
            .collect();

        let mut results: Vec<(usize, String, Option<Result<VideoOutcome>>)> =
            stream::iter(items.into_iter().enumerate())
                .map(move |(index, item)| async move {
                    if cancel.is_cancelled() {
                        return (index, item.input, None);
                    }
                    let (video_id, outcome) = match extract_video_id(&item.input) {
                        Some(id) => {
                            let outcome = self.ingest_source(&id, item.title.as_deref(), owner_id).await;
                            (id, outcome)
                        }
                        None => (
                            item.input.clone(),
                            Err(KbError::InvalidInput(format!("Not a video URL or id: {}", item.input))),
                        ),
                    };
                    (index, video_id, Some(outcome))
                })
                .buffer_unordered(self.max_concurrent_videos)
                .collect()
                .await;

        results.sort_by_key(|(index, _, _)| *index);

        let mut report = BatchReport::default();
        for (_, video_id, outcome) in results {
            match outcome {
                None => report.cancelled.push(video_id),
                Some(Ok(VideoOutcome::Ingested { chunks })) => report.succeeded.push((video_id, chunks)),
                Some(Ok(VideoOutcome::Skipped { .. })) => report.skipped.push(video_id),
                Some(Err(e)) => {
                    error!("Failed to ingest {}: {}", video_id, e);
                    report.failed.push(FailedVideo {
                        video_id,
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Fetch, chunk, embed and store one video.
    async fn ingest_source(&self, video_id: &str, title: Option<&str>, owner_id: &str) -> Result<VideoOutcome> {
        let segments = match self
            .retry
            .run("transcript fetch", || self.fetcher.fetch(video_id))
            .await
        {
            Ok(segments) => segments,
            Err(KbError::NotAvailable(reason)) => {
                info!("Skipping {}: {}", video_id, reason);
                return Ok(VideoOutcome::Skipped { reason });
            }
            Err(e) => return Err(e),
        };
        debug!("{}: transcript fetched ({} segments)", video_id, segments.len());

        let chunks = self.chunker.chunk(&segments);
        if chunks.is_empty() {
            info!("Skipping {}: transcript has no text", video_id);
            return Ok(VideoOutcome::Skipped {
                reason: "transcript has no text".to_string(),
            });
        }
        debug!("{}: chunked into {} chunks", video_id, chunks.len());

        let mut pending = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            if self.dedupe && self.store.contains(owner_id, video_id, chunk.start_seconds).await? {
                debug!("{}: chunk at {:.1}s already stored", video_id, chunk.start_seconds);
                continue;
            }
            pending.push(chunk);
        }
        if pending.is_empty() {
            info!("Ingested {}: nothing new to store", video_id);
            return Ok(VideoOutcome::Ingested { chunks: 0 });
        }

        let texts: Vec<String> = pending.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self
            .retry
            .run("embedding", || self.embedder.embed_batch(&texts))
            .await?;
        if embeddings.len() != pending.len() {
            return Err(KbError::provider(
                "embedding",
                format!("Expected {} embeddings, got {}", pending.len(), embeddings.len()),
            ));
        }
        debug!("{}: embedded {} chunks", video_id, embeddings.len());

        let source_title = title.unwrap_or(video_id);
        let mut written = 0;

        for (chunk, embedding) in pending.into_iter().zip(embeddings) {
            let record = KnowledgeChunk::new(
                owner_id,
                chunk.text,
                embedding,
                ChunkMetadata {
                    source_id: video_id.to_string(),
                    source_title: source_title.to_string(),
                    start_offset_seconds: chunk.start_seconds,
                },
            );
            self.store.insert(&record).await?;
            written += 1;
        }

        info!("Ingested {}: {} chunks stored", video_id, written);
        Ok(VideoOutcome::Ingested { chunks: written })
    }
}

fn parse_video(video_url: &str) -> Result<String> {
    extract_video_id(video_url)
        .ok_or_else(|| KbError::InvalidInput(format!("Not a video URL or id: {}", video_url)))
}

fn validate_owner(owner_id: &str) -> Result<()> {
    if owner_id.trim().is_empty() {
        return Err(KbError::InvalidInput("Owner id must not be empty".to_string()));
    }
    Ok(())
}

fn log_report(owner_id: &str, report: &BatchReport) {
    info!(
        "Batch for {} done: {} ingested ({} chunks), {} skipped, {} failed, {} cancelled",
        owner_id,
        report.succeeded.len(),
        report.chunks_written(),
        report.skipped.len(),
        report.failed.len(),
        report.cancelled.len()
    );
    if !report.failed.is_empty() {
        warn!("{} videos failed for {}", report.failed.len(), owner_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge_store::MemoryKnowledgeStore;
    use crate::transcript::TranscriptSegment;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};

    const A: &str = "aaaaaaaaaaa";
    const B: &str = "bbbbbbbbbbb";
    const C: &str = "ccccccccccc";

    enum Script {
        Segments(Vec<TranscriptSegment>),
        Missing,
        Broken,
        /// Fails transiently this many times, then returns the segments.
        Flaky(usize, Vec<TranscriptSegment>),
    }

    #[derive(Default)]
    struct FakeFetcher {
        scripts: HashMap<String, Script>,
        calls: AtomicUsize,
    }

    impl FakeFetcher {
        fn with(mut self, id: &str, script: Script) -> Self {
            self.scripts.insert(id.to_string(), script);
            self
        }
    }

    #[async_trait]
    impl TranscriptFetcher for FakeFetcher {
        async fn fetch(&self, video_id: &str) -> Result<Vec<TranscriptSegment>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.scripts.get(video_id) {
                Some(Script::Segments(s)) => Ok(s.clone()),
                Some(Script::Missing) | None => Err(KbError::NotAvailable(video_id.to_string())),
                Some(Script::Broken) => Err(KbError::provider("transcript", "401 Unauthorized")),
                Some(Script::Flaky(failures, s)) => {
                    if call < *failures {
                        Err(KbError::transient("transcript", "503 Service Unavailable"))
                    } else {
                        Ok(s.clone())
                    }
                }
            }
        }
    }

    /// Two-dimensional embedder; fails on texts containing "poison".
    struct FakeEmbedder;

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if text.contains("poison") {
                return Err(KbError::provider("fake", "content rejected"));
            }
            Ok(vec![1.0, text.len() as f32 / 1000.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let mut out = Vec::new();
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    struct FakeResolver(Vec<&'static str>);

    #[async_trait]
    impl ChannelResolver for FakeResolver {
        async fn resolve_channel(&self, channel_url: &str) -> Result<String> {
            if channel_url.contains("missing") {
                return Err(KbError::NotFound(channel_url.to_string()));
            }
            Ok("UCfake".to_string())
        }

        async fn list_top_videos(&self, _channel_id: &str, max_count: usize) -> Result<Vec<VideoRef>> {
            Ok(self
                .0
                .iter()
                .take(max_count)
                .map(|id| VideoRef {
                    id: id.to_string(),
                    title: Some(format!("Title {}", id)),
                })
                .collect())
        }
    }

    fn short_transcript(tag: &str) -> Vec<TranscriptSegment> {
        vec![
            TranscriptSegment::new(0.0, format!("{} opening thoughts on habits", tag)),
            TranscriptSegment::new(12.0, format!("{} why consistency beats intensity", tag)),
        ]
    }

    /// 60 segments of 10 words, one every 1.5 seconds.
    fn six_hundred_words() -> Vec<TranscriptSegment> {
        (0..60)
            .map(|i| {
                let text = (0..10).map(|w| format!("s{}w{}", i, w)).collect::<Vec<_>>().join(" ");
                TranscriptSegment::new(i as f64 * 1.5, text)
            })
            .collect()
    }

    fn orchestrator(fetcher: FakeFetcher, store: Arc<MemoryKnowledgeStore>) -> Orchestrator {
        Orchestrator::with_components(Arc::new(fetcher), Arc::new(FakeEmbedder), store)
            .with_retry(RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2)))
            .with_resolver(Arc::new(FakeResolver(vec![A, B, C])))
    }

    #[tokio::test]
    async fn test_end_to_end_six_hundred_words() {
        let store = Arc::new(MemoryKnowledgeStore::new());
        let orch = orchestrator(FakeFetcher::default().with(A, Script::Segments(six_hundred_words())), store.clone());

        let outcome = orch
            .ingest_video(&format!("https://www.youtube.com/watch?v={}", A), "coach-x")
            .await
            .unwrap();

        assert_eq!(outcome, VideoOutcome::Ingested { chunks: 3 });
        assert_eq!(store.count("coach-x").await.unwrap(), 3);
        for offset in [0.0, 30.0, 60.0] {
            assert!(store.contains("coach-x", A, offset).await.unwrap());
        }
        assert_eq!(store.count("coach-y").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_transcript_is_skipped() {
        let store = Arc::new(MemoryKnowledgeStore::new());
        let orch = orchestrator(FakeFetcher::default().with(A, Script::Missing), store.clone());

        let outcome = assert_ok!(orch.ingest_video(A, "coach-x").await);
        assert!(matches!(outcome, VideoOutcome::Skipped { .. }));
        assert_eq!(store.count("coach-x").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_blank_transcript_is_skipped() {
        let store = Arc::new(MemoryKnowledgeStore::new());
        let blank = vec![TranscriptSegment::new(0.0, "   "), TranscriptSegment::new(3.0, "")];
        let orch = orchestrator(FakeFetcher::default().with(A, Script::Segments(blank)), store.clone());

        let outcome = orch.ingest_video(A, "coach-x").await.unwrap();
        assert!(matches!(outcome, VideoOutcome::Skipped { .. }));
        assert_eq!(store.count("coach-x").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_input() {
        let store = Arc::new(MemoryKnowledgeStore::new());
        let orch = orchestrator(FakeFetcher::default(), store);

        let err = assert_err!(orch.ingest_video("https://example.com/nothing", "coach-x").await);
        assert!(matches!(err, KbError::InvalidInput(_)));

        let err = assert_err!(orch.ingest_video(A, "  ").await);
        assert!(matches!(err, KbError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_embedding_error_aborts_video() {
        let store = Arc::new(MemoryKnowledgeStore::new());
        let segments = vec![
            TranscriptSegment::new(0.0, "good advice here"),
            TranscriptSegment::new(40.0, "poison pill"),
        ];
        let orch = orchestrator(FakeFetcher::default().with(A, Script::Segments(segments)), store.clone());

        let err = orch.ingest_video(A, "coach-x").await.unwrap_err();
        assert!(matches!(err, KbError::Provider { .. }));
    }

    #[tokio::test]
    async fn test_store_error_propagates() {
        let store = Arc::new(MemoryKnowledgeStore::new());
        // Fix the store to three dimensions so the two-dimensional fake embeddings are rejected.
        store
            .insert(&KnowledgeChunk::new(
                "other",
                "seed",
                vec![1.0, 0.0, 0.0],
                ChunkMetadata {
                    source_id: "seed".to_string(),
                    source_title: "Seed".to_string(),
                    start_offset_seconds: 0.0,
                },
            ))
            .await
            .unwrap();
        let orch = orchestrator(FakeFetcher::default().with(A, Script::Segments(short_transcript("a"))), store);

        let err = orch.ingest_video(A, "coach-x").await.unwrap_err();
        assert!(err.is_store());
    }

    #[tokio::test]
    async fn test_reingestion_is_deduplicated() {
        let store = Arc::new(MemoryKnowledgeStore::new());
        let orch = orchestrator(
            FakeFetcher::default().with(A, Script::Segments(six_hundred_words())),
            store.clone(),
        );

        orch.ingest_video(A, "coach-x").await.unwrap();
        let second = orch.ingest_video(A, "coach-x").await.unwrap();

        assert_eq!(second, VideoOutcome::Ingested { chunks: 0 });
        assert_eq!(store.count("coach-x").await.unwrap(), 3);

        let replaced = orch.ingest_video_replacing(A, "coach-x").await.unwrap();
        assert_eq!(replaced, VideoOutcome::Ingested { chunks: 3 });
        assert_eq!(store.count("coach-x").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_transient_fetch_errors_are_retried() {
        let store = Arc::new(MemoryKnowledgeStore::new());
        let fetcher = FakeFetcher::default().with(A, Script::Flaky(2, short_transcript("a")));
        let orch = orchestrator(fetcher, store.clone());

        let outcome = orch.ingest_video(A, "coach-x").await.unwrap();
        assert!(matches!(outcome, VideoOutcome::Ingested { chunks } if chunks > 0));
    }

    #[tokio::test]
    async fn test_channel_partial_failure_isolation() {
        let store = Arc::new(MemoryKnowledgeStore::new());
        let fetcher = FakeFetcher::default()
            .with(A, Script::Segments(short_transcript("a")))
            .with(B, Script::Broken)
            .with(C, Script::Segments(short_transcript("c")));
        let orch = orchestrator(fetcher, store.clone());

        let report = orch
            .ingest_channel("https://www.youtube.com/@coach", "coach-x", None, &CancellationToken::new())
            .await
            .unwrap();

        let succeeded: Vec<&str> = report.succeeded.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(succeeded, vec![A, C]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].video_id, B);
        assert_eq!(report.chunks_written(), store.count("coach-x").await.unwrap());

        let sources = store.list_sources("coach-x").await.unwrap();
        assert!(sources.iter().any(|s| s.source_title == format!("Title {}", A)));
    }

    #[tokio::test]
    async fn test_channel_skips_missing_transcripts() {
        let store = Arc::new(MemoryKnowledgeStore::new());
        let fetcher = FakeFetcher::default()
            .with(A, Script::Missing)
            .with(B, Script::Segments(short_transcript("b")))
            .with(C, Script::Missing);
        let orch = orchestrator(fetcher, store);

        let report = orch
            .ingest_channel("https://www.youtube.com/@coach", "coach-x", None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.skipped, vec![A.to_string(), C.to_string()]);
        assert_eq!(report.succeeded.len(), 1);
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_batch_keeps_input_order() {
        let store = Arc::new(MemoryKnowledgeStore::new());
        let fetcher = FakeFetcher::default()
            .with(A, Script::Segments(short_transcript("a")))
            .with(B, Script::Segments(six_hundred_words()))
            .with(C, Script::Segments(short_transcript("c")));
        let orch = orchestrator(fetcher, store).with_concurrency(3);

        let urls = vec![C.to_string(), A.to_string(), "garbage".to_string(), B.to_string()];
        let report = orch
            .ingest_batch(&urls, "coach-x", &CancellationToken::new())
            .await
            .unwrap();

        let succeeded: Vec<&str> = report.succeeded.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(succeeded, vec![C, A, B]);
        assert_eq!(report.failed[0].video_id, "garbage");
        assert_eq!(report.attempted(), 4);
    }

    #[tokio::test]
    async fn test_repeated_batch_entries_are_ingested_once() {
        let store = Arc::new(MemoryKnowledgeStore::new());
        let fetcher = FakeFetcher::default()
            .with(A, Script::Segments(six_hundred_words()))
            .with(B, Script::Segments(short_transcript("b")));
        let orch = orchestrator(fetcher, store.clone()).with_concurrency(4);

        let urls = vec![
            A.to_string(),
            format!("https://youtu.be/{}", A),
            B.to_string(),
            format!("https://www.youtube.com/watch?v={}", A),
        ];
        let report = orch
            .ingest_batch(&urls, "coach-x", &CancellationToken::new())
            .await
            .unwrap();

        let succeeded: Vec<&str> = report.succeeded.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(succeeded, vec![A, B]);
        assert_eq!(report.chunks_written(), 4);
        assert_eq!(store.count("coach-x").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_channel_max_videos() {
        let store = Arc::new(MemoryKnowledgeStore::new());
        let fetcher = FakeFetcher::default()
            .with(A, Script::Segments(short_transcript("a")))
            .with(B, Script::Segments(short_transcript("b")));
        let orch = orchestrator(fetcher, store);

        let report = orch
            .ingest_channel("https://www.youtube.com/@coach", "coach-x", Some(1), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.attempted(), 1);
    }

    #[tokio::test]
    async fn test_channel_resolution_error_propagates() {
        let store = Arc::new(MemoryKnowledgeStore::new());
        let orch = orchestrator(FakeFetcher::default(), store);

        let err = orch
            .ingest_channel("https://www.youtube.com/@missing", "coach-x", None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, KbError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cancelled_batch_starts_nothing() {
        let store = Arc::new(MemoryKnowledgeStore::new());
        let fetcher = FakeFetcher::default().with(A, Script::Segments(short_transcript("a")));
        let orch = orchestrator(fetcher, store.clone());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = orch
            .ingest_batch(&[A.to_string(), B.to_string()], "coach-x", &cancel)
            .await
            .unwrap();

        assert_eq!(report.cancelled, vec![A.to_string(), B.to_string()]);
        assert_eq!(report.attempted(), 0);
        assert_eq!(store.count("coach-x").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_channel_is_not_resolved() {
        let store = Arc::new(MemoryKnowledgeStore::new());
        let orch = orchestrator(FakeFetcher::default(), store);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = orch
            .ingest_channel("https://www.youtube.com/@coach", "coach-x", None, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, KbError::Cancelled));
    }

    #[tokio::test]
    async fn test_ensure_owner_knowledge() {
        let store = Arc::new(MemoryKnowledgeStore::new());
        let fetcher = FakeFetcher::default().with(A, Script::Segments(short_transcript("a")));
        let orch = orchestrator(fetcher, store.clone());
        let cancel = CancellationToken::new();

        let mut profile = crate::persona::sample_profile("coach-x");
        assert!(orch.ensure_owner_knowledge(&profile, &cancel).await.unwrap().is_none());

        profile.channel_url = Some("https://www.youtube.com/@coach".to_string());
        let report = orch.ensure_owner_knowledge(&profile, &cancel).await.unwrap();
        assert!(report.is_some_and(|r| r.chunks_written() > 0));

        // Already seeded.
        assert!(orch.ensure_owner_knowledge(&profile, &cancel).await.unwrap().is_none());
    }
}
