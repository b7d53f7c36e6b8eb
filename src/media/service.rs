//! Request-level facade over the fetch and download paths.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn, Instrument};

use super::acquire::VideoAcquirer;
use super::error::MediaError;
use super::fetch::{FetchedImage, ImageFetcher};
use super::index::{VideoHit, VideoIndex};
use super::manifest::ResolutionTier;
use super::ratelimit::RateLimiter;
use super::types::{AcquisitionRequest, Artifact, MediaKind, RequestSource};
use super::workarea::WorkArea;
use crate::config::MediaConfig;
use crate::logging::request_span;

/// Search hits tried in turn for a query-based audio/video request.
const MAX_QUERY_ATTEMPTS: usize = 3;

/// Turns a free-text query into candidate image URLs.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn candidates(&self, query: &str) -> Result<Vec<String>, MediaError>;
}

impl From<FetchedImage> for Artifact {
    fn from(image: FetchedImage) -> Self {
        Artifact {
            path: image.path,
            size_bytes: image.size_bytes,
            kind: MediaKind::Image,
            title: None,
        }
    }
}

/// One work area, one rate limiter, and the fetchers that share them.
pub struct MediaService {
    work_area: Arc<WorkArea>,
    limiter: Arc<RateLimiter>,
    images: ImageFetcher,
    videos: VideoAcquirer,
    candidates: Option<Arc<dyn CandidateSource>>,
    concurrency: usize,
    job_timeout: Duration,
    search_limit: usize,
}

impl MediaService {
    pub fn new(config: &MediaConfig, index: Arc<dyn VideoIndex>) -> Result<Self, MediaError> {
        let work_area = Arc::new(WorkArea::new(config.work_dir.as_deref())?);
        let limiter = Arc::new(RateLimiter::new(config.index_interval()));
        let images = ImageFetcher::new(config.fetch_config(), Arc::clone(&work_area))?;
        let videos = VideoAcquirer::new(
            index,
            Arc::clone(&limiter),
            Arc::clone(&work_area),
            config.acquire_config(),
        );

        info!(
            root = %work_area.root().display(),
            concurrency = config.concurrency,
            max_delivery_mb = config.max_delivery_bytes / (1024 * 1024),
            "media service ready"
        );

        Ok(Self {
            work_area,
            limiter,
            images,
            videos,
            candidates: None,
            concurrency: config.concurrency.max(1),
            job_timeout: config.job_timeout(),
            search_limit: config.search_limit.max(1),
        })
    }

    /// Attach the search service used for query-based image requests.
    pub fn with_candidates(mut self, source: Arc<dyn CandidateSource>) -> Self {
        self.candidates = Some(source);
        self
    }

    pub fn work_area(&self) -> &Arc<WorkArea> {
        &self.work_area
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Fetch images with the configured concurrency unless `limit` is given.
    pub async fn fetch_all(&self, urls: &[String], limit: Option<usize>) -> Vec<FetchedImage> {
        self.images
            .fetch_all(urls, limit.unwrap_or(self.concurrency))
            .await
    }

    /// Download one audio/video source, bounded by the job timeout.
    ///
    /// When the timeout fires the job future is dropped, which removes its
    /// directory and kills the child process.
    pub async fn resolve_and_download(
        &self,
        url: &str,
        kind: MediaKind,
        hint: Option<ResolutionTier>,
    ) -> Result<Artifact, MediaError> {
        match tokio::time::timeout(
            self.job_timeout,
            self.videos.resolve_and_download(url, kind, hint),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(url = %url, timeout_secs = self.job_timeout.as_secs(), "download job timed out");
                Err(MediaError::Timeout(format!(
                    "job exceeded {}s",
                    self.job_timeout.as_secs()
                )))
            }
        }
    }

    /// Search the indexing service, through the shared rate limiter.
    pub async fn search_videos(
        &self,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<VideoHit>, MediaError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MediaError::InvalidInput("empty search query".to_string()));
        }
        self.limiter.acquire().await;
        self.videos
            .index()
            .search(query, limit.unwrap_or(self.search_limit))
            .await
    }

    /// Serve one user request.
    ///
    /// An empty `Ok` means nothing usable was found; single-source failures
    /// come back as the typed error.
    pub async fn handle(&self, request: &AcquisitionRequest) -> Result<Vec<Artifact>, MediaError> {
        let span = request_span(request);
        self.dispatch(request).instrument(span).await
    }

    async fn dispatch(&self, request: &AcquisitionRequest) -> Result<Vec<Artifact>, MediaError> {
        match (&request.source, request.kind) {
            (RequestSource::Url(url), MediaKind::Image) => {
                let image = self.images.fetch(url).await?;
                Ok(vec![image.into()])
            }
            (RequestSource::Query(query), MediaKind::Image) => {
                let source = self.candidates.as_ref().ok_or_else(|| {
                    MediaError::InvalidInput("no image search service configured".to_string())
                })?;
                let urls = source.candidates(query).await?;
                let fetched = self.fetch_all(&urls, None).await;
                if fetched.is_empty() {
                    info!(query = %query, candidates = urls.len(), "no usable images found");
                }
                Ok(fetched.into_iter().map(Artifact::from).collect())
            }
            (RequestSource::Url(url), kind) => {
                let artifact = self
                    .resolve_and_download(url, kind, request.resolution_hint)
                    .await?;
                Ok(vec![artifact])
            }
            (RequestSource::Query(query), kind) => {
                let hits = self.search_videos(query, None).await?;
                let mut last_error = None;
                for hit in hits.iter().take(MAX_QUERY_ATTEMPTS) {
                    match self
                        .resolve_and_download(&hit.url, kind, request.resolution_hint)
                        .await
                    {
                        Ok(artifact) => return Ok(vec![artifact]),
                        Err(e) => {
                            warn!(url = %hit.url, title = %hit.title, error = %e, "search hit skipped");
                            last_error = Some(e);
                        }
                    }
                }
                match last_error {
                    Some(e) => Err(e),
                    None => {
                        info!(query = %query, "search returned no hits");
                        Ok(Vec::new())
                    }
                }
            }
        }
    }

    /// Release one path, or the whole work area when `path` is `None`.
    pub async fn release(&self, path: Option<&Path>) -> usize {
        self.work_area.release(path).await
    }
}
