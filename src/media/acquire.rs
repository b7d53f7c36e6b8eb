//! Audio/video acquisition.
//!
//! A [`DownloadJob`] walks `ResolvingManifest → NegotiatingFormat →
//! Downloading → Validating → Done`, or drops into `Failed` from any
//! non-terminal state. Every call that reaches the indexing service first
//! passes the shared [`RateLimiter`]; concurrent jobs serialize on that gate
//! only, never on the transfer itself.
//!
//! The job directory lives in a [`PendingPath`](super::workarea::PendingPath)
//! until validation succeeds, so any failure (or a dropped future) leaves no
//! partial artifact behind.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::error::MediaError;
use super::index::{canonical_video_url, TransferRequest, VideoIndex};
use super::manifest::{negotiate, NegotiationPolicy, ResolutionTier};
use super::ratelimit::RateLimiter;
use super::types::{Artifact, MediaKind};
use super::workarea::WorkArea;

/// Default delivery ceiling for audio/video artifacts.
pub const DEFAULT_MAX_DELIVERY_BYTES: u64 = 75 * 1024 * 1024;

/// Default overall job timeout enforced by the caller.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(300);

/// States of a download job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum JobState {
    ResolvingManifest,
    NegotiatingFormat,
    Downloading,
    Validating,
    Done,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }
}

/// Transient bookkeeping for one audio/video request.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct DownloadJob {
    pub url: String,
    pub target_kind: MediaKind,
    pub target_tier: Option<ResolutionTier>,
    pub estimated_size_bytes: Option<u64>,
    pub final_path: Option<PathBuf>,
    state: JobState,
}

impl DownloadJob {
    fn new(url: String, target_kind: MediaKind, hint: Option<ResolutionTier>) -> Self {
        Self {
            url,
            target_kind,
            target_tier: hint,
            estimated_size_bytes: None,
            final_path: None,
            state: JobState::ResolvingManifest,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    fn advance(&mut self, next: JobState) {
        debug_assert!(!self.state.is_terminal(), "job already finished");
        debug!(url = %self.url, from = ?self.state, to = ?next, "download job transition");
        self.state = next;
    }

    fn fail(&mut self, err: MediaError) -> MediaError {
        warn!(
            url = %self.url,
            state = ?self.state,
            kind = %err.kind(),
            error = %err,
            "download job failed"
        );
        self.state = JobState::Failed;
        err
    }
}

/// Audio/video acquisition settings.
#[derive(Debug, Clone)]
pub struct AcquireConfig {
    /// Hard ceiling on the delivered file, checked before and after transfer.
    pub max_bytes: u64,
    pub policy: NegotiationPolicy,
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_DELIVERY_BYTES,
            policy: NegotiationPolicy::default(),
        }
    }
}

/// Drives download jobs against a [`VideoIndex`].
#[derive(Clone)]
pub struct VideoAcquirer {
    index: Arc<dyn VideoIndex>,
    limiter: Arc<RateLimiter>,
    work_area: Arc<WorkArea>,
    config: AcquireConfig,
}

impl VideoAcquirer {
    pub fn new(
        index: Arc<dyn VideoIndex>,
        limiter: Arc<RateLimiter>,
        work_area: Arc<WorkArea>,
        config: AcquireConfig,
    ) -> Self {
        Self {
            index,
            limiter,
            work_area,
            config,
        }
    }

    pub fn config(&self) -> &AcquireConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<dyn VideoIndex> {
        &self.index
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Resolve `url`, pick a format for `kind`, download and validate it.
    ///
    /// On success the caller owns delivery and must eventually release the
    /// returned path. On failure nothing is left on disk.
    pub async fn resolve_and_download(
        &self,
        url: &str,
        kind: MediaKind,
        hint: Option<ResolutionTier>,
    ) -> Result<Artifact, MediaError> {
        if kind == MediaKind::Image {
            return Err(MediaError::InvalidInput(
                "images are fetched, not downloaded from a stream".to_string(),
            ));
        }
        let url = canonical_video_url(url);
        if url.is_empty() {
            return Err(MediaError::InvalidInput("empty video URL".to_string()));
        }

        let mut job = DownloadJob::new(url, kind, hint);
        self.run(&mut job).await.map_err(|e| job.fail(e))
    }

    async fn run(&self, job: &mut DownloadJob) -> Result<Artifact, MediaError> {
        let limit = self.config.max_bytes;

        // ResolvingManifest
        self.limiter.acquire().await;
        let manifest = self.index.resolve(&job.url).await.map_err(|e| match e {
            MediaError::Timeout(_) | MediaError::InvalidInput(_) => e,
            other => MediaError::SourceUnavailable(other.to_string()),
        })?;

        job.advance(JobState::NegotiatingFormat);
        let selection = negotiate(&manifest, job.target_kind, job.target_tier, &self.config.policy)?;
        job.target_tier = selection.tier;
        job.estimated_size_bytes = selection.estimated_size;
        info!(
            url = %job.url,
            title = %manifest.title,
            format = %selection.format_spec(),
            tier = ?selection.tier,
            estimated_mb = selection.estimated_size.map(|s| s / (1024 * 1024)),
            "format negotiated"
        );

        job.advance(JobState::Downloading);
        if let Some(estimate) = selection.estimated_size {
            if estimate > limit {
                return Err(MediaError::too_large(estimate, limit));
            }
        }

        let job_dir = self
            .work_area
            .pending_dir(job.target_kind.partition())
            .await?;
        self.limiter.acquire().await;
        let produced = self
            .index
            .transfer(TransferRequest {
                url: &job.url,
                selection: &selection,
                kind: job.target_kind,
                dest_dir: job_dir.path(),
                max_bytes: limit,
            })
            .await?;

        job.advance(JobState::Validating);
        if !self.work_area.contains(&produced) || !produced.starts_with(job_dir.path()) {
            return Err(MediaError::Unknown(format!(
                "indexing service wrote outside the job directory: {}",
                produced.display()
            )));
        }
        let size = tokio::fs::metadata(&produced)
            .await
            .map_err(|e| MediaError::CorruptContent(format!("downloaded file missing: {e}")))?
            .len();
        if size == 0 {
            return Err(MediaError::CorruptContent("downloaded file is empty".to_string()));
        }
        if size > limit {
            return Err(MediaError::too_large(size, limit));
        }

        job_dir.commit();
        job.final_path = Some(produced.clone());
        job.advance(JobState::Done);
        info!(
            url = %job.url,
            path = %produced.display(),
            size_mb = size / (1024 * 1024),
            state = ?job.state(),
            "download job finished"
        );

        Ok(Artifact {
            path: produced,
            size_bytes: size,
            kind: job.target_kind,
            title: Some(manifest.title),
        })
    }
}
