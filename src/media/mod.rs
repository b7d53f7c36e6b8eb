//! Media acquisition
//!
//! Turns user requests into validated files on local disk:
//!
//! - **WorkArea**: one temporary root split into `images/`, `video/` and
//!   `audio/` partitions; issues collision-free paths and releases them
//!   - Pending paths are deleted on drop unless committed
//!   - Release is idempotent and never touches paths outside the root
//!
//! - **ImageFetcher**: HTTP image download with validation
//!   - Private/loopback hosts refused unless configured otherwise
//!   - Content-type check, streaming size ceiling, magic-byte sniffing
//!   - Bounded-concurrency batches that tolerate per-URL failures
//!
//! - **VideoAcquirer**: audio/video jobs against a [`VideoIndex`]
//!   - Manifest resolution and format negotiation under a resolution cap
//!   - Shared [`RateLimiter`] in front of the indexing service
//!   - Size ceiling checked before and after transfer
//!
//! - **MediaService**: the request-level entry point tying these together,
//!   plus [`deliver_and_release`] for the hand-off to a chat transport.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sisyphe_media::config::MediaConfig;
//! use sisyphe_media::media::{AcquisitionRequest, MediaKind, MediaService, YtDlpIndex};
//!
//! let config = MediaConfig::default();
//! let service = MediaService::new(&config, Arc::new(YtDlpIndex::new("yt-dlp")))?;
//! let request = AcquisitionRequest::from_url(MediaKind::Audio, "https://youtu.be/abc");
//! for artifact in service.handle(&request).await? {
//!     println!("{} ({} bytes)", artifact.path.display(), artifact.size_bytes);
//!     service.release(Some(&artifact.path)).await;
//! }
//! ```

pub mod acquire;
pub mod batch;
pub mod delivery;
pub mod error;
pub mod fetch;
pub mod index;
pub mod manifest;
pub mod ratelimit;
pub mod service;
pub mod sniff;
pub mod types;
pub mod workarea;

// Re-export commonly used types
pub use acquire::{
    AcquireConfig, VideoAcquirer, DEFAULT_JOB_TIMEOUT, DEFAULT_MAX_DELIVERY_BYTES,
};
pub use batch::{BatchOutcome, DEFAULT_CONCURRENCY};
pub use delivery::{deliver_and_release, DeliveryError, DeliveryReport, Transport};
pub use error::{MediaError, MediaErrorKind};
pub use fetch::{
    validate_url, FetchConfig, FetchResult, FetchedImage, HostPolicy, ImageFetcher,
    DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_IMAGE_BYTES, DEFAULT_MAX_REDIRECTS, MAX_URL_LENGTH,
};
pub use index::{
    canonical_video_url, parse_manifest, parse_search, TransferRequest, VideoHit, VideoIndex,
    YtDlpIndex,
};
pub use manifest::{
    negotiate, Manifest, NegotiationPolicy, ResolutionTier, Selection, StreamDescriptor,
    StreamKind,
};
pub use ratelimit::{RateLimiter, DEFAULT_MIN_INTERVAL};
pub use service::{CandidateSource, MediaService};
pub use sniff::ImageFormat;
pub use types::{AcquisitionRequest, Artifact, MediaKind, Partition, RequestSource};
pub use workarea::{PendingPath, WorkArea};
