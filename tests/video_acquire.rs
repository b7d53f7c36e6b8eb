//! Audio/video jobs against a scripted video index.

mod common;

use std::sync::Arc;
use std::time::Duration;

use sisyphe_media::media::{
    AcquireConfig, MediaError, MediaKind, Partition, RateLimiter, ResolutionTier, VideoAcquirer,
    WorkArea,
};
use tempfile::TempDir;

use common::{audio_only, files_under, manifest, muxed, StubIndex, MIB};

fn acquirer(tmp: &TempDir, index: &Arc<StubIndex>, max_bytes: u64) -> VideoAcquirer {
    let work_area = Arc::new(WorkArea::new(Some(tmp.path())).unwrap());
    VideoAcquirer::new(
        index.clone(),
        Arc::new(RateLimiter::new(Duration::ZERO)),
        work_area,
        AcquireConfig {
            max_bytes,
            ..AcquireConfig::default()
        },
    )
}

fn work_files(tmp: &TempDir) -> Vec<std::path::PathBuf> {
    files_under(tmp.path())
}

#[tokio::test]
async fn test_video_download_succeeds_within_ceiling() {
    let tmp = TempDir::new().unwrap();
    let index = Arc::new(StubIndex::new(
        manifest(
            "abc123",
            120,
            vec![muxed("18", 360, 8 * MIB), muxed("22", 720, 30 * MIB)],
        ),
        4096,
    ));
    let acquirer = acquirer(&tmp, &index, 75 * MIB);

    let artifact = acquirer
        .resolve_and_download("https://youtu.be/abc123", MediaKind::Video, None)
        .await
        .unwrap();

    assert_eq!(artifact.kind, MediaKind::Video);
    assert_eq!(artifact.size_bytes, 4096);
    assert_eq!(artifact.title.as_deref(), Some("Title of abc123"));
    assert_eq!(artifact.path.extension().unwrap(), "mp4");
    assert!(artifact.path.exists());
    assert_eq!(index.last_format.lock().as_deref(), Some("18"));
    assert_eq!(index.resolves(), 1);
    assert_eq!(index.transfers(), 1);
}

#[tokio::test]
async fn test_audio_download_uses_audio_partition() {
    let tmp = TempDir::new().unwrap();
    let index = Arc::new(StubIndex::new(
        manifest(
            "tune",
            200,
            vec![muxed("18", 360, 8 * MIB), audio_only("140", 3 * MIB), audio_only("249", MIB)],
        ),
        2048,
    ));
    let acquirer = acquirer(&tmp, &index, 75 * MIB);

    let artifact = acquirer
        .resolve_and_download("https://www.youtube.com/watch?v=tune", MediaKind::Audio, None)
        .await
        .unwrap();

    assert_eq!(artifact.kind, MediaKind::Audio);
    assert_eq!(artifact.path.extension().unwrap(), "mp3");
    assert_eq!(index.last_format.lock().as_deref(), Some("249"));
    let dest = index.last_dest.lock().clone().unwrap();
    assert!(dest.parent().unwrap().ends_with(Partition::Audio.dir_name()));
}

#[tokio::test]
async fn test_hint_240p_never_selects_higher_stream() {
    let tmp = TempDir::new().unwrap();
    let index = Arc::new(StubIndex::new(
        manifest(
            "tiers",
            60,
            vec![muxed("22", 720, 20 * MIB), muxed("133", 240, 2 * MIB), muxed("18", 360, 5 * MIB)],
        ),
        1024,
    ));
    let acquirer = acquirer(&tmp, &index, 75 * MIB);

    acquirer
        .resolve_and_download(
            "https://youtu.be/tiers",
            MediaKind::Video,
            Some(ResolutionTier::P240),
        )
        .await
        .unwrap();

    assert_eq!(index.last_format.lock().as_deref(), Some("133"));
}

#[tokio::test]
async fn test_estimate_above_ceiling_fails_without_transfer() {
    let tmp = TempDir::new().unwrap();
    let index = Arc::new(StubIndex::new(
        manifest("big", 600, vec![muxed("18", 240, 90_000_000)]),
        1024,
    ));
    let acquirer = acquirer(&tmp, &index, 75 * MIB);

    let err = acquirer
        .resolve_and_download("https://youtu.be/big", MediaKind::Video, None)
        .await
        .unwrap_err();

    assert_eq!(err, MediaError::TooLarge { size: 90_000_000, limit: 75 * MIB });
    assert_eq!(index.transfers(), 0);
    assert!(work_files(&tmp).is_empty());
}

#[tokio::test]
async fn test_oversized_download_is_deleted() {
    let tmp = TempDir::new().unwrap();
    let index = Arc::new(StubIndex::new(
        manifest("liar", 60, vec![muxed("18", 360, 100 * 1024)]),
        (2 * MIB) as usize,
    ));
    let acquirer = acquirer(&tmp, &index, MIB);

    let err = acquirer
        .resolve_and_download("https://youtu.be/liar", MediaKind::Video, None)
        .await
        .unwrap_err();

    assert_eq!(err, MediaError::TooLarge { size: 2 * MIB, limit: MIB });
    assert_eq!(index.transfers(), 1);
    assert!(work_files(&tmp).is_empty());
    let dest = index.last_dest.lock().clone().unwrap();
    assert!(!dest.exists());
}

#[tokio::test]
async fn test_empty_download_is_corrupt() {
    let tmp = TempDir::new().unwrap();
    let index = Arc::new(StubIndex::new(
        manifest("hollow", 60, vec![muxed("18", 360, MIB)]),
        0,
    ));
    let acquirer = acquirer(&tmp, &index, 75 * MIB);

    let err = acquirer
        .resolve_and_download("https://youtu.be/hollow", MediaKind::Video, None)
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::CorruptContent(_)), "{err:?}");
    assert!(work_files(&tmp).is_empty());
}

#[tokio::test]
async fn test_unresolvable_source_is_unavailable() {
    let tmp = TempDir::new().unwrap();
    let index = Arc::new(
        StubIndex::new(manifest("gone", 60, vec![muxed("18", 360, MIB)]), 1024)
            .with_unavailable(&["https://www.youtube.com/watch?v=gone"]),
    );
    let acquirer = acquirer(&tmp, &index, 75 * MIB);

    let err = acquirer
        .resolve_and_download("https://youtu.be/gone", MediaKind::Video, None)
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::SourceUnavailable(_)), "{err:?}");
    assert_eq!(index.transfers(), 0);
}

#[tokio::test]
async fn test_manifest_without_streams_is_unsupported() {
    let tmp = TempDir::new().unwrap();
    let index = Arc::new(StubIndex::new(manifest("bare", 60, Vec::new()), 1024));
    let acquirer = acquirer(&tmp, &index, 75 * MIB);

    let err = acquirer
        .resolve_and_download("https://youtu.be/bare", MediaKind::Audio, None)
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::UnsupportedContent(_)), "{err:?}");
}

#[tokio::test]
async fn test_image_kind_is_invalid_input() {
    let tmp = TempDir::new().unwrap();
    let index = Arc::new(StubIndex::new(manifest("x", 60, Vec::new()), 1024));
    let acquirer = acquirer(&tmp, &index, 75 * MIB);

    let err = acquirer
        .resolve_and_download("https://youtu.be/x", MediaKind::Image, None)
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::InvalidInput(_)));
    assert_eq!(index.resolves(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_jobs_share_rate_limiter() {
    let tmp = TempDir::new().unwrap();
    let index = Arc::new(StubIndex::new(
        manifest("rl", 60, vec![muxed("18", 360, MIB)]),
        128,
    ));
    let work_area = Arc::new(WorkArea::new(Some(tmp.path())).unwrap());
    let acquirer = VideoAcquirer::new(
        index.clone(),
        Arc::new(RateLimiter::new(Duration::from_secs(2))),
        work_area,
        AcquireConfig::default(),
    );

    let start = tokio::time::Instant::now();
    let (a, b) = tokio::join!(
        acquirer.resolve_and_download("https://youtu.be/rl", MediaKind::Video, None),
        acquirer.resolve_and_download("https://youtu.be/rl", MediaKind::Video, None),
    );
    a.unwrap();
    b.unwrap();

    // two jobs, two gated calls each: four slots spaced 2 s apart
    assert!(start.elapsed() >= Duration::from_secs(6));
    assert_eq!(index.transfers(), 2);
}
