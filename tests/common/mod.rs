//! Shared fixtures: an in-process image server and a scripted video index.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Redirect};
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;

use sisyphe_media::config::MediaConfig;
use sisyphe_media::media::{
    Manifest, MediaError, MediaKind, StreamDescriptor, TransferRequest, VideoHit, VideoIndex,
};

pub const PNG: &[u8] = &[
    0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I', b'H', b'D', b'R', 0, 0,
];
pub const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F', 0, 1, 1];
pub const MIB: u64 = 1024 * 1024;

/// Concurrency observed by the `/slow/{n}` route.
#[derive(Debug, Default)]
pub struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
    served: AtomicUsize,
}

impl InFlight {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn served(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }
}

pub struct ImageServer {
    pub addr: SocketAddr,
    pub in_flight: Arc<InFlight>,
}

impl ImageServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

async fn slow_png(State(state): State<Arc<InFlight>>) -> impl IntoResponse {
    let now = state.current.fetch_add(1, Ordering::SeqCst) + 1;
    state.peak.fetch_max(now, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    state.current.fetch_sub(1, Ordering::SeqCst);
    state.served.fetch_add(1, Ordering::SeqCst);
    ([(CONTENT_TYPE, "image/png")], PNG.to_vec())
}

/// Serve the image fixtures on an ephemeral loopback port.
pub async fn spawn_image_server() -> ImageServer {
    let in_flight = Arc::new(InFlight::default());
    let app = Router::new()
        .route("/cat.png", get(|| async { ([(CONTENT_TYPE, "image/png")], PNG.to_vec()) }))
        .route("/dog.jpg", get(|| async { ([(CONTENT_TYPE, "image/jpeg")], JPEG.to_vec()) }))
        .route(
            "/mislabelled.jpg",
            get(|| async { ([(CONTENT_TYPE, "image/jpeg")], PNG.to_vec()) }),
        )
        .route(
            "/page.html",
            get(|| async { ([(CONTENT_TYPE, "text/html")], "<html><body>hi</body></html>") }),
        )
        .route(
            "/corrupt.png",
            get(|| async { ([(CONTENT_TYPE, "image/png")], b"definitely not a png".to_vec()) }),
        )
        .route(
            "/empty.png",
            get(|| async { ([(CONTENT_TYPE, "image/png")], Vec::<u8>::new()) }),
        )
        .route(
            "/huge.png",
            get(|| async {
                let mut body = PNG.to_vec();
                body.resize(2 * MIB as usize, 0);
                ([(CONTENT_TYPE, "image/png")], body)
            }),
        )
        .route("/moved.png", get(|| async { Redirect::temporary("/cat.png") }))
        .route("/slow/{n}", get(slow_png))
        .with_state(Arc::clone(&in_flight));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    ImageServer { addr, in_flight }
}

/// Media settings pointing at `dir`, with loopback hosts allowed and no
/// indexing cooldown.
pub fn test_config(dir: &Path) -> MediaConfig {
    MediaConfig {
        work_dir: Some(dir.to_path_buf()),
        max_image_bytes: MIB,
        fetch_timeout_secs: 5,
        index_interval_ms: 0,
        allow_private_hosts: true,
        ..MediaConfig::default()
    }
}

pub fn muxed(format_id: &str, height: u32, size_bytes: u64) -> StreamDescriptor {
    StreamDescriptor {
        format_id: format_id.to_string(),
        ext: "mp4".to_string(),
        height: Some(height),
        vcodec: Some("avc1".to_string()),
        acodec: Some("mp4a".to_string()),
        size_bytes: Some(size_bytes),
        bitrate_kbps: None,
    }
}

pub fn audio_only(format_id: &str, size_bytes: u64) -> StreamDescriptor {
    StreamDescriptor {
        format_id: format_id.to_string(),
        ext: "m4a".to_string(),
        height: None,
        vcodec: Some("none".to_string()),
        acodec: Some("mp4a".to_string()),
        size_bytes: Some(size_bytes),
        bitrate_kbps: None,
    }
}

pub fn manifest(id: &str, duration_secs: u64, streams: Vec<StreamDescriptor>) -> Manifest {
    Manifest {
        id: id.to_string(),
        title: format!("Title of {id}"),
        webpage_url: Some(format!("https://www.youtube.com/watch?v={id}")),
        duration: Some(Duration::from_secs(duration_secs)),
        estimated_size: None,
        streams,
    }
}

/// Scripted [`VideoIndex`] that writes a file of a fixed size.
pub struct StubIndex {
    pub manifest: Manifest,
    pub file_size: usize,
    pub transfer_delay: Duration,
    pub hits: Vec<VideoHit>,
    /// URLs whose resolution fails.
    pub unavailable: Vec<String>,
    pub resolves: AtomicUsize,
    pub transfers: AtomicUsize,
    pub searches: AtomicUsize,
    pub last_format: Mutex<Option<String>>,
    pub last_dest: Mutex<Option<PathBuf>>,
}

impl StubIndex {
    pub fn new(manifest: Manifest, file_size: usize) -> Self {
        Self {
            manifest,
            file_size,
            transfer_delay: Duration::ZERO,
            hits: Vec::new(),
            unavailable: Vec::new(),
            resolves: AtomicUsize::new(0),
            transfers: AtomicUsize::new(0),
            searches: AtomicUsize::new(0),
            last_format: Mutex::new(None),
            last_dest: Mutex::new(None),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.transfer_delay = delay;
        self
    }

    pub fn with_hits(mut self, urls: &[&str]) -> Self {
        self.hits = urls
            .iter()
            .map(|url| VideoHit {
                title: format!("hit {url}"),
                url: url.to_string(),
                duration_secs: Some(90),
                thumbnail: None,
            })
            .collect();
        self
    }

    pub fn with_unavailable(mut self, urls: &[&str]) -> Self {
        self.unavailable = urls.iter().map(|u| u.to_string()).collect();
        self
    }

    pub fn transfers(&self) -> usize {
        self.transfers.load(Ordering::SeqCst)
    }

    pub fn resolves(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoIndex for StubIndex {
    async fn resolve(&self, url: &str) -> Result<Manifest, MediaError> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.iter().any(|u| u == url) {
            return Err(MediaError::SourceUnavailable(format!("video removed: {url}")));
        }
        Ok(self.manifest.clone())
    }

    async fn transfer(&self, request: TransferRequest<'_>) -> Result<PathBuf, MediaError> {
        self.transfers.fetch_add(1, Ordering::SeqCst);
        *self.last_format.lock() = Some(request.selection.format_spec());
        *self.last_dest.lock() = Some(request.dest_dir.to_path_buf());
        if !self.transfer_delay.is_zero() {
            tokio::time::sleep(self.transfer_delay).await;
        }
        let ext = match request.kind {
            MediaKind::Audio => "mp3",
            _ => "mp4",
        };
        let path = request.dest_dir.join(format!("{}.{ext}", self.manifest.id));
        tokio::fs::write(&path, vec![0u8; self.file_size]).await?;
        Ok(path)
    }

    async fn search(&self, _query: &str, limit: usize) -> Result<Vec<VideoHit>, MediaError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok(self.hits.iter().take(limit).cloned().collect())
    }
}

/// Regular files anywhere under `dir`.
pub fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&current) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                found.push(path);
            }
        }
    }
    found
}
