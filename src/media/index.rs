//! Video-indexing service.
//!
//! [`VideoIndex`] is the seam to whatever resolves a page URL into stream
//! metadata and performs the transfer. [`YtDlpIndex`] drives the `yt-dlp`
//! executable as a child process.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};
use url::Url;

use super::error::MediaError;
use super::manifest::{Manifest, Selection, StreamDescriptor};
use super::types::MediaKind;

/// Default audio bitrate for extracted mp3 files, in kbit/s.
pub const DEFAULT_AUDIO_BITRATE_KBPS: u32 = 64;

/// Everything the indexing service needs to perform one transfer.
#[derive(Debug, Clone, Copy)]
pub struct TransferRequest<'a> {
    pub url: &'a str,
    pub selection: &'a Selection,
    pub kind: MediaKind,
    /// Directory the artifact must be written into.
    pub dest_dir: &'a Path,
    pub max_bytes: u64,
}

/// A video search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub duration_secs: Option<u64>,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

impl VideoHit {
    /// Duration as `m:ss`, or `??:??` when unknown.
    pub fn duration_label(&self) -> String {
        match self.duration_secs {
            Some(secs) => format!("{}:{:02}", secs / 60, secs % 60),
            None => "??:??".to_string(),
        }
    }
}

/// Remote service that describes and transfers audio/video sources.
#[async_trait]
pub trait VideoIndex: Send + Sync {
    /// Resolve a source URL into its manifest.
    async fn resolve(&self, url: &str) -> Result<Manifest, MediaError>;

    /// Download the selected representation into `request.dest_dir` and
    /// return the path of the produced file.
    async fn transfer(&self, request: TransferRequest<'_>) -> Result<PathBuf, MediaError>;

    /// Search for videos matching free text.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<VideoHit>, MediaError>;
}

/// Normalize YouTube links to `https://www.youtube.com/watch?v=<id>`.
///
/// Any other URL is returned trimmed but otherwise untouched.
pub fn canonical_video_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(url) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };
    let host = url.host_str().unwrap_or("").to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let host = host
        .strip_prefix("m.")
        .or_else(|| host.strip_prefix("music."))
        .unwrap_or(host);

    let id = match host {
        "youtu.be" => url.path_segments().and_then(|mut s| s.next()).map(str::to_string),
        "youtube.com" => {
            let mut segments = url.path_segments().into_iter().flatten();
            match segments.next() {
                Some("watch") => url
                    .query_pairs()
                    .find(|(k, _)| k == "v")
                    .map(|(_, v)| v.into_owned()),
                Some("shorts") | Some("embed") | Some("live") => segments.next().map(str::to_string),
                _ => None,
            }
        }
        _ => None,
    };

    match id {
        Some(id) if is_video_id(&id) => format!("https://www.youtube.com/watch?v={id}"),
        _ => trimmed.to_string(),
    }
}

fn is_video_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// [`VideoIndex`] backed by the `yt-dlp` executable.
#[derive(Debug, Clone)]
pub struct YtDlpIndex {
    binary: PathBuf,
    audio_bitrate_kbps: u32,
    socket_timeout: Duration,
}

impl YtDlpIndex {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            audio_bitrate_kbps: DEFAULT_AUDIO_BITRATE_KBPS,
            socket_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_audio_bitrate(mut self, kbps: u32) -> Self {
        self.audio_bitrate_kbps = kbps;
        self
    }

    pub fn with_socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = timeout;
        self
    }

    /// Arguments for a transfer, exposed for inspection in tests.
    pub fn transfer_args(&self, request: &TransferRequest<'_>) -> Vec<String> {
        let template = request.dest_dir.join("%(id)s.%(ext)s");
        let mut args: Vec<String> = vec![
            "--no-warnings".into(),
            "--no-playlist".into(),
            "--no-progress".into(),
            "--no-simulate".into(),
            "--socket-timeout".into(),
            self.socket_timeout.as_secs().max(1).to_string(),
            "-f".into(),
            request.selection.format_spec(),
            "-o".into(),
            template.to_string_lossy().into_owned(),
            "--max-filesize".into(),
            request.max_bytes.to_string(),
            "--print".into(),
            "after_move:filepath".into(),
        ];
        match request.kind {
            MediaKind::Audio => args.extend([
                "-x".into(),
                "--audio-format".into(),
                "mp3".into(),
                "--audio-quality".into(),
                format!("{}K", self.audio_bitrate_kbps),
            ]),
            _ => args.extend(["--merge-output-format".into(), "mp4".into()]),
        }
        args.push("--".into());
        args.push(request.url.to_string());
        args
    }

    async fn run(&self, args: &[String]) -> Result<String, MediaError> {
        debug!(binary = %self.binary.display(), ?args, "running yt-dlp");
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                MediaError::Unknown(format!("failed to run {}: {e}", self.binary.display()))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("no diagnostic output")
            .trim()
            .to_string();
        warn!(status = ?output.status.code(), reason = %reason, "yt-dlp failed");
        Err(classify_failure(&reason))
    }
}

fn classify_failure(reason: &str) -> MediaError {
    let lower = reason.to_lowercase();
    if lower.contains("timed out") || lower.contains("timeout") {
        MediaError::Timeout(reason.to_string())
    } else if lower.contains("unsupported url") || lower.contains("is not a valid url") {
        MediaError::InvalidInput(reason.to_string())
    } else {
        MediaError::SourceUnavailable(reason.to_string())
    }
}

#[async_trait]
impl VideoIndex for YtDlpIndex {
    async fn resolve(&self, url: &str) -> Result<Manifest, MediaError> {
        let args: Vec<String> = vec![
            "-J".into(),
            "--no-warnings".into(),
            "--no-playlist".into(),
            "--socket-timeout".into(),
            self.socket_timeout.as_secs().max(1).to_string(),
            "--".into(),
            url.to_string(),
        ];
        let stdout = self.run(&args).await?;
        let manifest = parse_manifest(&stdout)?;
        info!(
            title = %manifest.title,
            streams = manifest.streams.len(),
            duration_secs = manifest.duration.map(|d| d.as_secs()),
            "manifest resolved"
        );
        Ok(manifest)
    }

    async fn transfer(&self, request: TransferRequest<'_>) -> Result<PathBuf, MediaError> {
        let args = self.transfer_args(&request);
        let stdout = self.run(&args).await?;

        let printed = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(PathBuf::from)
            .filter(|p| p.starts_with(request.dest_dir) && p.is_file());
        if let Some(path) = printed {
            return Ok(path);
        }

        let mut produced = output_files(request.dest_dir).await;
        match produced.len() {
            1 => return Ok(produced.remove(0)),
            0 => {}
            n => {
                return Err(MediaError::SourceUnavailable(format!(
                    "{n} unmerged files left for {}",
                    request.url
                )))
            }
        }

        // a clean exit without output means --max-filesize skipped the
        // download; the notice itself is suppressed by --print
        let size = request
            .selection
            .estimated_size
            .filter(|s| *s > request.max_bytes)
            .unwrap_or(request.max_bytes.saturating_add(1));
        warn!(url = %request.url, limit = request.max_bytes, "yt-dlp produced no file");
        Err(MediaError::too_large(size, request.max_bytes))
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<VideoHit>, MediaError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MediaError::InvalidInput("empty search query".to_string()));
        }
        let limit = limit.clamp(1, 20);
        let args: Vec<String> = vec![
            "-J".into(),
            "--flat-playlist".into(),
            "--no-warnings".into(),
            format!("ytsearch{limit}:{query}"),
        ];
        let stdout = self.run(&args).await?;
        let mut hits = parse_search(&stdout)?;
        hits.truncate(limit);
        info!(query = %query, hits = hits.len(), "video search finished");
        Ok(hits)
    }
}

/// Regular files in `dir` that are not partial downloads.
async fn output_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return files;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let partial = path
            .extension()
            .is_some_and(|ext| ext == "part" || ext == "ytdl");
        if !partial && entry.file_type().await.is_ok_and(|t| t.is_file()) {
            files.push(path);
        }
    }
    files
}

#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: Option<String>,
    title: Option<String>,
    webpage_url: Option<String>,
    duration: Option<f64>,
    filesize: Option<f64>,
    filesize_approx: Option<f64>,
    #[serde(default)]
    formats: Vec<YtDlpFormat>,
    // single-format extractors describe the only format at top level
    format_id: Option<String>,
    ext: Option<String>,
    height: Option<f64>,
    vcodec: Option<String>,
    acodec: Option<String>,
    tbr: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct YtDlpFormat {
    format_id: Option<String>,
    ext: Option<String>,
    height: Option<f64>,
    vcodec: Option<String>,
    acodec: Option<String>,
    filesize: Option<f64>,
    filesize_approx: Option<f64>,
    tbr: Option<f64>,
}

impl YtDlpFormat {
    fn into_stream(self) -> Option<StreamDescriptor> {
        Some(StreamDescriptor {
            format_id: self.format_id?,
            ext: self.ext.unwrap_or_default(),
            height: self.height.and_then(positive).map(|h| h as u32),
            vcodec: self.vcodec,
            acodec: self.acodec,
            size_bytes: self.filesize.or(self.filesize_approx).and_then(positive).map(|s| s as u64),
            bitrate_kbps: self.tbr.and_then(positive),
        })
    }
}

fn positive(v: f64) -> Option<f64> {
    (v.is_finite() && v > 0.0).then_some(v)
}

/// Parse `yt-dlp -J` output into a [`Manifest`].
pub fn parse_manifest(json: &str) -> Result<Manifest, MediaError> {
    let info: YtDlpInfo = serde_json::from_str(json)
        .map_err(|e| MediaError::SourceUnavailable(format!("unreadable manifest: {e}")))?;

    let mut streams: Vec<StreamDescriptor> = info
        .formats
        .into_iter()
        .filter_map(YtDlpFormat::into_stream)
        .collect();
    if streams.is_empty() {
        let single = YtDlpFormat {
            format_id: info.format_id,
            ext: info.ext,
            height: info.height,
            vcodec: info.vcodec,
            acodec: info.acodec,
            filesize: info.filesize,
            filesize_approx: info.filesize_approx,
            tbr: info.tbr,
        };
        streams.extend(single.into_stream());
    }

    Ok(Manifest {
        id: info.id.unwrap_or_default(),
        title: info.title.unwrap_or_else(|| "untitled".to_string()),
        webpage_url: info.webpage_url,
        duration: info
            .duration
            .and_then(positive)
            .map(Duration::from_secs_f64),
        estimated_size: info
            .filesize
            .or(info.filesize_approx)
            .and_then(positive)
            .map(|s| s as u64),
        streams,
    })
}

#[derive(Debug, Deserialize)]
struct YtDlpSearch {
    #[serde(default)]
    entries: Vec<Option<YtDlpEntry>>,
}

#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<YtDlpThumbnail>,
}

#[derive(Debug, Deserialize)]
struct YtDlpThumbnail {
    url: Option<String>,
}

/// Parse `yt-dlp -J ytsearchN:<query>` output.
pub fn parse_search(json: &str) -> Result<Vec<VideoHit>, MediaError> {
    let search: YtDlpSearch = serde_json::from_str(json)
        .map_err(|e| MediaError::SourceUnavailable(format!("unreadable search results: {e}")))?;

    let hits = search
        .entries
        .into_iter()
        .flatten()
        .filter_map(|entry| {
            let url = entry
                .webpage_url
                .or(entry.url)
                .filter(|u| u.starts_with("http"))
                .or_else(|| {
                    entry
                        .id
                        .as_deref()
                        .filter(|id| is_video_id(id))
                        .map(|id| format!("https://www.youtube.com/watch?v={id}"))
                })?;
            Some(VideoHit {
                title: entry.title.unwrap_or_else(|| "untitled".to_string()),
                url,
                duration_secs: entry.duration.and_then(positive).map(|d| d as u64),
                thumbnail: entry
                    .thumbnail
                    .or_else(|| entry.thumbnails.into_iter().rev().find_map(|t| t.url)),
            })
        })
        .collect();
    Ok(hits)
}
