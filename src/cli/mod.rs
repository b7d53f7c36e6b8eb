//! CLI subcommand definitions and handlers.
//!
//! Uses clap derive to define the subcommand hierarchy:
//! - `images <URL>...` -- fetch a batch of images
//! - `download <URL>` -- download a video (or its audio track)
//! - `search <QUERY>` -- list video search hits
//! - `config show` -- print the loaded configuration
//! - `version` -- print build/version info

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::config::{self, Config, ConfigError};
use crate::logging::{self, LoggingError};
use crate::media::{
    deliver_and_release, AcquisitionRequest, Artifact, DeliveryError, DeliveryReport,
    MediaError, MediaKind, MediaService, ResolutionTier, Transport, YtDlpIndex,
};

/// Media acquisition for the Sisyphe chat bot.
#[derive(Parser, Debug)]
#[command(
    name = "sisyphe-media",
    version = env!("CARGO_PKG_VERSION"),
    about = "Fetch images and download audio/video into a scoped work area"
)]
pub struct Cli {
    /// Configuration file (JSON5). Defaults to $SISYPHE_CONFIG or the user config dir.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch images by URL, several at a time.
    Images {
        /// Image URLs.
        #[arg(required = true)]
        urls: Vec<String>,

        /// Fetches in flight at once (default: from config).
        #[arg(short, long)]
        limit: Option<usize>,

        /// Directory the images are copied into.
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Download a video, or only its audio track as mp3.
    Download {
        /// Video page URL.
        url: String,

        /// Extract audio instead of keeping the video.
        #[arg(long)]
        audio: bool,

        /// Maximum resolution (144p, 240p, 360p, 480p, 720p, 1080p).
        #[arg(short, long)]
        resolution: Option<ResolutionTier>,

        /// Directory the file is copied into.
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Search for videos.
    Search {
        /// Free-text query.
        query: String,

        /// Number of results (default: from config).
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Inspect configuration.
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Print version, build date, and git commit information.
    Version,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the fully loaded configuration as JSON.
    Show,

    /// Print the resolved configuration file path.
    Path,
}

/// Errors surfaced by the binary.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("output error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("nothing usable was found")]
    NothingFound,
}

// ---------------------------------------------------------------------------
// Subcommand handlers
// ---------------------------------------------------------------------------

/// Run a parsed command line.
pub async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Version => {
            handle_version();
            Ok(())
        }
        Command::Config(ConfigCommand::Path) => {
            handle_config_path(cli.config.as_deref());
            Ok(())
        }
        command => {
            let cfg = config::load_config(cli.config.as_deref())?;
            logging::init_tracing(&cfg.logging)?;
            match command {
                Command::Images {
                    urls,
                    limit,
                    output,
                } => handle_images(&cfg, &urls, limit, &output).await,
                Command::Download {
                    url,
                    audio,
                    resolution,
                    output,
                } => handle_download(&cfg, &url, audio, resolution, &output).await,
                Command::Search { query, limit } => handle_search(&cfg, &query, limit).await,
                Command::Config(ConfigCommand::Show) => handle_config_show(&cfg),
                Command::Config(ConfigCommand::Path) | Command::Version => Ok(()),
            }
        }
    }
}

fn build_service(cfg: &Config) -> Result<MediaService, MediaError> {
    let index = YtDlpIndex::new(&cfg.media.ytdlp_binary)
        .with_audio_bitrate(cfg.media.audio_bitrate_kbps)
        .with_socket_timeout(cfg.media.fetch_config().timeout);
    MediaService::new(&cfg.media, Arc::new(index))
}

/// Run the `images` subcommand.
pub async fn handle_images(
    cfg: &Config,
    urls: &[String],
    limit: Option<usize>,
    output: &Path,
) -> Result<(), CliError> {
    let service = build_service(cfg)?;
    let artifacts: Vec<Artifact> = service
        .fetch_all(urls, limit)
        .await
        .into_iter()
        .map(Artifact::from)
        .collect();
    deliver_to_dir(&service, &artifacts, output).await
}

/// Run the `download` subcommand.
pub async fn handle_download(
    cfg: &Config,
    url: &str,
    audio: bool,
    resolution: Option<ResolutionTier>,
    output: &Path,
) -> Result<(), CliError> {
    let service = build_service(cfg)?;
    let kind = if audio {
        MediaKind::Audio
    } else {
        MediaKind::Video
    };
    let mut request = AcquisitionRequest::from_url(kind, url);
    if let Some(tier) = resolution {
        request = request.with_resolution(tier);
    }
    let artifacts = service.handle(&request).await?;
    deliver_to_dir(&service, &artifacts, output).await
}

/// Run the `search` subcommand.
pub async fn handle_search(cfg: &Config, query: &str, limit: Option<usize>) -> Result<(), CliError> {
    let service = build_service(cfg)?;
    let hits = service.search_videos(query, limit).await?;
    println!("{}", serde_json::to_string_pretty(&hits)?);
    Ok(())
}

/// Run the `config show` subcommand.
pub fn handle_config_show(cfg: &Config) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(cfg)?);
    Ok(())
}

/// Run the `config path` subcommand.
pub fn handle_config_path(explicit: Option<&Path>) {
    match config::resolve_config_path(explicit) {
        Some(path) => println!("{}", path.display()),
        None => println!("(no configuration directory on this platform)"),
    }
}

/// Run the `version` subcommand.
pub fn handle_version() {
    println!("sisyphe-media {}", env!("CARGO_PKG_VERSION"));
    println!("  Build date: {}", env!("SISYPHE_BUILD_DATE"));
    println!("  Git commit: {}", env!("SISYPHE_GIT_HASH"));
    println!(
        "  Platform:   {} ({})",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Transport that copies artifacts into a local directory.
#[derive(Debug)]
pub struct DirectoryTransport {
    dir: PathBuf,
    copied: Mutex<Vec<PathBuf>>,
}

impl DirectoryTransport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            copied: Mutex::new(Vec::new()),
        }
    }

    /// Destination paths written so far.
    pub fn copied(&self) -> Vec<PathBuf> {
        self.copied.lock().clone()
    }
}

#[async_trait]
impl Transport for DirectoryTransport {
    async fn deliver(&self, artifact: &Artifact) -> Result<(), DeliveryError> {
        let name = artifact
            .path
            .file_name()
            .ok_or_else(|| DeliveryError::Rejected("artifact has no file name".to_string()))?;
        let dest = self.dir.join(name);
        tokio::fs::copy(&artifact.path, &dest)
            .await
            .map_err(|e| DeliveryError::Transport(format!("{}: {e}", dest.display())))?;
        debug!(from = %artifact.path.display(), to = %dest.display(), "artifact copied");
        self.copied.lock().push(dest);
        Ok(())
    }
}

#[derive(Serialize)]
struct DeliverySummary {
    files: Vec<PathBuf>,
    #[serde(flatten)]
    report: DeliveryReport,
}

async fn deliver_to_dir(
    service: &MediaService,
    artifacts: &[Artifact],
    output: &Path,
) -> Result<(), CliError> {
    if artifacts.is_empty() {
        return Err(CliError::NothingFound);
    }
    tokio::fs::create_dir_all(output).await?;
    let transport = DirectoryTransport::new(output);
    let report = deliver_and_release(service, &transport, artifacts).await;
    let summary = DeliverySummary {
        files: transport.copied(),
        report,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
