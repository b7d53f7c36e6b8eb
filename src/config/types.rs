//! Typed configuration structures
//!
//! Provides strongly-typed access to configuration values with validation
//! and default values.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::media::{
    AcquireConfig, FetchConfig, HostPolicy, NegotiationPolicy, ResolutionTier,
};

const MIB: u64 = 1024 * 1024;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Media acquisition configuration
    #[serde(default)]
    pub media: MediaConfig,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError {
                path: "logging".to_string(),
                message: e,
            });
        }
        errors.extend(self.media.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /// Log level or filter directive (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, text)
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        if self.level.trim().is_empty() {
            return Err("level must not be empty".to_string());
        }
        Ok(())
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Output format for log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Media acquisition configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaConfig {
    /// Parent directory for the work area (system temp dir when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,

    /// Maximum size of a single image in bytes
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: u64,

    /// Maximum size of a delivered audio/video file in bytes
    #[serde(default = "default_max_delivery_bytes")]
    pub max_delivery_bytes: u64,

    /// Per-request image fetch timeout in seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Redirects followed per image request
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Image fetches in flight at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Minimum gap between calls to the video-indexing service, in milliseconds
    #[serde(default = "default_index_interval_ms")]
    pub index_interval_ms: u64,

    /// Overall audio/video job timeout in seconds
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    /// Video tier used when the request carries no hint
    #[serde(default = "default_video_tier")]
    pub default_tier: ResolutionTier,

    /// Video tier cap for long sources
    #[serde(default = "default_long_video_tier")]
    pub long_video_tier: ResolutionTier,

    /// Sources longer than this many seconds use `long_video_tier`
    #[serde(default = "default_long_video_secs")]
    pub long_video_secs: u64,

    /// Bitrate of extracted mp3 audio in kbit/s
    #[serde(default = "default_audio_bitrate_kbps")]
    pub audio_bitrate_kbps: u32,

    /// Number of video search results requested
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// Path or name of the yt-dlp executable
    #[serde(default = "default_ytdlp_binary")]
    pub ytdlp_binary: PathBuf,

    /// Image hosts allowed (any public host when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_image_hosts: Option<Vec<String>>,

    /// Allow loopback/private addresses as image hosts
    #[serde(default)]
    pub allow_private_hosts: bool,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            work_dir: None,
            max_image_bytes: default_max_image_bytes(),
            max_delivery_bytes: default_max_delivery_bytes(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_redirects: default_max_redirects(),
            concurrency: default_concurrency(),
            index_interval_ms: default_index_interval_ms(),
            job_timeout_secs: default_job_timeout_secs(),
            default_tier: default_video_tier(),
            long_video_tier: default_long_video_tier(),
            long_video_secs: default_long_video_secs(),
            audio_bitrate_kbps: default_audio_bitrate_kbps(),
            search_limit: default_search_limit(),
            ytdlp_binary: default_ytdlp_binary(),
            allowed_image_hosts: None,
            allow_private_hosts: false,
        }
    }
}

impl MediaConfig {
    /// Collect every invalid setting.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut check = |ok: bool, field: &str, message: &str| {
            if !ok {
                errors.push(ValidationError {
                    path: format!("media.{field}"),
                    message: message.to_string(),
                });
            }
        };

        check(self.max_image_bytes > 0, "maxImageBytes", "must be greater than zero");
        check(
            self.max_delivery_bytes > 0,
            "maxDeliveryBytes",
            "must be greater than zero",
        );
        check(
            self.max_image_bytes <= self.max_delivery_bytes,
            "maxImageBytes",
            "must not exceed maxDeliveryBytes",
        );
        check(self.fetch_timeout_secs > 0, "fetchTimeoutSecs", "must be greater than zero");
        check(self.job_timeout_secs > 0, "jobTimeoutSecs", "must be greater than zero");
        check(self.concurrency > 0, "concurrency", "must be greater than zero");
        check(self.search_limit > 0, "searchLimit", "must be greater than zero");
        check(self.audio_bitrate_kbps > 0, "audioBitrateKbps", "must be greater than zero");
        check(
            self.long_video_tier <= self.default_tier,
            "longVideoTier",
            "must not be above defaultTier",
        );
        check(
            !self.ytdlp_binary.as_os_str().is_empty(),
            "ytdlpBinary",
            "must not be empty",
        );

        errors
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            timeout: Duration::from_secs(self.fetch_timeout_secs),
            max_bytes: self.max_image_bytes,
            max_redirects: self.max_redirects,
            hosts: HostPolicy {
                allowed: self.allowed_image_hosts.clone(),
                allow_private: self.allow_private_hosts,
            },
        }
    }

    pub fn acquire_config(&self) -> AcquireConfig {
        AcquireConfig {
            max_bytes: self.max_delivery_bytes,
            policy: NegotiationPolicy {
                default_tier: self.default_tier,
                long_duration_tier: self.long_video_tier,
                long_duration: Duration::from_secs(self.long_video_secs),
            },
        }
    }

    pub fn index_interval(&self) -> Duration {
        Duration::from_millis(self.index_interval_ms)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

fn default_max_image_bytes() -> u64 {
    10 * MIB
}

fn default_max_delivery_bytes() -> u64 {
    75 * MIB
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_max_redirects() -> usize {
    10
}

fn default_concurrency() -> usize {
    3
}

fn default_index_interval_ms() -> u64 {
    2000
}

fn default_job_timeout_secs() -> u64 {
    300
}

fn default_video_tier() -> ResolutionTier {
    ResolutionTier::P360
}

fn default_long_video_tier() -> ResolutionTier {
    ResolutionTier::P240
}

fn default_long_video_secs() -> u64 {
    6 * 60
}

fn default_audio_bitrate_kbps() -> u32 {
    64
}

fn default_search_limit() -> usize {
    5
}

fn default_ytdlp_binary() -> PathBuf {
    PathBuf::from("yt-dlp")
}
