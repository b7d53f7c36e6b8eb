//! Configuration loading
//!
//! Configuration is a JSON5 document (comments and trailing commas allowed).
//! Every field has a default, so a missing file yields the default
//! configuration. A handful of environment variables override file values:
//!
//! - `SISYPHE_MEDIA_DIR` -- parent directory of the media work area
//! - `SISYPHE_LOG_LEVEL` -- log level / filter directive
//! - `SISYPHE_MAX_VIDEO_MB` -- audio/video delivery ceiling in MiB
//! - `SISYPHE_YTDLP` -- path of the yt-dlp executable

pub mod types;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

pub use types::{Config, LogFormat, LoggingConfig, MediaConfig, ValidationError};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "SISYPHE_CONFIG";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: String, value: String },

    #[error("invalid configuration: {}", join_errors(.0))]
    Invalid(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Default config file location: `<config dir>/sisyphe/media.json5`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("sisyphe").join("media.json5"))
}

/// Resolve which file to load: explicit path, then `SISYPHE_CONFIG`, then
/// the default location.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
        .or_else(default_config_path)
}

/// Parse a JSON5 document.
pub fn parse_config(raw: &str, origin: &Path) -> Result<Config, ConfigError> {
    json5::from_str::<Config>(raw).map_err(|e| ConfigError::Parse {
        path: origin.to_path_buf(),
        message: e.to_string(),
    })
}

/// Load, apply environment overrides, and validate.
///
/// A missing file is not an error; defaults are used instead. An explicitly
/// given path must exist.
pub fn load_config(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match resolve_config_path(explicit) {
        Some(path) => match std::fs::read_to_string(&path) {
            Ok(raw) => {
                debug!(path = %path.display(), "loading configuration");
                parse_config(&raw, &path)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && explicit.is_none() => {
                debug!(path = %path.display(), "no configuration file, using defaults");
                Config::default()
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    config.validate().map_err(ConfigError::Invalid)?;
    Ok(config)
}

/// Apply environment overrides read through `lookup`.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dir) = lookup("SISYPHE_MEDIA_DIR").filter(|v| !v.trim().is_empty()) {
        config.media.work_dir = Some(PathBuf::from(dir));
    }
    if let Some(level) = lookup("SISYPHE_LOG_LEVEL").filter(|v| !v.trim().is_empty()) {
        config.logging.level = level;
    }
    if let Some(raw) = lookup("SISYPHE_MAX_VIDEO_MB") {
        let invalid = || ConfigError::InvalidEnv {
            name: "SISYPHE_MAX_VIDEO_MB".to_string(),
            value: raw.clone(),
        };
        let mb: u64 = raw.trim().parse().map_err(|_| invalid())?;
        config.media.max_delivery_bytes = mb.checked_mul(1024 * 1024).ok_or_else(invalid)?;
    }
    if let Some(binary) = lookup("SISYPHE_YTDLP").filter(|v| !v.trim().is_empty()) {
        config.media.ytdlp_binary = PathBuf::from(binary);
    }
    Ok(())
}
