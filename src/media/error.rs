//! Error type shared by every media acquisition path.

use std::fmt;

use thiserror::Error;

/// Errors produced while acquiring media.
///
/// Per-item failures inside a batch are collected as values of this type and
/// never abort the batch; whole-request failures are returned to the caller
/// as a single error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("unsupported content: {0}")]
    UnsupportedContent(String),

    #[error("corrupt content: {0}")]
    CorruptContent(String),

    #[error("too large: {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

/// Discriminant of [`MediaError`] without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaErrorKind {
    InvalidInput,
    SourceUnavailable,
    UnsupportedContent,
    CorruptContent,
    TooLarge,
    Timeout,
    Io,
    Unknown,
}

impl MediaError {
    pub fn kind(&self) -> MediaErrorKind {
        match self {
            MediaError::InvalidInput(_) => MediaErrorKind::InvalidInput,
            MediaError::SourceUnavailable(_) => MediaErrorKind::SourceUnavailable,
            MediaError::UnsupportedContent(_) => MediaErrorKind::UnsupportedContent,
            MediaError::CorruptContent(_) => MediaErrorKind::CorruptContent,
            MediaError::TooLarge { .. } => MediaErrorKind::TooLarge,
            MediaError::Timeout(_) => MediaErrorKind::Timeout,
            MediaError::Io(_) => MediaErrorKind::Io,
            MediaError::Unknown(_) => MediaErrorKind::Unknown,
        }
    }

    pub(crate) fn too_large(size: u64, limit: u64) -> Self {
        MediaError::TooLarge { size, limit }
    }
}

impl fmt::Display for MediaErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MediaErrorKind::InvalidInput => "invalid_input",
            MediaErrorKind::SourceUnavailable => "source_unavailable",
            MediaErrorKind::UnsupportedContent => "unsupported_content",
            MediaErrorKind::CorruptContent => "corrupt_content",
            MediaErrorKind::TooLarge => "too_large",
            MediaErrorKind::Timeout => "timeout",
            MediaErrorKind::Io => "io",
            MediaErrorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

impl From<std::io::Error> for MediaError {
    fn from(err: std::io::Error) -> Self {
        MediaError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for MediaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            MediaError::Timeout(err.to_string())
        } else if err.is_builder() {
            MediaError::InvalidInput(err.to_string())
        } else if err.is_connect() || err.is_status() || err.is_redirect() || err.is_request() {
            MediaError::SourceUnavailable(err.to_string())
        } else if err.is_body() || err.is_decode() {
            MediaError::CorruptContent(err.to_string())
        } else {
            MediaError::Unknown(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(
            MediaError::InvalidInput("x".into()).kind(),
            MediaErrorKind::InvalidInput
        );
        assert_eq!(MediaError::too_large(10, 5).kind(), MediaErrorKind::TooLarge);
        assert_eq!(MediaError::Timeout("t".into()).kind(), MediaErrorKind::Timeout);
    }

    #[test]
    fn test_too_large_display() {
        let err = MediaError::too_large(2048, 1024);
        assert_eq!(
            err.to_string(),
            "too large: 2048 bytes exceeds limit of 1024 bytes"
        );
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(MediaErrorKind::SourceUnavailable.to_string(), "source_unavailable");
        assert_eq!(MediaErrorKind::CorruptContent.to_string(), "corrupt_content");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: MediaError = io.into();
        assert_eq!(err.kind(), MediaErrorKind::Io);
    }
}
