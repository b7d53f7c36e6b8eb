//! Image type detection.
//!
//! Maps declared MIME types onto the supported image formats and verifies
//! the real format by inspecting the leading bytes of the payload.

use serde::{Deserialize, Serialize};

/// Number of leading bytes needed to recognise every supported format.
pub const SNIFF_LEN: usize = 12;

/// Image formats accepted for delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageFormat {
    /// Map a declared `Content-Type` value onto a supported format.
    ///
    /// Parameters such as `; charset=binary` are ignored and the comparison is
    /// case-insensitive. Returns `None` for anything outside the allow-list.
    pub fn from_mime(content_type: &str) -> Option<Self> {
        let lower = content_type.to_lowercase();
        let base = lower.split(';').next().unwrap_or("").trim();
        match base {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(ImageFormat::Jpeg),
            "image/png" => Some(ImageFormat::Png),
            "image/gif" => Some(ImageFormat::Gif),
            "image/webp" => Some(ImageFormat::Webp),
            _ => None,
        }
    }

    /// Detect the format from magic bytes, independent of any declared type.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(b"GIF8") {
            Some(ImageFormat::Gif)
        } else if bytes.len() >= SNIFF_LEN && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP"
        {
            Some(ImageFormat::Webp)
        } else {
            None
        }
    }

    /// Normalized file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Webp => "image/webp",
        }
    }
}
