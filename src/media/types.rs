//! Request and result types exchanged with the chat-command layer.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::MediaError;
use super::manifest::ResolutionTier;

/// Kind of media a user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
}

impl MediaKind {
    /// Storage partition that holds artifacts of this kind.
    pub fn partition(self) -> Partition {
        match self {
            MediaKind::Image => Partition::Images,
            MediaKind::Audio => Partition::Audio,
            MediaKind::Video => Partition::Video,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MediaKind::Image => "image",
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        })
    }
}

impl FromStr for MediaKind {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "image" | "images" | "photo" => Ok(MediaKind::Image),
            "audio" | "mp3" => Ok(MediaKind::Audio),
            "video" | "mp4" => Ok(MediaKind::Video),
            other => Err(MediaError::InvalidInput(format!("unknown media kind: {other}"))),
        }
    }
}

/// One of the three directories a work area is split into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Images,
    Video,
    Audio,
}

impl Partition {
    pub const ALL: [Partition; 3] = [Partition::Images, Partition::Video, Partition::Audio];

    pub fn dir_name(self) -> &'static str {
        match self {
            Partition::Images => "images",
            Partition::Video => "video",
            Partition::Audio => "audio",
        }
    }
}

/// Where the requested media comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestSource {
    Url(String),
    Query(String),
}

/// An incoming request for media, built once per user command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionRequest {
    pub kind: MediaKind,
    pub source: RequestSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_hint: Option<ResolutionTier>,
}

impl AcquisitionRequest {
    pub fn from_url(kind: MediaKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            source: RequestSource::Url(url.into()),
            resolution_hint: None,
        }
    }

    pub fn from_query(kind: MediaKind, query: impl Into<String>) -> Self {
        Self {
            kind,
            source: RequestSource::Query(query.into()),
            resolution_hint: None,
        }
    }

    pub fn with_resolution(mut self, tier: ResolutionTier) -> Self {
        self.resolution_hint = Some(tier);
        self
    }
}

/// A validated file ready to hand to the chat transport.
///
/// The path stays owned by the work area until it is released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub kind: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_partition() {
        assert_eq!(MediaKind::Image.partition(), Partition::Images);
        assert_eq!(MediaKind::Audio.partition(), Partition::Audio);
        assert_eq!(MediaKind::Video.partition().dir_name(), "video");
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("mp3".parse::<MediaKind>().unwrap(), MediaKind::Audio);
        assert_eq!(" Video ".parse::<MediaKind>().unwrap(), MediaKind::Video);
        assert!("book".parse::<MediaKind>().is_err());
    }

    #[test]
    fn test_request_builders() {
        let req = AcquisitionRequest::from_url(MediaKind::Video, "https://example.com/v")
            .with_resolution(ResolutionTier::P240);
        assert_eq!(req.resolution_hint, Some(ResolutionTier::P240));
        assert_eq!(
            req.source,
            RequestSource::Url("https://example.com/v".to_string())
        );
    }

    #[test]
    fn test_request_serialize() {
        let req = AcquisitionRequest::from_query(MediaKind::Image, "cats");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["kind"], "image");
        assert_eq!(json["source"]["query"], "cats");
        assert!(json.get("resolution_hint").is_none());
    }
}
