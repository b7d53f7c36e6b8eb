//! Stream manifests and format negotiation.
//!
//! A [`Manifest`] describes the representations a remote source offers.
//! [`negotiate`] picks the one to download: delivery size is the binding
//! constraint, so the smallest stream that satisfies the request wins over
//! higher fidelity.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::MediaError;
use super::types::MediaKind;

/// Coarse quality bucket, ordered by vertical resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResolutionTier {
    #[serde(rename = "144p")]
    P144,
    #[serde(rename = "240p")]
    P240,
    #[serde(rename = "360p")]
    P360,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
}

impl ResolutionTier {
    pub const ALL: [ResolutionTier; 6] = [
        ResolutionTier::P144,
        ResolutionTier::P240,
        ResolutionTier::P360,
        ResolutionTier::P480,
        ResolutionTier::P720,
        ResolutionTier::P1080,
    ];

    pub fn height(self) -> u32 {
        match self {
            ResolutionTier::P144 => 144,
            ResolutionTier::P240 => 240,
            ResolutionTier::P360 => 360,
            ResolutionTier::P480 => 480,
            ResolutionTier::P720 => 720,
            ResolutionTier::P1080 => 1080,
        }
    }
}

impl fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}p", self.height())
    }
}

impl FromStr for ResolutionTier {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().to_ascii_lowercase();
        let digits = trimmed.strip_suffix('p').unwrap_or(&trimmed);
        let height: u32 = digits
            .parse()
            .map_err(|_| MediaError::InvalidInput(format!("invalid resolution: {s}")))?;
        ResolutionTier::ALL
            .into_iter()
            .find(|tier| tier.height() == height)
            .ok_or_else(|| MediaError::InvalidInput(format!("unsupported resolution: {s}")))
    }
}

/// What a stream carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Muxed,
    VideoOnly,
    AudioOnly,
    /// Neither audio nor video (storyboards, thumbnails).
    Unusable,
}

/// One downloadable representation of a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub format_id: String,
    pub ext: String,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    /// Declared or approximate size in bytes.
    #[serde(default)]
    pub size_bytes: Option<u64>,
    /// Total bitrate in kbit/s.
    #[serde(default)]
    pub bitrate_kbps: Option<f64>,
}

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv", "mov", "flv", "3gp"];

impl StreamDescriptor {
    pub fn kind(&self) -> StreamKind {
        let has_video = match self.vcodec.as_deref() {
            Some(codec) => codec != "none",
            None => self.height.is_some() || VIDEO_EXTENSIONS.contains(&self.ext.as_str()),
        };
        let has_audio = match self.acodec.as_deref() {
            Some(codec) => codec != "none",
            None => true,
        };
        match (has_video, has_audio) {
            (true, true) => StreamKind::Muxed,
            (true, false) => StreamKind::VideoOnly,
            (false, true) => StreamKind::AudioOnly,
            (false, false) => StreamKind::Unusable,
        }
    }

    /// Size in bytes, falling back to bitrate × duration.
    pub fn estimated_size(&self, duration: Option<Duration>) -> Option<u64> {
        self.size_bytes.or_else(|| {
            let kbps = self.bitrate_kbps?;
            let secs = duration?.as_secs_f64();
            (kbps > 0.0).then(|| (kbps * 1000.0 / 8.0 * secs) as u64)
        })
    }
}

/// Metadata returned by the video-indexing service for one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub webpage_url: Option<String>,
    #[serde(default, with = "duration_secs")]
    pub duration: Option<Duration>,
    /// Source-level size estimate, used when no stream declares one.
    #[serde(default)]
    pub estimated_size: Option<u64>,
    #[serde(default)]
    pub streams: Vec<StreamDescriptor>,
}

/// Tier caps applied when negotiating a video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiationPolicy {
    /// Cap used when the request carries no resolution hint.
    pub default_tier: ResolutionTier,
    /// Cap applied to sources longer than `long_duration`.
    pub long_duration_tier: ResolutionTier,
    pub long_duration: Duration,
}

impl Default for NegotiationPolicy {
    fn default() -> Self {
        Self {
            default_tier: ResolutionTier::P360,
            long_duration_tier: ResolutionTier::P240,
            long_duration: Duration::from_secs(6 * 60),
        }
    }
}

impl NegotiationPolicy {
    /// Highest tier allowed for a source of `duration` given the user's hint.
    pub fn effective_cap(
        &self,
        duration: Option<Duration>,
        hint: Option<ResolutionTier>,
    ) -> ResolutionTier {
        let requested = hint.unwrap_or(self.default_tier);
        match duration {
            Some(d) if d > self.long_duration => requested.min(self.long_duration_tier),
            _ => requested,
        }
    }
}

/// The representation chosen for download.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub primary: StreamDescriptor,
    /// Separate audio stream merged with a video-only `primary`.
    pub audio: Option<StreamDescriptor>,
    /// Tier cap that was applied, for video.
    pub tier: Option<ResolutionTier>,
    pub estimated_size: Option<u64>,
}

impl Selection {
    /// Format selector understood by the indexing tool (`id` or `video+audio`).
    pub fn format_spec(&self) -> String {
        match &self.audio {
            Some(audio) => format!("{}+{}", self.primary.format_id, audio.format_id),
            None => self.primary.format_id.clone(),
        }
    }
}

/// Pick the stream to download for `kind`.
pub fn negotiate(
    manifest: &Manifest,
    kind: MediaKind,
    hint: Option<ResolutionTier>,
    policy: &NegotiationPolicy,
) -> Result<Selection, MediaError> {
    let selection = match kind {
        MediaKind::Image => {
            return Err(MediaError::InvalidInput(
                "images are not negotiated from a stream manifest".to_string(),
            ))
        }
        MediaKind::Audio => negotiate_audio(manifest),
        MediaKind::Video => negotiate_video(manifest, policy.effective_cap(manifest.duration, hint)),
    };

    let mut selection = selection.ok_or_else(|| {
        MediaError::UnsupportedContent(format!("no usable {kind} stream for '{}'", manifest.title))
    })?;

    selection.estimated_size = estimate(&selection, manifest);
    Ok(selection)
}

fn negotiate_audio(manifest: &Manifest) -> Option<Selection> {
    let duration = manifest.duration;
    let smallest_audio = streams_of(manifest, StreamKind::AudioOnly)
        .min_by_key(|s| audio_key(s, duration))
        .cloned();
    let primary = smallest_audio.or_else(|| {
        streams_of(manifest, StreamKind::Muxed)
            .min_by_key(|s| video_key(s, duration))
            .cloned()
    })?;
    Some(Selection {
        primary,
        audio: None,
        tier: None,
        estimated_size: None,
    })
}

fn negotiate_video(manifest: &Manifest, cap: ResolutionTier) -> Option<Selection> {
    let duration = manifest.duration;

    let muxed: Vec<&StreamDescriptor> = streams_of(manifest, StreamKind::Muxed).collect();
    if let Some(primary) = lowest_under_cap(&muxed, cap, duration) {
        return Some(Selection {
            primary: primary.clone(),
            audio: None,
            tier: Some(cap),
            estimated_size: None,
        });
    }

    let video_only: Vec<&StreamDescriptor> = streams_of(manifest, StreamKind::VideoOnly).collect();
    let primary = lowest_under_cap(&video_only, cap, duration)?;
    let audio = streams_of(manifest, StreamKind::AudioOnly)
        .min_by_key(|s| audio_key(s, duration))?;
    Some(Selection {
        primary: primary.clone(),
        audio: Some(audio.clone()),
        tier: Some(cap),
        estimated_size: None,
    })
}

fn streams_of(manifest: &Manifest, kind: StreamKind) -> impl Iterator<Item = &StreamDescriptor> {
    manifest.streams.iter().filter(move |s| s.kind() == kind)
}

fn is_mp4(stream: &StreamDescriptor) -> bool {
    stream.ext == "mp4"
}

/// Lowest stream at or under `cap`, taking an mp4 one when any mp4 fits.
/// When nothing fits, the lowest stream overall, mp4 breaking ties.
fn lowest_under_cap<'a>(
    streams: &[&'a StreamDescriptor],
    cap: ResolutionTier,
    duration: Option<Duration>,
) -> Option<&'a StreamDescriptor> {
    let fitting: Vec<&StreamDescriptor> = streams
        .iter()
        .copied()
        .filter(|s| s.height.is_some_and(|h| h <= cap.height()))
        .collect();
    if !fitting.is_empty() {
        let pool: Vec<&StreamDescriptor> = if fitting.iter().any(|s| is_mp4(s)) {
            fitting.into_iter().filter(|s| is_mp4(s)).collect()
        } else {
            fitting
        };
        return pool.into_iter().min_by_key(|s| video_key(s, duration));
    }
    streams
        .iter()
        .copied()
        .min_by_key(|s| (video_key(s, duration), !is_mp4(s)))
}

/// Sort key for video: known heights first, lowest first, then smallest.
fn video_key(stream: &StreamDescriptor, duration: Option<Duration>) -> (u32, u64) {
    (
        stream.height.unwrap_or(u32::MAX),
        stream.estimated_size(duration).unwrap_or(u64::MAX),
    )
}

fn audio_key(stream: &StreamDescriptor, duration: Option<Duration>) -> (u64, u64) {
    (
        stream.estimated_size(duration).unwrap_or(u64::MAX),
        stream.bitrate_kbps.map(|b| b as u64).unwrap_or(u64::MAX),
    )
}

fn estimate(selection: &Selection, manifest: &Manifest) -> Option<u64> {
    let primary = selection.primary.estimated_size(manifest.duration);
    let streams = match &selection.audio {
        Some(audio) => primary.zip(audio.estimated_size(manifest.duration)).map(|(v, a)| v + a),
        None => primary,
    };
    streams.or(manifest.estimated_size)
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(d)?;
        Ok(secs
            .filter(|s| s.is_finite() && *s >= 0.0)
            .map(Duration::from_secs_f64))
    }
}
