//! Image fetching.
//!
//! [`ImageFetcher::fetch`] downloads one candidate URL into the `images/`
//! partition of the work area. A file only reaches disk after every check
//! has passed:
//!
//! - the URL is an absolute http(s) URL on a permitted host
//! - the response status is a success
//! - the declared content type is on the image allow-list
//! - the body stays under the byte ceiling while streaming
//! - the leading bytes carry a known image signature
//!
//! The stored file gets the extension of the sniffed format, never one taken
//! from the URL or the header.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};
use url::{Host, Url};

use super::error::MediaError;
use super::sniff::ImageFormat;
use super::types::Partition;
use super::workarea::WorkArea;

/// Default per-request timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default byte ceiling for a single image.
pub const DEFAULT_MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;

/// Default number of redirects followed.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Longest URL accepted.
pub const MAX_URL_LENGTH: usize = 2048;

const USER_AGENT: &str = concat!("sisyphe-media/", env!("CARGO_PKG_VERSION"));

/// Image fetch settings.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub max_bytes: u64,
    pub max_redirects: usize,
    pub hosts: HostPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_FETCH_TIMEOUT,
            max_bytes: DEFAULT_MAX_IMAGE_BYTES,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            hosts: HostPolicy::default(),
        }
    }
}

/// Which hosts images may be fetched from.
#[derive(Debug, Clone, Default)]
pub struct HostPolicy {
    /// When set, only these hosts and their subdomains are allowed.
    pub allowed: Option<Vec<String>>,
    /// Permit loopback, private and link-local addresses.
    pub allow_private: bool,
}

impl HostPolicy {
    /// Check the host of an already-parsed URL.
    pub fn check(&self, url: &Url) -> Result<(), MediaError> {
        let host = url
            .host()
            .ok_or_else(|| MediaError::InvalidInput(format!("URL has no host: {url}")))?;

        if !self.allow_private {
            let blocked = match &host {
                Host::Ipv4(ip) => is_private_ip(IpAddr::V4(*ip)),
                Host::Ipv6(ip) => is_private_ip(IpAddr::V6(*ip)),
                Host::Domain(name) => {
                    let name = name.to_ascii_lowercase();
                    name == "localhost" || name.ends_with(".localhost")
                }
            };
            if blocked {
                return Err(MediaError::InvalidInput(format!(
                    "host is not publicly routable: {host}"
                )));
            }
        }

        if let Some(allowed) = &self.allowed {
            let name = host.to_string().to_ascii_lowercase();
            let permitted = allowed.iter().any(|entry| {
                let entry = entry.trim().trim_start_matches('.').to_ascii_lowercase();
                name == entry || name.ends_with(&format!(".{entry}"))
            });
            if !permitted {
                return Err(MediaError::InvalidInput(format!(
                    "host not on the allow-list: {name}"
                )));
            }
        }
        Ok(())
    }
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                // carrier-grade NAT, 100.64.0.0/10
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_private_ip(IpAddr::V4(mapped));
            }
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xFE00) == 0xFC00
                || (first & 0xFFC0) == 0xFE80
        }
    }
}

/// Parse and validate a candidate URL.
pub fn validate_url(raw: &str, hosts: &HostPolicy) -> Result<Url, MediaError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(MediaError::InvalidInput("empty URL".to_string()));
    }
    if trimmed.len() > MAX_URL_LENGTH {
        return Err(MediaError::InvalidInput(format!(
            "URL longer than {MAX_URL_LENGTH} characters"
        )));
    }
    let url = Url::parse(trimmed)
        .map_err(|e| MediaError::InvalidInput(format!("malformed URL '{trimmed}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(MediaError::InvalidInput(format!(
            "unsupported URL scheme '{}'",
            url.scheme()
        )));
    }
    hosts.check(&url)?;
    Ok(url)
}

/// A successfully fetched, verified image on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchedImage {
    pub url: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub format: ImageFormat,
}

/// Outcome of one fetch attempt.
pub type FetchResult = Result<FetchedImage, MediaError>;

/// Downloads images into a work area.
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    client: reqwest::Client,
    config: FetchConfig,
    work_area: Arc<WorkArea>,
}

impl ImageFetcher {
    pub fn new(config: FetchConfig, work_area: Arc<WorkArea>) -> Result<Self, MediaError> {
        let hosts = config.hosts.clone();
        let max_redirects = config.max_redirects;
        let redirect = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= max_redirects {
                attempt.error("too many redirects")
            } else if let Err(e) = hosts.check(attempt.url()) {
                attempt.error(e)
            } else {
                attempt.follow()
            }
        });

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(Duration::from_secs(10)))
            .redirect(redirect)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| MediaError::Unknown(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            work_area,
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn work_area(&self) -> &Arc<WorkArea> {
        &self.work_area
    }

    /// Fetch one image. Every failure comes back as an `Err`, never a panic.
    pub async fn fetch(&self, url: &str) -> FetchResult {
        let result = self.fetch_inner(url).await;
        match &result {
            Ok(image) => info!(
                url = %url,
                path = %image.path.display(),
                size_kb = image.size_bytes / 1024,
                format = image.format.extension(),
                "image fetched"
            ),
            Err(e) => warn!(url = %url, kind = %e.kind(), error = %e, "image fetch failed"),
        }
        result
    }

    async fn fetch_inner(&self, raw: &str) -> FetchResult {
        let url = validate_url(raw, &self.config.hosts)?;
        let limit = self.config.max_bytes;

        debug!(url = %url, "requesting image");
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let declared = ImageFormat::from_mime(&content_type).ok_or_else(|| {
            MediaError::UnsupportedContent(format!("content type '{content_type}' is not an image"))
        })?;

        if let Some(length) = response.content_length() {
            if length > limit {
                return Err(MediaError::too_large(length, limit));
            }
        }

        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let size = (body.len() + chunk.len()) as u64;
            if size > limit {
                return Err(MediaError::too_large(size, limit));
            }
            body.extend_from_slice(&chunk);
        }

        if body.is_empty() {
            return Err(MediaError::CorruptContent("empty response body".to_string()));
        }

        let format = ImageFormat::sniff(&body).ok_or_else(|| {
            MediaError::CorruptContent(format!(
                "payload declared as {} has no known image signature",
                declared.mime()
            ))
        })?;
        if format != declared {
            debug!(
                url = %url,
                declared = declared.mime(),
                sniffed = format.mime(),
                "declared image type differs from payload, using payload type"
            );
        }

        let pending = self
            .work_area
            .pending_file(Partition::Images, format.extension());
        pending.write_all(&body).await?;
        let path = pending.commit();

        Ok(FetchedImage {
            url: url.to_string(),
            path,
            size_bytes: body.len() as u64,
            format,
        })
    }
}
