//! Hand-off to the chat transport, followed by cleanup.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::service::MediaService;
use super::types::Artifact;

/// Errors reported by a [`Transport`].
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The chat platform refused the file (size, type, permissions).
    #[error("rejected by transport: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Sends finished artifacts to the user.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, artifact: &Artifact) -> Result<(), DeliveryError>;
}

/// Outcome of [`deliver_and_release`].
#[derive(Debug, Default, Serialize)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
    /// Filesystem entries removed afterwards.
    pub released: usize,
}

/// Deliver every artifact, releasing each path whatever the outcome.
pub async fn deliver_and_release(
    service: &MediaService,
    transport: &dyn Transport,
    artifacts: &[Artifact],
) -> DeliveryReport {
    let mut report = DeliveryReport::default();

    for artifact in artifacts {
        match transport.deliver(artifact).await {
            Ok(()) => {
                debug!(path = %artifact.path.display(), kind = %artifact.kind, "artifact delivered");
                report.delivered += 1;
            }
            Err(e) => {
                warn!(path = %artifact.path.display(), error = %e, "artifact delivery failed");
                report.failed += 1;
            }
        }
        report.released += service.release(Some(&artifact.path)).await;
    }

    report
}
