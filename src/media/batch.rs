//! Bounded-concurrency image batches.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::error::MediaError;
use super::fetch::{FetchedImage, ImageFetcher};

/// Default number of image fetches in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Result of a batch: the images that made it, and why the rest did not.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub fetched: Vec<FetchedImage>,
    pub failures: Vec<(String, MediaError)>,
}

impl BatchOutcome {
    /// True when nothing usable came back, including for an empty batch.
    pub fn is_empty(&self) -> bool {
        self.fetched.is_empty()
    }
}

impl ImageFetcher {
    /// Fetch every URL with at most `limit` requests in flight and return the
    /// successes, in completion-independent order.
    ///
    /// A failing URL never aborts the batch. An empty result means "nothing
    /// usable", not an error.
    pub async fn fetch_all(&self, urls: &[String], limit: usize) -> Vec<FetchedImage> {
        self.fetch_batch(urls, limit).await.fetched
    }

    /// Like [`fetch_all`](Self::fetch_all) but keeps the per-URL failures.
    pub async fn fetch_batch(&self, urls: &[String], limit: usize) -> BatchOutcome {
        let mut seen = HashSet::new();
        let unique: Vec<&str> = urls
            .iter()
            .map(|u| u.trim())
            .filter(|u| !u.is_empty() && seen.insert(*u))
            .collect();

        if unique.is_empty() {
            warn!("image batch requested without any URL");
            return BatchOutcome::default();
        }

        let limit = limit.max(1);
        let gate = Arc::new(Semaphore::new(limit));
        info!(count = unique.len(), limit, "starting image batch");

        let attempts = unique.iter().map(|url| {
            let gate = Arc::clone(&gate);
            async move {
                let result = match gate.acquire().await {
                    Ok(_permit) => self.fetch(url).await,
                    Err(_) => Err(MediaError::Unknown("concurrency gate closed".to_string())),
                };
                (url.to_string(), result)
            }
        });

        let mut outcome = BatchOutcome::default();
        for (url, result) in join_all(attempts).await {
            match result {
                Ok(image) => outcome.fetched.push(image),
                Err(e) => {
                    debug!(url = %url, error = %e, "dropping failed image from batch");
                    outcome.failures.push((url, e));
                }
            }
        }

        info!(
            fetched = outcome.fetched.len(),
            failed = outcome.failures.len(),
            total = unique.len(),
            "image batch finished"
        );
        outcome
    }
}
