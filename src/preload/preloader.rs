use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::assets::decode::decode_image;
use crate::catalog::model::SourceDescriptor;
use crate::config::PreloadSettings;
use crate::foundation::error::{SkyloopError, SkyloopResult};
use crate::net::fetch::Fetcher;
use crate::preload::verified::VerifiedImageSet;

/// Batching and timeout knobs for [`FramePreloader`].
#[derive(Clone, Debug)]
pub struct PreloadOptions {
    /// Images verified concurrently per batch.
    pub batch_size: usize,
    /// Pause between batches.
    pub batch_delay: Duration,
    /// Per-image timeout.
    pub item_timeout: Duration,
    /// Timeout of the latest-image health probe.
    pub probe_timeout: Duration,
    /// Minimum verified frames before animation is allowed.
    pub min_frames: usize,
}

impl Default for PreloadOptions {
    fn default() -> Self {
        Self::from(&PreloadSettings::default())
    }
}

impl From<&PreloadSettings> for PreloadOptions {
    fn from(s: &PreloadSettings) -> Self {
        Self {
            batch_size: s.batch_size.max(1),
            batch_delay: Duration::from_millis(s.batch_delay_ms),
            item_timeout: Duration::from_millis(s.item_timeout_ms),
            probe_timeout: Duration::from_millis(s.probe_timeout_ms),
            min_frames: s.min_frames,
        }
    }
}

/// Result of a batch preload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PreloadReport {
    /// URLs that are now verified, in request order.
    pub verified: Vec<String>,
    /// URLs that failed, with a reason.
    pub failed: Vec<(String, String)>,
    /// URLs skipped because the run was cancelled.
    pub skipped: usize,
    /// Whether the run stopped early on cancellation.
    pub cancelled: bool,
}

impl PreloadReport {
    /// Return `true` when fewer than `min_frames` verified and the caller must fall back to
    /// latest-only mode.
    pub fn should_degrade(&self, min_frames: usize) -> bool {
        self.verified.len() < min_frames
    }
}

/// Verifies and prefetches frame images with bounded concurrency.
#[derive(Clone)]
pub struct FramePreloader {
    fetcher: Arc<dyn Fetcher>,
    verified: Arc<VerifiedImageSet>,
    opts: PreloadOptions,
}

impl FramePreloader {
    /// Create a preloader sharing `verified` with other components.
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        verified: Arc<VerifiedImageSet>,
        opts: PreloadOptions,
    ) -> Self {
        Self {
            fetcher,
            verified,
            opts,
        }
    }

    /// Options in force.
    pub fn options(&self) -> &PreloadOptions {
        &self.opts
    }

    /// Shared verified set.
    pub fn verified_set(&self) -> &Arc<VerifiedImageSet> {
        &self.verified
    }

    /// Decode the source's latest image within the probe timeout.
    ///
    /// An error means the source is unhealthy and no animation should be attempted.
    pub async fn probe(&self, source: &SourceDescriptor) -> SkyloopResult<()> {
        let url = source.latest_url.as_deref().ok_or_else(|| {
            SkyloopError::validation(format!("source '{}' has no latest image", source.key))
        })?;
        self.probe_url(&source.key, url).await
    }

    /// Decode `url` as the representative image of `source_key` within the probe timeout.
    pub async fn probe_url(&self, source_key: &str, url: &str) -> SkyloopResult<()> {
        match tokio::time::timeout(self.opts.probe_timeout, self.verify(url)).await {
            Ok(Ok(())) => {
                debug!(source = source_key, url, "health probe passed");
                Ok(())
            }
            Ok(Err(err)) => {
                warn!(source = source_key, url, error = %err, "health probe failed");
                Err(err)
            }
            Err(_) => Err(SkyloopError::decode(format!(
                "health probe of '{source_key}' timed out after {:?}",
                self.opts.probe_timeout
            ))),
        }
    }

    /// Verify `urls` in batches of `batch_size`, pausing `batch_delay` between batches.
    ///
    /// Each item has its own timeout, so a slow image never blocks its siblings. Cancellation is
    /// checked between batches and also aborts in-flight fetches.
    pub async fn preload(&self, urls: &[String], cancel: &CancellationToken) -> PreloadReport {
        let mut report = PreloadReport::default();

        for (batch_idx, batch) in urls.chunks(self.opts.batch_size).enumerate() {
            if batch_idx > 0 && !self.opts.batch_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.opts.batch_delay) => {}
                }
            }
            if cancel.is_cancelled() {
                report.cancelled = true;
                report.skipped = urls.len() - batch_idx * self.opts.batch_size;
                break;
            }

            let results = join_all(batch.iter().map(|url| self.verify_item(url, cancel))).await;
            for (url, res) in batch.iter().zip(results) {
                match res {
                    Ok(()) => report.verified.push(url.clone()),
                    Err(SkyloopError::Cancelled) => {
                        report.cancelled = true;
                        report.skipped += 1;
                    }
                    Err(e) => {
                        debug!(url, error = %e, "frame failed verification");
                        report.failed.push((url.clone(), e.to_string()));
                    }
                }
            }
        }

        if report.should_degrade(self.opts.min_frames) {
            warn!(
                verified = report.verified.len(),
                requested = urls.len(),
                min_frames = self.opts.min_frames,
                "too few frames verified"
            );
        } else {
            info!(
                verified = report.verified.len(),
                failed = report.failed.len(),
                "preload finished"
            );
        }
        report
    }

    async fn verify_item(&self, url: &str, cancel: &CancellationToken) -> SkyloopResult<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SkyloopError::Cancelled),
            res = tokio::time::timeout(self.opts.item_timeout, self.verify(url)) => match res {
                Ok(inner) => inner,
                Err(_) => Err(SkyloopError::decode(format!(
                    "timed out after {:?}",
                    self.opts.item_timeout
                ))),
            },
        }
    }

    async fn verify(&self, url: &str) -> SkyloopResult<()> {
        if self.verified.contains(url) {
            return Ok(());
        }
        let bytes = self.fetcher.fetch_bytes(url).await?;
        decode_image(&bytes)?;
        self.verified.insert(url);
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/preload/preloader.rs"]
mod tests;
