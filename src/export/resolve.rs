use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use image::RgbaImage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::assets::decode::decode_image;
use crate::catalog::model::{Catalog, SourceDescriptor};
use crate::foundation::core::Frame;
use crate::foundation::error::{SkyloopError, SkyloopResult};
use crate::net::fetch::Fetcher;
use crate::net::service::ImageProxy;
use crate::timeline::builder::Timeline;

/// One decoded single-view frame.
#[derive(Clone, Debug)]
pub struct ResolvedFrame {
    /// Capture instant.
    pub timestamp: DateTime<Utc>,
    /// Decoded pixels.
    pub image: Arc<RgbaImage>,
}

/// One decoded multi-view instant; sources without a usable image are absent.
#[derive(Clone, Debug)]
pub struct ResolvedEntry {
    /// Shared instant of the timeline entry.
    pub timestamp: DateTime<Utc>,
    /// Decoded image per source key.
    pub images: BTreeMap<String, Arc<RgbaImage>>,
}

/// A grid tile's source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileSource {
    /// Catalog key.
    pub key: String,
    /// Short label drawn on the tile.
    pub label: String,
}

/// Fully decoded input of an export job.
#[derive(Clone, Debug)]
pub enum ExportSequence {
    /// Frames of one source, letterboxed full-canvas.
    Single {
        /// Catalog key, used in the artifact name.
        source_key: String,
        /// Caption drawn top-left, if any.
        label: Option<String>,
        /// Frames in ascending time.
        frames: Vec<ResolvedFrame>,
    },
    /// Timeline entries tiled across several sources.
    Grid {
        /// Tile order.
        sources: Vec<TileSource>,
        /// Entries in ascending time.
        entries: Vec<ResolvedEntry>,
    },
}

impl ExportSequence {
    /// Number of output frames.
    pub fn len(&self) -> usize {
        match self {
            Self::Single { frames, .. } => frames.len(),
            Self::Grid { entries, .. } => entries.len(),
        }
    }

    /// Return `true` when there is nothing to encode.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Source key for single-view exports; `None` for grids.
    pub fn subject_key(&self) -> Option<&str> {
        match self {
            Self::Single { source_key, .. } => Some(source_key),
            Self::Grid { .. } => None,
        }
    }
}

/// Fetches and decodes the images an export needs before encoding starts.
pub struct SequenceResolver {
    fetcher: Arc<dyn Fetcher>,
    proxy: ImageProxy,
    item_timeout: Duration,
}

impl SequenceResolver {
    /// Resolve through `proxy`, bounding each image load by `item_timeout`.
    pub fn new(fetcher: Arc<dyn Fetcher>, proxy: ImageProxy, item_timeout: Duration) -> Self {
        Self {
            fetcher,
            proxy,
            item_timeout,
        }
    }

    async fn load(&self, url: &str, cancel: &CancellationToken) -> SkyloopResult<RgbaImage> {
        let target = self.proxy.proxied(url)?;
        let bytes = tokio::select! {
            _ = cancel.cancelled() => return Err(SkyloopError::Cancelled),
            res = tokio::time::timeout(self.item_timeout, self.fetcher.fetch_bytes(&target)) => {
                res.map_err(|_| SkyloopError::acquisition(format!("timed out loading {url}")))??
            }
        };
        decode_image(&bytes)
    }

    /// Decode `frames` of `source`; frames that fail to load are skipped.
    #[tracing::instrument(skip_all, fields(source = %source.key, frames = frames.len()))]
    pub async fn single(
        &self,
        source: &SourceDescriptor,
        frames: &[Frame],
        with_label: bool,
        cancel: &CancellationToken,
    ) -> SkyloopResult<ExportSequence> {
        let mut resolved = Vec::with_capacity(frames.len());
        for frame in frames {
            match self.load(&frame.url, cancel).await {
                Ok(image) => resolved.push(ResolvedFrame {
                    timestamp: frame.timestamp,
                    image: Arc::new(image),
                }),
                Err(SkyloopError::Cancelled) => return Err(SkyloopError::Cancelled),
                Err(err) => warn!(url = %frame.url, error = %err, "skipping frame"),
            }
        }
        if resolved.is_empty() {
            return Err(SkyloopError::SynchronizationShortfall {
                entries: 0,
                required: 1,
            });
        }
        info!(resolved = resolved.len(), "single-view sequence resolved");
        Ok(ExportSequence::Single {
            source_key: source.key.clone(),
            label: with_label.then(|| source.display_label().to_string()),
            frames: resolved,
        })
    }

    /// Decode every frame referenced by `timeline`.
    ///
    /// Entries left with fewer decoded images than the timeline's `min_sources` are dropped.
    #[tracing::instrument(skip_all, fields(sources = timeline.sources.len(), entries = timeline.len()))]
    pub async fn grid(
        &self,
        catalog: &Catalog,
        timeline: &Timeline,
        cancel: &CancellationToken,
    ) -> SkyloopResult<ExportSequence> {
        let sources = timeline
            .sources
            .iter()
            .map(|key| TileSource {
                key: key.clone(),
                label: catalog
                    .get(key)
                    .map_or(key.as_str(), SourceDescriptor::display_label)
                    .to_string(),
            })
            .collect::<Vec<_>>();

        let min_sources = timeline.min_sources.max(1);
        // Consecutive entries often reuse a frame; load each URL once.
        let mut loaded: HashMap<String, Option<Arc<RgbaImage>>> = HashMap::new();
        let mut entries = Vec::with_capacity(timeline.len());
        for entry in &timeline.entries {
            let mut images = BTreeMap::new();
            for (key, frame) in &entry.frames {
                if !loaded.contains_key(&frame.url) {
                    let image = match self.load(&frame.url, cancel).await {
                        Ok(image) => Some(Arc::new(image)),
                        Err(SkyloopError::Cancelled) => return Err(SkyloopError::Cancelled),
                        Err(err) => {
                            warn!(url = %frame.url, error = %err, "skipping tile image");
                            None
                        }
                    };
                    loaded.insert(frame.url.clone(), image);
                }
                if let Some(Some(image)) = loaded.get(&frame.url) {
                    images.insert(key.clone(), Arc::clone(image));
                }
            }
            if images.len() < min_sources {
                debug!(
                    at = %entry.timestamp,
                    images = images.len(),
                    min_sources,
                    "dropping entry short of images"
                );
                continue;
            }
            entries.push(ResolvedEntry {
                timestamp: entry.timestamp,
                images,
            });
        }
        if entries.is_empty() {
            return Err(SkyloopError::SynchronizationShortfall {
                entries: 0,
                required: 1,
            });
        }
        info!(resolved = entries.len(), "grid sequence resolved");
        Ok(ExportSequence::Grid { sources, entries })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/export/resolve.rs"]
mod tests;
