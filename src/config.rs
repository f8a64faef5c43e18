//! Runtime settings, loaded from JSON with every field defaulted.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::foundation::core::Resolution;
use crate::foundation::error::{SkyloopError, SkyloopResult};
use crate::timeline::builder::TimelinePolicy;

/// Top-level settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// HTTP client and collaborator endpoints.
    pub http: HttpSettings,
    /// Listing cache policy.
    pub listing: ListingSettings,
    /// Verification and preloading.
    pub preload: PreloadSettings,
    /// Cross-source alignment.
    pub timeline: TimelineSettings,
    /// Display pacing.
    pub playback: PlaybackSettings,
    /// Artifact rendering.
    pub export: ExportSettings,
}

impl Settings {
    /// Load settings from a JSON file; absent fields keep their defaults.
    pub fn from_path(path: impl AsRef<Path>) -> SkyloopResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read settings '{}'", path.display()))?;
        let settings: Settings = serde_json::from_str(&text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values that would stall or break the pipeline.
    pub fn validate(&self) -> SkyloopResult<()> {
        if self.preload.batch_size == 0 {
            return Err(SkyloopError::validation("preload.batch_size must be > 0"));
        }
        if self.listing.cache_capacity == 0 || self.preload.verified_capacity == 0 {
            return Err(SkyloopError::validation("cache capacities must be > 0"));
        }
        if self.timeline.max_entries == 0 {
            return Err(SkyloopError::validation("timeline.max_entries must be > 0"));
        }
        if self.playback.speed_ms == 0 || self.export.frame_delay_ms == 0 {
            return Err(SkyloopError::validation(
                "playback.speed_ms and export.frame_delay_ms must be > 0",
            ));
        }
        Resolution::new(self.export.width, self.export.height)?;
        Ok(())
    }
}

/// HTTP settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// User agent sent with every request.
    pub user_agent: String,
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
    /// Base URL of the cached frame-list service; direct directory listing is used when unset.
    pub frame_service_url: Option<String>,
    /// Base URL of the image proxy used for pixel access during export.
    pub image_proxy_url: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: format!("skyloop/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 20,
            frame_service_url: None,
            image_proxy_url: None,
        }
    }
}

impl HttpSettings {
    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Listing cache settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingSettings {
    /// Seconds a fetched listing stays live.
    pub ttl_secs: u64,
    /// Maximum number of cached `(source, hours)` listings.
    pub cache_capacity: usize,
    /// Default look-back window in hours.
    pub hours_back: u32,
}

impl Default for ListingSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            cache_capacity: 64,
            hours_back: 6,
        }
    }
}

/// Verification and preloading settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreloadSettings {
    /// Images verified concurrently per batch.
    pub batch_size: usize,
    /// Pause between batches, in milliseconds.
    pub batch_delay_ms: u64,
    /// Per-image verification timeout, in milliseconds.
    pub item_timeout_ms: u64,
    /// Timeout of the latest-image health probe, in milliseconds.
    pub probe_timeout_ms: u64,
    /// Below this many verified frames, callers fall back to latest-only mode.
    pub min_frames: usize,
    /// Maximum number of URLs remembered as verified.
    pub verified_capacity: usize,
}

impl Default for PreloadSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            batch_delay_ms: 75,
            item_timeout_ms: 5_000,
            probe_timeout_ms: 8_000,
            min_frames: 3,
            verified_capacity: 4_096,
        }
    }
}

/// Alignment policy selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineMode {
    /// 10 minute tolerance, entries need two sources.
    #[default]
    Strict,
    /// 15 minute tolerance, partial entries allowed.
    Progressive,
}

/// Timeline settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineSettings {
    /// Alignment preset.
    pub mode: TimelineMode,
    /// Upper bound on timeline length.
    pub max_entries: usize,
}

impl Default for TimelineSettings {
    fn default() -> Self {
        Self {
            mode: TimelineMode::Strict,
            max_entries: 100,
        }
    }
}

impl TimelineSettings {
    /// Resolve the configured preset into a policy.
    pub fn policy(&self) -> TimelinePolicy {
        let base = match self.mode {
            TimelineMode::Strict => TimelinePolicy::strict(),
            TimelineMode::Progressive => TimelinePolicy::progressive(),
        };
        base.with_max_entries(self.max_entries)
    }
}

/// Playback settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Milliseconds between animation steps.
    pub speed_ms: u64,
    /// Seconds between refreshes in latest-only mode.
    pub latest_refresh_secs: u64,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            speed_ms: 500,
            latest_refresh_secs: 60,
        }
    }
}

/// Export settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Artifact filename prefix.
    pub artifact_prefix: String,
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Milliseconds each frame is shown.
    pub frame_delay_ms: u64,
    /// TTF/OTF font used for captions; common system fonts are tried when unset.
    pub caption_font: Option<PathBuf>,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            artifact_prefix: "skyloop".to_string(),
            width: 1280,
            height: 720,
            frame_delay_ms: 200,
            caption_font: None,
        }
    }
}

impl ExportSettings {
    /// Output resolution.
    pub fn resolution(&self) -> SkyloopResult<Resolution> {
        Resolution::new(self.width, self.height)
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
