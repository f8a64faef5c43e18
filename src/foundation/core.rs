use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::foundation::error::{SkyloopError, SkyloopResult};

/// One published image of a feed, recovered from a listing.
///
/// Frames are immutable once constructed; a refresh replaces the whole list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Absolute image URL.
    pub url: String,
    /// Instant encoded in the filename, serialized as epoch milliseconds.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Bare filename (last path segment).
    pub filename: String,
    /// Key of the owning source.
    #[serde(default)]
    pub source_key: String,
}

impl Frame {
    /// Timestamp as epoch milliseconds.
    pub fn epoch_ms(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// Output pixel dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Resolution {
    /// Create a validated, non-zero resolution.
    pub fn new(width: u32, height: u32) -> SkyloopResult<Self> {
        if width == 0 || height == 0 {
            return Err(SkyloopError::validation(
                "resolution width/height must be non-zero",
            ));
        }
        Ok(Self { width, height })
    }

    /// Round both dimensions down to even values (required for yuv420p video).
    pub fn even(self) -> Self {
        Self {
            width: (self.width & !1).max(2),
            height: (self.height & !1).max(2),
        }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}
