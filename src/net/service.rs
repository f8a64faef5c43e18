use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::foundation::core::Frame;
use crate::foundation::error::{SkyloopError, SkyloopResult};
use crate::net::fetch::Fetcher;

/// Body of `GET /frames/{sourceKey}?hours=N` on the cached frame-list service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameListResponse {
    /// Source key echoed by the service.
    pub source: String,
    /// Directory the frames were listed from.
    #[serde(default)]
    pub base_url: String,
    /// Representative latest image, if the service knows one.
    #[serde(default)]
    pub latest_url: Option<String>,
    /// Frames in any order; the lister sorts and filters them.
    #[serde(default)]
    pub frames: Vec<Frame>,
    /// Service-side fetch instant, passed through verbatim.
    #[serde(default)]
    pub fetched_at: Option<String>,
}

/// Client for the cached frame-list service.
#[derive(Clone)]
pub struct FrameServiceClient {
    base_url: String,
    fetcher: Arc<dyn Fetcher>,
}

impl FrameServiceClient {
    /// Create a client rooted at `base_url`.
    pub fn new(base_url: impl Into<String>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            fetcher,
        }
    }

    /// URL of the frame list for `source_key` over the last `hours`.
    pub fn frames_url(&self, source_key: &str, hours: u32) -> SkyloopResult<String> {
        let mut url = reqwest::Url::parse(&format!("{}/frames/", self.base_url))
            .map_err(|e| SkyloopError::validation(format!("invalid frame service url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| SkyloopError::validation("frame service url cannot be a base"))?
            .pop_if_empty()
            .push(source_key);
        url.query_pairs_mut().append_pair("hours", &hours.to_string());
        Ok(url.to_string())
    }

    /// Fetch and decode the frame list. Frames missing a source key inherit `source_key`.
    pub async fn fetch(&self, source_key: &str, hours: u32) -> SkyloopResult<FrameListResponse> {
        let url = self.frames_url(source_key, hours)?;
        let body = self.fetcher.fetch_text(&url).await?;
        let mut resp: FrameListResponse = serde_json::from_str(&body)?;
        for f in &mut resp.frames {
            if f.source_key.is_empty() {
                f.source_key = source_key.to_string();
            }
        }
        Ok(resp)
    }
}

/// Builds image-proxy URLs for pixel-level access to cross-origin imagery.
#[derive(Clone, Debug, Default)]
pub struct ImageProxy {
    base_url: Option<String>,
}

impl ImageProxy {
    /// Proxy rooted at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into().trim_end_matches('/').to_string()),
        }
    }

    /// Pass-through proxy: URLs are used as-is.
    pub fn direct() -> Self {
        Self { base_url: None }
    }

    /// Build from an optional configured base URL.
    pub fn from_config(base_url: Option<&str>) -> Self {
        base_url.map_or_else(Self::direct, Self::new)
    }

    /// `{proxy}/image?url=<encoded>` when a proxy is configured, otherwise `url` unchanged.
    pub fn proxied(&self, url: &str) -> SkyloopResult<String> {
        let Some(base) = self.base_url.as_deref() else {
            return Ok(url.to_string());
        };
        let proxied = reqwest::Url::parse_with_params(&format!("{base}/image"), &[("url", url)])
            .map_err(|e| SkyloopError::validation(format!("invalid image proxy url: {e}")))?;
        Ok(proxied.to_string())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/net/service.rs"]
mod tests;
