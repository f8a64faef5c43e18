use async_trait::async_trait;
use tracing::debug;

use crate::config::HttpSettings;
use crate::foundation::error::{SkyloopError, SkyloopResult};

/// Network boundary used by listing, preloading and export.
///
/// Implementations map transport failures and non-2xx statuses to
/// [`SkyloopError::Acquisition`].
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `url` and return the body as text.
    async fn fetch_text(&self, url: &str) -> SkyloopResult<String>;
    /// GET `url` and return the raw body.
    async fn fetch_bytes(&self, url: &str) -> SkyloopResult<Vec<u8>>;
}

/// [`Fetcher`] backed by a shared `reqwest` client.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a client with the configured user agent and timeout.
    pub fn new(settings: &HttpSettings) -> SkyloopResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.timeout())
            .build()
            .map_err(|e| SkyloopError::acquisition(format!("failed to build http client: {e}")))?;
        Ok(Self { client })
    }

    async fn get(&self, url: &str) -> SkyloopResult<reqwest::Response> {
        debug!(url, "http get");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SkyloopError::acquisition(format!("GET {url}: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SkyloopError::acquisition(format!("GET {url}: HTTP {status}")));
        }
        Ok(resp)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> SkyloopResult<String> {
        self.get(url)
            .await?
            .text()
            .await
            .map_err(|e| SkyloopError::acquisition(format!("read body of {url}: {e}")))
    }

    async fn fetch_bytes(&self, url: &str) -> SkyloopResult<Vec<u8>> {
        let bytes = self
            .get(url)
            .await?
            .bytes()
            .await
            .map_err(|e| SkyloopError::acquisition(format!("read body of {url}: {e}")))?;
        Ok(bytes.to_vec())
    }
}
