use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::catalog::model::{Catalog, SourceDescriptor};
use crate::config::ListingSettings;
use crate::foundation::clock::Clock;
use crate::foundation::core::Frame;
use crate::foundation::error::SkyloopResult;
use crate::listing::anchors::scan_image_links;
use crate::listing::cache::TtlCache;
use crate::net::fetch::Fetcher;
use crate::net::service::FrameServiceClient;
use crate::timestamp::grammar::{GrammarTable, is_latest_placeholder};

/// Where raw frame listings come from.
#[derive(Clone)]
pub enum ListingBackend {
    /// Scan the source's HTML directory listing.
    Directory,
    /// Ask the cached frame-list service.
    Service(FrameServiceClient),
}

/// Cache key: one entry per `(source, hours_back)` request.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ListingKey {
    /// Source key.
    pub source_key: String,
    /// Look-back window in hours.
    pub hours_back: u32,
}

/// Produces sorted, time-filtered frame lists per source, caching parsed results.
///
/// Every acquisition failure is absorbed: the caller sees an empty list, never an error.
pub struct FrameLister {
    catalog: Arc<Catalog>,
    grammars: GrammarTable,
    fetcher: Arc<dyn Fetcher>,
    backend: ListingBackend,
    clock: Arc<dyn Clock>,
    cache: Mutex<TtlCache<ListingKey, Arc<Vec<Frame>>>>,
    in_flight: Mutex<HashMap<ListingKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl FrameLister {
    /// Create a lister for every source in `catalog`.
    pub fn new(
        catalog: Arc<Catalog>,
        fetcher: Arc<dyn Fetcher>,
        backend: ListingBackend,
        clock: Arc<dyn Clock>,
        settings: &ListingSettings,
    ) -> Self {
        let ttl = Duration::seconds(settings.ttl_secs as i64);
        Self {
            grammars: catalog.grammar_table(),
            catalog,
            fetcher,
            backend,
            cache: Mutex::new(TtlCache::new(settings.cache_capacity, ttl, clock.clone())),
            in_flight: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Register an additional source grammar without touching the catalog.
    pub fn grammars_mut(&mut self) -> &mut GrammarTable {
        &mut self.grammars
    }

    /// Frames of `source_key` newer than `now - hours_back`, strictly ascending by timestamp.
    ///
    /// A live cache entry is returned without any network call. Concurrent calls for the same
    /// key share one fetch. Unknown sources and failed fetches produce an empty list, which is
    /// not cached.
    pub async fn list(&self, source_key: &str, hours_back: u32) -> Vec<Frame> {
        let key = ListingKey {
            source_key: source_key.to_string(),
            hours_back,
        };
        if let Some(hit) = self.cached(&key) {
            return hit;
        }

        let gate = self.gate(&key);
        let frames = {
            let _fetching = gate.lock().await;
            match self.cached(&key) {
                Some(hit) => hit,
                None => self.fetch_and_cache(&key).await,
            }
        };
        self.release_gate(&key, &gate);
        frames
    }

    fn cached(&self, key: &ListingKey) -> Option<Vec<Frame>> {
        let hit = self.lock_cache().get(key)?;
        debug!(source = %key.source_key, hours_back = key.hours_back, "listing cache hit");
        Some(hit.as_ref().clone())
    }

    fn gate(&self, key: &ListingKey) -> Arc<tokio::sync::Mutex<()>> {
        self.lock_in_flight()
            .entry(key.clone())
            .or_default()
            .clone()
    }

    fn release_gate(&self, key: &ListingKey, gate: &Arc<tokio::sync::Mutex<()>>) {
        let mut in_flight = self.lock_in_flight();
        // Map entry plus ours: no other caller is waiting on this key.
        if Arc::strong_count(gate) == 2
            && in_flight.get(key).is_some_and(|g| Arc::ptr_eq(g, gate))
        {
            in_flight.remove(key);
        }
    }

    async fn fetch_and_cache(&self, key: &ListingKey) -> Vec<Frame> {
        let (source_key, hours_back) = (key.source_key.as_str(), key.hours_back);
        let Some(source) = self.catalog.get(source_key) else {
            warn!(source = source_key, "unknown source; returning empty frame list");
            return Vec::new();
        };

        let cutoff = self.clock.now() - Duration::hours(i64::from(hours_back));
        let fetched = match &self.backend {
            ListingBackend::Directory => self.list_directory(source, cutoff).await,
            ListingBackend::Service(client) => {
                self.list_service(client, source, hours_back, cutoff).await
            }
        };
        let frames = match fetched {
            Ok(frames) => frames,
            Err(e) => {
                warn!(source = source_key, error = %e, "listing fetch failed; returning empty frame list");
                return Vec::new();
            }
        };

        info!(source = source_key, hours_back, frames = frames.len(), "listed frames");
        self.lock_cache().insert(key.clone(), Arc::new(frames.clone()));
        frames
    }

    /// Drop every cached listing of `source_key` so the next `list` refetches.
    pub fn invalidate(&self, source_key: &str) {
        self.lock_cache()
            .invalidate_where(|k| k.source_key == source_key);
    }

    async fn list_directory(
        &self,
        source: &SourceDescriptor,
        cutoff: DateTime<Utc>,
    ) -> SkyloopResult<Vec<Frame>> {
        let html = self.fetcher.fetch_text(&source.base_url).await?;
        Ok(parse_listing(source, &self.grammars, &html, cutoff))
    }

    async fn list_service(
        &self,
        client: &FrameServiceClient,
        source: &SourceDescriptor,
        hours_back: u32,
        cutoff: DateTime<Utc>,
    ) -> SkyloopResult<Vec<Frame>> {
        let resp = client.fetch(&source.key, hours_back).await?;
        let frames = resp
            .frames
            .into_iter()
            .filter(|f| !is_latest_placeholder(&f.filename) && f.timestamp >= cutoff)
            .collect();
        Ok(sort_dedup(frames))
    }

    fn lock_in_flight(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<ListingKey, Arc<tokio::sync::Mutex<()>>>> {
        self.in_flight.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, TtlCache<ListingKey, Arc<Vec<Frame>>>> {
        self.cache.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Turn a raw directory listing into frames at or after `cutoff`.
///
/// "latest" placeholders and names the grammar cannot parse are dropped silently.
pub fn parse_listing(
    source: &SourceDescriptor,
    grammars: &GrammarTable,
    html: &str,
    cutoff: DateTime<Utc>,
) -> Vec<Frame> {
    let grammar = grammars.grammar_for(&source.key).unwrap_or(source.grammar);
    let frames = scan_image_links(source, html)
        .into_iter()
        .filter(|link| !is_latest_placeholder(&link.filename))
        .filter_map(|link| {
            let timestamp = grammar.extract(&link.filename)?;
            (timestamp >= cutoff).then(|| Frame {
                url: link.url,
                timestamp,
                filename: link.filename,
                source_key: source.key.clone(),
            })
        })
        .collect();
    sort_dedup(frames)
}

fn sort_dedup(mut frames: Vec<Frame>) -> Vec<Frame> {
    frames.sort_by_key(|f| f.timestamp);
    frames.dedup_by_key(|f| f.timestamp);
    frames
}

#[cfg(test)]
#[path = "../../tests/unit/listing/lister.rs"]
mod tests;
