pub mod rank;

use std::collections::HashSet;
use std::sync::Arc;
use crate::catalog::Catalog;
use crate::config::AppConfig;
use crate::errors::Result;
use crate::metadata::Track;
use crate::store::TrackStore;

/// Library-first search that tops up from the remote catalog.
pub struct SearchManager {
    store: Arc<dyn TrackStore>,
    catalog: Arc<dyn Catalog>,
    limit: usize,
    local_threshold: usize,
}

impl SearchManager {
    pub fn new(store: Arc<dyn TrackStore>, catalog: Arc<dyn Catalog>, config: &AppConfig) -> Self {
        Self {
            store,
            catalog,
            limit: config.search_limit,
            local_threshold: config.search_local_threshold,
        }
    }

    /// Searches the library, asks the catalog when the library has fewer than
    /// the threshold, and returns the ranked union without duplicate ids.
    ///
    /// A catalog failure is only returned when the library found nothing.
    pub async fn search(&self, query: &str) -> Result<Vec<Track>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let mut results = self.store.search_tracks(query, self.limit).await?;
        log::debug!("[SEARCH] '{}': {} local result(s)", query, results.len());

        if results.len() < self.local_threshold {
            match self.catalog.search_tracks(query, self.limit).await {
                Ok(remote) => self.merge_remote(&mut results, remote).await,
                Err(e) if !results.is_empty() => {
                    log::warn!("⚠️ [SEARCH] Catalog search for '{}' failed, using local results: {}", query, e);
                }
                Err(e) => {
                    log::error!("❌ [SEARCH] Catalog search for '{}' failed: {}", query, e);
                    return Err(e);
                }
            }
        }

        rank::rank(query, &mut results);
        Ok(results)
    }

    async fn merge_remote(&self, results: &mut Vec<Track>, remote: Vec<Track>) {
        let mut seen: HashSet<String> = results.iter().map(|track| track.id.clone()).collect();
        let mut added = 0;

        for track in remote {
            if !seen.insert(track.id.clone()) {
                continue;
            }
            if let Err(e) = self.store.insert_track_if_absent(&track).await {
                log::warn!("⚠️ [SEARCH] Could not store catalog track {}: {}", track.id, e);
            }
            results.push(track);
            added += 1;
        }

        log::debug!("[SEARCH] Added {} catalog result(s)", added);
    }
}
