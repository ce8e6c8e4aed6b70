//! URL-level deduplication against persisted listings and the page cache

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::error::StoreError;
use crate::models::SourceId;
use crate::store::{ListingStore, Store};

/// Default pagination stop threshold (percent of already-known candidates)
pub const DEFAULT_STOP_THRESHOLD: f64 = 80.0;

/// Query parameters that never change which listing a URL points to
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "ref",
    "referrer",
    "source",
];

/// Canonical form used for every key and comparison: no fragment, no
/// `www.`, no trailing slash, no tracking parameters, sorted query.
pub fn canonicalize_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);

    if let Some(host) = url.host_str().map(|h| h.to_string()) {
        if let Some(stripped) = host.strip_prefix("www.") {
            if let Err(e) = url.set_host(Some(stripped)) {
                warn!("Failed to strip www. from {}: {}", host, e);
            }
        }
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    if let Some(query) = url.query().map(|q| q.to_string()) {
        let mut params: Vec<&str> = query
            .split('&')
            .filter(|p| {
                let key = p.split('=').next().unwrap_or("").to_lowercase();
                !p.is_empty() && !TRACKING_PARAMS.contains(&key.as_str())
            })
            .collect();
        if params.is_empty() {
            url.set_query(None);
        } else {
            params.sort_unstable();
            url.set_query(Some(&params.join("&")));
        }
    }

    Some(url.to_string())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DedupStats {
    pub total: usize,
    pub new: usize,
    pub existing: usize,
    /// Percent of candidates already known, 0 when there were none
    pub duplicate_rate: f64,
    /// Informational: fetch cost saved by skipping known URLs
    pub estimated_cost_avoided: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DedupResult {
    pub new_urls: Vec<String>,
    pub existing_urls: Vec<String>,
    pub stats: DedupStats,
}

/// Read-only view over listings and cache metadata
pub struct DedupService {
    store: Arc<dyn Store>,
    batch_size: usize,
    cost_per_fetch: f64,
}

impl DedupService {
    pub fn new(store: Arc<dyn Store>, batch_size: usize, cost_per_fetch: f64) -> Self {
        Self {
            store,
            batch_size: batch_size.clamp(1, 100),
            cost_per_fetch,
        }
    }

    /// Partition `urls` into those with and without a stored listing for
    /// `source`. Input order is kept; repeated URLs are reported once.
    pub fn filter_new_urls(&self, source: SourceId, urls: &[String]) -> Result<DedupResult, StoreError> {
        let mut seen = HashSet::new();
        let unique: Vec<String> = urls.iter().filter(|u| seen.insert(u.as_str())).cloned().collect();

        let mut known = HashSet::new();
        for batch in unique.chunks(self.batch_size) {
            known.extend(self.store.existing_urls(source, batch)?);
        }

        let (existing_urls, new_urls): (Vec<String>, Vec<String>) =
            unique.into_iter().partition(|u| known.contains(u));

        let total = new_urls.len() + existing_urls.len();
        let duplicate_rate = if total == 0 {
            0.0
        } else {
            existing_urls.len() as f64 * 100.0 / total as f64
        };
        let stats = DedupStats {
            total,
            new: new_urls.len(),
            existing: existing_urls.len(),
            duplicate_rate,
            estimated_cost_avoided: existing_urls.len() as f64 * self.cost_per_fetch,
        };
        debug!(
            source = %source,
            total,
            new = stats.new,
            existing = stats.existing,
            rate = duplicate_rate,
            "Deduplicated candidates"
        );

        Ok(DedupResult {
            new_urls,
            existing_urls,
            stats,
        })
    }

    /// URLs with a cached page for `source`, whether or not a listing came of it
    pub fn get_existing_cached_urls(&self, source: SourceId) -> Result<HashSet<String>, StoreError> {
        Ok(self
            .store
            .cache_meta_for_source(source)?
            .into_iter()
            .map(|m| m.url)
            .collect())
    }

    /// Pagination breaker: stop once recent pages are mostly known. A
    /// heuristic only; never a proof that nothing new remains.
    pub fn should_stop_pagination(recent_duplicate_rate: f64, threshold: f64) -> bool {
        recent_duplicate_rate >= threshold
    }
}
