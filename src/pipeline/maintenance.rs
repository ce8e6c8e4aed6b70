//! Whole-dataset passes: re-normalization, reparse from cache, requeue
//! and per-source statistics

use chrono::Utc;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

use super::{ingest, IngestOutcome, RunReport};
use crate::cache::RawContentCache;
use crate::error::{PipelineError, StoreError};
use crate::models::{QueueStatus, SourceId};
use crate::normalize::Normalizer;
use crate::scrapers::scraper_for;
use crate::store::{CacheIndex, ListingStore, QueueStore, Store};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeReport {
    pub examined: usize,
    pub changed: usize,
    pub rejections: usize,
}

/// Re-apply normalization to every stored listing, writing only rows whose
/// canonical form changed. A second pass finds nothing to change.
pub fn normalize_all(store: &dyn Store, normalizer: &Normalizer) -> Result<NormalizeReport, StoreError> {
    let mut report = NormalizeReport::default();
    for stored in store.all_listings()? {
        report.examined += 1;
        let (listing, rejections) = normalizer.renormalize(&stored.listing);
        report.rejections += rejections.len();
        if listing != stored.listing {
            debug!(id = stored.id, url = %listing.source_url, "Normalized listing changed");
            store.update_listing(stored.id, &listing)?;
            report.changed += 1;
        }
    }
    store.flush()?;
    info!(examined = report.examined, changed = report.changed, "Normalization pass finished");
    Ok(report)
}

/// Move queue items in any of `statuses` back to pending. Returns how many
/// were reset.
pub fn requeue(store: &dyn Store, source: SourceId, statuses: &[QueueStatus]) -> Result<usize, StoreError> {
    let mut reset = 0;
    for status in statuses.iter().filter(|s| **s != QueueStatus::Pending) {
        for mut item in store.queue_items(source, Some(*status))? {
            item.status = QueueStatus::Pending;
            item.attempts = 0;
            item.last_error = None;
            item.rescrape.clear();
            item.updated_at = Utc::now();
            store.save_queue_item(&item)?;
            reset += 1;
        }
    }
    store.flush()?;
    info!(source = %source, reset, "Requeued items");
    Ok(reset)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceStats {
    pub source: Option<SourceId>,
    pub listings: usize,
    pub sold: usize,
    pub with_vin: usize,
    pub pending: usize,
    pub done: usize,
    pub failed: usize,
    pub needs_rescrape: usize,
    pub cached_pages: usize,
    pub cached_bytes: u64,
}

pub fn source_stats(store: &dyn Store, source: SourceId) -> Result<SourceStats, StoreError> {
    let mut stats = SourceStats {
        source: Some(source),
        ..Default::default()
    };
    for stored in store.all_listings()?.into_iter().filter(|s| s.listing.source == source) {
        stats.listings += 1;
        if stored.listing.is_sold() {
            stats.sold += 1;
        }
        if stored.listing.vin.is_some() {
            stats.with_vin += 1;
        }
    }
    for item in store.queue_items(source, None)? {
        match item.status {
            QueueStatus::Pending => stats.pending += 1,
            QueueStatus::Done => stats.done += 1,
            QueueStatus::Failed => stats.failed += 1,
            QueueStatus::NeedsRescrape => stats.needs_rescrape += 1,
        }
    }
    for meta in store.cache_meta_for_source(source)? {
        stats.cached_pages += 1;
        stats.cached_bytes += meta.stored_size;
    }
    Ok(stats)
}

impl fmt::Display for SourceStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = self.source.map(|s| s.as_str()).unwrap_or("-");
        write!(
            f,
            "{:<16} listings {:>6} (sold {}, vin {})  queue p/d/f/r {}/{}/{}/{}  cache {} pages, {} KiB",
            source,
            self.listings,
            self.sold,
            self.with_vin,
            self.pending,
            self.done,
            self.failed,
            self.needs_rescrape,
            self.cached_pages,
            self.cached_bytes / 1024
        )
    }
}

/// Parse every cached page of `source` again and push the results through
/// normalization and merge. No network access.
pub async fn reparse_from_cache(
    store: &dyn Store,
    cache: &RawContentCache,
    normalizer: &Normalizer,
    source: SourceId,
) -> Result<RunReport, PipelineError> {
    let scraper = scraper_for(source);
    let mut report = RunReport::new(source);

    for meta in cache.list(source).await? {
        let Some(html) = cache.get(source, &meta.url).await? else {
            continue;
        };
        report.cache_hits += 1;
        let partial = match scraper.parse_cached(&meta.url, &html) {
            Ok(partial) => partial,
            Err(failure) => {
                warn!(source = %source, url = %meta.url, "Reparse failed: {}", failure);
                report.failed += 1;
                continue;
            }
        };
        match ingest(store, normalizer, &partial)? {
            IngestOutcome::Applied { kind, .. } => report.record_merge(kind),
            IngestOutcome::Dropped { .. } => report.rejected += 1,
        }
    }

    store.flush()?;
    info!(
        source = %source,
        pages = report.cache_hits,
        persisted = report.persisted(),
        failed = report.failed,
        "Reparse from cache finished"
    );
    Ok(report)
}
