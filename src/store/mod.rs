//! Persistence contracts for listings, the scrape queue and cache metadata
//!
//! All writes are keyed by natural identity (`(source, url)` or VIN), so
//! concurrent writers converge without exclusive locks. A second insert for
//! an existing `(source, url)` reports `StoreError::Conflict` carrying the
//! existing row id instead of creating a duplicate.

mod db;

pub use db::SledStore;

use std::collections::HashSet;

use crate::error::StoreError;
use crate::models::{
    CacheMetadata, Listing, QueueStatus, ScrapeQueueItem, SourceId, StoredListing,
};

pub trait ListingStore: Send + Sync {
    /// Insert a new row; fails with `Conflict` when `(source, url)` exists.
    fn insert_listing(&self, listing: &Listing) -> Result<u64, StoreError>;
    fn update_listing(&self, id: u64, listing: &Listing) -> Result<(), StoreError>;
    fn get_listing(&self, id: u64) -> Result<Option<StoredListing>, StoreError>;
    fn find_by_url(&self, source: SourceId, url: &str) -> Result<Option<StoredListing>, StoreError>;
    fn find_by_vin(&self, vin: &str) -> Result<Vec<StoredListing>, StoreError>;
    /// Subset of `urls` that already have a listing for `source`
    fn existing_urls(&self, source: SourceId, urls: &[String]) -> Result<HashSet<String>, StoreError>;
    fn all_listings(&self) -> Result<Vec<StoredListing>, StoreError>;
    fn listing_count(&self) -> Result<usize, StoreError>;
}

pub trait QueueStore: Send + Sync {
    /// Add an item unless `(source, url)` is already queued. Returns whether
    /// it was added; existing items (including `Done` ones) are left untouched.
    fn enqueue(&self, item: &ScrapeQueueItem) -> Result<bool, StoreError>;
    fn queue_item(&self, source: SourceId, url: &str) -> Result<Option<ScrapeQueueItem>, StoreError>;
    fn save_queue_item(&self, item: &ScrapeQueueItem) -> Result<(), StoreError>;
    /// Pending items, highest priority first, then oldest first
    fn pending(&self, source: SourceId, limit: usize) -> Result<Vec<ScrapeQueueItem>, StoreError>;
    fn queue_items(
        &self,
        source: SourceId,
        status: Option<QueueStatus>,
    ) -> Result<Vec<ScrapeQueueItem>, StoreError>;
}

pub trait CacheIndex: Send + Sync {
    /// Upsert; one row per `(source, url)`
    fn put_cache_meta(&self, meta: &CacheMetadata) -> Result<(), StoreError>;
    fn cache_meta(&self, source: SourceId, url: &str) -> Result<Option<CacheMetadata>, StoreError>;
    fn cache_meta_for_source(&self, source: SourceId) -> Result<Vec<CacheMetadata>, StoreError>;
    fn delete_cache_meta(&self, source: SourceId, url: &str) -> Result<(), StoreError>;
}

/// Everything the orchestrator persists
pub trait Store: ListingStore + QueueStore + CacheIndex {
    /// Make every write so far durable
    fn flush(&self) -> Result<(), StoreError>;
}
