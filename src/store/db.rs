//! sled-backed store
//!
//! Trees:
//! - `listings`: id (big-endian u64) -> `StoredListing` JSON
//! - `url_index`: `source \x1f url` -> id
//! - `vin_index`: `VIN \x1f id` -> empty
//! - `queue`: `source \x1f url` -> `ScrapeQueueItem` JSON
//! - `cache_meta`: `source \x1f url` -> `CacheMetadata` JSON

use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::HashSet;
use sled::transaction::{abort, TransactionError};
use sled::Transactional;
use std::path::Path;

use super::{CacheIndex, ListingStore, QueueStore, Store};
use crate::error::StoreError;
use crate::models::{
    CacheMetadata, Listing, QueueStatus, ScrapeQueueItem, SourceId, StoredListing,
};

const SEP: char = '\u{1f}';

pub struct SledStore {
    db: sled::Db,
    listings: sled::Tree,
    url_index: sled::Tree,
    vin_index: sled::Tree,
    queue: sled::Tree,
    cache_meta: sled::Tree,
}

fn natural_key(source: SourceId, url: &str) -> Vec<u8> {
    format!("{}{}{}", source.as_str(), SEP, url).into_bytes()
}

fn source_prefix(source: SourceId) -> Vec<u8> {
    format!("{}{}", source.as_str(), SEP).into_bytes()
}

fn vin_key(vin: &str, id: u64) -> Vec<u8> {
    let mut key = format!("{}{}", vin, SEP).into_bytes();
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn id_from(bytes: &[u8]) -> Option<u64> {
    let arr: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_be_bytes(arr))
}

impl SledStore {
    /// Open or create the database under `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path)
            .with_context(|| format!("Failed to open listing database at {:?}", path))?;
        Self::from_db(db)
    }

    /// Throwaway database that is removed on drop
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .context("Failed to open temporary database")?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let listings = db.open_tree("listings").context("Failed to open listings tree")?;
        let url_index = db.open_tree("url_index").context("Failed to open URL index tree")?;
        let vin_index = db.open_tree("vin_index").context("Failed to open VIN index tree")?;
        let queue = db.open_tree("queue").context("Failed to open queue tree")?;
        let cache_meta = db.open_tree("cache_meta").context("Failed to open cache metadata tree")?;
        Ok(Self {
            db,
            listings,
            url_index,
            vin_index,
            queue,
            cache_meta,
        })
    }

    fn load_listing(&self, id: u64) -> Result<Option<StoredListing>, StoreError> {
        match self.listings.get(id.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl ListingStore for SledStore {
    fn insert_listing(&self, listing: &Listing) -> Result<u64, StoreError> {
        let key = natural_key(listing.source, &listing.source_url);
        let id = self.db.generate_id()?;
        let stored = StoredListing {
            id,
            listing: listing.clone(),
            updated_at: Utc::now(),
        };
        let row = serde_json::to_vec(&stored)?;

        // Key, row and VIN entry land together. A key whose row is missing
        // was never committed and is claimed again.
        let result = (&self.url_index, &self.listings, &self.vin_index).transaction(|(urls, rows, vins)| {
            if let Some(existing) = urls.get(&key)?.as_deref().and_then(id_from) {
                if rows.get(existing.to_be_bytes())?.is_some() {
                    return abort(existing);
                }
            }
            urls.insert(key.as_slice(), &id.to_be_bytes()[..])?;
            rows.insert(&id.to_be_bytes()[..], row.as_slice())?;
            if let Some(vin) = &listing.vin {
                vins.insert(vin_key(vin, id), &[] as &[u8])?;
            }
            Ok(())
        });

        match result {
            Ok(()) => Ok(id),
            Err(TransactionError::Abort(existing)) => Err(StoreError::Conflict { id: existing }),
            Err(TransactionError::Storage(e)) => Err(StoreError::Db(e)),
        }
    }

    fn update_listing(&self, id: u64, listing: &Listing) -> Result<(), StoreError> {
        let previous = self.load_listing(id)?.ok_or(StoreError::NotFound(id))?;
        if previous.listing.vin != listing.vin {
            if let Some(old) = &previous.listing.vin {
                self.vin_index.remove(vin_key(old, id))?;
            }
            if let Some(new) = &listing.vin {
                self.vin_index.insert(vin_key(new, id), &[] as &[u8])?;
            }
        }
        let stored = StoredListing {
            id,
            listing: listing.clone(),
            updated_at: Utc::now(),
        };
        self.listings.insert(id.to_be_bytes(), serde_json::to_vec(&stored)?)?;
        Ok(())
    }

    fn get_listing(&self, id: u64) -> Result<Option<StoredListing>, StoreError> {
        self.load_listing(id)
    }

    fn find_by_url(&self, source: SourceId, url: &str) -> Result<Option<StoredListing>, StoreError> {
        match self.url_index.get(natural_key(source, url))? {
            Some(bytes) => match id_from(&bytes) {
                Some(id) => self.load_listing(id),
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    fn find_by_vin(&self, vin: &str) -> Result<Vec<StoredListing>, StoreError> {
        let prefix = format!("{}{}", vin, SEP).into_bytes();
        let mut rows = Vec::new();
        for entry in self.vin_index.scan_prefix(&prefix) {
            let (key, _) = entry?;
            if let Some(id) = id_from(&key[prefix.len()..]) {
                if let Some(row) = self.load_listing(id)? {
                    rows.push(row);
                }
            }
        }
        rows.sort_by_key(|r| r.id);
        Ok(rows)
    }

    fn existing_urls(&self, source: SourceId, urls: &[String]) -> Result<HashSet<String>, StoreError> {
        let mut found = HashSet::new();
        for url in urls {
            let id = self.url_index.get(natural_key(source, url))?.as_deref().and_then(id_from);
            if let Some(id) = id {
                if self.listings.contains_key(id.to_be_bytes())? {
                    found.insert(url.clone());
                }
            }
        }
        Ok(found)
    }

    fn all_listings(&self) -> Result<Vec<StoredListing>, StoreError> {
        self.listings
            .iter()
            .values()
            .map(|v| Ok(serde_json::from_slice(&v?)?))
            .collect()
    }

    fn listing_count(&self) -> Result<usize, StoreError> {
        Ok(self.listings.len())
    }
}

impl QueueStore for SledStore {
    fn enqueue(&self, item: &ScrapeQueueItem) -> Result<bool, StoreError> {
        let key = natural_key(item.source, &item.url);
        let bytes = serde_json::to_vec(item)?;
        Ok(self
            .queue
            .compare_and_swap(&key, None as Option<&[u8]>, Some(bytes))?
            .is_ok())
    }

    fn queue_item(&self, source: SourceId, url: &str) -> Result<Option<ScrapeQueueItem>, StoreError> {
        match self.queue.get(natural_key(source, url))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save_queue_item(&self, item: &ScrapeQueueItem) -> Result<(), StoreError> {
        self.queue
            .insert(natural_key(item.source, &item.url), serde_json::to_vec(item)?)?;
        Ok(())
    }

    fn pending(&self, source: SourceId, limit: usize) -> Result<Vec<ScrapeQueueItem>, StoreError> {
        let mut items = self.queue_items(source, Some(QueueStatus::Pending))?;
        items.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.enqueued_at.cmp(&b.enqueued_at))
                .then_with(|| a.url.cmp(&b.url))
        });
        items.truncate(limit);
        Ok(items)
    }

    fn queue_items(
        &self,
        source: SourceId,
        status: Option<QueueStatus>,
    ) -> Result<Vec<ScrapeQueueItem>, StoreError> {
        let mut items = Vec::new();
        for entry in self.queue.scan_prefix(source_prefix(source)) {
            let (_, bytes) = entry?;
            let item: ScrapeQueueItem = serde_json::from_slice(&bytes)?;
            if status.map_or(true, |s| s == item.status) {
                items.push(item);
            }
        }
        Ok(items)
    }
}

impl CacheIndex for SledStore {
    fn put_cache_meta(&self, meta: &CacheMetadata) -> Result<(), StoreError> {
        self.cache_meta
            .insert(natural_key(meta.source, &meta.url), serde_json::to_vec(meta)?)?;
        Ok(())
    }

    fn cache_meta(&self, source: SourceId, url: &str) -> Result<Option<CacheMetadata>, StoreError> {
        match self.cache_meta.get(natural_key(source, url))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn cache_meta_for_source(&self, source: SourceId) -> Result<Vec<CacheMetadata>, StoreError> {
        self.cache_meta
            .scan_prefix(source_prefix(source))
            .values()
            .map(|v| Ok(serde_json::from_slice(&v?)?))
            .collect()
    }

    fn delete_cache_meta(&self, source: SourceId, url: &str) -> Result<(), StoreError> {
        self.cache_meta.remove(natural_key(source, url))?;
        Ok(())
    }
}

impl Store for SledStore {
    fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}
