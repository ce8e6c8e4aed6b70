//! Raw page cache
//!
//! Every fetched detail page is kept gzip-compressed in a blob store at
//! `<source>/<h[0..2]>/<h>.html.gz`, where `h` is the hex SHA-256 of the URL.
//! Metadata (sizes, fetch time) lives in the listing database, one row per
//! `(source, url)`. Entries are written once; only `refresh` replaces them.

mod blob;

pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore};

use chrono::Utc;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::io::{self, Read, Write};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::models::{CacheMetadata, SourceId};
use crate::store::{CacheIndex, Store};

/// Deterministic blob key for a page
pub fn blob_key(source: SourceId, url: &str) -> String {
    let hash = hex::encode(Sha256::digest(url.as_bytes()));
    format!("{}/{}/{}.html.gz", source.as_str(), &hash[..2], hash)
}

fn compress(html: &str) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(html.as_bytes())?;
    encoder.finish()
}

fn decompress(bytes: &[u8]) -> io::Result<String> {
    let mut html = String::new();
    GzDecoder::new(bytes).read_to_string(&mut html)?;
    Ok(html)
}

#[derive(Clone)]
pub struct RawContentCache {
    blobs: Arc<dyn BlobStore>,
    index: Arc<dyn Store>,
}

impl RawContentCache {
    pub fn new(blobs: Arc<dyn BlobStore>, index: Arc<dyn Store>) -> Self {
        Self { blobs, index }
    }

    pub async fn has(&self, source: SourceId, url: &str) -> Result<bool, CacheError> {
        Ok(self.index.cache_meta(source, url)?.is_some())
    }

    /// Decompressed page content, if cached
    pub async fn get(&self, source: SourceId, url: &str) -> Result<Option<String>, CacheError> {
        let Some(meta) = self.index.cache_meta(source, url)? else {
            return Ok(None);
        };
        let Some(bytes) = self.blobs.get(&meta.path).await? else {
            warn!(source = %source, url = %url, path = %meta.path, "Cache metadata without blob, dropping entry");
            self.index.delete_cache_meta(source, url)?;
            return Ok(None);
        };
        let html = if meta.compressed {
            decompress(&bytes)?
        } else {
            String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
        };
        Ok(Some(html))
    }

    /// Store a freshly fetched page. An existing entry is left as it is.
    pub async fn put(&self, source: SourceId, url: &str, html: &str) -> Result<CacheMetadata, CacheError> {
        if let Some(existing) = self.index.cache_meta(source, url)? {
            debug!(source = %source, url = %url, "Page already cached");
            return Ok(existing);
        }
        self.write(source, url, html).await
    }

    /// Replace the cached page and its metadata
    pub async fn refresh(&self, source: SourceId, url: &str, html: &str) -> Result<CacheMetadata, CacheError> {
        self.write(source, url, html).await
    }

    async fn write(&self, source: SourceId, url: &str, html: &str) -> Result<CacheMetadata, CacheError> {
        let path = blob_key(source, url);
        let compressed = compress(html)?;
        self.blobs.put(&path, &compressed).await?;

        let meta = CacheMetadata {
            source,
            url: url.to_string(),
            path,
            byte_size: html.len() as u64,
            stored_size: compressed.len() as u64,
            compressed: true,
            fetched_at: Utc::now(),
        };
        self.index.put_cache_meta(&meta)?;
        debug!(
            source = %source,
            url = %url,
            bytes = meta.byte_size,
            stored = meta.stored_size,
            "Cached page"
        );
        Ok(meta)
    }

    pub async fn delete(&self, source: SourceId, url: &str) -> Result<(), CacheError> {
        if let Some(meta) = self.index.cache_meta(source, url)? {
            self.blobs.delete(&meta.path).await?;
            self.index.delete_cache_meta(source, url)?;
        }
        Ok(())
    }

    /// Metadata of every cached page for a source
    pub async fn list(&self, source: SourceId) -> Result<Vec<CacheMetadata>, CacheError> {
        Ok(self.index.cache_meta_for_source(source)?)
    }
}
