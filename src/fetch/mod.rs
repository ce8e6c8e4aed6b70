//! Page retrieval
//!
//! `PageFetcher` is the transport contract; `HttpFetcher` and
//! `BrowserFetcher` implement it. `CachedPages` puts the raw content cache
//! in front of any fetcher so detail pages are paid for once.

mod browser;
mod http;

pub use browser::BrowserFetcher;
pub use http::HttpFetcher;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::RawContentCache;
use crate::config::FetchConfig;
use crate::error::{FetchError, PipelineError};
use crate::models::SourceId;

/// Per-request hints for the transport
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Page content is rendered client-side
    pub render_js: bool,
    /// Override of the transport's default timeout
    pub timeout: Option<Duration>,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch a page body. Timeouts and challenge pages surface as distinct
    /// `FetchError` variants so callers can back off.
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<String, FetchError>;

    fn name(&self) -> &'static str;
}

/// Markers of bot-challenge or block pages served with any status
const CHALLENGE_MARKERS: &[&str] = &[
    "cf-chl-",
    "challenge-platform",
    "just a moment...",
    "attention required! | cloudflare",
    "px-captcha",
    "please verify you are a human",
    "access to this page has been denied",
    "g-recaptcha",
];

/// Classify a response as a block/challenge page
pub fn detect_challenge(status: u16, body: &str) -> Option<String> {
    if status == 429 {
        return Some("rate limited".to_string());
    }
    let lower = body.to_lowercase();
    if let Some(marker) = CHALLENGE_MARKERS.iter().find(|m| lower.contains(*m)) {
        return Some(format!("challenge page ({})", marker));
    }
    if status == 403 {
        return Some("forbidden".to_string());
    }
    None
}

/// Build the configured transport. Credentials are checked here, before
/// any request is made.
pub fn build_fetcher(config: &FetchConfig) -> Result<Arc<dyn PageFetcher>, PipelineError> {
    if config.use_browser {
        let fetcher = BrowserFetcher::new(config)
            .map_err(|e| PipelineError::Credentials(format!("browser unavailable: {}", e)))?;
        return Ok(Arc::new(fetcher));
    }
    let api_key = config.resolve_api_key()?;
    let fetcher = HttpFetcher::new(config, api_key)
        .map_err(|e| PipelineError::Credentials(format!("HTTP client unavailable: {}", e)))?;
    Ok(Arc::new(fetcher))
}

/// A page body and where it came from
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub html: String,
    pub from_cache: bool,
}

/// Read-through cache in front of a fetcher
#[derive(Clone)]
pub struct CachedPages {
    fetcher: Arc<dyn PageFetcher>,
    cache: RawContentCache,
}

impl CachedPages {
    pub fn new(fetcher: Arc<dyn PageFetcher>, cache: RawContentCache) -> Self {
        Self { fetcher, cache }
    }

    pub fn cache(&self) -> &RawContentCache {
        &self.cache
    }

    pub fn fetcher(&self) -> &Arc<dyn PageFetcher> {
        &self.fetcher
    }

    /// Serve from cache when possible, otherwise fetch and cache the body
    /// before returning it. Cache trouble never fails a fetch.
    pub async fn get(
        &self,
        source: SourceId,
        url: &str,
        options: &FetchOptions,
    ) -> Result<FetchedPage, FetchError> {
        match self.cache.get(source, url).await {
            Ok(Some(html)) => {
                debug!(source = %source, url = %url, "Cache hit");
                return Ok(FetchedPage { html, from_cache: true });
            }
            Ok(None) => debug!(source = %source, url = %url, "Cache miss"),
            Err(e) => warn!(source = %source, url = %url, "Cache read failed: {}", e),
        }

        let html = self.fetcher.fetch(url, options).await?;
        if let Err(e) = self.cache.put(source, url, &html).await {
            warn!(source = %source, url = %url, "Cache write failed: {}", e);
        }
        Ok(FetchedPage { html, from_cache: false })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryBlobStore;
    use crate::store::{SledStore, Store};
    use parking_lot::Mutex;

    struct CountingFetcher {
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl PageFetcher for CountingFetcher {
        async fn fetch(&self, url: &str, _options: &FetchOptions) -> Result<String, FetchError> {
            *self.calls.lock() += 1;
            if url.contains("blocked") {
                return Err(FetchError::Blocked { status: 403, reason: "forbidden".into() });
            }
            Ok(format!("<html>{}</html>", url))
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn pages() -> (CachedPages, Arc<CountingFetcher>) {
        let fetcher = Arc::new(CountingFetcher { calls: Mutex::new(0) });
        let store: Arc<dyn Store> = Arc::new(SledStore::temporary().unwrap());
        let cache = RawContentCache::new(Arc::new(MemoryBlobStore::new()), store);
        (CachedPages::new(fetcher.clone(), cache), fetcher)
    }

    #[test]
    fn test_detect_challenge() {
        assert!(detect_challenge(503, "<title>Just a moment...</title>").is_some());
        assert!(detect_challenge(200, "<div id=\"px-captcha\"></div>").is_some());
        assert!(detect_challenge(429, "").is_some());
        assert!(detect_challenge(403, "nope").is_some());
        assert!(detect_challenge(200, "<html>1995 Porsche 911</html>").is_none());
        assert!(detect_challenge(500, "server error").is_none());
    }

    #[tokio::test]
    async fn test_second_get_is_served_from_cache() {
        let (pages, fetcher) = pages();
        let url = "https://bringatrailer.com/listing/2001-porsche-911-turbo";
        let first = pages.get(SourceId::BringATrailer, url, &FetchOptions::default()).await.unwrap();
        let second = pages.get(SourceId::BringATrailer, url, &FetchOptions::default()).await.unwrap();
        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(first.html, second.html);
        assert_eq!(*fetcher.calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let (pages, fetcher) = pages();
        let url = "https://carsandbids.com/auctions/blocked";
        for _ in 0..2 {
            let err = pages.get(SourceId::CarsAndBids, url, &FetchOptions::default()).await.unwrap_err();
            assert!(matches!(err, FetchError::Blocked { .. }));
        }
        assert_eq!(*fetcher.calls.lock(), 2);
        assert!(!pages.cache().has(SourceId::CarsAndBids, url).await.unwrap());
    }
}
