pub mod autotrader;
pub mod bring_a_trailer;
pub mod cars_and_bids;
pub mod classic_com;
pub mod collecting_cars;
pub mod dom;
pub mod pcarmarket;
pub mod traits;
pub mod types;

pub use autotrader::AutotraderScraper;
pub use bring_a_trailer::BringATrailerScraper;
pub use cars_and_bids::CarsAndBidsScraper;
pub use classic_com::ClassicComScraper;
pub use collecting_cars::CollectingCarsScraper;
pub use pcarmarket::PcarmarketScraper;
pub use traits::{DetailPage, SourceScraper};
pub use types::{Candidate, IndexPage, IndexParams};

use std::sync::Arc;

use crate::error::FetchError;
use crate::fetch::PageFetcher;
use crate::models::SourceId;

/// Adapter for a marketplace
pub fn scraper_for(source: SourceId) -> Arc<dyn SourceScraper> {
    match source {
        SourceId::BringATrailer => Arc::new(BringATrailerScraper::new()),
        SourceId::CarsAndBids => Arc::new(CarsAndBidsScraper::new()),
        SourceId::Pcarmarket => Arc::new(PcarmarketScraper::new()),
        SourceId::CollectingCars => Arc::new(CollectingCarsScraper::new()),
        SourceId::ClassicCom => Arc::new(ClassicComScraper::new()),
        SourceId::Autotrader => Arc::new(AutotraderScraper::new()),
    }
}

/// Walks result pages one at a time. Finite (bounded by `max_pages` and
/// the site's own last page) and restartable from any page.
pub struct IndexPager {
    scraper: Arc<dyn SourceScraper>,
    params: IndexParams,
    next: u32,
    last: u32,
    exhausted: bool,
}

impl IndexPager {
    pub fn new(scraper: Arc<dyn SourceScraper>, params: IndexParams) -> Self {
        Self::starting_at(scraper, params, 1)
    }

    pub fn starting_at(scraper: Arc<dyn SourceScraper>, params: IndexParams, first_page: u32) -> Self {
        let first = first_page.max(1);
        let last = first.saturating_add(params.max_pages).saturating_sub(1);
        Self {
            scraper,
            params,
            next: first,
            last,
            exhausted: false,
        }
    }

    /// Page number the next call will fetch
    pub fn next_page_number(&self) -> u32 {
        self.next
    }

    /// Fetch the next page, or `None` once the sequence is over. A fetch
    /// error does not end the sequence; calling again retries the same page.
    pub async fn next_page(&mut self, fetcher: &dyn PageFetcher) -> Option<Result<IndexPage, FetchError>> {
        if self.exhausted || self.next > self.last {
            return None;
        }
        let page = match self.scraper.index_page(fetcher, &self.params, self.next).await {
            Ok(page) => page,
            Err(e) => return Some(Err(e)),
        };
        self.next += 1;
        // Filters may empty a page the site still paginates past
        if !page.has_more || page.raw_count == 0 {
            self.exhausted = true;
        }
        Some(Ok(page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchOptions;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[test]
    fn test_registry_covers_every_source() {
        for source in SourceId::ALL {
            assert_eq!(scraper_for(source).source_id(), source);
        }
    }

    /// Serves BaT-style result pages; page N links to N+1 up to `pages`
    struct PagedSite {
        pages: u32,
        first_title: &'static str,
        requested: Mutex<Vec<String>>,
    }

    impl PagedSite {
        fn new(pages: u32) -> Self {
            Self {
                pages,
                first_title: "2018 Porsche 911 GT3",
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PageFetcher for PagedSite {
        async fn fetch(&self, url: &str, _options: &FetchOptions) -> Result<String, FetchError> {
            self.requested.lock().push(url.to_string());
            let page: u32 = url.rsplit("page=").next().and_then(|p| p.parse().ok()).unwrap_or(1);
            let title = if page == 1 { self.first_title } else { "2018 Porsche 911 GT3" };
            let mut html = format!(
                r#"<a class="listing-card" href="/listing/car-{}/"><h3>{}</h3><div class="item-results">Sold for USD $150,000 on 5/1/24</div></a>"#,
                page, title
            );
            if page < self.pages {
                html.push_str(r#"<div class="pagination"><a class="next">Next</a></div>"#);
            }
            Ok(html)
        }

        fn name(&self) -> &'static str {
            "paged"
        }
    }

    #[tokio::test]
    async fn test_pager_stops_at_last_site_page() {
        let site = PagedSite::new(3);
        let mut pager = IndexPager::new(scraper_for(SourceId::BringATrailer), IndexParams::default());
        let mut seen = Vec::new();
        while let Some(page) = pager.next_page(&site).await {
            seen.push(page.unwrap().page);
        }
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(site.requested.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_pager_respects_page_limit_and_restart() {
        let site = PagedSite::new(50);
        let params = IndexParams {
            max_pages: 2,
            ..IndexParams::default()
        };
        let mut pager = IndexPager::starting_at(scraper_for(SourceId::BringATrailer), params, 5);
        let first = pager.next_page(&site).await.unwrap().unwrap();
        assert_eq!(first.page, 5);
        assert_eq!(first.candidates[0].url, "https://bringatrailer.com/listing/car-5");
        assert!(pager.next_page(&site).await.is_some());
        assert!(pager.next_page(&site).await.is_none());
    }

    #[tokio::test]
    async fn test_sold_only_autotrader_yields_empty_page() {
        let site = PagedSite::new(1);
        let mut pager = IndexPager::new(scraper_for(SourceId::Autotrader), IndexParams::default());
        let page = pager.next_page(&site).await.unwrap().unwrap();
        assert!(page.candidates.is_empty());
        assert!(pager.next_page(&site).await.is_none());
        assert!(site.requested.lock().is_empty());
    }

    #[tokio::test]
    async fn test_pager_walks_past_page_emptied_by_filters() {
        let site = PagedSite {
            first_title: "2016 Porsche Cayman GT4",
            ..PagedSite::new(3)
        };
        let params = IndexParams {
            model: Some(crate::models::Model::Nine11),
            max_pages: 3,
            ..IndexParams::default()
        };
        let mut pager = IndexPager::new(scraper_for(SourceId::BringATrailer), params);

        let first = pager.next_page(&site).await.unwrap().unwrap();
        assert!(first.candidates.is_empty());
        assert_eq!(first.raw_count, 1);

        let second = pager.next_page(&site).await.unwrap().unwrap();
        assert_eq!(second.page, 2);
        assert_eq!(second.candidates[0].url, "https://bringatrailer.com/listing/car-2");
        assert_eq!(site.requested.lock().len(), 2);
    }
}
