use async_trait::async_trait;
use std::collections::HashSet;
use tracing::debug;

use crate::dedup::canonicalize_url;
use crate::error::{ExtractionFailure, FetchError};
use crate::fetch::{CachedPages, FetchOptions, PageFetcher};
use crate::models::{PartialListing, SourceId};
use crate::normalize::taxonomy;
use crate::scrapers::types::{Candidate, IndexPage, IndexParams};

/// Result of one detail fetch: the parse outcome and whether the page was cached
#[derive(Debug, Clone)]
pub struct DetailPage {
    pub result: Result<PartialListing, ExtractionFailure>,
    pub from_cache: bool,
}

/// Common contract for all marketplace adapters.
///
/// Adapters only know their site's URLs and markup; they hold no state and
/// never retry. A page that cannot be parsed yields an empty index page or
/// an `ExtractionFailure`, never a panic.
#[async_trait]
pub trait SourceScraper: Send + Sync {
    fn source_id(&self) -> SourceId;

    /// Result page URL (1-based), or `None` when the site cannot serve the
    /// requested kind of results
    fn index_url(&self, params: &IndexParams, page: u32) -> Option<String>;

    fn parse_index(&self, html: &str) -> IndexPage;

    fn parse_detail(&self, url: &str, html: &str) -> Result<PartialListing, ExtractionFailure>;

    fn fetch_options(&self) -> FetchOptions {
        FetchOptions::default()
    }

    /// Fetch and parse one result page. Candidate URLs are canonical,
    /// unique within the page, and match the sold/model/trim filters.
    async fn index_page(
        &self,
        fetcher: &dyn PageFetcher,
        params: &IndexParams,
        page: u32,
    ) -> Result<IndexPage, FetchError> {
        let Some(url) = self.index_url(params, page) else {
            debug!(source = %self.source_id(), "No index for these parameters");
            return Ok(IndexPage {
                page,
                ..IndexPage::default()
            });
        };
        let html = fetcher.fetch(&url, &self.fetch_options()).await?;
        let mut parsed = self.parse_index(&html);
        parsed.page = page;
        parsed.candidates = filter_candidates(parsed.candidates, params);
        Ok(parsed)
    }

    /// Fetch (through the cache) and parse one listing page
    async fn detail_page(&self, pages: &CachedPages, url: &str) -> Result<DetailPage, FetchError> {
        let fetched = pages.get(self.source_id(), url, &self.fetch_options()).await?;
        Ok(DetailPage {
            result: self.parse_cached(url, &fetched.html),
            from_cache: fetched.from_cache,
        })
    }

    /// Parse already-fetched content, tagging the result with this source
    /// and the exact URL it was requested as
    fn parse_cached(&self, url: &str, html: &str) -> Result<PartialListing, ExtractionFailure> {
        let mut partial = self.parse_detail(url, html)?;
        partial.source = self.source_id();
        partial.source_url = url.to_string();
        Ok(partial)
    }
}

fn filter_candidates(candidates: Vec<Candidate>, params: &IndexParams) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter_map(|mut c| {
            c.url = canonicalize_url(&c.url)?;
            Some(c)
        })
        .filter(|c| seen.insert(c.url.clone()))
        .filter(|c| !(params.only_sold && c.hints.sold == Some(false)))
        .filter(|c| match (params.model, c.hints.title.as_deref()) {
            (Some(wanted), Some(title)) => taxonomy::canonical_model(title).map_or(true, |m| m == wanted),
            _ => true,
        })
        .filter(|c| match (&params.trim, c.hints.title.as_deref()) {
            (Some(trim), Some(title)) => title.to_lowercase().contains(&trim.to_lowercase()),
            _ => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CandidateHints, Model};

    fn candidate(url: &str, title: &str, sold: Option<bool>) -> Candidate {
        Candidate {
            url: url.to_string(),
            hints: CandidateHints {
                title: Some(title.to_string()),
                sold,
                ..CandidateHints::default()
            },
        }
    }

    #[test]
    fn test_filter_applies_sold_and_model() {
        let params = IndexParams {
            only_sold: true,
            model: Some(Model::Nine11),
            ..IndexParams::default()
        };
        let kept = filter_candidates(
            vec![
                candidate("https://www.a.com/1/", "2018 Porsche 911 GT3", Some(true)),
                candidate("https://a.com/1", "2018 Porsche 911 GT3", Some(true)),
                candidate("https://a.com/2", "2019 Porsche 911 Carrera", Some(false)),
                candidate("https://a.com/3", "2016 Porsche Cayman GT4", Some(true)),
                candidate("https://a.com/4", "Porsche Sunday Special", None),
                candidate("relative/5", "2018 Porsche 911 GT3", Some(true)),
            ],
            &params,
        );
        let urls: Vec<_> = kept.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.com/1", "https://a.com/4"]);
    }

    #[test]
    fn test_filter_applies_trim() {
        let params = IndexParams {
            only_sold: false,
            trim: Some("gt3".to_string()),
            ..IndexParams::default()
        };
        let kept = filter_candidates(
            vec![
                candidate("https://a.com/1", "2018 Porsche 911 GT3 Touring", None),
                candidate("https://a.com/2", "2019 Porsche 911 Carrera", None),
            ],
            &params,
        );
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_query_and_slug() {
        let params = IndexParams {
            model: Some(Model::CarreraGt),
            trim: None,
            ..IndexParams::default()
        };
        assert_eq!(params.query(), "porsche carrera gt");
        assert_eq!(params.model_slug().as_deref(), Some("carrera-gt"));
    }
}
