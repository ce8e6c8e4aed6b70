use scraper::Html;
use url::Url;

use crate::error::ExtractionFailure;
use crate::fetch::FetchOptions;
use crate::models::{CandidateHints, PartialListing, SourceId};
use crate::normalize::parse::{find_vin, parse_date, parse_mileage, parse_money, parse_year};
use crate::scrapers::dom;
use crate::scrapers::traits::SourceScraper;
use crate::scrapers::types::{Candidate, IndexPage, IndexParams};

const BASE_URL: &str = "https://carsandbids.com";

/// Cars & Bids. The site renders client-side, so pages are requested rendered.
pub struct CarsAndBidsScraper;

impl CarsAndBidsScraper {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CarsAndBidsScraper {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceScraper for CarsAndBidsScraper {
    fn source_id(&self) -> SourceId {
        SourceId::CarsAndBids
    }

    fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            render_js: true,
            ..FetchOptions::default()
        }
    }

    fn index_url(&self, params: &IndexParams, page: u32) -> Option<String> {
        let path = if params.only_sold { "/past-auctions/" } else { "/search/" };
        Url::parse_with_params(
            &format!("{}{}", BASE_URL, path),
            &[("q", params.query()), ("page", page.to_string())],
        )
        .ok()
        .map(String::from)
    }

    fn parse_index(&self, html: &str) -> IndexPage {
        let doc = Html::parse_document(html);
        let mut candidates = Vec::new();
        for item in dom::elements(&doc, "li.auction-item") {
            let Some(href) = dom::child_attr(item, ".auction-title a", "href") else {
                continue;
            };
            let Some(url) = dom::absolute(BASE_URL, &href) else {
                continue;
            };
            let title = dom::child_text(item, ".auction-title");
            let status = dom::child_text(item, ".auction-status").map(|s| s.to_lowercase());
            let sold = status.map(|s| s.starts_with("sold"));
            candidates.push(Candidate {
                url,
                hints: CandidateHints {
                    year: title.as_deref().and_then(parse_year),
                    title,
                    price: dom::child_text(item, ".bid-value").and_then(|t| parse_money(&t)).map(|(a, _)| a),
                    sold,
                },
            });
        }

        // The last page renders a disabled "next" arrow
        let has_more = dom::elements(&doc, ".paginator li.arrow.next")
            .iter()
            .any(|li| !li.value().classes().any(|c| c == "disabled"));
        IndexPage {
            page: 0,
            raw_count: candidates.len(),
            candidates,
            has_more,
        }
    }

    fn parse_detail(&self, url: &str, html: &str) -> Result<PartialListing, ExtractionFailure> {
        let doc = Html::parse_document(html);
        let title = dom::select_text(&doc, ".auction-title h1").ok_or_else(|| ExtractionFailure::not_a_listing(url))?;

        let facts = dom::definition_pairs(&doc, ".quick-facts dl");
        if facts.is_empty() {
            return Err(ExtractionFailure::malformed(url, "quick facts table missing"));
        }
        if let Some(make) = dom::lookup(&facts, "Make") {
            if !make.eq_ignore_ascii_case("porsche") {
                return Err(ExtractionFailure::not_a_listing(url));
            }
        }

        let mut listing = PartialListing::new(SourceId::CarsAndBids, url);
        listing.year = parse_year(&title);
        listing.model_text = dom::lookup(&facts, "Model").map(str::to_string);
        listing.trim_text = listing.model_text.clone();
        listing.vin = dom::lookup(&facts, "VIN").and_then(find_vin);
        listing.mileage = dom::lookup(&facts, "Mileage").and_then(|m| {
            // Bare numbers are miles
            parse_mileage(m).or_else(|| parse_mileage(&format!("{} miles", m)))
        });
        listing.transmission_text = dom::lookup(&facts, "Transmission").map(str::to_string);
        listing.exterior_color = dom::lookup(&facts, "Exterior Color").map(str::to_string);
        listing.interior_color = dom::lookup(&facts, "Interior Color").map(str::to_string);

        let equipment = dom::select_all_text(&doc, ".detail-equipment li");
        if !equipment.is_empty() {
            listing.options_text = Some(equipment.join("; "));
        }

        if let Some(status) = dom::select_text(&doc, ".bid-bar .status") {
            listing.price = parse_money(&status).map(|(amount, _)| amount);
            if status.to_lowercase().starts_with("sold") {
                listing.sold_date = dom::select_text(&doc, ".time-ended").as_deref().and_then(parse_date);
            }
        }
        listing.title = Some(title);
        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractionKind;
    use chrono::NaiveDate;

    const INDEX: &str = r#"
        <ul class="auctions-list">
          <li class="auction-item">
            <div class="auction-title"><a href="/auctions/rx4Gk7Ab/2016-porsche-911-gt3-rs">2016 Porsche 911 GT3 RS</a></div>
            <div class="auction-status">Sold</div>
            <span class="bid-value">$187,500</span>
          </li>
          <li class="auction-item">
            <div class="auction-title"><a href="/auctions/9aZ0q1Lm/2015-porsche-macan-s">2015 Porsche Macan S</a></div>
            <div class="auction-status">Reserve not met</div>
            <span class="bid-value">$24,000</span>
          </li>
        </ul>
        <ul class="paginator"><li class="arrow next disabled"><span>Next</span></li></ul>
    "#;

    const DETAIL: &str = r#"
        <div class="auction-title"><h1>2016 Porsche 911 GT3 RS</h1></div>
        <div class="quick-facts">
          <dl>
            <dt>Make</dt><dd>Porsche</dd>
            <dt>Model</dt><dd>911 GT3 RS</dd>
            <dt>Mileage</dt><dd>6,300</dd>
            <dt>VIN</dt><dd>WP0AF2A92GS192418</dd>
            <dt>Transmission</dt><dd>Automatic (7-Speed PDK)</dd>
            <dt>Exterior Color</dt><dd>Lava Orange</dd>
            <dt>Interior Color</dt><dd>Black/Lava Orange</dd>
          </dl>
        </div>
        <div class="detail-equipment"><ul><li>Front axle lift</li><li>Carbon bucket seats</li></ul></div>
        <div class="bid-bar"><span class="status">Sold for $187,500</span></div>
        <span class="time-ended">Ended Mar 4, 2024</span>
    "#;

    #[test]
    fn test_pages_are_rendered() {
        assert!(CarsAndBidsScraper::new().fetch_options().render_js);
    }

    #[test]
    fn test_parse_index() {
        let page = CarsAndBidsScraper::new().parse_index(INDEX);
        assert_eq!(page.candidates.len(), 2);
        assert!(!page.has_more);
        assert_eq!(
            page.candidates[0].url,
            "https://carsandbids.com/auctions/rx4Gk7Ab/2016-porsche-911-gt3-rs"
        );
        assert_eq!(page.candidates[0].hints.sold, Some(true));
        assert_eq!(page.candidates[0].hints.price, Some(187_500));
        assert_eq!(page.candidates[1].hints.sold, Some(false));
    }

    #[test]
    fn test_parse_detail() {
        let url = "https://carsandbids.com/auctions/rx4Gk7Ab/2016-porsche-911-gt3-rs";
        let listing = CarsAndBidsScraper::new().parse_detail(url, DETAIL).unwrap();
        assert_eq!(listing.vin.as_deref(), Some("WP0AF2A92GS192418"));
        assert_eq!(listing.model_text.as_deref(), Some("911 GT3 RS"));
        assert_eq!(listing.mileage, Some(6_300));
        assert_eq!(listing.price, Some(187_500));
        assert_eq!(listing.sold_date, NaiveDate::from_ymd_opt(2024, 3, 4));
        assert_eq!(listing.exterior_color.as_deref(), Some("Lava Orange"));
        assert_eq!(listing.options_text.as_deref(), Some("Front axle lift; Carbon bucket seats"));
    }

    #[test]
    fn test_other_makes_are_not_listings() {
        let html = DETAIL.replace("<dd>Porsche</dd>", "<dd>BMW</dd>");
        let err = CarsAndBidsScraper::new().parse_detail("https://carsandbids.com/auctions/x", &html).unwrap_err();
        assert_eq!(err.kind, ExtractionKind::NotAListing);
    }

    #[test]
    fn test_missing_facts_is_malformed() {
        let html = r#"<div class="auction-title"><h1>2016 Porsche 911 GT3 RS</h1></div>"#;
        let err = CarsAndBidsScraper::new().parse_detail("https://carsandbids.com/auctions/x", html).unwrap_err();
        assert_eq!(err.kind, ExtractionKind::Malformed);
    }
}
