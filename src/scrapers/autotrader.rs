use scraper::Html;
use url::Url;

use crate::error::ExtractionFailure;
use crate::models::{CandidateHints, PartialListing, SourceId};
use crate::normalize::parse::{find_vin, parse_date, parse_mileage, parse_money, parse_year};
use crate::scrapers::dom;
use crate::scrapers::traits::SourceScraper;
use crate::scrapers::types::{Candidate, IndexPage, IndexParams};

const BASE_URL: &str = "https://www.autotrader.com";
const PAGE_SIZE: u32 = 25;

/// AutoTrader dealer and private inventory. Only live listings exist here,
/// so a sold-only crawl has nothing to visit.
pub struct AutotraderScraper;

impl AutotraderScraper {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AutotraderScraper {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceScraper for AutotraderScraper {
    fn source_id(&self) -> SourceId {
        SourceId::Autotrader
    }

    fn index_url(&self, params: &IndexParams, page: u32) -> Option<String> {
        if params.only_sold {
            return None;
        }
        let path = match params.model_slug() {
            Some(slug) => format!("{}/cars-for-sale/porsche/{}", BASE_URL, slug),
            None => format!("{}/cars-for-sale/porsche", BASE_URL),
        };
        let first_record = page.saturating_sub(1) * PAGE_SIZE;
        Url::parse_with_params(
            &path,
            &[
                ("firstRecord", first_record.to_string()),
                ("numRecords", PAGE_SIZE.to_string()),
                ("sortBy", "datelistedDESC".to_string()),
            ],
        )
        .ok()
        .map(String::from)
    }

    fn parse_index(&self, html: &str) -> IndexPage {
        let doc = Html::parse_document(html);
        let candidates: Vec<Candidate> = dom::elements(&doc, r#"[data-cmp="inventoryListing"]"#)
            .into_iter()
            .filter_map(|card| {
                let href = dom::child_attr(card, r#"a[data-cmp="link"]"#, "href")?;
                // Drop the tracking query AutoTrader appends to every card link
                let url = dom::absolute(BASE_URL, href.split('?').next()?)?;
                let title = dom::child_text(card, r#"[data-cmp="subheading"]"#);
                Some(Candidate {
                    url,
                    hints: CandidateHints {
                        year: title.as_deref().and_then(parse_year),
                        title,
                        price: dom::child_text(card, r#"[data-cmp="firstPrice"]"#)
                            .as_deref()
                            .and_then(parse_money)
                            .map(|(a, _)| a),
                        sold: Some(false),
                    },
                })
            })
            .collect();
        let has_more = candidates.len() as u32 >= PAGE_SIZE;
        IndexPage {
            page: 0,
            raw_count: candidates.len(),
            candidates,
            has_more,
        }
    }

    fn parse_detail(&self, url: &str, html: &str) -> Result<PartialListing, ExtractionFailure> {
        let doc = Html::parse_document(html);
        let title = dom::select_text(&doc, r#"h1[data-cmp="heading"]"#)
            .ok_or_else(|| ExtractionFailure::not_a_listing(url))?;
        if dom::select_text(&doc, r#"[data-cmp="unavailableListing"]"#).is_some() {
            return Err(ExtractionFailure::not_a_listing(url));
        }

        let details: Vec<(String, String)> = dom::elements(&doc, r#"ul[data-cmp="vehicleDetails"] li"#)
            .into_iter()
            .filter_map(|li| Some((dom::child_text(li, ".label")?, dom::child_text(li, ".value")?)))
            .collect();

        let mut listing = PartialListing::new(SourceId::Autotrader, url);
        // Titles read "Used 2018 Porsche 911 Carrera T"
        listing.year = parse_year(&title);
        listing.vin = dom::select_text(&doc, r#"[data-cmp="vin"]"#)
            .as_deref()
            .and_then(find_vin)
            .or_else(|| dom::lookup(&details, "VIN").and_then(find_vin));
        listing.mileage = dom::lookup(&details, "Mileage").and_then(parse_mileage);
        listing.transmission_text = dom::lookup(&details, "Transmission").map(str::to_string);
        listing.exterior_color = dom::lookup(&details, "Exterior").map(str::to_string);
        listing.interior_color = dom::lookup(&details, "Interior").map(str::to_string);
        listing.trim_text = dom::lookup(&details, "Trim").map(str::to_string);
        listing.price = dom::select_text(&doc, r#"[data-cmp="pricing"] [data-cmp="firstPrice"]"#)
            .as_deref()
            .and_then(parse_money)
            .map(|(a, _)| a);
        listing.list_date = dom::select_attr(&doc, r#"time[data-cmp="listedDate"]"#, "datetime")
            .as_deref()
            .and_then(parse_date);

        let features = dom::select_all_text(&doc, r#"[data-cmp="features"] li"#);
        if !features.is_empty() {
            listing.options_text = Some(features.join("; "));
        }
        listing.title = Some(title.trim_start_matches("Used ").trim_start_matches("Certified ").to_string());
        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_sold_only_has_no_index() {
        let scraper = AutotraderScraper::new();
        assert_eq!(scraper.index_url(&IndexParams::default(), 1), None);
        let live = IndexParams {
            only_sold: false,
            ..IndexParams::default()
        };
        assert_eq!(
            scraper.index_url(&live, 3).as_deref(),
            Some("https://www.autotrader.com/cars-for-sale/porsche?firstRecord=50&numRecords=25&sortBy=datelistedDESC")
        );
    }

    #[test]
    fn test_parse_index() {
        let html = r#"
            <div data-cmp="inventoryListing">
              <a data-cmp="link" href="/cars-for-sale/vehicle/712345678?listingId=712345678&amp;clickType=listing">
                <h2 data-cmp="subheading">Used 2019 Porsche Panamera 4</h2>
              </a>
              <span data-cmp="firstPrice">68,990</span>
            </div>
        "#;
        let page = AutotraderScraper::new().parse_index(html);
        assert!(!page.has_more);
        assert_eq!(page.candidates.len(), 1);
        assert_eq!(page.candidates[0].url, "https://www.autotrader.com/cars-for-sale/vehicle/712345678");
        assert_eq!(page.candidates[0].hints.price, Some(68_990));
        assert_eq!(page.candidates[0].hints.sold, Some(false));
    }

    #[test]
    fn test_parse_detail() {
        let html = r#"
            <h1 data-cmp="heading">Used 2019 Porsche Panamera 4</h1>
            <div data-cmp="pricing"><span data-cmp="firstPrice">$68,990</span></div>
            <div data-cmp="vin">VIN: WP0AA2A75KL100234</div>
            <time data-cmp="listedDate" datetime="2024-06-01">Listed June 1</time>
            <ul data-cmp="vehicleDetails">
              <li><span class="label">Mileage</span><span class="value">21,400 miles</span></li>
              <li><span class="label">Transmission</span><span class="value">8-Speed Automatic (PDK)</span></li>
              <li><span class="label">Exterior</span><span class="value">Carrara White Metallic</span></li>
              <li><span class="label">Interior</span><span class="value">Black</span></li>
            </ul>
            <ul data-cmp="features"><li>Sport Chrono Package</li><li>Panoramic Roof</li></ul>
        "#;
        let listing = AutotraderScraper::new()
            .parse_detail("https://autotrader.com/cars-for-sale/vehicle/712345678", html)
            .unwrap();
        assert_eq!(listing.title.as_deref(), Some("2019 Porsche Panamera 4"));
        assert_eq!(listing.year, Some(2019));
        assert_eq!(listing.vin.as_deref(), Some("WP0AA2A75KL100234"));
        assert_eq!(listing.mileage, Some(21_400));
        assert_eq!(listing.price, Some(68_990));
        assert_eq!(listing.sold_date, None);
        assert_eq!(listing.list_date, NaiveDate::from_ymd_opt(2024, 6, 1));
        assert_eq!(listing.options_text.as_deref(), Some("Sport Chrono Package; Panoramic Roof"));
    }
}
