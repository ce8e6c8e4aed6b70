use scraper::Html;
use url::Url;

use crate::error::ExtractionFailure;
use crate::models::{CandidateHints, PartialListing, SourceId};
use crate::normalize::parse::{find_vin, parse_date, parse_mileage, parse_money, parse_year};
use crate::scrapers::dom;
use crate::scrapers::traits::SourceScraper;
use crate::scrapers::types::{Candidate, IndexPage, IndexParams};

const BASE_URL: &str = "https://www.classic.com";

/// classic.com market aggregator
pub struct ClassicComScraper;

impl ClassicComScraper {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ClassicComScraper {
    fn default() -> Self {
        Self::new()
    }
}

fn spec_rows(doc: &Html) -> Vec<(String, String)> {
    dom::elements(doc, "table.vehicle-specs tr")
        .into_iter()
        .filter_map(|row| Some((dom::child_text(row, "th")?, dom::child_text(row, "td")?)))
        .collect()
}

fn status_is_sold(status: &str) -> bool {
    let lower = status.to_lowercase();
    lower.starts_with("sold")
}

impl SourceScraper for ClassicComScraper {
    fn source_id(&self) -> SourceId {
        SourceId::ClassicCom
    }

    fn index_url(&self, params: &IndexParams, page: u32) -> Option<String> {
        let path = match params.model_slug() {
            Some(slug) => format!("{}/m/porsche/{}/", BASE_URL, slug),
            None => format!("{}/m/porsche/", BASE_URL),
        };
        Url::parse_with_params(
            &path,
            &[
                ("status", if params.only_sold { "sold" } else { "forsale" }),
                ("page", page.to_string().as_str()),
            ],
        )
        .ok()
        .map(String::from)
    }

    fn parse_index(&self, html: &str) -> IndexPage {
        let doc = Html::parse_document(html);
        let candidates: Vec<Candidate> = dom::elements(&doc, ".search-result")
            .into_iter()
            .filter_map(|card| {
                let url = dom::absolute(BASE_URL, &dom::child_attr(card, "a.vehicle-link", "href")?)?;
                let title = dom::child_text(card, ".vehicle-title");
                Some(Candidate {
                    url,
                    hints: CandidateHints {
                        year: title.as_deref().and_then(parse_year),
                        title,
                        price: dom::child_text(card, ".vehicle-price")
                            .as_deref()
                            .and_then(parse_money)
                            .map(|(a, _)| a),
                        sold: dom::child_text(card, ".sale-status").map(|s| status_is_sold(&s)),
                    },
                })
            })
            .collect();
        let has_more = !dom::elements(&doc, r#"nav.pagination a[rel="next"]"#).is_empty();
        IndexPage {
            page: 0,
            raw_count: candidates.len(),
            candidates,
            has_more,
        }
    }

    fn parse_detail(&self, url: &str, html: &str) -> Result<PartialListing, ExtractionFailure> {
        let doc = Html::parse_document(html);
        let title = dom::select_text(&doc, "h1.vehicle-title").ok_or_else(|| ExtractionFailure::not_a_listing(url))?;
        let specs = spec_rows(&doc);
        if specs.is_empty() {
            return Err(ExtractionFailure::malformed(url, "specification table missing"));
        }

        let mut listing = PartialListing::new(SourceId::ClassicCom, url);
        listing.year = dom::lookup(&specs, "Year").and_then(parse_year).or_else(|| parse_year(&title));
        listing.model_text = dom::lookup(&specs, "Model").map(str::to_string);
        listing.trim_text = dom::lookup(&specs, "Trim").map(str::to_string);
        listing.vin = dom::lookup(&specs, "VIN").and_then(find_vin);
        listing.mileage = dom::lookup(&specs, "Mileage").and_then(parse_mileage);
        listing.transmission_text = dom::lookup(&specs, "Transmission").map(str::to_string);
        listing.exterior_color = dom::lookup(&specs, "Exterior Color").map(str::to_string);
        listing.interior_color = dom::lookup(&specs, "Interior Color").map(str::to_string);

        if let Some((amount, currency)) = dom::select_text(&doc, ".vehicle-price").as_deref().and_then(parse_money) {
            listing.price = Some(amount);
            listing.currency = currency;
        }
        let sold = dom::select_text(&doc, ".sale-status").is_some_and(|s| status_is_sold(&s));
        if sold {
            listing.sold_date = dom::select_text(&doc, ".sale-date").as_deref().and_then(parse_date);
        }
        listing.list_date = dom::select_text(&doc, ".listed-date").as_deref().and_then(parse_date);
        listing.title = Some(title);
        Ok(listing)
    }
}
