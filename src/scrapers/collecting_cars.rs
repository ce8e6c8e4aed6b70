use scraper::Html;
use serde_json::Value;
use url::Url;

use crate::error::ExtractionFailure;
use crate::models::{CandidateHints, Currency, PartialListing, SourceId};
use crate::normalize::parse::{find_vin, parse_date, parse_mileage, parse_year};
use crate::scrapers::dom;
use crate::scrapers::traits::SourceScraper;
use crate::scrapers::types::{Candidate, IndexPage, IndexParams};

const BASE_URL: &str = "https://collectingcars.com";
const NEXT_DATA: &str = "script#__NEXT_DATA__";

/// Collecting Cars. Pages embed their state as Next.js JSON, and lots are
/// priced in the seller's currency.
pub struct CollectingCarsScraper;

impl CollectingCarsScraper {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CollectingCarsScraper {
    fn default() -> Self {
        Self::new()
    }
}

fn page_props(doc: &Html) -> Option<Value> {
    dom::script_json(doc, NEXT_DATA)?.get("props")?.get("pageProps").cloned()
}

fn currency(code: Option<String>) -> Currency {
    match code.as_deref() {
        Some("GBP") => Currency::Gbp,
        Some("EUR") => Currency::Eur,
        Some("CAD") => Currency::Cad,
        _ => Currency::Usd,
    }
}

impl SourceScraper for CollectingCarsScraper {
    fn source_id(&self) -> SourceId {
        SourceId::CollectingCars
    }

    fn index_url(&self, params: &IndexParams, page: u32) -> Option<String> {
        let query = params.query().trim_start_matches("porsche").trim().to_string();
        Url::parse_with_params(
            &format!("{}/search", BASE_URL),
            &[
                ("make", "Porsche".to_string()),
                ("query", query),
                ("stage", if params.only_sold { "sold" } else { "live" }.to_string()),
                ("page", page.to_string()),
            ],
        )
        .ok()
        .map(String::from)
    }

    fn parse_index(&self, html: &str) -> IndexPage {
        let doc = Html::parse_document(html);
        let Some(results) = page_props(&doc).and_then(|p| p.get("searchResults").cloned()) else {
            return IndexPage::default();
        };

        let candidates = results
            .get("lots")
            .and_then(Value::as_array)
            .map(|lots| {
                lots.iter()
                    .filter_map(|lot| {
                        let slug = dom::json_str(lot.get("slug"))?;
                        let title = dom::json_str(lot.get("title"));
                        let stage = dom::json_str(lot.get("stage"));
                        let sold = stage.as_deref().map(|s| s == "sold");
                        let price = if sold == Some(true) {
                            dom::json_i64(lot.get("soldPrice"))
                        } else {
                            dom::json_i64(lot.get("currentBid"))
                        };
                        Some(Candidate {
                            url: format!("{}/for-sale/{}", BASE_URL, slug),
                            hints: CandidateHints {
                                year: title.as_deref().and_then(parse_year),
                                title,
                                // Hints are compared in USD only
                                price: price.filter(|_| currency(dom::json_str(lot.get("currencyCode"))) == Currency::Usd),
                                sold,
                            },
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let page = dom::json_i64(results.get("page")).unwrap_or(1);
        let total = dom::json_i64(results.get("totalPages")).unwrap_or(page);
        IndexPage {
            page: 0,
            raw_count: candidates.len(),
            candidates,
            has_more: page < total,
        }
    }

    fn parse_detail(&self, url: &str, html: &str) -> Result<PartialListing, ExtractionFailure> {
        let doc = Html::parse_document(html);
        let props = page_props(&doc).ok_or_else(|| ExtractionFailure::malformed(url, "page state missing"))?;
        let lot = props.get("lot").ok_or_else(|| ExtractionFailure::not_a_listing(url))?;

        let title = dom::json_str(lot.get("title")).ok_or_else(|| ExtractionFailure::missing(url, "title"))?;
        if let Some(make) = dom::json_str(lot.get("make")) {
            if !make.eq_ignore_ascii_case("porsche") {
                return Err(ExtractionFailure::not_a_listing(url));
            }
        }

        let mut listing = PartialListing::new(SourceId::CollectingCars, url);
        listing.year = dom::json_i64(lot.get("year"))
            .and_then(|y| i32::try_from(y).ok())
            .or_else(|| parse_year(&title));
        listing.model_text = dom::json_str(lot.get("model"));
        listing.trim_text = dom::json_str(lot.get("variant"));
        listing.vin = dom::json_str(lot.get("chassisNumber")).as_deref().and_then(find_vin);
        listing.mileage = dom::json_str(lot.get("mileage")).as_deref().and_then(parse_mileage);
        listing.exterior_color = dom::json_str(lot.get("exteriorColour"));
        listing.interior_color = dom::json_str(lot.get("interiorColour"));
        listing.transmission_text = dom::json_str(lot.get("transmission"));
        listing.currency = currency(dom::json_str(lot.get("currencyCode")));
        listing.list_date = dom::json_str(lot.get("listingStartDate")).as_deref().and_then(parse_date);

        if dom::json_str(lot.get("stage")).as_deref() == Some("sold") {
            listing.price = dom::json_i64(lot.get("soldPrice"));
            listing.sold_date = dom::json_str(lot.get("endDate")).as_deref().and_then(parse_date);
        } else {
            listing.price = dom::json_i64(lot.get("currentBid"));
        }

        let facts: Vec<String> = lot
            .get("keyFacts")
            .and_then(Value::as_array)
            .map(|facts| facts.iter().filter_map(|f| dom::json_str(Some(f))).collect())
            .unwrap_or_default();
        if !facts.is_empty() {
            listing.options_text = Some(facts.join("; "));
        }

        listing.title = Some(title);
        Ok(listing)
    }
}
