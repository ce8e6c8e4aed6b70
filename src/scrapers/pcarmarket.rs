use scraper::Html;
use serde_json::Value;
use url::Url;

use crate::error::ExtractionFailure;
use crate::models::{CandidateHints, Currency, PartialListing, SourceId};
use crate::normalize::parse::{find_vin, parse_date, parse_mileage, parse_money, parse_year};
use crate::scrapers::dom;
use crate::scrapers::traits::SourceScraper;
use crate::scrapers::types::{Candidate, IndexPage, IndexParams};

const BASE_URL: &str = "https://www.pcarmarket.com";

/// PCARMARKET. Detail pages carry a schema.org `Car` block; the visible
/// markup is only a fallback.
pub struct PcarmarketScraper;

impl PcarmarketScraper {
    pub fn new() -> Self {
        Self
    }

    fn apply_structured(listing: &mut PartialListing, car: &Value) {
        listing.title = dom::json_str(car.get("name"));
        listing.vin = dom::json_str(car.get("vehicleIdentificationNumber")).as_deref().and_then(find_vin);
        listing.year = dom::json_str(car.get("modelDate")).as_deref().and_then(parse_year);
        listing.model_text = dom::json_str(car.get("model"));
        listing.trim_text = dom::json_str(car.get("vehicleConfiguration"));
        listing.exterior_color = dom::json_str(car.get("color"));
        listing.interior_color = dom::json_str(car.get("vehicleInteriorColor"));
        listing.transmission_text = dom::json_str(car.get("vehicleTransmission"));

        if let Some(odometer) = car.get("mileageFromOdometer") {
            let value = dom::json_i64(odometer.get("value"));
            listing.mileage = match dom::json_str(odometer.get("unitCode")).as_deref() {
                // UN/CEFACT: SMI = statute miles, KMT = kilometres
                Some("KMT") => value.and_then(|v| parse_mileage(&format!("{} km", v))),
                _ => value,
            };
        }

        if let Some(offer) = car.get("offers") {
            listing.price = dom::json_i64(offer.get("price"));
            listing.currency = match dom::json_str(offer.get("priceCurrency")).as_deref() {
                Some("GBP") => Currency::Gbp,
                Some("EUR") => Currency::Eur,
                Some("CAD") => Currency::Cad,
                _ => Currency::Usd,
            };
            let sold = dom::json_str(offer.get("availability")).is_some_and(|a| a.ends_with("SoldOut"));
            if sold {
                listing.sold_date = dom::json_str(offer.get("availabilityEnds")).as_deref().and_then(parse_date);
            }
        }
    }
}

impl Default for PcarmarketScraper {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceScraper for PcarmarketScraper {
    fn source_id(&self) -> SourceId {
        SourceId::Pcarmarket
    }

    fn index_url(&self, params: &IndexParams, page: u32) -> Option<String> {
        let mut query = vec![
            ("status", if params.only_sold { "sold" } else { "live" }.to_string()),
            ("make", "porsche".to_string()),
            ("page", page.to_string()),
        ];
        if let Some(slug) = params.model_slug() {
            query.push(("model", slug));
        }
        Url::parse_with_params(&format!("{}/auctions/", BASE_URL), &query)
            .ok()
            .map(String::from)
    }

    fn parse_index(&self, html: &str) -> IndexPage {
        let doc = Html::parse_document(html);
        let candidates: Vec<Candidate> = dom::elements(&doc, ".post-list-item")
            .into_iter()
            .filter_map(|card| {
                let url = dom::absolute(BASE_URL, &dom::child_attr(card, "a", "href")?)?;
                let title = dom::child_text(card, "h2");
                let price_text = dom::child_text(card, ".price");
                let sold = price_text.as_deref().map(|t| t.to_lowercase().contains("sold"));
                Some(Candidate {
                    url,
                    hints: CandidateHints {
                        year: title.as_deref().and_then(parse_year),
                        title,
                        price: price_text.as_deref().and_then(parse_money).map(|(a, _)| a),
                        sold,
                    },
                })
            })
            .collect();
        let has_more = dom::select_attr(&doc, r#"a[rel="next"]"#, "href").is_some();
        IndexPage {
            page: 0,
            raw_count: candidates.len(),
            candidates,
            has_more,
        }
    }

    fn parse_detail(&self, url: &str, html: &str) -> Result<PartialListing, ExtractionFailure> {
        let doc = Html::parse_document(html);
        let mut listing = PartialListing::new(SourceId::Pcarmarket, url);

        match dom::json_ld_of_type(&doc, &["Car", "Vehicle"]) {
            Some(car) => Self::apply_structured(&mut listing, &car),
            None => {
                listing.title = dom::select_text(&doc, "h1.auction-title");
                listing.year = listing.title.as_deref().and_then(parse_year);
                listing.vin = dom::select_text(&doc, ".auction-details").as_deref().and_then(find_vin);
                if let Some(price) = dom::select_text(&doc, ".auction-price") {
                    if let Some((amount, currency)) = parse_money(&price) {
                        listing.price = Some(amount);
                        listing.currency = currency;
                    }
                }
            }
        }

        if listing.title.is_none() {
            return Err(ExtractionFailure::not_a_listing(url));
        }
        if listing.list_date.is_none() {
            listing.list_date = dom::select_attr(&doc, "[data-auction-start]", "data-auction-start")
                .as_deref()
                .and_then(parse_date);
        }
        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const DETAIL: &str = r#"
        <html><head>
        <script type="application/ld+json">
        {
          "@context": "https://schema.org",
          "@type": "Car",
          "name": "2007 Porsche 911 Carrera 4S Coupe",
          "vehicleIdentificationNumber": "WP0AB29937S730155",
          "modelDate": "2007",
          "model": "911",
          "vehicleConfiguration": "Carrera 4S",
          "color": "Atlas Grey Metallic",
          "vehicleInteriorColor": "Black",
          "vehicleTransmission": "6-Speed Manual",
          "mileageFromOdometer": {"@type": "QuantitativeValue", "value": 48211, "unitCode": "SMI"},
          "offers": {
            "@type": "Offer",
            "price": "52000",
            "priceCurrency": "USD",
            "availability": "https://schema.org/SoldOut",
            "availabilityEnds": "2024-02-10T20:00:00-05:00"
          }
        }
        </script></head>
        <body><div data-auction-start="2024-02-03">Auction</div></body></html>
    "#;

    #[test]
    fn test_index_url_carries_model() {
        let params = IndexParams {
            model: Some(crate::models::Model::Cayman),
            ..IndexParams::default()
        };
        let url = PcarmarketScraper::new().index_url(&params, 3).unwrap();
        assert_eq!(
            url,
            "https://www.pcarmarket.com/auctions/?status=sold&make=porsche&page=3&model=cayman"
        );
    }

    #[test]
    fn test_parse_index() {
        let html = r#"
            <div class="post-list-item"><a href="/auction/2007-porsche-911-carrera-4s-3/"><h2>2007 Porsche 911 Carrera 4S</h2></a><span class="price">Sold $52,000</span></div>
            <div class="post-list-item"><a href="/auction/2019-porsche-cayenne-e-hybrid/"><h2>2019 Porsche Cayenne E-Hybrid</h2></a><span class="price">High bid $41,000</span></div>
            <a rel="next" href="?page=2">Next</a>
        "#;
        let page = PcarmarketScraper::new().parse_index(html);
        assert_eq!(page.candidates.len(), 2);
        assert!(page.has_more);
        assert_eq!(
            page.candidates[0].url,
            "https://www.pcarmarket.com/auction/2007-porsche-911-carrera-4s-3/"
        );
        assert_eq!(page.candidates[0].hints.sold, Some(true));
        assert_eq!(page.candidates[1].hints.sold, Some(false));
        assert_eq!(page.candidates[1].hints.price, Some(41_000));
    }

    #[test]
    fn test_parse_structured_detail() {
        let listing = PcarmarketScraper::new()
            .parse_detail("https://pcarmarket.com/auction/2007-porsche-911-carrera-4s-3", DETAIL)
            .unwrap();
        assert_eq!(listing.title.as_deref(), Some("2007 Porsche 911 Carrera 4S Coupe"));
        assert_eq!(listing.vin.as_deref(), Some("WP0AB29937S730155"));
        assert_eq!(listing.year, Some(2007));
        assert_eq!(listing.trim_text.as_deref(), Some("Carrera 4S"));
        assert_eq!(listing.mileage, Some(48_211));
        assert_eq!(listing.price, Some(52_000));
        assert_eq!(listing.currency, Currency::Usd);
        assert_eq!(listing.sold_date, NaiveDate::from_ymd_opt(2024, 2, 10));
        assert_eq!(listing.list_date, NaiveDate::from_ymd_opt(2024, 2, 3));
    }

    #[test]
    fn test_kilometre_odometer_is_converted() {
        let html = DETAIL.replace(r#""value": 48211, "unitCode": "SMI""#, r#""value": 16093, "unitCode": "KMT""#);
        let listing = PcarmarketScraper::new().parse_detail("https://pcarmarket.com/auction/x", &html).unwrap();
        assert_eq!(listing.mileage, Some(10_000));
    }

    #[test]
    fn test_markup_fallback() {
        let html = r#"
            <h1 class="auction-title">1989 Porsche 911 Speedster</h1>
            <div class="auction-details">VIN WP0EB0918KS173421, 21k miles</div>
            <div class="auction-price">$245,000</div>
        "#;
        let listing = PcarmarketScraper::new().parse_detail("https://pcarmarket.com/auction/y", html).unwrap();
        assert_eq!(listing.year, Some(1989));
        assert_eq!(listing.price, Some(245_000));
        assert_eq!(listing.vin.as_deref(), Some("WP0EB0918KS173421"));
        assert_eq!(listing.sold_date, None);
    }
}
