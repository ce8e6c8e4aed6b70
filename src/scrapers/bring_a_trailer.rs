use scraper::Html;
use url::Url;

use crate::error::ExtractionFailure;
use crate::models::{CandidateHints, PartialListing, SourceId};
use crate::normalize::parse::{find_vin, parse_date, parse_mileage, parse_money, parse_transmission, parse_year};
use crate::scrapers::dom;
use crate::scrapers::traits::SourceScraper;
use crate::scrapers::types::{Candidate, IndexPage, IndexParams};

const BASE_URL: &str = "https://bringatrailer.com";

/// Bring a Trailer auctions
pub struct BringATrailerScraper;

impl BringATrailerScraper {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BringATrailerScraper {
    fn default() -> Self {
        Self::new()
    }
}

/// Result line: "Sold for USD $123,000 on 5/12/24" or "Bid to USD $98,000 on 5/12/24"
fn parse_result_line(text: &str) -> (Option<bool>, Option<i64>) {
    let lower = text.to_lowercase();
    let sold = if lower.contains("sold for") {
        Some(true)
    } else if lower.contains("bid to") || lower.contains("current bid") || lower.contains("withdrawn") {
        Some(false)
    } else {
        None
    };
    (sold, parse_money(text).map(|(amount, _)| amount))
}

impl SourceScraper for BringATrailerScraper {
    fn source_id(&self) -> SourceId {
        SourceId::BringATrailer
    }

    fn index_url(&self, params: &IndexParams, page: u32) -> Option<String> {
        let path = if params.only_sold { "/auctions/results/" } else { "/auctions/" };
        Url::parse_with_params(
            &format!("{}{}", BASE_URL, path),
            &[("s", params.query()), ("page", page.to_string())],
        )
        .ok()
        .map(String::from)
    }

    fn parse_index(&self, html: &str) -> IndexPage {
        let doc = Html::parse_document(html);
        let candidates = dom::elements(&doc, "a.listing-card")
            .into_iter()
            .filter_map(|card| {
                let url = dom::absolute(BASE_URL, card.value().attr("href")?)?;
                let title = dom::child_text(card, "h3");
                let (sold, price) = dom::child_text(card, ".item-results")
                    .map(|t| parse_result_line(&t))
                    .unwrap_or((None, None));
                Some(Candidate {
                    url,
                    hints: CandidateHints {
                        year: title.as_deref().and_then(parse_year),
                        title,
                        price,
                        sold,
                    },
                })
            })
            .collect::<Vec<_>>();

        let has_more = !candidates.is_empty() && !dom::elements(&doc, ".pagination a.next").is_empty();
        IndexPage {
            page: 0,
            raw_count: candidates.len(),
            candidates,
            has_more,
        }
    }

    fn parse_detail(&self, url: &str, html: &str) -> Result<PartialListing, ExtractionFailure> {
        let doc = Html::parse_document(html);
        let title = dom::select_text(&doc, "h1.post-title")
            .or_else(|| dom::select_text(&doc, "h1"))
            .ok_or_else(|| ExtractionFailure::not_a_listing(url))?;

        let mut listing = PartialListing::new(SourceId::BringATrailer, url);
        listing.year = parse_year(&title);

        let mut leftovers = Vec::new();
        for item in dom::select_all_text(&doc, ".essentials li") {
            if item.starts_with("Chassis") {
                listing.vin = find_vin(&item);
            } else if let Some(color) = item.strip_suffix(" Paint") {
                listing.exterior_color = Some(color.to_string());
            } else if let Some(color) = item.strip_suffix(" Upholstery") {
                listing.interior_color = Some(color.to_string());
            } else if listing.mileage.is_none() && parse_mileage(&item).is_some() {
                listing.mileage = parse_mileage(&item);
            } else if listing.transmission_text.is_none() && parse_transmission(&item).is_some() {
                listing.transmission_text = Some(item);
            } else if !item.starts_with("Seller") && !item.starts_with("Location") && !item.starts_with("Lot") {
                leftovers.push(item);
            }
        }
        if !leftovers.is_empty() {
            listing.options_text = Some(leftovers.join("; "));
        }

        if let Some(result) = dom::select_text(&doc, ".listing-available-info") {
            let (sold, price) = parse_result_line(&result);
            listing.price = price;
            if sold == Some(true) {
                listing.sold_date = parse_date(&result);
            }
        }
        listing.list_date = dom::select_attr(&doc, "time.listing-date", "datetime")
            .as_deref()
            .and_then(parse_date);
        listing.title = Some(title);

        if listing.year.is_none() && listing.vin.is_none() {
            return Err(ExtractionFailure::missing(url, "model year"));
        }
        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractionKind;
    use chrono::NaiveDate;

    const INDEX: &str = r#"
        <div class="auctions-completed">
          <a class="listing-card" href="/listing/2018-porsche-911-gt3-42/">
            <h3>2018 Porsche 911 GT3 6-Speed</h3>
            <div class="item-results">Sold for USD $165,000 on 5/12/24</div>
          </a>
          <a class="listing-card" href="https://bringatrailer.com/listing/1999-porsche-911-carrera-coupe/">
            <h3>1999 Porsche 911 Carrera Coupe</h3>
            <div class="item-results">Bid to USD $21,500 on 5/11/24</div>
          </a>
          <a class="listing-card">
            <h3>Missing link</h3>
          </a>
        </div>
        <div class="pagination"><a class="next" href="?page=2">Next</a></div>
    "#;

    const DETAIL: &str = r#"
        <html><body>
          <h1 class="post-title listing-post-title">2018 Porsche 911 GT3 6-Speed</h1>
          <time class="listing-date" datetime="2024-05-05T17:00:00Z">May 5</time>
          <div class="item essentials">
            <ul>
              <li>Chassis: <a href="/search?q=WP0AC2A99JS176782">WP0AC2A99JS176782</a></li>
              <li>8k Miles</li>
              <li>4.0-Liter Flat-Six</li>
              <li>Six-Speed Manual Transaxle</li>
              <li>Paint to Sample Voodoo Blue Paint</li>
              <li>Black Leather &amp; Race-Tex Upholstery</li>
              <li>Front-Axle Lift System</li>
              <li>Location: Denver, Colorado 80202</li>
              <li>Lot #140233</li>
            </ul>
          </div>
          <span class="listing-available-info">Sold for USD $165,000 on 5/12/24</span>
        </body></html>
    "#;

    #[test]
    fn test_index_url() {
        let scraper = BringATrailerScraper::new();
        let params = IndexParams::default();
        assert_eq!(
            scraper.index_url(&params, 2).as_deref(),
            Some("https://bringatrailer.com/auctions/results/?s=porsche&page=2")
        );
        let live = IndexParams {
            only_sold: false,
            ..IndexParams::default()
        };
        assert!(scraper.index_url(&live, 1).unwrap().contains("/auctions/?"));
    }

    #[test]
    fn test_parse_index() {
        let page = BringATrailerScraper::new().parse_index(INDEX);
        assert_eq!(page.candidates.len(), 2);
        assert!(page.has_more);

        let first = &page.candidates[0];
        assert_eq!(first.url, "https://bringatrailer.com/listing/2018-porsche-911-gt3-42/");
        assert_eq!(first.hints.sold, Some(true));
        assert_eq!(first.hints.price, Some(165_000));
        assert_eq!(first.hints.year, Some(2018));
        assert_eq!(page.candidates[1].hints.sold, Some(false));
    }

    #[test]
    fn test_parse_detail() {
        let url = "https://bringatrailer.com/listing/2018-porsche-911-gt3-42";
        let listing = BringATrailerScraper::new().parse_detail(url, DETAIL).unwrap();
        assert_eq!(listing.source, SourceId::BringATrailer);
        assert_eq!(listing.source_url, url);
        assert_eq!(listing.vin.as_deref(), Some("WP0AC2A99JS176782"));
        assert_eq!(listing.year, Some(2018));
        assert_eq!(listing.mileage, Some(8_000));
        assert_eq!(listing.price, Some(165_000));
        assert_eq!(listing.sold_date, NaiveDate::from_ymd_opt(2024, 5, 12));
        assert_eq!(listing.list_date, NaiveDate::from_ymd_opt(2024, 5, 5));
        assert_eq!(listing.exterior_color.as_deref(), Some("Paint to Sample Voodoo Blue"));
        assert_eq!(listing.interior_color.as_deref(), Some("Black Leather & Race-Tex"));
        assert_eq!(listing.transmission_text.as_deref(), Some("Six-Speed Manual Transaxle"));
        assert_eq!(
            listing.options_text.as_deref(),
            Some("4.0-Liter Flat-Six; Front-Axle Lift System")
        );
    }

    #[test]
    fn test_unsold_detail_has_no_sold_date() {
        let html = DETAIL.replace("Sold for USD $165,000 on 5/12/24", "Bid to USD $141,000 on 5/12/24");
        let listing = BringATrailerScraper::new().parse_detail("https://bringatrailer.com/listing/x", &html).unwrap();
        assert_eq!(listing.price, Some(141_000));
        assert_eq!(listing.sold_date, None);
    }

    #[test]
    fn test_non_listing_page() {
        let err = BringATrailerScraper::new()
            .parse_detail("https://bringatrailer.com/404", "<html><body><p>Gone</p></body></html>")
            .unwrap_err();
        assert_eq!(err.kind, ExtractionKind::NotAListing);
    }
}
