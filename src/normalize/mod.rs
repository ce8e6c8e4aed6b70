//! Deterministic canonicalization of scraped listing fields
//!
//! `Normalizer::normalize` turns a site-specific `PartialListing` into a
//! canonical `Listing` (or drops it when identity cannot be recovered), and
//! `Normalizer::renormalize` applies the same rules to an already-stored row.
//! Both are pure and converge: normalizing a normalized row changes nothing.

pub mod color;
pub mod generation;
pub mod parse;
pub mod plausibility;
pub mod taxonomy;

use chrono::{Datelike, Utc};
use tracing::debug;

use crate::config::ValidationConfig;
use crate::models::{Currency, FieldGroup, Listing, Model, PartialListing};
use crate::vin::{self, VinDecodeResult, VinDecoder};

/// Earliest model year the pipeline tracks
const FIRST_MODEL_YEAR: i32 = 1948;

/// A field that failed validation and was nulled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub field: FieldGroup,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Accepted { listing: Listing, rejections: Vec<Rejection> },
    /// Identity (model/year) could not be recovered
    Dropped { reason: String },
}

pub struct Normalizer {
    config: ValidationConfig,
    decoder: VinDecoder,
}

impl Normalizer {
    pub fn new(config: ValidationConfig) -> Self {
        let reference_year = config.reference_year.unwrap_or_else(|| Utc::now().year());
        Self {
            config,
            decoder: VinDecoder::new(reference_year),
        }
    }

    pub fn reference_year(&self) -> i32 {
        self.decoder.reference_year()
    }

    pub fn decoder(&self) -> &VinDecoder {
        &self.decoder
    }

    fn year_plausible(&self, year: i32) -> bool {
        (FIRST_MODEL_YEAR..=self.reference_year() + 1).contains(&year)
    }

    fn decode_vin(&self, raw: Option<&str>) -> Option<VinDecodeResult> {
        let raw = raw?.trim();
        let decoded = self.decoder.decode(raw);
        decoded.valid.then_some(decoded)
    }

    pub fn normalize(&self, partial: &PartialListing) -> Normalized {
        let decoded = self.decode_vin(partial.vin.as_deref());
        let title = partial.title.as_deref().and_then(parse::clean_text).unwrap_or_default();

        let scraped_model = partial
            .model_text
            .as_deref()
            .and_then(taxonomy::canonical_model)
            .or_else(|| taxonomy::canonical_model(&title));
        let vin_model = decoded.as_ref().and_then(|d| d.model);
        if let (Some(scraped), Some(from_vin)) = (scraped_model, vin_model) {
            if scraped != from_vin {
                debug!(url = %partial.source_url, %scraped, %from_vin, "VIN model disagrees with listing text");
            }
        }
        let Some(model) = scraped_model.or(vin_model) else {
            return Normalized::Dropped {
                reason: format!("model unrecoverable from '{}'", title),
            };
        };

        let year = partial
            .year
            .or_else(|| parse::parse_year(&title))
            .filter(|y| self.year_plausible(*y))
            .or_else(|| {
                decoded
                    .as_ref()
                    .and_then(|d| d.model_year)
                    .filter(|y| self.year_plausible(*y))
            });
        let Some(year) = year else {
            return Normalized::Dropped {
                reason: format!("model year unrecoverable from '{}'", title),
            };
        };

        let vin = decoded.map(|d| d.vin);
        let trim = partial
            .trim_text
            .as_deref()
            .and_then(|t| taxonomy::canonical_trim(model, t))
            .or_else(|| taxonomy::canonical_trim(model, &title))
            .or_else(|| self.trim_from_vin(model, vin.as_deref()));

        let exterior = partial.exterior_color.as_deref().map(color::clean_exterior);
        let title = if title.is_empty() {
            synthesize_title(year, model, trim)
        } else {
            title
        };

        let mut listing = Listing {
            source: partial.source,
            source_url: partial.source_url.clone(),
            vin,
            transmission: partial
                .transmission_text
                .as_deref()
                .and_then(parse::parse_transmission)
                .or_else(|| parse::parse_transmission(&title)),
            title,
            year,
            model,
            trim: trim.map(str::to_string),
            generation: generation::generation_for(model, year).map(str::to_string),
            price: partial.price,
            mileage: partial.mileage,
            exterior_color: exterior.as_ref().and_then(|c| c.name.clone()),
            is_paint_to_sample: exterior.map(|c| c.paint_to_sample).unwrap_or(false),
            interior_color: partial.interior_color.as_deref().and_then(color::clean_interior),
            list_date: partial.list_date,
            sold_date: partial.sold_date,
            options_text: partial.options_text.as_deref().and_then(parse::clean_text),
            scraped_at: partial.scraped_at,
            first_seen_at: partial.scraped_at,
        };

        let mut rejections = Vec::new();
        if partial.currency != Currency::Usd {
            if let Some(price) = listing.price.take() {
                rejections.push(Rejection {
                    field: FieldGroup::Price,
                    reason: format!("price {} in {:?}, only USD is accepted", price, partial.currency),
                });
            }
        }
        self.apply_checks(&mut listing, &mut rejections);

        Normalized::Accepted { listing, rejections }
    }

    /// Re-apply canonicalization to a stored row. Identity fields are kept
    /// as stored; everything derived from them is recomputed.
    pub fn renormalize(&self, stored: &Listing) -> (Listing, Vec<Rejection>) {
        let mut listing = stored.clone();
        let model = listing.model;

        if listing.vin.is_some() {
            listing.vin = self.decode_vin(listing.vin.as_deref()).map(|d| d.vin);
        }
        listing.trim = listing
            .trim
            .as_deref()
            .and_then(|t| taxonomy::canonical_trim(model, t))
            .or_else(|| taxonomy::canonical_trim(model, &listing.title))
            .or_else(|| self.trim_from_vin(model, listing.vin.as_deref()))
            .map(str::to_string);
        listing.generation = generation::generation_for(model, listing.year).map(str::to_string);

        if let Some(raw) = listing.exterior_color.take() {
            let cleaned = color::clean_exterior(&raw);
            listing.exterior_color = cleaned.name;
            listing.is_paint_to_sample |= cleaned.paint_to_sample;
        }
        listing.interior_color = listing.interior_color.as_deref().and_then(color::clean_interior);
        listing.options_text = listing.options_text.as_deref().and_then(parse::clean_text);
        if let Some(title) = parse::clean_text(&listing.title) {
            listing.title = title;
        }

        let mut rejections = Vec::new();
        self.apply_checks(&mut listing, &mut rejections);
        (listing, rejections)
    }

    fn trim_from_vin(&self, model: Model, vin: Option<&str>) -> Option<&'static str> {
        let hint = vin::trim_hint(vin?)?;
        taxonomy::canonical_trim(model, hint)
    }

    fn apply_checks(&self, listing: &mut Listing, rejections: &mut Vec<Rejection>) {
        if let Some(price) = listing.price {
            if let Err(rejection) =
                plausibility::check_price(price, listing.model, listing.trim.as_deref(), &self.config)
            {
                listing.price = None;
                rejections.push(Rejection {
                    field: FieldGroup::Price,
                    reason: rejection.to_string(),
                });
            }
        }

        if let Some(mileage) = listing.mileage {
            let observed_year = listing.observed_on().year();
            if let Err(reason) = plausibility::check_mileage(mileage, listing.year, observed_year, &self.config) {
                listing.mileage = None;
                rejections.push(Rejection {
                    field: FieldGroup::Mileage,
                    reason,
                });
            }
        }

        if let (Some(listed), Some(sold)) = (listing.list_date, listing.sold_date) {
            if sold < listed {
                listing.list_date = None;
                rejections.push(Rejection {
                    field: FieldGroup::Dates,
                    reason: format!("sold {} before listed {}", sold, listed),
                });
            }
        }
    }
}

fn synthesize_title(year: i32, model: Model, trim: Option<&str>) -> String {
    match trim {
        Some(trim) => format!("{} Porsche {} {}", year, model, trim),
        None => format!("{} Porsche {}", year, model),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SourceId, Transmission};
    use chrono::NaiveDate;

    fn normalizer() -> Normalizer {
        Normalizer::new(ValidationConfig {
            reference_year: Some(2026),
            ..ValidationConfig::default()
        })
    }

    fn partial(title: &str) -> PartialListing {
        let mut p = PartialListing::new(SourceId::BringATrailer, "https://bringatrailer.com/listing/x");
        p.title = Some(title.to_string());
        p
    }

    fn accepted(n: Normalized) -> (Listing, Vec<Rejection>) {
        match n {
            Normalized::Accepted { listing, rejections } => (listing, rejections),
            Normalized::Dropped { reason } => panic!("unexpectedly dropped: {}", reason),
        }
    }

    #[test]
    fn test_full_canonicalization() {
        let mut p = partial("2018 Porsche 911 GT3 6-Speed");
        p.vin = Some("wp0ac2a99js176782".to_string());
        p.price = Some(165_000);
        p.mileage = Some(8_200);
        p.exterior_color = Some("Paint to Sample Voodoo Blue".to_string());
        p.transmission_text = Some("Six-Speed Manual".to_string());
        p.sold_date = NaiveDate::from_ymd_opt(2024, 5, 12);

        let (listing, rejections) = accepted(normalizer().normalize(&p));
        assert!(rejections.is_empty());
        assert_eq!(listing.vin.as_deref(), Some("WP0AC2A99JS176782"));
        assert_eq!(listing.model, Model::Nine11);
        assert_eq!(listing.year, 2018);
        assert_eq!(listing.trim.as_deref(), Some("GT3"));
        assert_eq!(listing.generation.as_deref(), Some("991.2"));
        assert_eq!(listing.exterior_color.as_deref(), Some("Voodoo Blue"));
        assert!(listing.is_paint_to_sample);
        assert_eq!(listing.transmission, Some(Transmission::Manual));
    }

    #[test]
    fn test_identity_recovered_from_vin() {
        let mut p = partial("Rare find, one owner");
        p.vin = Some("WP0AF2A92GS192418".to_string());
        let (listing, _) = accepted(normalizer().normalize(&p));
        assert_eq!(listing.model, Model::Nine11);
        assert_eq!(listing.year, 2016);
        assert_eq!(listing.trim.as_deref(), Some("GT3 RS"));
        assert_eq!(listing.generation.as_deref(), Some("991.1"));
    }

    #[test]
    fn test_unrecoverable_identity_is_dropped() {
        assert!(matches!(
            normalizer().normalize(&partial("2019 Honda Civic")),
            Normalized::Dropped { .. }
        ));
        assert!(matches!(
            normalizer().normalize(&partial("Porsche 911 Carrera")),
            Normalized::Dropped { .. }
        ));
    }

    #[test]
    fn test_gt3_rs_below_floor_is_nulled_not_dropped() {
        let mut p = partial("2016 Porsche 911 GT3 RS");
        p.price = Some(48_000);
        let (listing, rejections) = accepted(normalizer().normalize(&p));
        assert_eq!(listing.price, None);
        assert_eq!(rejections.len(), 1);
        assert_eq!(rejections[0].field, FieldGroup::Price);
    }

    #[test]
    fn test_non_usd_price_is_rejected() {
        let mut p = partial("2018 Porsche 911 Carrera T");
        p.price = Some(95_000);
        p.currency = Currency::Gbp;
        let (listing, rejections) = accepted(normalizer().normalize(&p));
        assert_eq!(listing.price, None);
        assert_eq!(rejections[0].field, FieldGroup::Price);
    }

    #[test]
    fn test_implausible_mileage_is_nulled() {
        let mut p = partial("2023 Porsche 911 Carrera S");
        p.mileage = Some(310_000);
        p.list_date = NaiveDate::from_ymd_opt(2024, 1, 3);
        let (listing, rejections) = accepted(normalizer().normalize(&p));
        assert_eq!(listing.mileage, None);
        assert_eq!(rejections[0].field, FieldGroup::Mileage);
    }

    #[test]
    fn test_renormalize_is_a_fixed_point() {
        let mut p = partial("2007 porsche 911  carrera 4s");
        p.vin = Some("WP0AB29937S730155".to_string());
        p.price = Some(52_000);
        p.exterior_color = Some("mexico blue (PTS)".to_string());
        p.interior_color = Some("black leather".to_string());
        let n = normalizer();
        let (listing, _) = accepted(n.normalize(&p));
        let (again, rejections) = n.renormalize(&listing);
        assert!(rejections.is_empty());
        assert_eq!(again, listing);
        let (third, _) = n.renormalize(&again);
        assert_eq!(third, again);
    }

    #[test]
    fn test_renormalize_repairs_legacy_generation_labels() {
        let mut p = partial("2018 Porsche 911 Carrera T");
        p.price = Some(99_000);
        let n = normalizer();
        let (mut listing, _) = accepted(n.normalize(&p));
        listing.generation = Some("991".to_string());
        listing.trim = Some("carrera t".to_string());
        let (fixed, _) = n.renormalize(&listing);
        assert_eq!(fixed.generation.as_deref(), Some("991.2"));
        assert_eq!(fixed.trim.as_deref(), Some("Carrera T"));
    }
}
