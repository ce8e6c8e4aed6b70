//! Free-text field parsing shared by every site adapter

use chrono::NaiveDate;
use regex_lite::Regex;
use std::sync::OnceLock;

use crate::models::{Currency, Transmission};
use crate::vin;

static RE_AMOUNT: OnceLock<Regex> = OnceLock::new();
static RE_MILEAGE: OnceLock<Regex> = OnceLock::new();
static RE_YEAR: OnceLock<Regex> = OnceLock::new();
static RE_VIN: OnceLock<Regex> = OnceLock::new();
static RE_SLASH_DATE: OnceLock<Regex> = OnceLock::new();
static RE_LONG_DATE: OnceLock<Regex> = OnceLock::new();
static RE_ISO_DATE: OnceLock<Regex> = OnceLock::new();

/// Parse a money amount such as `$123,500`, `USD 45k` or `£89,995`.
pub fn parse_money(text: &str) -> Option<(i64, Currency)> {
    let re = RE_AMOUNT.get_or_init(|| {
        Regex::new(r"(?i)(\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?\s*(k\b)?").unwrap()
    });
    let caps = re.captures(text)?;
    let digits = caps.get(1)?.as_str().replace(',', "");
    let mut amount: i64 = digits.parse().ok()?;
    if caps.get(2).is_some() {
        amount = amount.checked_mul(1_000)?;
    }
    Some((amount, detect_currency(text)))
}

fn detect_currency(text: &str) -> Currency {
    let upper = text.to_uppercase();
    if upper.contains('£') || upper.contains("GBP") {
        Currency::Gbp
    } else if upper.contains('€') || upper.contains("EUR") {
        Currency::Eur
    } else if upper.contains("CA$") || upper.contains("C$") || upper.contains("CAD") {
        Currency::Cad
    } else {
        Currency::Usd
    }
}

/// Parse an odometer reading. Kilometres are converted to miles.
/// "TMU" (true mileage unknown) yields `None`.
pub fn parse_mileage(text: &str) -> Option<i64> {
    if text.to_uppercase().contains("TMU") {
        return None;
    }
    let re = RE_MILEAGE.get_or_init(|| {
        Regex::new(r"(?i)(\d{1,3}(?:,\d{3})+|\d+(?:\.\d+)?)\s*(k)?\s*(miles|mile|mi\b|kilometers|kilometres|km\b)")
            .unwrap()
    });
    let caps = re.captures(text)?;
    let mut value: f64 = caps.get(1)?.as_str().replace(',', "").parse().ok()?;
    if caps.get(2).is_some() {
        value *= 1_000.0;
    }
    let unit = caps.get(3)?.as_str().to_lowercase();
    if unit.starts_with('k') {
        value /= 1.609_344;
    }
    Some(value.round() as i64)
}

/// First plausible model year in a title, e.g. `2018 Porsche 911 GT3`.
pub fn parse_year(text: &str) -> Option<i32> {
    let re = RE_YEAR.get_or_init(|| Regex::new(r"\b(19[4-9]\d|20[0-4]\d)\b").unwrap());
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

/// First well-formed 17-character VIN in free text.
pub fn find_vin(text: &str) -> Option<String> {
    let re = RE_VIN.get_or_init(|| Regex::new(r"\b[A-HJ-NPR-Za-hj-npr-z0-9]{17}\b").unwrap());
    re.find_iter(text)
        .map(|m| m.as_str().to_uppercase())
        .find(|candidate| vin::is_well_formed(candidate) && candidate.chars().any(|c| c.is_ascii_digit()))
}

/// Parse a date in any of the formats the marketplaces render.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();

    let iso = RE_ISO_DATE.get_or_init(|| Regex::new(r"\d{4}-\d{2}-\d{2}").unwrap());
    if let Some(m) = iso.find(trimmed) {
        if let Ok(date) = NaiveDate::parse_from_str(m.as_str(), "%Y-%m-%d") {
            return Some(date);
        }
    }

    let slash = RE_SLASH_DATE.get_or_init(|| Regex::new(r"\d{1,2}/\d{1,2}/\d{2,4}").unwrap());
    if let Some(m) = slash.find(trimmed) {
        for fmt in ["%m/%d/%Y", "%m/%d/%y"] {
            if let Ok(date) = NaiveDate::parse_from_str(m.as_str(), fmt) {
                if fmt == "%m/%d/%Y" && m.as_str().rsplit('/').next().map(str::len) != Some(4) {
                    continue;
                }
                return Some(date);
            }
        }
    }

    let long = RE_LONG_DATE.get_or_init(|| {
        Regex::new(r"(?i)([A-Z][a-z]+\.? \d{1,2},? \d{4}|\d{1,2} [A-Z][a-z]+ \d{4})").unwrap()
    });
    let m = long.find(trimmed)?;
    let candidate = m.as_str().replace('.', "").replace(',', "");
    ["%B %d %Y", "%b %d %Y", "%d %B %Y", "%d %b %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&candidate, fmt).ok())
}

/// Gearbox from a free-text description. Bare "6-speed" is not enough to decide.
pub fn parse_transmission(text: &str) -> Option<Transmission> {
    let lower = text.to_lowercase();
    if lower.contains("pdk") {
        Some(Transmission::Pdk)
    } else if lower.contains("tiptronic") {
        Some(Transmission::Tiptronic)
    } else if lower.contains("manual") || lower.contains("stick") {
        Some(Transmission::Manual)
    } else if lower.contains("automatic") || lower.contains("auto trans") {
        Some(Transmission::Automatic)
    } else {
        None
    }
}

/// Collapse runs of whitespace and trim; empty results become `None`.
pub fn clean_text(text: &str) -> Option<String> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}
