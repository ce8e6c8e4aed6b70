use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Marketplace a listing was observed on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    BringATrailer,
    CarsAndBids,
    Pcarmarket,
    CollectingCars,
    ClassicCom,
    Autotrader,
}

impl SourceId {
    pub const ALL: [SourceId; 6] = [
        SourceId::BringATrailer,
        SourceId::CarsAndBids,
        SourceId::Pcarmarket,
        SourceId::CollectingCars,
        SourceId::ClassicCom,
        SourceId::Autotrader,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BringATrailer => "bring_a_trailer",
            Self::CarsAndBids => "cars_and_bids",
            Self::Pcarmarket => "pcarmarket",
            Self::CollectingCars => "collecting_cars",
            Self::ClassicCom => "classic_com",
            Self::Autotrader => "autotrader",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace(['-', ' '], "_");
        Self::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == wanted)
            .or(match wanted.as_str() {
                "bat" => Some(Self::BringATrailer),
                "cnb" | "carsandbids" => Some(Self::CarsAndBids),
                "classic" => Some(Self::ClassicCom),
                _ => None,
            })
            .ok_or_else(|| format!("unknown source '{}'", s))
    }
}

/// Canonical model line
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Model {
    #[serde(rename = "911")]
    Nine11,
    Cayman,
    Boxster,
    Cayenne,
    Macan,
    Panamera,
    Taycan,
    #[serde(rename = "Carrera GT")]
    CarreraGt,
    #[serde(rename = "918 Spyder")]
    Spyder918,
    #[serde(rename = "928")]
    Nine28,
    #[serde(rename = "944")]
    Nine44,
    #[serde(rename = "968")]
    Nine68,
    #[serde(rename = "924")]
    Nine24,
    #[serde(rename = "914")]
    Nine14,
    #[serde(rename = "356")]
    ThreeFiftySix,
}

impl Model {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nine11 => "911",
            Self::Cayman => "Cayman",
            Self::Boxster => "Boxster",
            Self::Cayenne => "Cayenne",
            Self::Macan => "Macan",
            Self::Panamera => "Panamera",
            Self::Taycan => "Taycan",
            Self::CarreraGt => "Carrera GT",
            Self::Spyder918 => "918 Spyder",
            Self::Nine28 => "928",
            Self::Nine44 => "944",
            Self::Nine68 => "968",
            Self::Nine24 => "924",
            Self::Nine14 => "914",
            Self::ThreeFiftySix => "356",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Transmission {
    Manual,
    Automatic,
    Pdk,
    Tiptronic,
}

impl Transmission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "Manual",
            Self::Automatic => "Automatic",
            Self::Pdk => "PDK",
            Self::Tiptronic => "Tiptronic",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Usd,
    Gbp,
    Eur,
    Cad,
}

/// Fields as scraped from one detail page, before normalization
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartialListing {
    pub source: SourceId,
    pub source_url: String,
    pub vin: Option<String>,
    pub title: Option<String>,
    pub year: Option<i32>,
    pub model_text: Option<String>,
    pub trim_text: Option<String>,
    pub price: Option<i64>,
    pub currency: Currency,
    pub mileage: Option<i64>,
    pub exterior_color: Option<String>,
    pub interior_color: Option<String>,
    pub transmission_text: Option<String>,
    pub list_date: Option<NaiveDate>,
    pub sold_date: Option<NaiveDate>,
    pub options_text: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

impl PartialListing {
    pub fn new(source: SourceId, source_url: impl Into<String>) -> Self {
        Self {
            source,
            source_url: source_url.into(),
            vin: None,
            title: None,
            year: None,
            model_text: None,
            trim_text: None,
            price: None,
            currency: Currency::Usd,
            mileage: None,
            exterior_color: None,
            interior_color: None,
            transmission_text: None,
            list_date: None,
            sold_date: None,
            options_text: None,
            scraped_at: Utc::now(),
        }
    }

    pub fn is_sold(&self) -> bool {
        self.sold_date.is_some()
    }
}

/// One canonical observed offering from one source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    pub source: SourceId,
    pub source_url: String,
    pub vin: Option<String>,
    pub title: String,
    pub year: i32,
    pub model: Model,
    pub trim: Option<String>,
    pub generation: Option<String>,
    pub price: Option<i64>,
    pub mileage: Option<i64>,
    pub exterior_color: Option<String>,
    pub is_paint_to_sample: bool,
    pub interior_color: Option<String>,
    pub transmission: Option<Transmission>,
    pub list_date: Option<NaiveDate>,
    pub sold_date: Option<NaiveDate>,
    pub options_text: Option<String>,
    pub scraped_at: DateTime<Utc>,
    pub first_seen_at: DateTime<Utc>,
}

impl Listing {
    pub fn is_sold(&self) -> bool {
        self.sold_date.is_some()
    }

    /// Most recent date this observation speaks for
    pub fn observed_on(&self) -> NaiveDate {
        self.sold_date
            .or(self.list_date)
            .unwrap_or_else(|| self.scraped_at.date_naive())
    }
}

/// A listing as persisted, with its store-assigned id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredListing {
    pub id: u64,
    pub listing: Listing,
    pub updated_at: DateTime<Utc>,
}

/// Minimal facts an index page exposes about a candidate
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CandidateHints {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub price: Option<i64>,
    pub sold: Option<bool>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Done,
    Failed,
    NeedsRescrape,
}

/// Field groups that can be flagged for a targeted rescrape
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum FieldGroup {
    Identity,
    Price,
    Mileage,
    Color,
    Dates,
}

/// Work item linking the index phase to the detail phase
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScrapeQueueItem {
    pub source: SourceId,
    pub url: String,
    pub status: QueueStatus,
    pub priority: i32,
    pub hints: CandidateHints,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub rescrape: Vec<FieldGroup>,
    pub enqueued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScrapeQueueItem {
    pub fn pending(source: SourceId, url: impl Into<String>, priority: i32, hints: CandidateHints) -> Self {
        let now = Utc::now();
        Self {
            source,
            url: url.into(),
            status: QueueStatus::Pending,
            priority,
            hints,
            attempts: 0,
            last_error: None,
            rescrape: Vec::new(),
            enqueued_at: now,
            updated_at: now,
        }
    }
}

/// Metadata row describing one cached raw page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheMetadata {
    pub source: SourceId,
    pub url: String,
    pub path: String,
    pub byte_size: u64,
    pub stored_size: u64,
    pub compressed: bool,
    pub fetched_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_id_round_trips_through_str() {
        for id in SourceId::ALL {
            assert_eq!(id.as_str().parse::<SourceId>().unwrap(), id);
        }
        assert_eq!("bat".parse::<SourceId>().unwrap(), SourceId::BringATrailer);
        assert_eq!("Cars-And-Bids".parse::<SourceId>().unwrap(), SourceId::CarsAndBids);
        assert!("ebay".parse::<SourceId>().is_err());
    }

    #[test]
    fn test_model_serializes_as_canonical_name() {
        let json = serde_json::to_string(&Model::Nine11).unwrap();
        assert_eq!(json, "\"911\"");
        let back: Model = serde_json::from_str("\"Carrera GT\"").unwrap();
        assert_eq!(back, Model::CarreraGt);
    }
}
