//! Merge classification
//!
//! `classify` decides, from the incoming normalized listing and the stored
//! rows that share its URL or VIN, what the store should do. It is pure and
//! deterministic; the orchestrator applies the result.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fmt;

use crate::models::{Listing, SourceId, StoredListing};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MergeKind {
    New,
    Update,
    Relist,
    Merge,
    Skip,
}

impl fmt::Display for MergeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "NEW",
            Self::Update => "UPDATE",
            Self::Relist => "RELIST",
            Self::Merge => "MERGE",
            Self::Skip => "SKIP",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MergeAction {
    /// Insert; nothing known about this URL or VIN
    New(Listing),
    /// Rewrite the row for the same `(source, url)`
    Update { id: u64, listing: Listing },
    /// Insert as a fresh observation of a car this source listed before
    Relist { listing: Listing, previous_id: u64 },
    /// Insert with vehicle fields reconciled across sources, and back-fill
    /// gaps in the rows already stored
    Merge {
        listing: Listing,
        backfills: Vec<(u64, Listing)>,
    },
    /// Same `(source, url)` and nothing new
    Skip { id: u64 },
}

impl MergeAction {
    pub fn kind(&self) -> MergeKind {
        match self {
            Self::New(_) => MergeKind::New,
            Self::Update { .. } => MergeKind::Update,
            Self::Relist { .. } => MergeKind::Relist,
            Self::Merge { .. } => MergeKind::Merge,
            Self::Skip { .. } => MergeKind::Skip,
        }
    }
}

/// Decide how `incoming` lands in the store.
///
/// `by_url` is the stored row with the same `(source, url)`; `by_vin` are
/// stored rows sharing its VIN (may include `by_url`).
pub fn classify(incoming: &Listing, by_url: Option<&StoredListing>, by_vin: &[StoredListing]) -> MergeAction {
    if let Some(existing) = by_url {
        let (merged, changed) = update_observation(&existing.listing, incoming);
        return if changed {
            MergeAction::Update {
                id: existing.id,
                listing: merged,
            }
        } else {
            MergeAction::Skip { id: existing.id }
        };
    }

    if incoming.vin.is_none() || by_vin.is_empty() {
        return MergeAction::New(incoming.clone());
    }

    let earlier_same_source = by_vin
        .iter()
        .filter(|row| row.listing.source == incoming.source)
        .filter(|row| match (incoming.list_date, row.listing.list_date.or(row.listing.sold_date)) {
            (Some(new), Some(old)) => new > old,
            _ => false,
        })
        .max_by_key(|row| (recency(&row.listing), row.id));
    if let Some(previous) = earlier_same_source {
        return MergeAction::Relist {
            listing: incoming.clone(),
            previous_id: previous.id,
        };
    }

    if by_vin.iter().any(|row| row.listing.source != incoming.source) {
        let reconciled = reconcile(incoming, by_vin);
        let backfills = by_vin
            .iter()
            .filter_map(|row| {
                let mut filled = row.listing.clone();
                backfill(&mut filled, &reconciled);
                (filled != row.listing).then_some((row.id, filled))
            })
            .collect();
        return MergeAction::Merge {
            listing: reconciled,
            backfills,
        };
    }

    MergeAction::New(incoming.clone())
}

type RecencyKey = (NaiveDate, DateTime<Utc>, SourceId, String);

/// Total order on observations: latest dated first, ties broken by scrape
/// time then identity
fn recency(listing: &Listing) -> RecencyKey {
    (
        listing.observed_on(),
        listing.scraped_at,
        listing.source,
        listing.source_url.clone(),
    )
}

/// Apply a re-scrape of the same URL. Price, mileage and sale outcome
/// follow the newer scrape; anything else only fills gaps. First-seen
/// fields are kept.
fn update_observation(existing: &Listing, incoming: &Listing) -> (Listing, bool) {
    let mut merged = existing.clone();

    if incoming.price.is_some() {
        merged.price = incoming.price;
    }
    if incoming.mileage.is_some() {
        merged.mileage = incoming.mileage;
    }
    if incoming.sold_date.is_some() {
        merged.sold_date = incoming.sold_date;
    }

    fill(&mut merged.vin, &incoming.vin);
    fill(&mut merged.list_date, &incoming.list_date);
    backfill(&mut merged, incoming);

    let changed = merged != *existing;
    if changed {
        merged.scraped_at = incoming.scraped_at.max(existing.scraped_at);
    }
    (merged, changed)
}

fn fill<T: Clone>(target: &mut Option<T>, source: &Option<T>) {
    if target.is_none() {
        target.clone_from(source);
    }
}

/// Fill empty vehicle-level fields of `target` from `source`
fn backfill(target: &mut Listing, source: &Listing) {
    fill(&mut target.trim, &source.trim);
    fill(&mut target.generation, &source.generation);
    if target.exterior_color.is_none() && source.exterior_color.is_some() {
        target.exterior_color.clone_from(&source.exterior_color);
        target.is_paint_to_sample = source.is_paint_to_sample;
    }
    fill(&mut target.interior_color, &source.interior_color);
    fill(&mut target.transmission, &source.transmission);
    fill(&mut target.options_text, &source.options_text);
}

/// Vehicle-level fields for a new row, reconciled over every observation of
/// the same VIN: a value beats no value, then the most recent observation
/// wins. Observation fields (price, mileage, dates) stay as scraped.
fn reconcile(incoming: &Listing, by_vin: &[StoredListing]) -> Listing {
    let mut observations: Vec<&Listing> = by_vin.iter().map(|row| &row.listing).collect();
    observations.push(incoming);
    observations.sort_by_key(|l| std::cmp::Reverse(recency(l)));

    let mut out = incoming.clone();
    if let Some(latest) = observations.first() {
        out.model = latest.model;
        out.year = latest.year;
        out.generation.clone_from(&latest.generation);
    }

    out.trim = observations.iter().find_map(|l| l.trim.clone());
    if out.generation.is_none() {
        out.generation = observations.iter().find_map(|l| l.generation.clone());
    }
    match observations.iter().find(|l| l.exterior_color.is_some()) {
        Some(l) => {
            out.exterior_color.clone_from(&l.exterior_color);
            out.is_paint_to_sample = l.is_paint_to_sample;
        }
        None => out.is_paint_to_sample = observations.iter().any(|l| l.is_paint_to_sample),
    }
    out.interior_color = observations.iter().find_map(|l| l.interior_color.clone());
    out.transmission = observations.iter().find_map(|l| l.transmission);
    out.options_text = observations.iter().find_map(|l| l.options_text.clone());
    out
}
