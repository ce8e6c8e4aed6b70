//! Vehicle Ledger: collector-car listing ingestion
//!
//! Crawls auction and classifieds marketplaces, keeps every fetched page in a
//! compressed raw cache, and folds the parsed listings into one canonical,
//! deduplicated dataset:
//! - VIN decoding (model year, plant, generation)
//! - Deterministic normalization with plausibility checks
//! - URL deduplication with an early-stop pagination breaker
//! - Merge classification across sources (new, update, relist, merge, skip)

pub mod cache;
pub mod config;
pub mod dedup;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod scrapers;
pub mod store;
pub mod vin;

pub use config::Config;
pub use models::*;
