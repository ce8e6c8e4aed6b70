//! Ingestion orchestrator
//!
//! A run for one source has two phases:
//! 1. Index: walk result pages, drop already-stored URLs, queue the rest.
//!    Pagination stops early once a page is mostly known.
//! 2. Detail: drain the queue in bounded batches through the page cache,
//!    normalize, classify and persist. A run of consecutive failures aborts
//!    the phase; everything already persisted stays.
//!
//! Queue status and cache writes are committed per item, so an interrupted
//! run resumes from pending items rather than from page one.

pub mod maintenance;
pub mod merge;
mod report;

pub use merge::{classify, MergeAction, MergeKind};
pub use report::RunReport;

use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::{Config, PipelineConfig};
use crate::dedup::DedupService;
use crate::error::{ExtractionFailure, ExtractionKind, FetchError, PipelineError, StoreError};
use crate::fetch::CachedPages;
use crate::models::{FieldGroup, Listing, Model, PartialListing, QueueStatus, ScrapeQueueItem, SourceId};
use crate::normalize::{Normalized, Normalizer, Rejection};
use crate::scrapers::{scraper_for, DetailPage, IndexPager, IndexParams, SourceScraper};
use crate::store::{ListingStore, QueueStore, Store};

/// Parameters of one batch run
#[derive(Debug, Clone)]
pub struct RunParams {
    pub source: SourceId,
    /// Overrides the configured page limit
    pub max_index_pages: Option<u32>,
    pub only_sold: bool,
    pub model: Option<Model>,
    pub trim: Option<String>,
    /// Seed the queue without visiting detail pages
    pub index_only: bool,
}

impl RunParams {
    pub fn new(source: SourceId) -> Self {
        Self {
            source,
            max_index_pages: None,
            only_sold: true,
            model: None,
            trim: None,
            index_only: false,
        }
    }
}

/// Reports of a multi-source run. One source failing does not stop the rest.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub reports: Vec<RunReport>,
    pub failures: Vec<(SourceId, PipelineError)>,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// What happened to one parsed listing
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Applied { kind: MergeKind, rejections: Vec<Rejection> },
    /// Identity could not be recovered; nothing was written
    Dropped { reason: String },
}

pub struct Orchestrator {
    store: Arc<dyn Store>,
    pages: CachedPages,
    dedup: DedupService,
    normalizer: Normalizer,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn Store>, pages: CachedPages, config: &Config) -> Self {
        let dedup = DedupService::new(
            store.clone(),
            config.pipeline.dedup_batch_size,
            config.pipeline.cost_per_fetch,
        );
        Self {
            store,
            pages,
            dedup,
            normalizer: Normalizer::new(config.validation.clone()),
            config: config.pipeline.clone(),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Run both phases for one source
    pub async fn run(&self, params: &RunParams) -> Result<RunReport, PipelineError> {
        let scraper = scraper_for(params.source);
        let mut report = RunReport::new(params.source);
        info!(source = %params.source, only_sold = params.only_sold, index_only = params.index_only, "Starting run");

        self.index_phase(&scraper, params, &mut report).await?;
        if params.index_only {
            info!(source = %params.source, enqueued = report.enqueued, "Index-only run finished");
        } else {
            self.detail_phase(&scraper, params.only_sold, &mut report).await?;
        }

        self.store.flush()?;
        info!(
            source = %params.source,
            new = report.new,
            updated = report.updated,
            relisted = report.relisted,
            merged = report.merged,
            skipped = report.skipped,
            failed = report.failed,
            "Run finished"
        );
        Ok(report)
    }

    /// Run each source in turn, keeping going past a source that fails
    pub async fn run_all(&self, runs: &[RunParams]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for params in runs {
            match self.run(params).await {
                Ok(report) => {
                    if report.aborted {
                        warn!(source = %params.source, "Run aborted after consecutive failures");
                    }
                    outcome.reports.push(report);
                }
                Err(e) => {
                    error!(source = %params.source, "Run failed: {}", e);
                    outcome.failures.push((params.source, e));
                }
            }
        }
        outcome
    }

    async fn index_phase(
        &self,
        scraper: &Arc<dyn SourceScraper>,
        params: &RunParams,
        report: &mut RunReport,
    ) -> Result<(), PipelineError> {
        let source = params.source;
        let index_params = IndexParams {
            only_sold: params.only_sold,
            model: params.model,
            trim: params.trim.clone(),
            max_pages: params.max_index_pages.unwrap_or(self.config.max_index_pages),
        };
        let mut pager = IndexPager::new(scraper.clone(), index_params);
        let fetcher = self.pages.fetcher().clone();
        let mut attempts = 0u32;

        loop {
            let page_number = pager.next_page_number();
            let page = match pager.next_page(fetcher.as_ref()).await {
                None => break,
                Some(Ok(page)) => page,
                Some(Err(e)) => {
                    attempts += 1;
                    if !e.is_transient() || attempts > self.config.max_retries {
                        warn!(source = %source, page = page_number, "Index page failed, ending index phase: {}", e);
                        report.index_errors += 1;
                        break;
                    }
                    let delay = self.retry_delay(&e, attempts);
                    warn!(source = %source, page = page_number, attempt = attempts, "Index page failed, retrying in {:?}: {}", delay, e);
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };
            attempts = 0;
            report.pages_fetched += 1;

            let urls: Vec<String> = page.candidates.iter().map(|c| c.url.clone()).collect();
            let dedup = self.dedup.filter_new_urls(source, &urls)?;
            report.record_dedup(&dedup.stats);

            let fresh: BTreeSet<&str> = dedup.new_urls.iter().map(String::as_str).collect();
            for candidate in page.candidates.iter().filter(|c| fresh.contains(c.url.as_str())) {
                let priority = if candidate.hints.sold == Some(true) { 1 } else { 0 };
                let item = ScrapeQueueItem::pending(source, candidate.url.clone(), priority, candidate.hints.clone());
                if self.store.enqueue(&item)? {
                    report.enqueued += 1;
                }
            }
            info!(
                source = %source,
                page = page.page,
                candidates = dedup.stats.total,
                new = dedup.stats.new,
                duplicate_rate = dedup.stats.duplicate_rate,
                "Index page processed"
            );

            if DedupService::should_stop_pagination(dedup.stats.duplicate_rate, self.config.stop_duplicate_rate) {
                info!(
                    source = %source,
                    page = page.page,
                    "Page {:.0}% already known, stopping pagination",
                    dedup.stats.duplicate_rate
                );
                report.stopped_early = true;
                break;
            }
            self.pause().await;
        }
        Ok(())
    }

    async fn detail_phase(
        &self,
        scraper: &Arc<dyn SourceScraper>,
        only_sold: bool,
        report: &mut RunReport,
    ) -> Result<(), PipelineError> {
        let source = scraper.source_id();
        let group_size = self.config.detail_concurrency.max(1);
        let mut consecutive_failures = 0u32;

        'batches: loop {
            let batch = self.store.pending(source, self.config.detail_batch_size.max(1))?;
            if batch.is_empty() {
                break;
            }
            debug!(source = %source, items = batch.len(), "Detail batch");

            for group in batch.chunks(group_size) {
                let outcomes: Vec<Result<DetailPage, FetchError>> = stream::iter(group.iter())
                    .map(|item| self.fetch_detail(scraper.as_ref(), &item.url))
                    .buffered(group_size)
                    .collect()
                    .await;

                let mut fetched_any = false;
                for (item, outcome) in group.iter().zip(outcomes) {
                    let mut item = item.clone();
                    item.attempts += 1;
                    let failed = match outcome {
                        Ok(detail) => {
                            if detail.from_cache {
                                report.cache_hits += 1;
                            } else {
                                report.fetches += 1;
                                fetched_any = true;
                            }
                            self.settle_parsed(&mut item, detail.result, only_sold, report)?
                        }
                        Err(e) => {
                            warn!(source = %source, url = %item.url, "Detail fetch failed: {}", e);
                            fetched_any = true;
                            report.failed += 1;
                            item.status = QueueStatus::Failed;
                            item.last_error = Some(e.to_string());
                            true
                        }
                    };
                    item.updated_at = chrono::Utc::now();
                    self.store.save_queue_item(&item)?;

                    if failed {
                        consecutive_failures += 1;
                    } else {
                        consecutive_failures = 0;
                    }
                }

                if consecutive_failures >= self.config.max_consecutive_failures {
                    warn!(
                        source = %source,
                        failures = consecutive_failures,
                        "Too many consecutive failures, aborting detail phase"
                    );
                    report.aborted = true;
                    break 'batches;
                }
                if fetched_any {
                    self.pause().await;
                }
            }
        }
        Ok(())
    }

    /// Record the parse outcome on the queue item. Returns whether it
    /// counts as a failure.
    fn settle_parsed(
        &self,
        item: &mut ScrapeQueueItem,
        parsed: Result<PartialListing, ExtractionFailure>,
        only_sold: bool,
        report: &mut RunReport,
    ) -> Result<bool, StoreError> {
        let partial = match parsed {
            Ok(partial) => partial,
            Err(failure) => {
                warn!(source = %item.source, url = %item.url, "Extraction failed: {}", failure);
                report.failed += 1;
                item.last_error = Some(failure.to_string());
                match failure.kind {
                    ExtractionKind::NotAListing => item.status = QueueStatus::Failed,
                    ExtractionKind::MissingField | ExtractionKind::Malformed => {
                        item.status = QueueStatus::NeedsRescrape;
                        item.rescrape = vec![FieldGroup::Identity];
                    }
                }
                return Ok(true);
            }
        };

        // Index hints can leave the sale result unknown; the detail page decides
        if only_sold && !partial.is_sold() {
            debug!(source = %item.source, url = %item.url, "Listing not sold, skipping");
            report.filtered += 1;
            item.status = QueueStatus::Done;
            item.last_error = Some("listing not sold".to_string());
            return Ok(false);
        }

        match self.ingest(&partial)? {
            IngestOutcome::Applied { kind, rejections } => {
                report.record_merge(kind);
                item.last_error = None;
                let groups: BTreeSet<FieldGroup> = rejections.iter().map(|r| r.field).collect();
                if groups.is_empty() {
                    item.status = QueueStatus::Done;
                    item.rescrape.clear();
                } else {
                    item.status = QueueStatus::NeedsRescrape;
                    item.rescrape = groups.into_iter().collect();
                }
                Ok(false)
            }
            IngestOutcome::Dropped { reason } => {
                report.rejected += 1;
                item.status = QueueStatus::Failed;
                item.last_error = Some(reason);
                Ok(false)
            }
        }
    }

    /// Fetch one detail page with retries for transient failures
    async fn fetch_detail(&self, scraper: &dyn SourceScraper, url: &str) -> Result<DetailPage, FetchError> {
        let mut attempt = 0;
        loop {
            match scraper.detail_page(&self.pages, url).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = self.retry_delay(&e, attempt);
                    debug!(url = %url, attempt, "Retrying in {:?}: {}", delay, e);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn retry_delay(&self, error: &FetchError, attempt: u32) -> Duration {
        Duration::from_millis(self.config.retry_base_delay_ms)
            .saturating_mul(error.backoff_multiplier())
            .saturating_mul(attempt)
    }

    async fn pause(&self) {
        if self.config.request_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.request_delay_ms)).await;
        }
    }

    /// Normalize one parsed listing and persist it according to its merge
    /// classification
    pub fn ingest(&self, partial: &PartialListing) -> Result<IngestOutcome, StoreError> {
        ingest(self.store.as_ref(), &self.normalizer, partial)
    }
}

pub fn ingest(store: &dyn Store, normalizer: &Normalizer, partial: &PartialListing) -> Result<IngestOutcome, StoreError> {
    match normalizer.normalize(partial) {
        Normalized::Dropped { reason } => {
            debug!(url = %partial.source_url, "Dropped: {}", reason);
            Ok(IngestOutcome::Dropped { reason })
        }
        Normalized::Accepted { listing, rejections } => {
            for rejection in &rejections {
                debug!(url = %listing.source_url, field = ?rejection.field, "Rejected: {}", rejection.reason);
            }
            let kind = persist(store, &listing)?;
            Ok(IngestOutcome::Applied { kind, rejections })
        }
    }
}

/// Classify against the current store contents and apply. A natural-key
/// conflict means another writer got there first; classifying again
/// against its row resolves it.
pub fn persist(store: &dyn Store, listing: &Listing) -> Result<MergeKind, StoreError> {
    let mut retried = false;
    loop {
        let by_url = store.find_by_url(listing.source, &listing.source_url)?;
        let by_vin = match &listing.vin {
            Some(vin) => store.find_by_vin(vin)?,
            None => Vec::new(),
        };
        let action = classify(listing, by_url.as_ref(), &by_vin);
        let kind = action.kind();
        debug!(url = %listing.source_url, action = %kind, "Merge decision");

        match apply(store, action) {
            Ok(()) => return Ok(kind),
            Err(StoreError::Conflict { id }) if !retried => {
                debug!(url = %listing.source_url, id, "Natural key taken concurrently, reclassifying");
                retried = true;
            }
            Err(e) => return Err(e),
        }
    }
}

fn apply(store: &dyn Store, action: MergeAction) -> Result<(), StoreError> {
    match action {
        MergeAction::New(listing) | MergeAction::Relist { listing, .. } => {
            store.insert_listing(&listing)?;
        }
        MergeAction::Update { id, listing } => store.update_listing(id, &listing)?,
        MergeAction::Merge { listing, backfills } => {
            store.insert_listing(&listing)?;
            for (id, filled) in backfills {
                store.update_listing(id, &filled)?;
            }
        }
        MergeAction::Skip { .. } => {}
    }
    Ok(())
}
