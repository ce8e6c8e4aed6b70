use serde::Serialize;
use std::fmt;

use super::merge::MergeKind;
use crate::dedup::DedupStats;
use crate::models::SourceId;

/// Counters for one orchestrator run
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RunReport {
    pub source: Option<SourceId>,
    pub new: usize,
    pub updated: usize,
    pub relisted: usize,
    pub merged: usize,
    pub skipped: usize,
    /// Detail pages that could not be fetched or extracted
    pub failed: usize,
    /// Parsed pages dropped by normalization
    pub rejected: usize,
    /// Detail pages left out by the sold-only filter
    pub filtered: usize,
    pub pages_fetched: usize,
    pub index_errors: usize,
    pub candidates: usize,
    pub known: usize,
    pub enqueued: usize,
    /// Duplicate rate of the last index page, in percent
    pub duplicate_rate: f64,
    pub estimated_cost_avoided: f64,
    pub fetches: usize,
    pub cache_hits: usize,
    pub stopped_early: bool,
    pub aborted: bool,
}

impl RunReport {
    pub fn new(source: SourceId) -> Self {
        Self {
            source: Some(source),
            ..Default::default()
        }
    }

    pub(super) fn record_dedup(&mut self, stats: &DedupStats) {
        self.candidates += stats.total;
        self.known += stats.existing;
        self.duplicate_rate = stats.duplicate_rate;
        self.estimated_cost_avoided += stats.estimated_cost_avoided;
    }

    pub(super) fn record_merge(&mut self, kind: MergeKind) {
        match kind {
            MergeKind::New => self.new += 1,
            MergeKind::Update => self.updated += 1,
            MergeKind::Relist => self.relisted += 1,
            MergeKind::Merge => self.merged += 1,
            MergeKind::Skip => self.skipped += 1,
        }
    }

    /// Listings written by the detail phase
    pub fn persisted(&self) -> usize {
        self.new + self.updated + self.relisted + self.merged
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = self.source.map(|s| s.as_str()).unwrap_or("-");
        writeln!(f, "Run report: {}", source)?;
        writeln!(f, "  index pages     {:>6}  (errors {})", self.pages_fetched, self.index_errors)?;
        writeln!(f, "  candidates      {:>6}  (known {})", self.candidates, self.known)?;
        writeln!(f, "  enqueued        {:>6}", self.enqueued)?;
        writeln!(f, "  last dup rate   {:>5.1}%", self.duplicate_rate)?;
        writeln!(f, "  cost avoided    {:>6.2}", self.estimated_cost_avoided)?;
        writeln!(f, "  fetched         {:>6}  (cache hits {})", self.fetches, self.cache_hits)?;
        writeln!(f, "  new             {:>6}", self.new)?;
        writeln!(f, "  updated         {:>6}", self.updated)?;
        writeln!(f, "  relisted        {:>6}", self.relisted)?;
        writeln!(f, "  merged          {:>6}", self.merged)?;
        writeln!(f, "  skipped         {:>6}", self.skipped)?;
        writeln!(f, "  failed          {:>6}", self.failed)?;
        writeln!(f, "  rejected        {:>6}", self.rejected)?;
        writeln!(f, "  not sold        {:>6}", self.filtered)?;
        if self.stopped_early {
            writeln!(f, "  pagination stopped early on known listings")?;
        }
        if self.aborted {
            writeln!(f, "  detail phase aborted after consecutive failures")?;
        }
        Ok(())
    }
}
