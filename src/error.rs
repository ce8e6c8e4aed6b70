//! Error types shared across the ingestion pipeline

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by a page fetch
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Timeout after {0:?}")]
    Timeout(Duration),
    #[error("Blocked by upstream (status {status}): {reason}")]
    Blocked { status: u16, reason: String },
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Fetch service credentials missing or invalid: {0}")]
    Credentials(String),
    #[error("Browser error: {0}")]
    Browser(String),
}

impl FetchError {
    /// Whether retrying the same request later can reasonably succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Blocked { .. } | Self::Transport(_) | Self::Browser(_) => true,
            Self::Status(code) => *code == 408 || *code >= 500,
            Self::Credentials(_) => false,
        }
    }

    /// Backoff scale relative to the base retry delay
    pub fn backoff_multiplier(&self) -> u32 {
        match self {
            Self::Blocked { .. } => 4,
            _ => 1,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(Duration::ZERO)
        } else if let Some(status) = e.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionKind {
    /// A field required to identify the vehicle was absent
    MissingField,
    /// Markup was present but could not be interpreted
    Malformed,
    /// Page is not a vehicle listing (removed, category page, etc.)
    NotAListing,
}

/// A page was fetched but its fields could not be extracted
#[derive(Debug, Clone, Error, PartialEq)]
#[error("extraction failed for {url} ({kind:?}): {detail}")]
pub struct ExtractionFailure {
    pub url: String,
    pub kind: ExtractionKind,
    pub detail: String,
}

impl ExtractionFailure {
    pub fn missing(url: &str, field: &str) -> Self {
        Self {
            url: url.to_string(),
            kind: ExtractionKind::MissingField,
            detail: format!("missing {}", field),
        }
    }

    pub fn malformed(url: &str, detail: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            kind: ExtractionKind::Malformed,
            detail: detail.into(),
        }
    }

    pub fn not_a_listing(url: &str) -> Self {
        Self {
            url: url.to_string(),
            kind: ExtractionKind::NotAListing,
            detail: "page does not describe a vehicle listing".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Db(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Listing {0} not found")]
    NotFound(u64),
    #[error("Natural key already held by listing {id}")]
    Conflict { id: u64 },
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Blob I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Conditions that abort a run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Fetch service credentials: {0}")]
    Credentials(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(FetchError::Timeout(Duration::from_secs(30)).is_transient());
        assert!(FetchError::Status(503).is_transient());
        assert!(!FetchError::Status(404).is_transient());
        assert!(!FetchError::Credentials("no key".into()).is_transient());
    }

    #[test]
    fn test_blocked_backs_off_harder_than_timeout() {
        let blocked = FetchError::Blocked { status: 403, reason: "challenge".into() };
        assert!(blocked.backoff_multiplier() > FetchError::Timeout(Duration::ZERO).backoff_multiplier());
    }
}
