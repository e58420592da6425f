// src/error.rs
//! Failure taxonomy for one institution's scrape attempt.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScrapeError {
    /// Transport failure, timeout, HTTP 429 or 5xx. Retried next scheduled run.
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },

    /// robots.txt forbids every candidate URL. Terminal for this run.
    #[error("robots.txt disallows {url}")]
    RobotsDisallowed { url: String },

    /// Every candidate URL was tried and none yielded deadlines.
    #[error("no deadlines found after trying {tried} url(s)")]
    NoDeadlinesFound { tried: usize },

    /// A date fragment could not be resolved. Drops only that candidate.
    #[error("unparseable date: {0:?}")]
    UnparseableDate(String),

    /// Extracted record fell below the persist threshold.
    #[error("confidence {score:.2} below persist threshold {threshold:.2}")]
    LowConfidence { score: f32, threshold: f32 },
}

impl ScrapeError {
    /// Whether this failure increments the institution's consecutive-failure counter.
    pub fn counts_as_failure(&self) -> bool {
        matches!(
            self,
            ScrapeError::Network { .. } | ScrapeError::NoDeadlinesFound { .. }
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ScrapeError::Network { .. })
    }

    /// Short machine tag used in audit rows and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::Network { .. } => "network_error",
            ScrapeError::RobotsDisallowed { .. } => "robots_disallowed",
            ScrapeError::NoDeadlinesFound { .. } => "no_deadlines_found",
            ScrapeError::UnparseableDate(_) => "unparseable_date",
            ScrapeError::LowConfidence { .. } => "low_confidence",
        }
    }
}
