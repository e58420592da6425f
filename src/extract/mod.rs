// src/extract/mod.rs
//! Content extraction: turns a fetched page into deadline candidates.
//!
//! Strategies are plain functions tried in priority order (table → list →
//! paragraph). The first one that yields at least one candidate wins; the
//! rest are not consulted.

pub mod labels;
pub mod list;
pub mod paragraph;
pub mod table;
pub mod text;

use chrono::NaiveDate;
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::dates::{find_dates, resolve_date};
use crate::error::ScrapeError;
use crate::model::{DeadlineType, ExtractionMethod};

pub use labels::classify_label;

/// Raw, unresolved deadline found on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub raw_label: String,
    pub deadline_type: DeadlineType,
    pub application_date: String,
    pub notification_date: Option<String>,
    pub method: ExtractionMethod,
}

/// Candidate with calendar dates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCandidate {
    pub raw_label: String,
    pub deadline_type: DeadlineType,
    pub application_date: NaiveDate,
    pub notification_date: Option<NaiveDate>,
    pub method: ExtractionMethod,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractOptions {
    /// Max tokens between a paragraph keyword and its date.
    pub paragraph_window_tokens: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            paragraph_window_tokens: 12,
        }
    }
}

/// Winning strategy and its candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub method: ExtractionMethod,
    pub candidates: Vec<Candidate>,
}

type Strategy = fn(&Html, &ExtractOptions) -> Option<Vec<Candidate>>;

const STRATEGIES: [(ExtractionMethod, Strategy); 3] = [
    (ExtractionMethod::Table, table::extract_tables),
    (ExtractionMethod::List, list::extract_lists),
    (ExtractionMethod::Paragraph, paragraph::extract_paragraphs),
];

/// Run the strategies over `html`. `None` means no deadlines on this page.
pub fn extract(html: &str, opts: &ExtractOptions) -> Option<Extraction> {
    let doc = Html::parse_document(html);
    STRATEGIES.iter().find_map(|(method, strategy)| {
        let candidates = strategy(&doc, opts)?;
        if candidates.is_empty() {
            None
        } else {
            tracing::debug!(target: "extract", %method, found = candidates.len(), "strategy matched");
            Some(Extraction {
                method: *method,
                candidates,
            })
        }
    })
}

/// First date in `text` is the application date, a second one the notification date.
pub(crate) fn split_dates(text: &str) -> Option<(String, Option<String>)> {
    let mut dates = find_dates(text).into_iter();
    let first = dates.next()?;
    Some((first.text, dates.next().map(|d| d.text)))
}

/// Resolve candidate dates against the scrape's reference date.
///
/// A candidate whose application date fails to parse is dropped and its
/// error returned; siblings are unaffected. An unparseable notification
/// date just leaves the field empty. The first resolvable candidate per
/// deadline type wins, in document order.
pub fn resolve_candidates(
    extraction: &Extraction,
    reference: NaiveDate,
) -> (Vec<ResolvedCandidate>, Vec<ScrapeError>) {
    let mut resolved = Vec::with_capacity(extraction.candidates.len());
    let mut dropped = Vec::new();
    let mut seen = HashSet::new();

    for c in &extraction.candidates {
        if seen.contains(&c.deadline_type) {
            continue;
        }
        let application_date = match resolve_date(&c.application_date, reference) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(target: "extract", label = %c.raw_label, error = %e, "dropping candidate");
                dropped.push(e);
                continue;
            }
        };
        let notification_date = c
            .notification_date
            .as_deref()
            .and_then(|s| resolve_date(s, reference).ok());
        seen.insert(c.deadline_type);
        resolved.push(ResolvedCandidate {
            raw_label: c.raw_label.clone(),
            deadline_type: c.deadline_type,
            application_date,
            notification_date,
            method: c.method,
        });
    }
    (resolved, dropped)
}
