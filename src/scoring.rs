//! Confidence scoring for extracted deadline records.
//!
//! score = strategy base (table 1.0, list 0.8, paragraph 0.6)
//!       + 0.10 if the page lives on the institution's own domain
//!       + 0.10 if the page lists ≥ 3 distinct deadline types
//!       − 0.05 if this record has no notification date while a sibling does
//!
//! Each adjustment is applied in that order and clamped to [0,1]; the result
//! is rounded to two decimals.

use reqwest::Url;

use crate::extract::ResolvedCandidate;
use crate::model::ExtractionMethod;

pub const OFFICIAL_DOMAIN_BONUS: f32 = 0.10;
pub const COVERAGE_BONUS: f32 = 0.10;
pub const COVERAGE_MIN_TYPES: usize = 3;
pub const MISSING_NOTIFICATION_PENALTY: f32 = 0.05;

/// Page-level facts shared by every record on the page.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PageSignals {
    pub distinct_types: usize,
    pub any_notification: bool,
    pub official_domain: bool,
}

impl PageSignals {
    pub fn from_candidates(resolved: &[ResolvedCandidate], official_domain: bool) -> Self {
        let mut types: Vec<_> = resolved.iter().map(|c| c.deadline_type).collect();
        types.sort();
        types.dedup();
        Self {
            distinct_types: types.len(),
            any_notification: resolved.iter().any(|c| c.notification_date.is_some()),
            official_domain,
        }
    }
}

/// Score one record.
pub fn score(method: ExtractionMethod, has_notification: bool, page: &PageSignals) -> f32 {
    fn c(x: f32) -> f32 {
        x.clamp(0.0, 1.0)
    }
    let mut s = c(method.base_score());
    if page.official_domain {
        s = c(s + OFFICIAL_DOMAIN_BONUS);
    }
    if page.distinct_types >= COVERAGE_MIN_TYPES {
        s = c(s + COVERAGE_BONUS);
    }
    if !has_notification && page.any_notification {
        s = c(s - MISSING_NOTIFICATION_PENALTY);
    }
    round2(s)
}

pub fn score_candidate(c: &ResolvedCandidate, page: &PageSignals) -> f32 {
    score(c.method, c.notification_date.is_some(), page)
}

#[inline]
pub fn round2(x: f32) -> f32 {
    (x * 100.0).round() / 100.0
}

/// True when `source_url` is on the institution's own domain (or a subdomain of it).
pub fn is_official_domain(source_url: &str, base_url: &str) -> bool {
    let host = |u: &str| {
        Url::parse(u)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_ascii_lowercase()))
    };
    match (host(source_url), host(base_url)) {
        (Some(src), Some(base)) if !base.is_empty() => {
            src == base || src.ends_with(&format!(".{base}"))
        }
        _ => false,
    }
}
