// src/extract/paragraph.rs
//! Paragraph strategy: a plan keyword followed by a date within a bounded
//! token window, stopping at the next plan keyword.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use super::labels::find_labels;
use super::text::{element_text, mentions_notification};
use super::{Candidate, ExtractOptions};
use crate::dates::find_dates;
use crate::model::ExtractionMethod;

static RE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S+").expect("token regex"));

pub fn extract_paragraphs(doc: &Html, opts: &ExtractOptions) -> Option<Vec<Candidate>> {
    let p_sel = Selector::parse("p").ok()?;
    let mut out = Vec::new();
    for p in doc.select(&p_sel) {
        out.extend(scan_text(&element_text(&p), opts.paragraph_window_tokens));
    }

    // pages that never use <p> still get one pass over the body text
    if out.is_empty() && doc.select(&p_sel).next().is_none() {
        let body_sel = Selector::parse("body").ok()?;
        if let Some(body) = doc.select(&body_sel).next() {
            out.extend(scan_text(&element_text(&body), opts.paragraph_window_tokens));
        }
    }
    Some(out)
}

/// Number of whitespace-separated tokens in `text[from..to]`.
fn tokens_between(text: &str, from: usize, to: usize) -> usize {
    if to <= from {
        return 0;
    }
    RE_TOKEN.find_iter(&text[from..to]).count()
}

pub(crate) fn scan_text(text: &str, window: usize) -> Vec<Candidate> {
    let labels = find_labels(text);
    let dates = find_dates(text);
    let mut out = Vec::new();

    for (i, label) in labels.iter().enumerate() {
        let limit = labels.get(i + 1).map(|l| l.start).unwrap_or(text.len());
        let near: Vec<_> = dates
            .iter()
            .filter(|d| d.start >= label.end && d.end <= limit)
            .filter(|d| tokens_between(text, label.end, d.start) <= window)
            .collect();
        let Some(first) = near.first() else {
            continue;
        };
        let notification = near.get(1).and_then(|second| {
            mentions_notification(&text[first.end..second.start]).then(|| second.text.clone())
        });
        out.push(Candidate {
            raw_label: label.text.clone(),
            deadline_type: label.deadline_type,
            application_date: first.text.clone(),
            notification_date: notification,
            method: ExtractionMethod::Paragraph,
        });
    }
    out
}
