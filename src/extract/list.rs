// src/extract/list.rs
//! List strategy: `<dl>` term/definition pairs, then bulleted `label: date` lines.

use scraper::{Html, Selector};

use super::labels::classify_label;
use super::text::element_text;
use super::{split_dates, Candidate, ExtractOptions};
use crate::dates::find_dates;
use crate::model::ExtractionMethod;

pub fn extract_lists(doc: &Html, _opts: &ExtractOptions) -> Option<Vec<Candidate>> {
    let mut out = definition_lists(doc)?;
    out.extend(bullets(doc)?);
    Some(out)
}

fn definition_lists(doc: &Html) -> Option<Vec<Candidate>> {
    let dl_sel = Selector::parse("dl").ok()?;
    let item_sel = Selector::parse("dt, dd").ok()?;
    let mut out = Vec::new();

    for dl in doc.select(&dl_sel) {
        // (term, concatenated definitions)
        let mut pairs: Vec<(String, String)> = Vec::new();
        for item in dl.select(&item_sel) {
            let text = element_text(&item);
            if item.value().name() == "dt" {
                pairs.push((text, String::new()));
            } else if let Some((_, defs)) = pairs.last_mut() {
                if !defs.is_empty() {
                    defs.push_str("; ");
                }
                defs.push_str(&text);
            }
        }
        for (term, defs) in pairs {
            let Some(deadline_type) = classify_label(&term) else {
                continue;
            };
            if let Some((application_date, notification_date)) = split_dates(&defs) {
                out.push(Candidate {
                    raw_label: term,
                    deadline_type,
                    application_date,
                    notification_date,
                    method: ExtractionMethod::List,
                });
            }
        }
    }
    Some(out)
}

fn bullets(doc: &Html) -> Option<Vec<Candidate>> {
    let li_sel = Selector::parse("li").ok()?;
    let mut out = Vec::new();

    for li in doc.select(&li_sel) {
        let text = element_text(&li);
        let Some(first) = find_dates(&text).into_iter().next() else {
            continue;
        };
        let label = &text[..first.start];
        let Some(deadline_type) = classify_label(label) else {
            continue;
        };
        if let Some((application_date, notification_date)) = split_dates(&text[first.start..]) {
            out.push(Candidate {
                raw_label: label.trim().trim_end_matches([':', '-', '–', '—']).trim().to_string(),
                deadline_type,
                application_date,
                notification_date,
                method: ExtractionMethod::List,
            });
        }
    }
    Some(out)
}
