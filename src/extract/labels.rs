// src/extract/labels.rs
//! Deadline label classification into the six canonical plan types.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::DeadlineType;

/// Long-form patterns, checked in order (more specific first).
static LONG_FORMS: Lazy<Vec<(DeadlineType, Regex)>> = Lazy::new(|| {
    let table = [
        (
            DeadlineType::REA,
            r"(?i)\b(?:restrictive|single[\s-]*choice)\s+early\s+action\b",
        ),
        (DeadlineType::ED2, r"(?i)\bearly\s+decision\s*(?:ii|2)\b"),
        (DeadlineType::ED1, r"(?i)\bearly\s+decision(?:\s*(?:i|1)\b)?"),
        (DeadlineType::EA, r"(?i)\bearly\s+action\b"),
        (
            DeadlineType::RD,
            r"(?i)\bregular\s+(?:decision|admission|deadline)s?\b",
        ),
        (DeadlineType::Rolling, r"(?i)\brolling(?:\s+admissions?)?\b"),
    ];
    table
        .into_iter()
        .map(|(t, p)| (t, Regex::new(p).expect("label regex")))
        .collect()
});

/// Any long form, for scanning running text. Alternation order mirrors `LONG_FORMS`.
static ANY_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:(?:restrictive|single[\s-]*choice)\s+early\s+action\b|early\s+decision\s*(?:ii|2)\b|early\s+decision(?:\s*(?:i|1)\b)?|early\s+action\b|regular\s+(?:decision|admission|deadline)s?\b|rolling(?:\s+admissions?)?\b)",
    )
    .expect("label scan regex")
});

/// A label located in running text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMatch {
    pub deadline_type: DeadlineType,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Classify a label cell / term. Abbreviations are only accepted when they
/// are the whole label, so "ed" inside prose never matches.
pub fn classify_label(label: &str) -> Option<DeadlineType> {
    for (t, re) in LONG_FORMS.iter() {
        if re.is_match(label) {
            return Some(*t);
        }
    }
    classify_abbreviation(label)
}

fn classify_abbreviation(label: &str) -> Option<DeadlineType> {
    let norm: String = label
        .trim()
        .trim_end_matches([':', '*', '.'])
        .to_ascii_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("");
    let t = match norm.as_str() {
        "ed" | "edi" | "ed1" => DeadlineType::ED1,
        "edii" | "ed2" => DeadlineType::ED2,
        "ea" => DeadlineType::EA,
        "rea" | "scea" => DeadlineType::REA,
        "rd" => DeadlineType::RD,
        _ => return None,
    };
    Some(t)
}

/// All labels in `text`, in document order.
pub fn find_labels(text: &str) -> Vec<LabelMatch> {
    ANY_LABEL
        .find_iter(text)
        .filter_map(|m| {
            let deadline_type = classify_label(m.as_str())?;
            Some(LabelMatch {
                deadline_type,
                start: m.start(),
                end: m.end(),
                text: m.as_str().to_string(),
            })
        })
        .collect()
}
