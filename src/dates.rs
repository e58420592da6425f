//! # Date Resolver
//! Turns date fragments scraped from admissions pages into calendar dates.
//!
//! Supported shapes: ISO (`2025-11-01`), US numeric (`11/1`, `11/01/2025`,
//! `11/1/25`), long form (`November 1`, `Nov. 1st, 2025`, `1 November 2025`)
//! and relative qualifiers (`early|mid|late November` → day 7/15/25).
//!
//! Year-less fragments use application-cycle inference, see [`infer_year`].
//! Everything here is pure; the reference date is always passed in.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ScrapeError;

const MONTH: &str = r"(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\b\.?";

static RE_ISO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").expect("iso date regex"));

static RE_RELATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b(early|mid|late)[\s-]+{MONTH}(?:,?\s+(\d{{4}})\b)?"
    ))
    .expect("relative date regex")
});

static RE_MONTH_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b{MONTH}\s+(\d{{1,2}})(?:st|nd|rd|th)?\b(?:,?\s+(\d{{4}})\b)?"
    ))
    .expect("month-day regex")
});

static RE_DAY_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?{MONTH}(?:,?\s+(\d{{4}})\b)?"
    ))
    .expect("day-month regex")
});

static RE_NUMERIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})/(\d{1,2})(?:/(\d{4}|\d{2}))?\b").expect("numeric date regex")
});

/// A date-looking substring located inside free text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateSpan {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Parts {
    year: Option<i32>,
    month: u32,
    day: u32,
}

/// Resolve a date fragment against the scrape's reference date.
pub fn resolve_date(fragment: &str, reference: NaiveDate) -> Result<NaiveDate, ScrapeError> {
    let frag = fragment
        .trim()
        .trim_end_matches(|c: char| matches!(c, ',' | ';' | ':' | ')' | '*'))
        .trim();
    let unparseable = || ScrapeError::UnparseableDate(fragment.trim().to_string());

    let parts = parse_parts(frag).ok_or_else(unparseable)?;
    let year = parts
        .year
        .unwrap_or_else(|| infer_year(parts.month, reference));
    NaiveDate::from_ymd_opt(year, parts.month, parts.day).ok_or_else(unparseable)
}

/// Application-cycle year inference for a year-less month.
///
/// Aug–Dec ("fall") takes the reference year. Jan–Jul ("spring") takes the
/// following year once the reference month is August or later, otherwise the
/// reference year.
pub fn infer_year(month: u32, reference: NaiveDate) -> i32 {
    let y = reference.year();
    if month >= 8 {
        y
    } else if reference.month() >= 8 {
        y + 1
    } else {
        y
    }
}

/// Locate every date-parseable substring in `text`, in document order.
/// Overlapping matches keep the earliest, then the longest.
pub fn find_dates(text: &str) -> Vec<DateSpan> {
    let mut hits: Vec<(usize, usize)> = Vec::new();
    for re in [&*RE_ISO, &*RE_RELATIVE, &*RE_MONTH_DAY, &*RE_DAY_MONTH, &*RE_NUMERIC] {
        for m in re.find_iter(text) {
            hits.push((m.start(), m.end()));
        }
    }
    hits.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

    let mut out: Vec<DateSpan> = Vec::new();
    for (start, mut end) in hits {
        if out.last().is_some_and(|prev| start < prev.end) {
            continue;
        }
        // sentence-final period
        if text[start..end].ends_with('.') {
            end -= 1;
        }
        out.push(DateSpan {
            start,
            end,
            text: text[start..end].to_string(),
        });
    }
    out
}

fn parse_parts(frag: &str) -> Option<Parts> {
    let full = |re: &Regex| {
        re.captures(frag)
            .filter(|c| c.get(0).is_some_and(|m| m.start() == 0 && m.end() == frag.len()))
    };

    if let Some(c) = full(&RE_ISO) {
        return Some(Parts {
            year: c[1].parse().ok(),
            month: c[2].parse().ok()?,
            day: c[3].parse().ok()?,
        });
    }
    if let Some(c) = full(&RE_RELATIVE) {
        let day = match c[1].to_ascii_lowercase().as_str() {
            "early" => 7,
            "mid" => 15,
            _ => 25,
        };
        return Some(Parts {
            year: c.get(3).and_then(|m| m.as_str().parse().ok()),
            month: month_number(&c[2])?,
            day,
        });
    }
    if let Some(c) = full(&RE_MONTH_DAY) {
        return Some(Parts {
            year: c.get(3).and_then(|m| m.as_str().parse().ok()),
            month: month_number(&c[1])?,
            day: c[2].parse().ok()?,
        });
    }
    if let Some(c) = full(&RE_DAY_MONTH) {
        return Some(Parts {
            year: c.get(3).and_then(|m| m.as_str().parse().ok()),
            month: month_number(&c[2])?,
            day: c[1].parse().ok()?,
        });
    }
    if let Some(c) = full(&RE_NUMERIC) {
        let year = match c.get(3) {
            Some(m) if m.as_str().len() == 2 => Some(2000 + m.as_str().parse::<i32>().ok()?),
            Some(m) => Some(m.as_str().parse().ok()?),
            None => None,
        };
        return Some(Parts {
            year,
            month: c[1].parse().ok()?,
            day: c[2].parse().ok()?,
        });
    }
    None
}

fn month_number(name: &str) -> Option<u32> {
    let n = name.trim_end_matches('.').to_ascii_lowercase();
    let m = match n.get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(m)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn explicit_year_wins_over_reference() {
        for reference in [d(2019, 3, 1), d(2025, 10, 1), d(2031, 12, 31)] {
            assert_eq!(resolve_date("2025-11-01", reference).unwrap(), d(2025, 11, 1));
            assert_eq!(resolve_date("11/01/2025", reference).unwrap(), d(2025, 11, 1));
            assert_eq!(resolve_date("January 5, 2027", reference).unwrap(), d(2027, 1, 5));
            assert_eq!(resolve_date("1 March 2026", reference).unwrap(), d(2026, 3, 1));
        }
    }

    #[test]
    fn fall_month_takes_reference_year() {
        assert_eq!(resolve_date("November 1", d(2025, 10, 3)).unwrap(), d(2025, 11, 1));
        assert_eq!(resolve_date("Aug 15", d(2025, 2, 3)).unwrap(), d(2025, 8, 15));
        assert_eq!(resolve_date("12/15", d(2025, 9, 1)).unwrap(), d(2025, 12, 15));
    }

    #[test]
    fn spring_month_rolls_forward_once_cycle_started() {
        assert_eq!(resolve_date("January 2", d(2025, 10, 1)).unwrap(), d(2026, 1, 2));
        assert_eq!(resolve_date("April 1st", d(2025, 8, 1)).unwrap(), d(2026, 4, 1));
        // before August the cycle has not started
        assert_eq!(resolve_date("January 2", d(2025, 7, 31)).unwrap(), d(2025, 1, 2));
    }

    #[test]
    fn relative_qualifiers() {
        let r = d(2025, 9, 1);
        assert_eq!(resolve_date("early November", r).unwrap(), d(2025, 11, 7));
        assert_eq!(resolve_date("mid-December", r).unwrap(), d(2025, 12, 15));
        assert_eq!(resolve_date("late March", r).unwrap(), d(2026, 3, 25));
        assert_eq!(resolve_date("Late March 2027", r).unwrap(), d(2027, 3, 25));
    }

    #[test]
    fn abbreviations_and_two_digit_years() {
        let r = d(2025, 9, 1);
        assert_eq!(resolve_date("Nov. 15", r).unwrap(), d(2025, 11, 15));
        assert_eq!(resolve_date("Sept 30", r).unwrap(), d(2025, 9, 30));
        assert_eq!(resolve_date("1/5/26", r).unwrap(), d(2026, 1, 5));
    }

    #[test]
    fn garbage_and_impossible_dates_fail() {
        let r = d(2025, 9, 1);
        assert!(matches!(
            resolve_date("soon", r),
            Err(ScrapeError::UnparseableDate(_))
        ));
        assert!(resolve_date("February 30", r).is_err());
        assert!(resolve_date("13/45", r).is_err());
    }

    #[test]
    fn finds_dates_in_running_text() {
        let t = "Early Decision: apply by November 1; decisions released mid-December.";
        let spans = find_dates(t);
        let texts: Vec<_> = spans.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["November 1", "mid-December"]);
    }

    #[test]
    fn may_as_a_verb_is_not_a_date() {
        assert!(find_dates("Students may apply online").is_empty());
    }
}
