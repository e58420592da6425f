// src/extract/text.rs
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::ElementRef;

static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws regex"));

/// Collapse whitespace (including NBSP) and trim.
pub fn clean_text(s: &str) -> String {
    let s = s.replace('\u{00A0}', " ");
    RE_WS.replace_all(&s, " ").trim().to_string()
}

/// Visible text of an element, whitespace-collapsed.
pub fn element_text(el: &ElementRef<'_>) -> String {
    clean_text(&el.text().collect::<Vec<_>>().join(" "))
}

static RE_NOTIFY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)notif|release|decision\s+date|decisions?\s+(?:by|on|in|mailed|posted|available)|respon|hear\s+back|admission\s+decision")
        .expect("notification keyword regex")
});

/// Whether `s` talks about when decisions come out.
pub fn mentions_notification(s: &str) -> bool {
    RE_NOTIFY.is_match(s)
}

static RE_APPLY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)deadline|apply|application|due|submit|postmark")
        .expect("application keyword regex")
});

pub fn mentions_application(s: &str) -> bool {
    RE_APPLY.is_match(s)
}
