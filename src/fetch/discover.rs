// src/fetch/discover.rs
//! Fallback link discovery on an institution's admissions landing page.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use scraper::{Html, Selector};
use std::collections::HashSet;

use crate::extract::text::element_text;
use crate::scoring::is_official_domain;

static RE_STRONG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)deadline|(?:important|key)[\s_-]+dates|dates[\s_-]+(?:and|&)[\s_-]+deadlines")
        .expect("strong link regex")
});
static RE_WEAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)dates|apply|application|timeline").expect("weak link regex"));

/// Same-site links that look like deadline pages, strongest first.
pub fn discover_links(html: &str, page_url: &str, base_url: &str, max: usize) -> Vec<String> {
    let Ok(page) = Url::parse(page_url) else {
        return Vec::new();
    };
    let doc = Html::parse_document(html);
    let Ok(a_sel) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    // (rank, document order, url)
    let mut found: Vec<(u8, usize, String)> = Vec::new();

    for (order, a) in doc.select(&a_sel).enumerate() {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let text = element_text(&a);
        let hay = format!("{text} {href}");
        let rank = if RE_STRONG.is_match(&hay) {
            0
        } else if RE_WEAK.is_match(&hay) {
            1
        } else {
            continue;
        };

        let Ok(mut link) = page.join(href) else {
            continue;
        };
        if !matches!(link.scheme(), "http" | "https") {
            continue;
        }
        link.set_fragment(None);
        let link = link.to_string();
        if link == page.as_str() || !is_official_domain(&link, base_url) {
            continue;
        }
        if seen.insert(link.clone()) {
            found.push((rank, order, link));
        }
    }

    found.sort();
    found.into_iter().take(max).map(|(_, _, l)| l).collect()
}
