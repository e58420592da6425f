//! Run extraction + scoring over a saved HTML page and print what would be stored.
//!
//! `extract-demo <page.html> [YYYY-MM-DD] [source-url base-url]`

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};

use deadline_scout::change_detector::build_records;
use deadline_scout::config::ChangeConfig;
use deadline_scout::extract::{self, ExtractOptions};
use deadline_scout::scoring::{self, PageSignals};

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let mut args = std::env::args().skip(1);
    let path = args
        .next()
        .context("usage: extract-demo <page.html> [YYYY-MM-DD] [source-url base-url]")?;
    let reference = match args.next() {
        Some(d) => NaiveDate::parse_from_str(&d, "%Y-%m-%d").context("reference date")?,
        None => Utc::now().date_naive(),
    };
    let source_url = args.next().unwrap_or_else(|| "https://example.edu/admissions/deadlines".into());
    let base_url = args.next().unwrap_or_else(|| "https://example.edu".into());

    let html = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let Some(extraction) = extract::extract(&html, &ExtractOptions::default()) else {
        println!("no deadlines found");
        return Ok(());
    };
    let (resolved, dropped) = extract::resolve_candidates(&extraction, reference);
    let signals = PageSignals::from_candidates(
        &resolved,
        scoring::is_official_domain(&source_url, &base_url),
    );
    let scores: Vec<f32> = resolved
        .iter()
        .map(|c| scoring::score_candidate(c, &signals))
        .collect();

    println!("method: {}", extraction.method);
    for e in &dropped {
        println!("dropped: {e}");
    }
    let records = build_records(
        "demo",
        &source_url,
        &resolved,
        &scores,
        &ChangeConfig::default(),
        Utc::now(),
    );
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}
