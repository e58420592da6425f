// tests/fetch_fallback.rs
mod common;

use common::*;
use deadline_scout::model::{AttemptStatus, ExtractionMethod};
use deadline_scout::InstitutionRef;

const LANDING: &str = r#"<html><body>
  <a href="/visit">Visit us</a>
  <a href="/admissions/important-dates">Important Dates</a>
</body></html>"#;

#[tokio::test]
async fn dead_cached_url_falls_back_to_discovered_link() {
    let h = harness(test_config());
    h.fetcher.page("https://example.edu/admissions", LANDING);
    h.fetcher
        .page("https://example.edu/admissions/important-dates", DEADLINE_TABLE);

    let mut inst = InstitutionRef::new("example", "https://example.edu");
    inst.cached_url = Some("https://example.edu/old/deadlines".into());

    let report = h.engine.run_institution(inst, october_2025()).await;

    assert_eq!(report.attempt.status, AttemptStatus::Success);
    assert_eq!(
        report.attempt.url_visited,
        "https://example.edu/admissions/important-dates"
    );
    assert_eq!(
        report.institution.cached_url.as_deref(),
        Some("https://example.edu/admissions/important-dates")
    );
    // pattern candidates were tried before the landing page
    assert!(h.fetcher.requested("https://example.edu/old/deadlines"));
    assert!(h.fetcher.requested("https://example.edu/admissions/deadlines"));
    assert!(h.fetcher.requested("https://example.edu/apply/deadlines"));
    assert!(!h.fetcher.requested("https://example.edu/visit"));
}

#[tokio::test]
async fn landing_page_itself_is_the_last_resort() {
    let h = harness(test_config());
    let mut inst = InstitutionRef::new("example", "https://example.edu");
    inst.admissions_url = Some("https://example.edu/undergrad".into());
    h.fetcher.page(
        "https://example.edu/undergrad",
        "<ul><li>Early Action: November 1</li><li>Regular Decision: January 1</li></ul>",
    );

    let report = h.engine.run_institution(inst, october_2025()).await;
    assert_eq!(report.attempt.status, AttemptStatus::Success);
    assert_eq!(report.attempt.extraction_method, ExtractionMethod::List);
    assert_eq!(
        report.institution.cached_url.as_deref(),
        Some("https://example.edu/undergrad")
    );
}

#[tokio::test]
async fn exhausted_urls_count_as_failure() {
    let h = harness(test_config());
    let report = h
        .engine
        .run_institution(InstitutionRef::new("ghost", "https://ghost.edu"), october_2025())
        .await;

    assert_eq!(report.attempt.status, AttemptStatus::Failure);
    assert_eq!(report.institution.consecutive_failures, 1);
    assert!(report
        .attempt
        .error_message
        .as_deref()
        .unwrap()
        .starts_with("no_deadlines_found"));
}

#[tokio::test]
async fn robots_disallow_is_logged_but_not_counted() {
    let h = harness(test_config());
    h.fetcher
        .page("https://example.edu/robots.txt", "User-agent: *\nDisallow: /\n");
    h.fetcher
        .page("https://example.edu/admissions/deadlines", DEADLINE_TABLE);

    let mut inst = InstitutionRef::new("example", "https://example.edu");
    inst.consecutive_failures = 1;
    let report = h.engine.run_institution(inst, october_2025()).await;

    assert_eq!(report.attempt.status, AttemptStatus::Failure);
    assert_eq!(
        report.attempt.url_visited,
        "https://example.edu/admissions/deadlines"
    );
    assert!(report
        .attempt
        .error_message
        .as_deref()
        .unwrap()
        .starts_with("robots_disallowed"));
    assert_eq!(report.institution.consecutive_failures, 1);
    assert!(!h.fetcher.requested("https://example.edu/admissions/deadlines"));
    assert!(h.engine.store().is_empty());
    assert_eq!(h.engine.audit().len(), 1);
}

#[tokio::test]
async fn disallowed_pattern_is_skipped_for_an_allowed_one() {
    let h = harness(test_config());
    h.fetcher.page(
        "https://example.edu/robots.txt",
        "User-agent: *\nDisallow: /admissions/deadlines\n",
    );
    h.fetcher
        .page("https://example.edu/admissions/deadlines", DEADLINE_TABLE);
    h.fetcher.page("https://example.edu/apply/deadlines", DEADLINE_TABLE);

    let report = h
        .engine
        .run_institution(InstitutionRef::new("example", "https://example.edu"), october_2025())
        .await;

    assert_eq!(report.attempt.status, AttemptStatus::Success);
    assert_eq!(report.attempt.url_visited, "https://example.edu/apply/deadlines");
    assert_eq!(
        report.institution.cached_url.as_deref(),
        Some("https://example.edu/apply/deadlines")
    );
    assert!(!h.fetcher.requested("https://example.edu/admissions/deadlines"));
    assert_eq!(h.engine.store().len(), 2);
}

#[tokio::test]
async fn disallowed_and_missing_pages_still_count_as_failure() {
    let h = harness(test_config());
    h.fetcher.page(
        "https://example.edu/robots.txt",
        "User-agent: *\nDisallow: /admissions/deadlines\n",
    );

    let report = h
        .engine
        .run_institution(InstitutionRef::new("example", "https://example.edu"), october_2025())
        .await;

    assert_eq!(report.attempt.status, AttemptStatus::Failure);
    assert!(report
        .attempt
        .error_message
        .as_deref()
        .unwrap()
        .starts_with("no_deadlines_found"));
    assert_eq!(report.institution.consecutive_failures, 1);
}
