// tests/pipeline_scenario.rs
mod common;

use chrono::{Duration, NaiveDate};
use common::*;
use deadline_scout::model::{AttemptStatus, DeadlineType, ExtractionMethod, VerificationStatus};
use deadline_scout::notify::Channel;
use deadline_scout::scheduler;
use deadline_scout::InstitutionRef;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

#[tokio::test]
async fn table_page_yields_two_records_at_full_confidence() {
    let h = harness(test_config());
    h.fetcher
        .page("https://example.edu/admissions/deadlines", DEADLINE_TABLE);
    let inst = InstitutionRef::new("example", "https://example.edu");

    let report = h.engine.run_institution(inst, october_2025()).await;

    assert_eq!(report.attempt.status, AttemptStatus::Success);
    assert_eq!(report.attempt.extraction_method, ExtractionMethod::Table);
    assert_eq!(report.attempt.deadlines_found, 2);
    assert_eq!(report.added, 2);

    let mut records = h.engine.store().records_for_institution("example");
    records.sort_by_key(|r| r.deadline_type);
    assert_eq!(records.len(), 2);

    let ed1 = &records[0];
    assert_eq!(ed1.deadline_type, DeadlineType::ED1);
    assert_eq!(ed1.application_date, d(2025, 11, 1));
    assert_eq!(ed1.notification_date, Some(d(2025, 12, 15)));
    assert_eq!(ed1.application_year, 2026);
    assert_eq!(ed1.confidence_score, 1.0);
    assert_eq!(ed1.verification_status, VerificationStatus::AutoVerified);
    assert_eq!(ed1.offered_types, vec![DeadlineType::ED1, DeadlineType::RD]);

    let rd = &records[1];
    assert_eq!(rd.deadline_type, DeadlineType::RD);
    assert_eq!(rd.application_date, d(2026, 1, 2));
    assert_eq!(rd.notification_date, Some(d(2026, 4, 1)));
    assert_eq!(rd.confidence_score, 1.0);

    // the working URL is cached and the nearest deadline written back
    assert_eq!(
        report.institution.cached_url.as_deref(),
        Some("https://example.edu/admissions/deadlines")
    );
    assert_eq!(report.institution.next_deadline, Some(d(2025, 11, 1)));
    assert_eq!(report.institution.last_scraped_at, Some(october_2025()));

    // first sighting: one "added" notification per type, in-app only
    let sent = h.sink.payloads();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|p| p.channels == vec![Channel::InApp]));

    assert_eq!(h.engine.audit().len(), 1);
    assert!(h.engine.audit().entries()[0].content_hash.is_some());
    assert_eq!(h.engine.audit().entries()[0].dates_changed, 0);
}

#[tokio::test]
async fn rescraping_unchanged_page_is_idempotent() {
    let h = harness(test_config());
    h.fetcher
        .page("https://example.edu/admissions/deadlines", DEADLINE_TABLE);
    let inst = InstitutionRef::new("example", "https://example.edu");

    let first = h.engine.run_institution(inst, october_2025()).await;
    let snapshot = h.engine.store().snapshot();

    let second = h
        .engine
        .run_institution(first.institution.clone(), october_2025() + Duration::minutes(5))
        .await;

    assert_eq!(second.attempt.status, AttemptStatus::Success);
    assert!(second.changes.is_empty());
    assert_eq!(second.attempt.changes_detected, 0);
    assert_eq!(second.institution.consecutive_failures, 0);
    assert_eq!(h.engine.store().snapshot(), snapshot);
    assert_eq!(h.sink.payloads().len(), 2);
    assert_eq!(
        h.engine.audit().entries()[0].content_hash,
        h.engine.audit().entries()[1].content_hash
    );
}

#[tokio::test]
async fn earlier_deadline_notifies_by_email() {
    let h = harness(test_config());
    let url = "https://example.edu/admissions/deadlines";
    h.fetcher.page(url, DEADLINE_TABLE);
    let first = h
        .engine
        .run_institution(InstitutionRef::new("example", "https://example.edu"), october_2025())
        .await;

    h.fetcher
        .page(url, &DEADLINE_TABLE.replace("November 1", "October 30"));
    let second = h
        .engine
        .run_institution(first.institution, october_2025() + Duration::days(7))
        .await;

    assert_eq!(second.changes.len(), 1);
    assert_eq!(second.updated, 1);
    let last = h.sink.payloads().pop().unwrap();
    assert_eq!(last.deadline_type, DeadlineType::ED1);
    assert_eq!(last.old_date, Some(d(2025, 11, 1)));
    assert_eq!(last.new_date, Some(d(2025, 10, 30)));
    assert!(last.is_email_worthy());
}

#[tokio::test]
async fn unparseable_candidate_is_dropped_and_siblings_persist() {
    let h = harness(test_config());
    h.fetcher.page(
        "https://example.edu/admissions/deadlines",
        r#"<table>
            <tr><th>Plan</th><th>Deadline</th></tr>
            <tr><td>Early Action</td><td>November 31</td></tr>
            <tr><td>Regular Decision</td><td>January 5</td></tr>
        </table>"#,
    );
    let report = h
        .engine
        .run_institution(InstitutionRef::new("x", "https://example.edu"), october_2025())
        .await;

    assert_eq!(report.attempt.status, AttemptStatus::Partial);
    assert!(report
        .attempt
        .error_message
        .as_deref()
        .unwrap_or_default()
        .contains("dropped"));
    let records = h.engine.store().records_for_institution("x");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].deadline_type, DeadlineType::RD);
    assert_eq!(report.institution.consecutive_failures, 0);
}

#[tokio::test]
async fn one_notification_move_is_not_frequent_change() {
    let h = harness(test_config());
    let url = "https://example.edu/admissions/deadlines";
    h.fetcher.page(url, DEADLINE_TABLE);
    let first = h
        .engine
        .run_institution(InstitutionRef::new("e", "https://example.edu"), october_2025())
        .await;

    h.fetcher.page(url, &DEADLINE_TABLE.replace("April 1", "April 3"));
    let later = october_2025() + Duration::days(30);
    let second = h.engine.run_institution(first.institution, later).await;
    assert_eq!(second.changes.len(), 1);
    assert_eq!(second.attempt.dates_changed, 1);

    let mut registry = vec![second.institution];
    let cfg = h.engine.config().scheduler.clone();
    let report = scheduler::recalculate_tiers(later, &mut registry, h.engine.audit(), &cfg);
    assert!(!registry[0].frequently_changes);
    assert!(report.promoted.is_empty());
}
