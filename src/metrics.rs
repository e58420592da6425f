// src/metrics.rs
//! Run counters. The engine only records; installing a recorder/exporter is
//! left to the host process (without one these calls are no-ops).

use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;

use crate::model::AttemptStatus;

/// One-time metric descriptions.
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "scrape_attempts_total",
            "Per-institution scrape attempts, labelled by status."
        );
        describe_counter!(
            "scrape_failures_total",
            "Failed attempts, labelled by error kind."
        );
        describe_counter!(
            "deadline_changes_total",
            "Change events produced by the change detector."
        );
        describe_counter!(
            "notifications_emitted_total",
            "Notification payloads handed to the sink."
        );
        describe_histogram!(
            "scrape_duration_ms",
            "Wall time of one institution pipeline in milliseconds."
        );
    });
}

fn status_label(s: AttemptStatus) -> &'static str {
    match s {
        AttemptStatus::Success => "success",
        AttemptStatus::Partial => "partial",
        AttemptStatus::Failure => "failure",
    }
}

pub fn record_attempt(status: AttemptStatus, duration_ms: u64) {
    ensure_described();
    counter!("scrape_attempts_total", "status" => status_label(status)).increment(1);
    histogram!("scrape_duration_ms").record(duration_ms as f64);
}

pub fn record_failure(kind: &'static str) {
    counter!("scrape_failures_total", "kind" => kind).increment(1);
}

pub fn record_changes(n: usize) {
    if n > 0 {
        counter!("deadline_changes_total").increment(n as u64);
    }
}

pub fn record_notification() {
    counter!("notifications_emitted_total").increment(1);
}
