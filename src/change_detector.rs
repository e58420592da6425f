//! change_detector.rs: diff fresh records against stored ones and persist.
//!
//! Dates are compared per field. A type that disappears from a page is left
//! alone in the store, and a missing notification date on the new side keeps
//! the stored one: absent evidence never deletes data.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::config::ChangeConfig;
use crate::error::ScrapeError;
use crate::extract::ResolvedCandidate;
use crate::model::{
    ChangeEvent, ChangedField, DeadlineRecord, DeadlineType, ReviewReason, Severity,
    VerificationStatus,
};
use crate::review::ReviewQueue;
use crate::store::RecordStore;

/// Entering year of the admission cycle an application date belongs to.
/// Fall deadlines (Aug–Dec) apply for the following year.
pub fn application_year(date: NaiveDate) -> i32 {
    if date.month() >= 8 {
        date.year() + 1
    } else {
        date.year()
    }
}

/// Severity of moving a date from `old` to `new`.
pub fn classify_shift(old: NaiveDate, new: NaiveDate, major_shift_days: i64) -> Severity {
    let delta = (new - old).num_days();
    if delta < 0 || delta.abs() >= major_shift_days {
        Severity::Major
    } else {
        Severity::Minor
    }
}

/// Events for one record against its stored counterpart (if any).
pub fn diff_record(
    old: Option<&DeadlineRecord>,
    new: &DeadlineRecord,
    cfg: &ChangeConfig,
) -> Vec<ChangeEvent> {
    let Some(old) = old else {
        return vec![ChangeEvent {
            deadline_type: new.deadline_type,
            old_date: None,
            new_date: Some(new.application_date),
            field_changed: ChangedField::Added,
            severity: Severity::Minor,
        }];
    };

    let mut events = Vec::new();
    if old.application_date != new.application_date {
        events.push(ChangeEvent {
            deadline_type: new.deadline_type,
            old_date: Some(old.application_date),
            new_date: Some(new.application_date),
            field_changed: ChangedField::ApplicationDate,
            severity: classify_shift(old.application_date, new.application_date, cfg.major_shift_days),
        });
    }

    if let Some(new_n) = new.notification_date {
        if old.notification_date != Some(new_n) {
            let severity = match old.notification_date {
                Some(old_n) => classify_shift(old_n, new_n, cfg.major_shift_days),
                None => Severity::Minor,
            };
            events.push(ChangeEvent {
                deadline_type: new.deadline_type,
                old_date: old.notification_date,
                new_date: Some(new_n),
                field_changed: ChangedField::NotificationDate,
                severity,
            });
        }
    }
    events
}

/// Turn scored candidates into records. `scores` is parallel to `resolved`.
pub fn build_records(
    institution_id: &str,
    source_url: &str,
    resolved: &[ResolvedCandidate],
    scores: &[f32],
    cfg: &ChangeConfig,
    now: DateTime<Utc>,
) -> Vec<DeadlineRecord> {
    let mut offered: Vec<DeadlineType> = resolved.iter().map(|c| c.deadline_type).collect();
    offered.sort();
    offered.dedup();

    resolved
        .iter()
        .zip(scores)
        .map(|(c, &score)| DeadlineRecord {
            institution_id: institution_id.to_string(),
            application_year: application_year(c.application_date),
            deadline_type: c.deadline_type,
            application_date: c.application_date,
            notification_date: c.notification_date,
            offered_types: offered.clone(),
            source_url: source_url.to_string(),
            confidence_score: score,
            verification_status: if score >= cfg.auto_verify_threshold {
                VerificationStatus::AutoVerified
            } else {
                VerificationStatus::Unverified
            },
            last_updated: now,
        })
        .collect()
}

#[derive(Debug, Default, Clone)]
pub struct ApplyOutcome {
    /// Events for records that were persisted.
    pub changes: Vec<ChangeEvent>,
    pub added: usize,
    pub updated: usize,
    /// Identical to what is stored; nothing written.
    pub unchanged: usize,
    /// Below the persist threshold; stored rows left as they were.
    pub withheld: Vec<DeadlineRecord>,
}

impl ApplyOutcome {
    pub fn persisted(&self) -> usize {
        self.added + self.updated
    }
}

/// Diff `fresh` against the store and persist what clears the threshold.
/// Withheld records raise (or refresh) a low-confidence review entry.
pub fn apply(
    fresh: Vec<DeadlineRecord>,
    store: &RecordStore,
    review: &ReviewQueue,
    cfg: &ChangeConfig,
    now: DateTime<Utc>,
) -> ApplyOutcome {
    let mut out = ApplyOutcome::default();

    for mut rec in fresh {
        if rec.confidence_score < cfg.persist_threshold {
            out.withheld.push(rec);
            continue;
        }

        let old = store.get(&rec.key());
        if let Some(old) = &old {
            if rec.notification_date.is_none() {
                rec.notification_date = old.notification_date;
            }
        }

        let events = diff_record(old.as_ref(), &rec, cfg);
        match &old {
            None => out.added += 1,
            Some(old) if events.is_empty() => {
                if old.verification_status == VerificationStatus::ManuallyVerified {
                    rec.verification_status = VerificationStatus::ManuallyVerified;
                }
                if same_content(old, &rec) {
                    out.unchanged += 1;
                    continue;
                }
                out.updated += 1;
            }
            Some(_) => out.updated += 1,
        }

        for e in &events {
            tracing::info!(
                institution = %rec.institution_id,
                deadline_type = %e.deadline_type,
                field = ?e.field_changed,
                old = ?e.old_date,
                new = ?e.new_date,
                severity = ?e.severity,
                "deadline change"
            );
        }
        out.changes.extend(events);
        store.upsert(rec);
    }

    if let Some(lowest) = out
        .withheld
        .iter()
        .min_by(|a, b| a.confidence_score.total_cmp(&b.confidence_score))
    {
        let err = ScrapeError::LowConfidence {
            score: lowest.confidence_score,
            threshold: cfg.persist_threshold,
        };
        let types: Vec<&str> = out.withheld.iter().map(|r| r.deadline_type.as_str()).collect();
        review.flag(
            &lowest.institution_id,
            ReviewReason::LowConfidence,
            lowest.confidence_score,
            Some(format!("{err} for {}", types.join(", "))),
            now,
        );
    }

    out
}

/// Equal apart from `last_updated`.
fn same_content(a: &DeadlineRecord, b: &DeadlineRecord) -> bool {
    a.application_date == b.application_date
        && a.notification_date == b.notification_date
        && a.offered_types == b.offered_types
        && a.source_url == b.source_url
        && (a.confidence_score - b.confidence_score).abs() < f32::EPSILON
        && a.verification_status == b.verification_status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExtractionMethod, ReviewStatus};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn rec(t: DeadlineType, app: NaiveDate, notif: Option<NaiveDate>, score: f32) -> DeadlineRecord {
        DeadlineRecord {
            institution_id: "inst".into(),
            application_year: application_year(app),
            deadline_type: t,
            application_date: app,
            notification_date: notif,
            offered_types: vec![DeadlineType::ED1, DeadlineType::RD],
            source_url: "https://inst.edu/deadlines".into(),
            confidence_score: score,
            verification_status: VerificationStatus::AutoVerified,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn cycle_year_follows_application_month() {
        assert_eq!(application_year(d(2025, 11, 1)), 2026);
        assert_eq!(application_year(d(2026, 1, 2)), 2026);
        assert_eq!(application_year(d(2025, 8, 1)), 2026);
        assert_eq!(application_year(d(2025, 7, 31)), 2025);
    }

    #[test]
    fn earlier_is_always_major() {
        assert_eq!(classify_shift(d(2025, 11, 2), d(2025, 11, 1), 30), Severity::Major);
        assert_eq!(classify_shift(d(2025, 11, 1), d(2025, 11, 3), 7), Severity::Minor);
        assert_eq!(classify_shift(d(2025, 11, 1), d(2025, 11, 8), 7), Severity::Major);
    }

    fn seeded(records: Vec<DeadlineRecord>) -> RecordStore {
        let store = RecordStore::new();
        for r in records {
            store.upsert(r);
        }
        store
    }

    #[test]
    fn apply_reports_added_and_leaves_missing_types() {
        let cfg = ChangeConfig::default();
        let store = seeded(vec![rec(DeadlineType::EA, d(2025, 11, 1), None, 1.0)]);
        let out = apply(
            vec![rec(DeadlineType::RD, d(2026, 1, 2), None, 1.0)],
            &store,
            &ReviewQueue::new(),
            &cfg,
            Utc::now(),
        );
        assert_eq!(out.changes.len(), 1);
        assert_eq!(out.changes[0].field_changed, ChangedField::Added);
        assert_eq!(out.changes[0].deadline_type, DeadlineType::RD);
        assert!(!out.changes[0].moves_stored_date());
        // EA is not on the page any more but stays stored
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn identical_records_produce_no_events() {
        let cfg = ChangeConfig::default();
        let set = vec![
            rec(DeadlineType::ED1, d(2025, 11, 1), Some(d(2025, 12, 15)), 1.0),
            rec(DeadlineType::RD, d(2026, 1, 2), Some(d(2026, 4, 1)), 1.0),
        ];
        let store = seeded(set.clone());
        let out = apply(set, &store, &ReviewQueue::new(), &cfg, Utc::now());
        assert!(out.changes.is_empty());
        assert_eq!(out.unchanged, 2);
    }

    #[test]
    fn application_and_notification_compared_independently() {
        let cfg = ChangeConfig::default();
        let store = seeded(vec![rec(DeadlineType::ED1, d(2025, 11, 1), Some(d(2025, 12, 15)), 1.0)]);
        let out = apply(
            vec![rec(DeadlineType::ED1, d(2025, 11, 3), Some(d(2025, 12, 10)), 1.0)],
            &store,
            &ReviewQueue::new(),
            &cfg,
            Utc::now(),
        );
        let events = out.changes;
        assert_eq!(out.updated, 1);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].field_changed, ChangedField::ApplicationDate);
        assert_eq!(events[0].severity, Severity::Minor);
        assert_eq!(events[1].field_changed, ChangedField::NotificationDate);
        assert_eq!(events[1].severity, Severity::Major);
        assert!(events.iter().all(ChangeEvent::moves_stored_date));
    }

    #[test]
    fn apply_is_idempotent_and_keeps_notification() {
        let cfg = ChangeConfig::default();
        let store = RecordStore::new();
        let review = ReviewQueue::new();
        let now = Utc::now();

        let first = apply(
            vec![rec(DeadlineType::ED1, d(2025, 11, 1), Some(d(2025, 12, 15)), 1.0)],
            &store,
            &review,
            &cfg,
            now,
        );
        assert_eq!(first.added, 1);
        assert_eq!(first.changes.len(), 1);

        // same page again, this time without the notification date
        let second = apply(
            vec![rec(DeadlineType::ED1, d(2025, 11, 1), None, 1.0)],
            &store,
            &review,
            &cfg,
            now,
        );
        assert!(second.changes.is_empty());
        assert_eq!(second.unchanged, 1);
        let stored = store.snapshot();
        assert_eq!(stored[0].notification_date, Some(d(2025, 12, 15)));
    }

    #[test]
    fn low_confidence_is_withheld_and_flagged() {
        let cfg = ChangeConfig::default();
        let store = RecordStore::new();
        store.upsert(rec(DeadlineType::RD, d(2026, 1, 2), None, 1.0));
        let review = ReviewQueue::new();

        let out = apply(
            vec![rec(DeadlineType::RD, d(2026, 1, 15), None, 0.6)],
            &store,
            &review,
            &cfg,
            Utc::now(),
        );
        assert!(out.changes.is_empty());
        assert_eq!(out.withheld.len(), 1);
        assert_eq!(store.snapshot()[0].application_date, d(2026, 1, 2));
        let entry = review.pending_for("inst").unwrap();
        assert_eq!(entry.reason, ReviewReason::LowConfidence);
        assert_eq!(entry.status, ReviewStatus::Pending);
        assert!((entry.confidence_score - 0.6).abs() < 1e-6);
    }

    #[test]
    fn manual_verification_survives_unchanged_rescrape() {
        let cfg = ChangeConfig::default();
        let store = RecordStore::new();
        let mut manual = rec(DeadlineType::EA, d(2025, 11, 1), None, 0.8);
        manual.verification_status = VerificationStatus::ManuallyVerified;
        store.upsert(manual);

        let fresh = rec(DeadlineType::EA, d(2025, 11, 1), None, 1.0);
        let out = apply(vec![fresh], &store, &ReviewQueue::new(), &cfg, Utc::now());
        assert!(out.changes.is_empty());
        assert_eq!(
            store.snapshot()[0].verification_status,
            VerificationStatus::ManuallyVerified
        );
    }

    #[test]
    fn build_records_sets_year_types_and_status() {
        let cfg = ChangeConfig::default();
        let resolved = vec![
            ResolvedCandidate {
                raw_label: "Regular Decision".into(),
                deadline_type: DeadlineType::RD,
                application_date: d(2026, 1, 2),
                notification_date: None,
                method: ExtractionMethod::List,
            },
            ResolvedCandidate {
                raw_label: "Early Action".into(),
                deadline_type: DeadlineType::EA,
                application_date: d(2025, 11, 1),
                notification_date: None,
                method: ExtractionMethod::List,
            },
        ];
        let recs = build_records("x", "https://x.edu", &resolved, &[0.95, 0.8], &cfg, Utc::now());
        assert_eq!(recs[0].application_year, 2026);
        assert_eq!(recs[1].application_year, 2026);
        assert_eq!(recs[0].offered_types, vec![DeadlineType::EA, DeadlineType::RD]);
        assert_eq!(recs[0].verification_status, VerificationStatus::AutoVerified);
        assert_eq!(recs[1].verification_status, VerificationStatus::Unverified);
    }
}
