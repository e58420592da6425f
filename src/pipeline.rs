// src/pipeline.rs
//! Per-institution pipeline and the bounded batch that drives it.
//!
//! One institution: fetch → extract → resolve → score → diff/persist →
//! notify → failure bookkeeping → audit row. Steps are strictly sequential
//! and every error is caught here and turned into a `ScrapeAttempt`.
//!
//! A batch runs at most `run.workers` pipelines at once. Past the run
//! deadline, or once a stop is requested, no new institution is admitted;
//! in-flight ones finish.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use crate::audit::AuditLog;
use crate::change_detector::{self, ApplyOutcome};
use crate::config::{EngineConfig, MAX_WORKERS, MIN_WORKERS};
use crate::error::ScrapeError;
use crate::fetch::{AttemptContext, FetchOrchestrator, Harvest, PageFetcher};
use crate::metrics;
use crate::model::{
    AttemptStatus, ChangeEvent, ExtractionMethod, InstitutionRef, ScrapeAttempt, ScrapeSummary,
};
use crate::notify::{self, NotificationSink};
use crate::review::ReviewQueue;
use crate::scheduler::{self, AttemptOutcome, DueInstitutions};
use crate::scoring::{self, PageSignals};
use crate::store::{self, RecordStore};

/// Result of one institution's pipeline.
#[derive(Debug, Clone)]
pub struct InstitutionReport {
    /// The institution with the engine-owned fields updated.
    pub institution: InstitutionRef,
    pub attempt: ScrapeAttempt,
    pub changes: Vec<ChangeEvent>,
    pub added: usize,
    pub updated: usize,
    pub notifications_sent: usize,
}

#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub reports: Vec<InstitutionReport>,
    /// Institutions not admitted because the run deadline passed or a stop
    /// was requested.
    pub not_admitted: Vec<String>,
    pub summary: ScrapeSummary,
}

impl BatchOutcome {
    pub fn updated_institutions(&self) -> impl Iterator<Item = &InstitutionRef> {
        self.reports.iter().map(|r| &r.institution)
    }
}

#[derive(Clone)]
pub struct Engine {
    cfg: Arc<EngineConfig>,
    orchestrator: FetchOrchestrator,
    store: Arc<RecordStore>,
    review: Arc<ReviewQueue>,
    audit: Arc<AuditLog>,
    sink: Arc<dyn NotificationSink>,
    stop: Arc<AtomicBool>,
}

impl Engine {
    pub fn new(
        cfg: EngineConfig,
        fetcher: Arc<dyn PageFetcher>,
        store: Arc<RecordStore>,
        review: Arc<ReviewQueue>,
        audit: Arc<AuditLog>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        metrics::ensure_described();
        let orchestrator = FetchOrchestrator::new(fetcher, cfg.fetch.clone(), cfg.extract);
        Self {
            cfg: Arc::new(cfg),
            orchestrator,
            store,
            review,
            audit,
            sink,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Engine backed by the files under `storage.data_dir`.
    pub fn open(
        cfg: EngineConfig,
        fetcher: Arc<dyn PageFetcher>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        let storage = &cfg.storage;
        let store = RecordStore::load(&storage.records_path())?;
        let review = ReviewQueue::load(&storage.review_path())?;
        let audit = AuditLog::open(storage.audit_path())?;
        Ok(Self::new(
            cfg,
            fetcher,
            Arc::new(store),
            Arc::new(review),
            Arc::new(audit),
            sink,
        ))
    }

    /// Write the record store and review queue back to disk. The audit log
    /// is written as it goes.
    pub fn save_state(&self) -> Result<()> {
        let storage = &self.cfg.storage;
        self.store.save(&storage.records_path())?;
        self.review.save(&storage.review_path())?;
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn review(&self) -> &ReviewQueue {
        &self.review
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Stop admitting institutions into running and future batches.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn admission_closed(&self, deadline: Instant) -> bool {
        self.stop_requested() || Instant::now() >= deadline
    }

    /// Run the full pipeline for one institution. Never fails: errors end up
    /// in the returned attempt row.
    pub async fn run_institution(&self, mut inst: InstitutionRef, now: DateTime<Utc>) -> InstitutionReport {
        let started_at = Utc::now();
        let timer = Instant::now();
        let mut ctx = AttemptContext::new();

        let harvested = self
            .orchestrator
            .harvest(&mut inst, now.date_naive(), &mut ctx)
            .await;

        let mut report = match harvested {
            Ok(h) => self.persist_harvest(&mut inst, h, now).await,
            Err(e) => self.record_error(&mut inst, &ctx, e, now),
        };

        inst.last_scraped_at = Some(now);
        report.attempt.started_at = started_at;
        report.attempt.completed_at = Utc::now();
        report.attempt.duration_ms = timer.elapsed().as_millis() as u64;

        if let Err(e) = self.audit.append(report.attempt.clone()) {
            tracing::error!(target: "pipeline", institution = %inst.id, error = %e, "failed to append audit row");
        }
        metrics::record_attempt(report.attempt.status, report.attempt.duration_ms);

        tracing::info!(
            target: "pipeline",
            institution = %inst.id,
            status = ?report.attempt.status,
            method = %report.attempt.extraction_method,
            found = report.attempt.deadlines_found,
            changes = report.attempt.changes_detected,
            ms = report.attempt.duration_ms,
            "institution done"
        );

        report.institution = inst;
        report
    }

    async fn persist_harvest(
        &self,
        inst: &mut InstitutionRef,
        h: Harvest,
        now: DateTime<Utc>,
    ) -> InstitutionReport {
        let official = scoring::is_official_domain(&h.url, &inst.base_url);
        let signals = PageSignals::from_candidates(&h.resolved, official);
        let scores: Vec<f32> = h
            .resolved
            .iter()
            .map(|c| scoring::score_candidate(c, &signals))
            .collect();

        let records = change_detector::build_records(
            &inst.id,
            &h.url,
            &h.resolved,
            &scores,
            &self.cfg.change,
            now,
        );
        let applied = change_detector::apply(records, &self.store, &self.review, &self.cfg.change, now);
        metrics::record_changes(applied.changes.len());

        let notifications_sent = self.notify(&inst.id, &applied.changes).await;
        inst.next_deadline = self.next_deadline(&inst.id, now);
        scheduler::record_outcome(inst, &AttemptOutcome::Succeeded, &self.review, &self.cfg.scheduler, now);

        let status = if h.dropped.is_empty() && applied.withheld.is_empty() {
            AttemptStatus::Success
        } else {
            AttemptStatus::Partial
        };

        InstitutionReport {
            institution: inst.clone(),
            attempt: ScrapeAttempt {
                institution_id: inst.id.clone(),
                url_visited: h.url.clone(),
                started_at: now,
                completed_at: now,
                status,
                deadlines_found: h.resolved.len(),
                changes_detected: applied.changes.len(),
                error_message: partial_message(&h, &applied),
                confidence_score: mean_score(&scores),
                extraction_method: h.extraction.method,
                duration_ms: 0,
                content_hash: Some(h.content_hash.clone()),
                dates_changed: applied.changes.iter().filter(|c| c.moves_stored_date()).count(),
            },
            added: applied.added,
            updated: applied.updated,
            changes: applied.changes,
            notifications_sent,
        }
    }

    fn record_error(
        &self,
        inst: &mut InstitutionRef,
        ctx: &AttemptContext,
        err: ScrapeError,
        now: DateTime<Utc>,
    ) -> InstitutionReport {
        let url_visited = match &err {
            ScrapeError::RobotsDisallowed { url } | ScrapeError::Network { url, .. } => url.clone(),
            _ => ctx
                .last_url()
                .map(str::to_string)
                .unwrap_or_else(|| inst.base_url.clone()),
        };

        let outcome = if err.counts_as_failure() {
            metrics::record_failure(err.kind());
            tracing::warn!(
                target: "pipeline",
                institution = %inst.id,
                error = %err,
                retry_next_run = err.is_retryable(),
                "scrape failed"
            );
            AttemptOutcome::Failed {
                details: err.to_string(),
            }
        } else {
            tracing::info!(target: "pipeline", institution = %inst.id, error = %err, "scrape skipped");
            AttemptOutcome::Skipped
        };
        scheduler::record_outcome(inst, &outcome, &self.review, &self.cfg.scheduler, now);

        InstitutionReport {
            institution: inst.clone(),
            attempt: ScrapeAttempt {
                institution_id: inst.id.clone(),
                url_visited,
                started_at: now,
                completed_at: now,
                status: AttemptStatus::Failure,
                deadlines_found: 0,
                changes_detected: 0,
                error_message: Some(format!("{}: {err}", err.kind())),
                confidence_score: 0.0,
                extraction_method: ExtractionMethod::None,
                duration_ms: 0,
                content_hash: None,
                dates_changed: 0,
            },
            changes: Vec::new(),
            added: 0,
            updated: 0,
            notifications_sent: 0,
        }
    }

    /// Hand each change to the sink. Delivery failures are logged only.
    async fn notify(&self, institution_id: &str, changes: &[ChangeEvent]) -> usize {
        let mut sent = 0;
        for event in changes {
            let payload = notify::dispatch(institution_id, event);
            match self.sink.deliver(&payload).await {
                Ok(()) => {
                    sent += 1;
                    metrics::record_notification();
                }
                Err(e) => {
                    tracing::warn!(target: "notify", institution = %institution_id, error = %e, "notification delivery failed");
                }
            }
        }
        sent
    }

    /// Earliest stored application date on or after today.
    fn next_deadline(&self, institution_id: &str, now: DateTime<Utc>) -> Option<chrono::NaiveDate> {
        let today = now.date_naive();
        self.store
            .records_for_institution(institution_id)
            .into_iter()
            .map(|r| r.application_date)
            .filter(|d| *d >= today)
            .min()
    }

    /// Run a batch with the configured run length.
    pub async fn run_batch(&self, due: DueInstitutions, now: DateTime<Utc>) -> BatchOutcome {
        let deadline = Instant::now() + Duration::from_secs(self.cfg.run.max_run_secs);
        self.run_batch_until(due, now, deadline).await
    }

    /// Run a batch over a bounded worker pool, admitting institutions until
    /// `deadline`.
    pub async fn run_batch_until(
        &self,
        due: DueInstitutions,
        now: DateTime<Utc>,
        deadline: Instant,
    ) -> BatchOutcome {
        let tier1_count = due.tier1.len();
        let tier2_count = due.tier2.len();
        let workers = self.cfg.run.workers.clamp(MIN_WORKERS, MAX_WORKERS);
        let sem = Arc::new(Semaphore::new(workers));
        let mut handles = Vec::new();
        let mut not_admitted = Vec::new();

        tracing::info!(target: "pipeline", tier1 = tier1_count, tier2 = tier2_count, workers, "batch started");

        let mut queue = due.into_vec().into_iter();
        while let Some(inst) = queue.next() {
            if self.admission_closed(deadline) {
                not_admitted.push(inst.id);
                not_admitted.extend(queue.by_ref().map(|i| i.id));
                break;
            }
            let permit = match sem.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => {
                    not_admitted.push(inst.id);
                    continue;
                }
            };
            // a stop or the deadline may have come while waiting for a slot
            if self.admission_closed(deadline) {
                drop(permit);
                not_admitted.push(inst.id);
                not_admitted.extend(queue.by_ref().map(|i| i.id));
                break;
            }
            let this = self.clone();
            let original = inst.clone();
            let h = tokio::spawn(async move {
                let _permit = permit;
                this.run_institution(inst, now).await
            });
            handles.push((original, h));
        }

        if !not_admitted.is_empty() {
            tracing::warn!(
                target: "pipeline",
                count = not_admitted.len(),
                stopped = self.stop_requested(),
                "admission closed; institutions not admitted"
            );
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (original, h) in handles {
            match h.await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::error!(target: "pipeline", institution = %original.id, error = %e, "pipeline task aborted");
                    not_admitted.push(original.id);
                }
            }
        }

        let summary = summarize(now, tier1_count, tier2_count, &reports);
        tracing::info!(
            target: "pipeline",
            success = summary.success_count,
            failure = summary.failure_count,
            added = summary.deadlines_added,
            updated = summary.deadlines_updated,
            notifications = summary.notifications_sent,
            "batch finished"
        );
        BatchOutcome {
            reports,
            not_admitted,
            summary,
        }
    }
}

fn partial_message(h: &Harvest, applied: &ApplyOutcome) -> Option<String> {
    let mut parts = Vec::new();
    if !h.dropped.is_empty() {
        let detail: Vec<String> = h.dropped.iter().map(ToString::to_string).collect();
        parts.push(format!("{} candidate(s) dropped: {}", h.dropped.len(), detail.join("; ")));
    }
    if !applied.withheld.is_empty() {
        parts.push(format!(
            "{} record(s) withheld below persist threshold",
            applied.withheld.len()
        ));
    }
    (!parts.is_empty()).then(|| parts.join("; "))
}

fn mean_score(scores: &[f32]) -> f32 {
    if scores.is_empty() {
        return 0.0;
    }
    scoring::round2(scores.iter().sum::<f32>() / scores.len() as f32)
}

/// Roll a batch up into its summary. Partial attempts count as successes.
pub fn summarize(
    now: DateTime<Utc>,
    tier1_count: usize,
    tier2_count: usize,
    reports: &[InstitutionReport],
) -> ScrapeSummary {
    let mut s = ScrapeSummary {
        run_date: Some(now.date_naive()),
        tier1_count,
        tier2_count,
        ..ScrapeSummary::default()
    };
    let mut conf_sum = 0.0f32;
    let mut conf_n = 0usize;
    let mut dur_sum = 0u64;

    for r in reports {
        match r.attempt.status {
            AttemptStatus::Failure => s.failure_count += 1,
            AttemptStatus::Success | AttemptStatus::Partial => {
                s.success_count += 1;
                conf_sum += r.attempt.confidence_score;
                conf_n += 1;
            }
        }
        s.deadlines_added += r.added;
        s.deadlines_updated += r.updated;
        s.notifications_sent += r.notifications_sent;
        dur_sum += r.attempt.duration_ms;
    }
    if conf_n > 0 {
        s.avg_confidence = scoring::round2(conf_sum / conf_n as f32);
    }
    if !reports.is_empty() {
        s.avg_duration_ms = dur_sum / reports.len() as u64;
    }
    s
}

/// Copy the engine-owned fields of `updated` back into the registry.
pub fn write_back(registry: &mut [InstitutionRef], updated: &[InstitutionRef]) {
    for u in updated {
        if let Some(slot) = registry.iter_mut().find(|r| r.id == u.id) {
            slot.cached_url = u.cached_url.clone();
            slot.tier = u.tier;
            slot.consecutive_failures = u.consecutive_failures;
            slot.scraping_difficult = u.scraping_difficult;
            slot.last_scraped_at = u.last_scraped_at;
            slot.next_deadline = u.next_deadline;
            slot.frequently_changes = u.frequently_changes;
        }
    }
}

/// Apply the engine-owned fields of `updated` to the registry as it is on
/// disk right now. Institutions added or removed and signals edited while
/// the run was going are kept as the registry has them.
pub fn merge_into_registry(path: &Path, updated: &[InstitutionRef]) -> Result<()> {
    let mut current = store::load_registry(path)?;
    write_back(&mut current, updated);
    store::save_registry(path, &current)
        .with_context(|| format!("saving merged registry to {}", path.display()))
}

/// Append one summary line to the JSONL summaries file.
pub fn append_summary(path: &Path, summary: &ScrapeSummary) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context("creating summary directory")?;
        }
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let line = serde_json::to_string(summary).context("serializing summary")?;
    writeln!(file, "{line}").context("appending summary")?;
    Ok(())
}
