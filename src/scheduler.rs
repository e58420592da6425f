// src/scheduler.rs
//! Two-tier scheduling over the institution registry.
//!
//! Everything here is a pure function of `now`, the registry snapshot and
//! config; the daemon loop in the binary is only a clock that asks
//! `due_triggers` what to do.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::audit::AuditLog;
use crate::config::SchedulerConfig;
use crate::model::{InstitutionRef, ReviewReason, Tier};
use crate::review::{FlagOutcome, ReviewQueue};

/// Institutions selected for one run, per tier.
#[derive(Debug, Clone, Default)]
pub struct DueInstitutions {
    pub tier1: Vec<InstitutionRef>,
    pub tier2: Vec<InstitutionRef>,
}

impl DueInstitutions {
    pub fn len(&self) -> usize {
        self.tier1.len() + self.tier2.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_vec(self) -> Vec<InstitutionRef> {
        let mut all = self.tier1;
        all.extend(self.tier2);
        all
    }
}

/// Any one signal is enough.
pub fn qualifies_for_tier1(inst: &InstitutionRef, today: NaiveDate, cfg: &SchedulerConfig) -> bool {
    let top_ranked = inst
        .ranking
        .is_some_and(|r| (1..=cfg.tier1_top_n).contains(&r));
    let popular = inst.active_users > cfg.tier1_min_active_users;
    let deadline_soon = inst.next_deadline.is_some_and(|d| {
        let days = (d - today).num_days();
        (0..=cfg.tier1_deadline_window_days).contains(&days)
    });
    top_ranked || popular || deadline_soon || inst.frequently_changes
}

fn interval_days(tier: Tier, cfg: &SchedulerConfig) -> i64 {
    match tier {
        Tier::Tier1 => cfg.tier1_interval_days,
        Tier::Tier2 => cfg.tier2_interval_days,
    }
}

/// Due when never scraped or the tier's interval (in calendar days) has passed.
pub fn is_due(inst: &InstitutionRef, now: DateTime<Utc>, cfg: &SchedulerConfig) -> bool {
    match inst.last_scraped_at {
        None => true,
        Some(last) => {
            (now.date_naive() - last.date_naive()).num_days() >= interval_days(inst.tier, cfg)
        }
    }
}

/// Due institutions, least recently scraped first. Tier 2 is capped at
/// `tier2_max_per_run`; unavailable institutions are skipped.
pub fn select_due_institutions(
    now: DateTime<Utc>,
    registry: &[InstitutionRef],
    cfg: &SchedulerConfig,
) -> DueInstitutions {
    let mut due = DueInstitutions::default();
    for inst in registry.iter().filter(|i| !i.unavailable && is_due(i, now, cfg)) {
        match inst.tier {
            Tier::Tier1 => due.tier1.push(inst.clone()),
            Tier::Tier2 => due.tier2.push(inst.clone()),
        }
    }
    // None sorts first: never-scraped institutions go before everyone else
    due.tier1.sort_by(|a, b| a.last_scraped_at.cmp(&b.last_scraped_at).then_with(|| a.id.cmp(&b.id)));
    due.tier2.sort_by(|a, b| a.last_scraped_at.cmp(&b.last_scraped_at).then_with(|| a.id.cmp(&b.id)));
    due.tier2.truncate(cfg.tier2_max_per_run);
    due
}

/// Selection restricted to the tiers whose trigger fired.
pub fn select_for_triggers(
    now: DateTime<Utc>,
    registry: &[InstitutionRef],
    cfg: &SchedulerConfig,
    triggers: &[Trigger],
) -> DueInstitutions {
    let mut due = select_due_institutions(now, registry, cfg);
    if !triggers.contains(&Trigger::Tier1Weekly) {
        due.tier1.clear();
    }
    if !triggers.contains(&Trigger::Tier2Monthly) {
        due.tier2.clear();
    }
    due
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecalcReport {
    pub promoted: Vec<String>,
    pub demoted: Vec<String>,
    pub frequently_changing: usize,
}

/// Recompute the "frequently changes" flag from audit history and Tier-1
/// membership from the registry signals. Institutions flagged as difficult
/// stay in Tier 2.
pub fn recalculate_tiers(
    now: DateTime<Utc>,
    registry: &mut [InstitutionRef],
    audit: &AuditLog,
    cfg: &SchedulerConfig,
) -> RecalcReport {
    let since = now - Duration::days(cfg.frequent_change_lookback_days);
    let today = now.date_naive();
    let mut report = RecalcReport::default();

    for inst in registry.iter_mut() {
        // first sightings (initial scrape, a new cycle's records) are not changes
        let runs_with_moves = audit
            .history_since(&inst.id, since)
            .iter()
            .filter(|a| a.dates_changed > 0)
            .count();
        inst.frequently_changes = runs_with_moves >= cfg.frequent_change_min_runs;
        if inst.frequently_changes {
            report.frequently_changing += 1;
        }

        let target = if !inst.scraping_difficult && qualifies_for_tier1(inst, today, cfg) {
            Tier::Tier1
        } else {
            Tier::Tier2
        };
        if target != inst.tier {
            match target {
                Tier::Tier1 => report.promoted.push(inst.id.clone()),
                Tier::Tier2 => report.demoted.push(inst.id.clone()),
            }
            inst.tier = target;
        }
    }

    tracing::info!(
        target: "scheduler",
        promoted = report.promoted.len(),
        demoted = report.demoted.len(),
        frequently_changing = report.frequently_changing,
        "tier recalculation done"
    );
    report
}

/// How an attempt affects the failure counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    Failed { details: String },
    /// Neither success nor failure (e.g. disallowed by robots.txt).
    Skipped,
}

/// Update the failure counter and escalate at the threshold. Returns the
/// review-queue outcome when an entry was created or refreshed.
pub fn record_outcome(
    inst: &mut InstitutionRef,
    outcome: &AttemptOutcome,
    review: &ReviewQueue,
    cfg: &SchedulerConfig,
    now: DateTime<Utc>,
) -> Option<FlagOutcome> {
    match outcome {
        AttemptOutcome::Succeeded => {
            if inst.consecutive_failures > 0 || inst.scraping_difficult {
                tracing::info!(target: "scheduler", institution = %inst.id, "failure streak ended");
            }
            inst.consecutive_failures = 0;
            inst.scraping_difficult = false;
            None
        }
        AttemptOutcome::Skipped => None,
        AttemptOutcome::Failed { details } => {
            inst.consecutive_failures = inst.consecutive_failures.saturating_add(1);
            if inst.consecutive_failures < cfg.failure_threshold {
                return None;
            }
            if !inst.scraping_difficult {
                tracing::warn!(
                    target: "scheduler",
                    institution = %inst.id,
                    failures = inst.consecutive_failures,
                    "marking institution as difficult to scrape"
                );
            }
            inst.scraping_difficult = true;
            inst.tier = Tier::Tier2;
            Some(review.flag(
                &inst.id,
                ReviewReason::RepeatedFailures,
                0.0,
                Some(format!(
                    "{} consecutive failures; last: {details}",
                    inst.consecutive_failures
                )),
                now,
            ))
        }
    }
}

/// Time-based triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trigger {
    Tier1Weekly,
    Tier2Monthly,
    Recalculate,
}

/// When each trigger last fired; persisted between daemon restarts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerState {
    pub last_tier1_run: Option<DateTime<Utc>>,
    pub last_tier2_run: Option<DateTime<Utc>>,
    pub last_recalc: Option<DateTime<Utc>>,
}

impl SchedulerState {
    pub fn mark(&mut self, trigger: Trigger, at: DateTime<Utc>) {
        match trigger {
            Trigger::Tier1Weekly => self.last_tier1_run = Some(at),
            Trigger::Tier2Monthly => self.last_tier2_run = Some(at),
            Trigger::Recalculate => self.last_recalc = Some(at),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading scheduler state from {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing scheduler state in {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        crate::store::write_json(path, self)
    }
}

fn elapsed(last: Option<DateTime<Utc>>, now: DateTime<Utc>, days: i64) -> bool {
    last.map_or(true, |t| (now.date_naive() - t.date_naive()).num_days() >= days)
}

/// Triggers that are due at `now`. Recalculation is listed first so a
/// batch in the same tick sees fresh tiers.
pub fn due_triggers(now: DateTime<Utc>, state: &SchedulerState, cfg: &SchedulerConfig) -> Vec<Trigger> {
    let mut out = Vec::new();
    if elapsed(state.last_recalc, now, cfg.recalc_interval_days) {
        out.push(Trigger::Recalculate);
    }
    if elapsed(state.last_tier1_run, now, cfg.tier1_interval_days) {
        out.push(Trigger::Tier1Weekly);
    }
    if elapsed(state.last_tier2_run, now, cfg.tier2_interval_days) {
        out.push(Trigger::Tier2Monthly);
    }
    out
}
