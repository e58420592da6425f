//! review.rs: manual review queue.
//!
//! At most one `pending` entry per institution. Flagging again refreshes that
//! entry in place; entries a human moved out of `pending` are left alone and
//! a fresh pending entry is opened next to them.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use crate::model::{ManualReviewEntry, ReviewReason, ReviewStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagOutcome {
    Created,
    Refreshed,
}

#[derive(Debug, Default)]
pub struct ReviewQueue {
    inner: Mutex<Vec<ManualReviewEntry>>,
}

impl ReviewQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<ManualReviewEntry>) -> Self {
        Self {
            inner: Mutex::new(entries),
        }
    }

    /// Create or refresh the institution's pending entry.
    pub fn flag(
        &self,
        institution_id: &str,
        reason: ReviewReason,
        confidence_score: f32,
        error_details: Option<String>,
        now: DateTime<Utc>,
    ) -> FlagOutcome {
        let mut v = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = v
            .iter_mut()
            .find(|e| e.institution_id == institution_id && e.status == ReviewStatus::Pending)
        {
            entry.reason = reason;
            entry.confidence_score = confidence_score;
            entry.error_details = error_details;
            entry.flagged_at = now;
            return FlagOutcome::Refreshed;
        }

        tracing::info!(institution = %institution_id, ?reason, "flagged for manual review");
        v.push(ManualReviewEntry {
            institution_id: institution_id.to_string(),
            reason,
            confidence_score,
            error_details,
            flagged_at: now,
            status: ReviewStatus::Pending,
            notes: None,
        });
        FlagOutcome::Created
    }

    pub fn pending_for(&self, institution_id: &str) -> Option<ManualReviewEntry> {
        let v = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        v.iter()
            .find(|e| e.institution_id == institution_id && e.status == ReviewStatus::Pending)
            .cloned()
    }

    pub fn entries(&self) -> Vec<ManualReviewEntry> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading review queue from {}", path.display()))?;
        let entries = serde_json::from_str(&content)
            .with_context(|| format!("parsing review queue in {}", path.display()))?;
        Ok(Self::from_entries(entries))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        crate::store::write_json(path, &self.entries())
    }
}
