//! model.rs: records produced and consumed by the deadline engine.
//!
//! Field names serialize in camelCase so downstream readers (dashboards,
//! calendars, the review UI) see the same shapes regardless of which store
//! adapter persisted them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical deadline plan types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DeadlineType {
    ED1,
    ED2,
    /// Non-restrictive early action.
    EA,
    /// Restrictive / single-choice early action.
    REA,
    RD,
    Rolling,
}

impl DeadlineType {
    pub fn as_str(self) -> &'static str {
        match self {
            DeadlineType::ED1 => "ED1",
            DeadlineType::ED2 => "ED2",
            DeadlineType::EA => "EA",
            DeadlineType::REA => "REA",
            DeadlineType::RD => "RD",
            DeadlineType::Rolling => "Rolling",
        }
    }
}

impl fmt::Display for DeadlineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    #[default]
    Unverified,
    AutoVerified,
    ManuallyVerified,
}

/// Which extraction strategy produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Table,
    List,
    Paragraph,
    /// No extraction happened (attempt failed before content was parsed).
    None,
}

impl ExtractionMethod {
    /// Base confidence of the strategy before heuristics.
    pub fn base_score(self) -> f32 {
        match self {
            ExtractionMethod::Table => 1.0,
            ExtractionMethod::List => 0.8,
            ExtractionMethod::Paragraph => 0.6,
            ExtractionMethod::None => 0.0,
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExtractionMethod::Table => "table",
            ExtractionMethod::List => "list",
            ExtractionMethod::Paragraph => "paragraph",
            ExtractionMethod::None => "none",
        };
        f.write_str(s)
    }
}

/// Scheduling class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Weekly.
    Tier1,
    /// Monthly.
    #[default]
    Tier2,
}

/// Institution as supplied by the external registry.
///
/// The engine only writes back `cached_url`, `tier`, the failure counter,
/// the flags and its own bookkeeping (`last_scraped_at`, `next_deadline`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstitutionRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub base_url: String,
    /// Known admissions landing page; defaults to `<base>/admissions`.
    #[serde(default)]
    pub admissions_url: Option<String>,
    #[serde(default)]
    pub cached_url: Option<String>,
    #[serde(default)]
    pub tier: Tier,
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default)]
    pub scraping_difficult: bool,
    #[serde(default)]
    pub unavailable: bool,
    #[serde(default)]
    pub frequently_changes: bool,
    /// External ranking signal (1 = top).
    #[serde(default)]
    pub ranking: Option<u32>,
    /// Number of active users listing this institution.
    #[serde(default)]
    pub active_users: u32,
    #[serde(default)]
    pub last_scraped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_deadline: Option<NaiveDate>,
}

impl InstitutionRef {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            base_url: base_url.into(),
            admissions_url: None,
            cached_url: None,
            tier: Tier::Tier2,
            consecutive_failures: 0,
            scraping_difficult: false,
            unavailable: false,
            frequently_changes: false,
            ranking: None,
            active_users: 0,
            last_scraped_at: None,
            next_deadline: None,
        }
    }
}

/// Unique key of a DeadlineRecord.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    pub institution_id: String,
    pub application_year: i32,
    pub deadline_type: DeadlineType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadlineRecord {
    pub institution_id: String,
    pub application_year: i32,
    pub deadline_type: DeadlineType,
    pub application_date: NaiveDate,
    #[serde(default)]
    pub notification_date: Option<NaiveDate>,
    #[serde(default)]
    pub offered_types: Vec<DeadlineType>,
    pub source_url: String,
    pub confidence_score: f32,
    #[serde(default)]
    pub verification_status: VerificationStatus,
    pub last_updated: DateTime<Utc>,
}

impl DeadlineRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey {
            institution_id: self.institution_id.clone(),
            application_year: self.application_year,
            deadline_type: self.deadline_type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Success,
    Partial,
    Failure,
}

/// Audit row, one per fetch attempt. Never mutated after it is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeAttempt {
    pub institution_id: String,
    pub url_visited: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub status: AttemptStatus,
    pub deadlines_found: usize,
    pub changes_detected: usize,
    #[serde(default)]
    pub error_message: Option<String>,
    pub confidence_score: f32,
    pub extraction_method: ExtractionMethod,
    pub duration_ms: u64,
    /// SHA-256 of the page body the records came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Changes that moved an already stored date. First sightings excluded.
    #[serde(default)]
    pub dates_changed: usize,
}

/// Which field of a deadline changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangedField {
    /// Type was not stored before.
    Added,
    ApplicationDate,
    NotificationDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Major,
}

/// Transient diff result; lives for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub deadline_type: DeadlineType,
    pub old_date: Option<NaiveDate>,
    pub new_date: Option<NaiveDate>,
    pub field_changed: ChangedField,
    pub severity: Severity,
}

impl ChangeEvent {
    /// True when a previously stored date moved, as opposed to a type or
    /// date seen for the first time.
    pub fn moves_stored_date(&self) -> bool {
        self.field_changed != ChangedField::Added && self.old_date.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    InReview,
    Resolved,
    Dismissed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewReason {
    LowConfidence,
    RepeatedFailures,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualReviewEntry {
    pub institution_id: String,
    pub reason: ReviewReason,
    pub confidence_score: f32,
    #[serde(default)]
    pub error_details: Option<String>,
    pub flagged_at: DateTime<Utc>,
    pub status: ReviewStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Daily rollup, one per batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeSummary {
    pub run_date: Option<NaiveDate>,
    pub tier1_count: usize,
    pub tier2_count: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub deadlines_added: usize,
    pub deadlines_updated: usize,
    pub notifications_sent: usize,
    pub avg_confidence: f32,
    pub avg_duration_ms: u64,
}
