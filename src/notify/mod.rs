// src/notify/mod.rs
//! Notification dispatch: decides which channels a change goes to and hands
//! the payload to a sink. Composing and sending the actual message belongs
//! to the delivery service behind the sink.

pub mod webhook;

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::{ChangeEvent, ChangedField, DeadlineType, Severity};

pub use webhook::WebhookSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    InApp,
    Email,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub institution_id: String,
    pub deadline_type: DeadlineType,
    pub field_changed: ChangedField,
    pub old_date: Option<NaiveDate>,
    pub new_date: Option<NaiveDate>,
    pub severity: Severity,
    pub channels: Vec<Channel>,
}

impl NotificationPayload {
    pub fn is_email_worthy(&self) -> bool {
        self.channels.contains(&Channel::Email)
    }
}

/// Every change goes in-app; major ones are also email-worthy.
pub fn dispatch(institution_id: &str, event: &ChangeEvent) -> NotificationPayload {
    let mut channels = vec![Channel::InApp];
    if event.severity == Severity::Major {
        channels.push(Channel::Email);
    }
    NotificationPayload {
        institution_id: institution_id.to_string(),
        deadline_type: event.deadline_type,
        field_changed: event.field_changed,
        old_date: event.old_date,
        new_date: event.new_date,
        severity: event.severity,
        channels,
    }
}

#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, payload: &NotificationPayload) -> Result<()>;
}

/// Writes payloads to the log. Default sink when no webhook is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait::async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, p: &NotificationPayload) -> Result<()> {
        tracing::info!(
            target: "notify",
            institution = %p.institution_id,
            deadline_type = %p.deadline_type,
            old = ?p.old_date,
            new = ?p.new_date,
            severity = ?p.severity,
            email = p.is_email_worthy(),
            "deadline notification"
        );
        Ok(())
    }
}
