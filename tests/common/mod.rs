// tests/common/mod.rs
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use deadline_scout::audit::AuditLog;
use deadline_scout::fetch::{FetchedPage, PageFetcher};
use deadline_scout::notify::{NotificationPayload, NotificationSink};
use deadline_scout::review::ReviewQueue;
use deadline_scout::store::RecordStore;
use deadline_scout::{Engine, EngineConfig, ScrapeError};

pub const DEADLINE_TABLE: &str = r#"<html><body>
<h1>Dates and Deadlines</h1>
<table>
  <tr><th>Plan</th><th>Application Deadline</th><th>Notification</th></tr>
  <tr><td>Early Decision I</td><td>November 1</td><td>December 15</td></tr>
  <tr><td>Regular Decision</td><td>January 2</td><td>April 1</td></tr>
</table>
</body></html>"#;

/// Mid-October 2025: fall dates stay in 2025, spring dates roll to 2026.
pub fn october_2025() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 15, 9, 0, 0).unwrap()
}

enum Canned {
    Page(u16, String),
    NetworkDown,
}

/// In-memory web: unknown URLs answer 404.
#[derive(Default)]
pub struct MemoryFetcher {
    pages: Mutex<HashMap<String, Canned>>,
    pub requests: Mutex<Vec<String>>,
    latency: Mutex<Duration>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MemoryFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn page(&self, url: &str, body: &str) {
        self.status(url, 200, body);
    }

    pub fn status(&self, url: &str, status: u16, body: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), Canned::Page(status, body.to_string()));
    }

    pub fn network_down(&self, url: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), Canned::NetworkDown);
    }

    pub fn set_latency(&self, d: Duration) {
        *self.latency.lock().unwrap() = d;
    }

    pub fn requested(&self, url: &str) -> bool {
        self.requests.lock().unwrap().iter().any(|u| u == url)
    }
}

#[async_trait]
impl PageFetcher for MemoryFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Result<FetchedPage, ScrapeError> {
        self.requests.lock().unwrap().push(url.to_string());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let pages = self.pages.lock().unwrap();
        match pages.get(url) {
            Some(Canned::Page(status, body)) => Ok(FetchedPage {
                url: url.to_string(),
                status: *status,
                body: body.clone(),
            }),
            Some(Canned::NetworkDown) => Err(ScrapeError::Network {
                url: url.to_string(),
                message: "connection refused".into(),
            }),
            None => Ok(FetchedPage {
                url: url.to_string(),
                status: 404,
                body: String::new(),
            }),
        }
    }
}

/// Keeps every payload it is handed.
#[derive(Default)]
pub struct RecordingSink {
    pub delivered: Mutex<Vec<NotificationPayload>>,
}

impl RecordingSink {
    pub fn payloads(&self) -> Vec<NotificationPayload> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, payload: &NotificationPayload) -> anyhow::Result<()> {
        self.delivered.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

/// Config with no politeness delay and a single short URL pattern list.
pub fn test_config() -> EngineConfig {
    let mut cfg = EngineConfig::default();
    cfg.fetch.min_delay_ms = 0;
    cfg.fetch.max_delay_ms = 0;
    cfg.fetch.url_patterns = vec![
        "/admissions/deadlines".into(),
        "/apply/deadlines".into(),
    ];
    cfg
}

pub struct Harness {
    pub engine: Engine,
    pub fetcher: Arc<MemoryFetcher>,
    pub sink: Arc<RecordingSink>,
}

pub fn harness(cfg: EngineConfig) -> Harness {
    let fetcher = MemoryFetcher::new();
    let sink = Arc::new(RecordingSink::default());
    let engine = Engine::new(
        cfg,
        fetcher.clone(),
        Arc::new(RecordStore::new()),
        Arc::new(ReviewQueue::new()),
        Arc::new(AuditLog::in_memory()),
        sink.clone(),
    );
    Harness {
        engine,
        fetcher,
        sink,
    }
}
