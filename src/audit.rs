//! audit.rs: append-only log of scrape attempts.
//!
//! Rows go to an in-memory mirror and, when a path is configured, to a JSONL
//! file opened in append mode. Both sit behind one mutex so concurrent
//! workers never interleave partial lines. There is no update or delete.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::model::ScrapeAttempt;

#[derive(Debug)]
pub struct AuditLog {
    path: Option<PathBuf>,
    inner: Mutex<Vec<ScrapeAttempt>>,
}

impl AuditLog {
    /// In-memory only.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            inner: Mutex::new(Vec::new()),
        }
    }

    /// Open (or create) a JSONL audit file and load its history.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let history = if path.exists() {
            read_jsonl(&path)?
        } else {
            Vec::new()
        };
        Ok(Self {
            path: Some(path),
            inner: Mutex::new(history),
        })
    }

    pub fn append(&self, attempt: ScrapeAttempt) -> Result<()> {
        let mut v = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).context("creating audit directory")?;
                }
            }
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening audit log {}", path.display()))?;
            let line = serde_json::to_string(&attempt).context("serializing scrape attempt")?;
            writeln!(file, "{line}").context("appending scrape attempt")?;
        }
        v.push(attempt);
        Ok(())
    }

    pub fn entries(&self) -> Vec<ScrapeAttempt> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Attempts for one institution completed at or after `since`.
    pub fn history_since(&self, institution_id: &str, since: DateTime<Utc>) -> Vec<ScrapeAttempt> {
        let v = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        v.iter()
            .filter(|a| a.institution_id == institution_id && a.completed_at >= since)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn read_jsonl(path: &Path) -> Result<Vec<ScrapeAttempt>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut out = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.context("reading audit line")?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(a) => out.push(a),
            // a torn last line from a crash should not lose the whole history
            Err(e) => tracing::warn!(line = n + 1, error = %e, "skipping malformed audit row"),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttemptStatus, ExtractionMethod};
    use std::sync::Arc;

    fn attempt(id: &str) -> ScrapeAttempt {
        let now = Utc::now();
        ScrapeAttempt {
            institution_id: id.into(),
            url_visited: "https://x.edu/deadlines".into(),
            started_at: now,
            completed_at: now,
            status: AttemptStatus::Success,
            deadlines_found: 2,
            changes_detected: 0,
            error_message: None,
            confidence_score: 1.0,
            extraction_method: ExtractionMethod::Table,
            duration_ms: 12,
            content_hash: None,
            dates_changed: 0,
        }
    }

    #[test]
    fn appends_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit/attempts.jsonl");
        {
            let log = AuditLog::open(&path).unwrap();
            log.append(attempt("a")).unwrap();
            log.append(attempt("b")).unwrap();
        }
        let log = AuditLog::open(&path).unwrap();
        assert_eq!(log.len(), 2);
        log.append(attempt("c")).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attempts.jsonl");
        let log = Arc::new(AuditLog::open(&path).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for j in 0..25 {
                        log.append(attempt(&format!("i{i}-{j}"))).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let reopened = AuditLog::open(&path).unwrap();
        assert_eq!(reopened.len(), 200);
    }
}
