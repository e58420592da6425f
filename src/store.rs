// src/store.rs
//! File-backed adapters for the DeadlineRecord store and the institution
//! registry snapshot.
//!
//! Records are keyed by (institution, year, type); a write replaces the row
//! for its key and rows are never deleted.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::RwLock;

use crate::model::{DeadlineRecord, InstitutionRef, RecordKey};

#[derive(Debug, Default)]
pub struct RecordStore {
    inner: RwLock<BTreeMap<RecordKey, DeadlineRecord>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<DeadlineRecord>) -> Self {
        let map = records.into_iter().map(|r| (r.key(), r)).collect();
        Self {
            inner: RwLock::new(map),
        }
    }

    /// Stored records for one institution and application year.
    pub fn records_for_institution(&self, institution_id: &str) -> Vec<DeadlineRecord> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        guard
            .values()
            .filter(|r| r.institution_id == institution_id)
            .cloned()
            .collect()
    }

    pub fn get(&self, key: &RecordKey) -> Option<DeadlineRecord> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        guard.get(key).cloned()
    }

    /// Insert or overwrite the row for the record's key.
    pub fn upsert(&self, record: DeadlineRecord) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.insert(record.key(), record);
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<DeadlineRecord> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        guard.values().cloned().collect()
    }

    /// Load from a JSON array; a missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading deadline records from {}", path.display()))?;
        let records: Vec<DeadlineRecord> = serde_json::from_str(&content)
            .with_context(|| format!("parsing deadline records in {}", path.display()))?;
        Ok(Self::from_records(records))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json(path, &self.snapshot())
    }
}

/// Registry snapshot as handed over by the institution registry.
pub fn load_registry(path: &Path) -> Result<Vec<InstitutionRef>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading institution registry from {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("parsing institution registry in {}", path.display()))
}

pub fn save_registry(path: &Path, registry: &[InstitutionRef]) -> Result<()> {
    write_json(path, registry)
}

pub(crate) fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
    }
    let json = serde_json::to_vec_pretty(value)?;
    // write-then-rename so readers never see half a file
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}
