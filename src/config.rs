// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::extract::ExtractOptions;
use crate::fetch::FetchConfig;

pub const ENV_CONFIG_PATH: &str = "SCOUT_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/scout.toml";

const ENV_WORKERS: &str = "SCOUT_WORKERS";
const ENV_PERSIST_THRESHOLD: &str = "SCOUT_PERSIST_THRESHOLD";
const ENV_MAJOR_SHIFT_DAYS: &str = "SCOUT_MAJOR_SHIFT_DAYS";

/// Worker pool bounds; keeps concurrent fetch pipelines in single digits.
pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 9;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fetch: FetchConfig,
    pub extract: ExtractOptions,
    pub change: ChangeConfig,
    pub scheduler: SchedulerConfig,
    pub run: RunConfig,
    pub storage: StorageConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeConfig {
    /// A shift of at least this many days (either direction) is major.
    pub major_shift_days: i64,
    /// Records scoring below this are withheld and sent to manual review.
    pub persist_threshold: f32,
    /// Records at or above this are stored as `auto_verified`.
    pub auto_verify_threshold: f32,
}

impl Default for ChangeConfig {
    fn default() -> Self {
        Self {
            major_shift_days: 7,
            persist_threshold: 0.7,
            auto_verify_threshold: 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Ranking positions 1..=N qualify for Tier 1.
    pub tier1_top_n: u32,
    /// Strictly more active users than this qualifies for Tier 1.
    pub tier1_min_active_users: u32,
    /// Next deadline within this many days qualifies for Tier 1.
    pub tier1_deadline_window_days: i64,
    pub tier1_interval_days: i64,
    pub tier2_interval_days: i64,
    pub tier2_max_per_run: usize,
    /// Consecutive failures before an institution is escalated.
    pub failure_threshold: u32,
    pub recalc_interval_days: i64,
    /// Audit history window used to derive "frequently changes".
    pub frequent_change_lookback_days: i64,
    /// Attempts with detected changes inside the window needed for the flag.
    pub frequent_change_min_runs: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tier1_top_n: 50,
            tier1_min_active_users: 100,
            tier1_deadline_window_days: 30,
            tier1_interval_days: 7,
            tier2_interval_days: 30,
            tier2_max_per_run: 200,
            failure_threshold: 3,
            recalc_interval_days: 30,
            frequent_change_lookback_days: 365,
            frequent_change_min_runs: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub workers: usize,
    /// Stop admitting institutions after this many seconds.
    pub max_run_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_run_secs: 3_600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("state"),
        }
    }
}

impl StorageConfig {
    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join("institutions.json")
    }
    pub fn records_path(&self) -> PathBuf {
        self.data_dir.join("deadlines.json")
    }
    pub fn review_path(&self) -> PathBuf {
        self.data_dir.join("review_queue.json")
    }
    pub fn audit_path(&self) -> PathBuf {
        self.data_dir.join("scrape_attempts.jsonl")
    }
    pub fn summary_path(&self) -> PathBuf {
        self.data_dir.join("summaries.jsonl")
    }
    pub fn scheduler_state_path(&self) -> PathBuf {
        self.data_dir.join("scheduler_state.json")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// When set, notification payloads are POSTed here as JSON.
    pub webhook_url: Option<String>,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    /// Per-request timeout for webhook deliveries.
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            max_retries: 3,
            backoff_base_ms: 500,
            timeout_secs: 5,
        }
    }
}

impl EngineConfig {
    /// Load from an explicit TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading engine config from {}", path.display()))?;
        let cfg: EngineConfig = toml::from_str(&content)
            .with_context(|| format!("parsing engine config in {}", path.display()))?;
        Ok(cfg)
    }

    /// Load using env var + fallbacks, then apply env overrides:
    /// 1) $SCOUT_CONFIG_PATH
    /// 2) config/scout.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default_p.exists() {
                Self::load_from(&default_p)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env_overrides();
        cfg.validate();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(w) = env_parse::<usize>(ENV_WORKERS) {
            self.run.workers = w;
        }
        if let Some(t) = env_parse::<f32>(ENV_PERSIST_THRESHOLD) {
            self.change.persist_threshold = t;
        }
        if let Some(d) = env_parse::<i64>(ENV_MAJOR_SHIFT_DAYS) {
            self.change.major_shift_days = d;
        }
    }

    /// Clamp values into their usable ranges.
    pub fn validate(&mut self) {
        self.run.workers = self.run.workers.clamp(MIN_WORKERS, MAX_WORKERS);
        self.change.persist_threshold = clamp01(self.change.persist_threshold);
        self.change.auto_verify_threshold = clamp01(self.change.auto_verify_threshold);
        self.change.major_shift_days = self.change.major_shift_days.max(1);
        if self.fetch.min_delay_ms > self.fetch.max_delay_ms {
            std::mem::swap(&mut self.fetch.min_delay_ms, &mut self.fetch.max_delay_ms);
        }
        self.scheduler.failure_threshold = self.scheduler.failure_threshold.max(1);
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(%key, value = %raw, "ignoring unparseable env override");
            None
        }
    }
}

#[inline]
fn clamp01(x: f32) -> f32 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}
