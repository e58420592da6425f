// src/fetch/mod.rs
//! Fetch orchestration: finds the page that carries an institution's
//! deadlines and returns its resolved candidates.
//!
//! URL order: cached URL → configured path patterns on the institution's
//! domain → links discovered on the admissions landing page → the landing
//! page itself. The first URL that yields resolvable deadlines is cached on
//! the institution.

pub mod client;
pub mod discover;
pub mod politeness;
pub mod robots;

use chrono::NaiveDate;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ScrapeError;
use crate::extract::{self, ExtractOptions, Extraction, ResolvedCandidate};
use crate::model::InstitutionRef;

pub use client::{FetchedPage, HttpFetcher, PageFetcher};
pub use politeness::Politeness;
pub use robots::RobotsRules;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Path candidates tried on the institution's domain, in order.
    pub url_patterns: Vec<String>,
    pub admissions_path: String,
    pub max_discovered_links: usize,
    pub respect_robots: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "deadline-scout/0.1 (+https://github.com/lumlich/deadline-scout)".into(),
            timeout_secs: 20,
            min_delay_ms: 1_000,
            max_delay_ms: 3_000,
            url_patterns: vec![
                "/admissions/deadlines".into(),
                "/admissions/dates-and-deadlines".into(),
                "/admission/deadlines".into(),
                "/apply/deadlines".into(),
                "/admissions/apply/deadlines".into(),
                "/undergraduate/admissions/deadlines".into(),
                "/admissions/first-year/deadlines".into(),
            ],
            admissions_path: "/admissions".into(),
            max_discovered_links: 5,
            respect_robots: true,
        }
    }
}

/// Per-attempt state: robots rules per host, the URLs visited so far and
/// the ones robots.txt kept us from visiting.
#[derive(Debug, Default)]
pub struct AttemptContext {
    robots: HashMap<String, RobotsRules>,
    pub urls_tried: Vec<String>,
    pub urls_disallowed: Vec<String>,
}

impl AttemptContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_url(&self) -> Option<&str> {
        self.urls_tried.last().map(String::as_str)
    }

    fn tried(&self, url: &str) -> bool {
        self.urls_tried.iter().chain(&self.urls_disallowed).any(|u| u == url)
    }
}

/// A page that produced deadlines.
#[derive(Debug, Clone)]
pub struct Harvest {
    pub url: String,
    pub extraction: Extraction,
    pub resolved: Vec<ResolvedCandidate>,
    /// Candidates dropped for unparseable dates.
    pub dropped: Vec<ScrapeError>,
    pub content_hash: String,
}

#[derive(Clone)]
pub struct FetchOrchestrator {
    fetcher: Arc<dyn PageFetcher>,
    cfg: FetchConfig,
    extract: ExtractOptions,
    politeness: Politeness,
}

impl FetchOrchestrator {
    pub fn new(fetcher: Arc<dyn PageFetcher>, cfg: FetchConfig, extract: ExtractOptions) -> Self {
        let politeness = Politeness::new(cfg.min_delay_ms, cfg.max_delay_ms);
        Self {
            fetcher,
            cfg,
            extract,
            politeness,
        }
    }

    /// Cached URL first, then the configured patterns on the institution's domain.
    pub fn candidate_urls(&self, inst: &InstitutionRef) -> Vec<String> {
        let mut urls: Vec<String> = inst.cached_url.iter().cloned().collect();
        for p in &self.cfg.url_patterns {
            if let Some(u) = join_url(&inst.base_url, p) {
                if !urls.contains(&u) {
                    urls.push(u);
                }
            }
        }
        urls
    }

    fn landing_url(&self, inst: &InstitutionRef) -> Option<String> {
        inst.admissions_url
            .clone()
            .or_else(|| join_url(&inst.base_url, &self.cfg.admissions_path))
    }

    /// Find deadlines for `inst`. Updates `inst.cached_url` on success and
    /// clears it when the cached page stops producing deadlines.
    pub async fn harvest(
        &self,
        inst: &mut InstitutionRef,
        reference: NaiveDate,
        ctx: &mut AttemptContext,
    ) -> Result<Harvest, ScrapeError> {
        for url in self.candidate_urls(inst) {
            if let Some(h) = self.try_url(&url, reference, ctx).await? {
                return Ok(self.remember(inst, h));
            }
            if inst.cached_url.as_deref() == Some(url.as_str()) {
                tracing::info!(target: "fetch", institution = %inst.id, %url, "cached url no longer yields deadlines");
                inst.cached_url = None;
            }
        }

        if let Some(landing) = self.landing_url(inst) {
            if !ctx.tried(&landing) {
                if let Some(page) = self.get(&landing, ctx).await? {
                    let links = discover::discover_links(
                        &page.body,
                        &page.url,
                        &inst.base_url,
                        self.cfg.max_discovered_links,
                    );
                    tracing::debug!(target: "fetch", institution = %inst.id, links = links.len(), "discovered links on landing page");
                    for link in links {
                        if ctx.tried(&link) {
                            continue;
                        }
                        if let Some(h) = self.try_url(&link, reference, ctx).await? {
                            return Ok(self.remember(inst, h));
                        }
                    }
                    if let Some(h) = self.evaluate(&page, reference) {
                        return Ok(self.remember(inst, h));
                    }
                }
            }
        }

        // only a robots verdict if nothing at all could be fetched
        if ctx.urls_tried.is_empty() {
            if let Some(url) = ctx.urls_disallowed.first() {
                return Err(ScrapeError::RobotsDisallowed { url: url.clone() });
            }
        }
        Err(ScrapeError::NoDeadlinesFound {
            tried: ctx.urls_tried.len(),
        })
    }

    fn remember(&self, inst: &mut InstitutionRef, h: Harvest) -> Harvest {
        if inst.cached_url.as_deref() != Some(h.url.as_str()) {
            tracing::info!(target: "fetch", institution = %inst.id, url = %h.url, "caching deadline url");
            inst.cached_url = Some(h.url.clone());
        }
        h
    }

    async fn try_url(
        &self,
        url: &str,
        reference: NaiveDate,
        ctx: &mut AttemptContext,
    ) -> Result<Option<Harvest>, ScrapeError> {
        let Some(page) = self.get(url, ctx).await? else {
            return Ok(None);
        };
        Ok(self.evaluate(&page, reference))
    }

    /// Extract and resolve; `None` when the page has no usable deadlines.
    fn evaluate(&self, page: &FetchedPage, reference: NaiveDate) -> Option<Harvest> {
        let extraction = extract::extract(&page.body, &self.extract)?;
        let (resolved, dropped) = extract::resolve_candidates(&extraction, reference);
        if resolved.is_empty() {
            tracing::debug!(target: "fetch", url = %page.url, dropped = dropped.len(), "candidates found but no date resolved");
            return None;
        }
        Some(Harvest {
            url: page.url.clone(),
            extraction,
            resolved,
            dropped,
            content_hash: content_hash(&page.body),
        })
    }

    /// Robots check, politeness delay, fetch. `Ok(None)` for pages that
    /// simply are not there (4xx other than 429) and for disallowed URLs.
    async fn get(
        &self,
        url: &str,
        ctx: &mut AttemptContext,
    ) -> Result<Option<FetchedPage>, ScrapeError> {
        if self.cfg.respect_robots && !self.robots_allows(url, ctx).await {
            tracing::info!(target: "fetch", %url, "skipping: disallowed by robots.txt");
            ctx.urls_disallowed.push(url.to_string());
            return Ok(None);
        }

        self.politeness.wait().await;
        ctx.urls_tried.push(url.to_string());
        let page = self.fetcher.fetch(url, self.timeout()).await?;

        match page.status {
            200..=299 => Ok(Some(page)),
            429 | 500..=599 => Err(ScrapeError::Network {
                url: url.to_string(),
                message: format!("HTTP {}", page.status),
            }),
            status => {
                tracing::debug!(target: "fetch", %url, status, "page not available");
                Ok(None)
            }
        }
    }

    async fn robots_allows(&self, url: &str, ctx: &mut AttemptContext) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return true;
        };
        let Some(host) = parsed.host_str() else {
            return true;
        };
        let host_key = match parsed.port() {
            Some(port) => format!("{}://{host}:{port}", parsed.scheme()),
            None => format!("{}://{host}", parsed.scheme()),
        };

        if !ctx.robots.contains_key(&host_key) {
            let robots_url = format!("{host_key}/robots.txt");
            self.politeness.wait().await;
            let rules = match self.fetcher.fetch(&robots_url, self.timeout()).await {
                Ok(p) if p.is_success() => RobotsRules::parse(&p.body, &self.cfg.user_agent),
                Ok(_) => RobotsRules::allow_all(),
                Err(e) => {
                    tracing::debug!(target: "fetch", url = %robots_url, error = %e, "robots.txt unavailable; allowing");
                    RobotsRules::allow_all()
                }
            };
            ctx.robots.insert(host_key.clone(), rules);
        }

        ctx.robots
            .get(&host_key)
            .map(|r| r.is_allowed(parsed.path()))
            .unwrap_or(true)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.cfg.timeout_secs.max(1))
    }
}

fn join_url(base: &str, path: &str) -> Option<String> {
    let base = Url::parse(base).ok()?;
    base.join(path).ok().map(|u| u.to_string())
}

pub fn content_hash(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())
}
