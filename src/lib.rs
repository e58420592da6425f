// src/lib.rs
// Public library surface for the binary, demos and integration tests.

pub mod audit;
pub mod change_detector;
pub mod config;
pub mod dates;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod pipeline;
pub mod review;
pub mod scheduler;
pub mod scoring;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::config::EngineConfig;
pub use crate::error::ScrapeError;
pub use crate::model::{
    DeadlineRecord, DeadlineType, InstitutionRef, ManualReviewEntry, ScrapeAttempt, ScrapeSummary,
};
pub use crate::pipeline::{BatchOutcome, Engine, InstitutionReport};
