//! Core types for frontierwatch: baseline strata, the estimator, the daily
//! history ledger, growth projections and the shared error type.
//!
//! This crate performs no network I/O. Frontier discovery lives in
//! `frontierwatch-probe`; the binary and its configuration live in
//! `frontierwatch-cli`.

#![forbid(unsafe_code)]

pub mod error;
pub mod estimate;
pub mod history;
pub mod projection;
pub mod stratum;
pub mod tracing_config;

pub use error::{FrontierError, FrontierResult};
pub use estimate::{
    ConfidenceInterval, EstimateSnapshot, FrontierAnomaly, Recomputed, Z_95, confidence_interval,
    frontier_stratum_size, recompute,
};
pub use history::{HistoryEntry, HistoryLedger, LedgerLock, UpsertAction, UpsertOutcome};
pub use projection::{
    DEFAULT_DAILY_GROWTH, GrowthOutlook, MILESTONE_STEP, PROJECTION_HORIZONS_DAYS, Projection,
    average_daily_growth, outlook,
};
pub use stratum::{Baseline, BaselineDocument, Stratum};
