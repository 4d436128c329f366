//! # frontierwatch
//!
//! Live population estimate for an account space whose IDs are handed out
//! roughly in sequence.
//!
//! A baseline study samples the ID space in strata and measures the fraction
//! of IDs that belong to real accounts. The last stratum is open-ended: it
//! grows as new accounts are created. frontierwatch keeps that stratum current
//! by finding the *frontier* (the highest ID that exists today) through an
//! existence oracle, then re-extrapolates the total.
//!
//! - [`FrontierSearch`] finds the frontier in three phases (exponential,
//!   binary, fine scan) under a wall-clock deadline, always returning a
//!   best-effort lower bound.
//! - [`RetryGovernor`] wraps each oracle call with bounded retries that
//!   honor rate-limit hints.
//! - [`recompute`] and [`confidence_interval`] turn a frontier into an
//!   estimate.
//! - [`HistoryLedger`] keeps one entry per day.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use frontierwatch::prelude::*;
//!
//! # fn main() -> FrontierResult<()> {
//! let baseline = Baseline::bundled()?;
//! let oracle = HttpOracle::new(OracleConfig::default())?;
//! let search = FrontierSearch::new(
//!     &oracle,
//!     &SystemClock,
//!     RetryConfig::default(),
//!     SearchBudget::interactive(),
//! );
//! let result = search.run(baseline.baseline_frontier());
//! let estimate = recompute(&baseline, result.frontier);
//! println!("frontier {} -> {} accounts", result.frontier, estimate.point_estimate);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub use frontierwatch_cli as cli;

pub use frontierwatch_core::{
    Baseline, BaselineDocument, ConfidenceInterval, EstimateSnapshot, FrontierAnomaly,
    FrontierError, FrontierResult, GrowthOutlook, HistoryEntry, HistoryLedger, LedgerLock,
    Projection, Recomputed, Stratum, UpsertAction, UpsertOutcome, confidence_interval,
    frontier_stratum_size, outlook, recompute,
};
pub use frontierwatch_probe::{
    AccountMetadata, Clock, Deadline, DeadlineExceeded, ExhaustedRetryPolicy, ExistenceOracle,
    FrontierSearch, GovernedOutcome, HttpOracle, ManualClock, OracleConfig, Outcome, Phase, Probe,
    RetryConfig, RetryGovernor, SearchBudget, SearchResult, SystemClock, Termination,
    TransientFailure, Verdict,
};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        Baseline, ExistenceOracle, FrontierError, FrontierResult, FrontierSearch, HistoryLedger,
        HttpOracle, OracleConfig, RetryConfig, SearchBudget, SearchResult, SystemClock, recompute,
    };
}
