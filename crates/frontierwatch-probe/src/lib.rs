//! Frontier discovery for frontierwatch.
//!
//! - [`oracle`]: one existence check per account ID ([`HttpOracle`] for the
//!   REST API, or any [`ExistenceOracle`] implementation).
//! - [`governor`]: bounded retries, rate-limit waits and the shared deadline.
//! - [`search`]: the exponential / binary / fine-scan engine.
//! - [`budget`]: the interactive and daily presets.

#![forbid(unsafe_code)]

pub mod budget;
pub mod clock;
pub mod governor;
pub mod oracle;
pub mod search;

pub use budget::SearchBudget;
pub use clock::{Clock, Deadline, DeadlineExceeded, ManualClock, SystemClock};
pub use governor::{ExhaustedRetryPolicy, GovernedOutcome, RetryConfig, RetryGovernor, Verdict};
pub use oracle::{
    AccountMetadata, ExistenceOracle, HttpOracle, OracleConfig, Outcome, TransientFailure,
};
pub use search::{FrontierSearch, Phase, Probe, SearchResult, Termination};
