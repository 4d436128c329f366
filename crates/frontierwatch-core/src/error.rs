use std::path::PathBuf;

/// Unified error type covering every fatal failure mode of the estimator.
///
/// Every variant includes an actionable message. Oracle hiccups (rate
/// limiting, network blips) and search deadlines are deliberately absent:
/// the probe layer absorbs those and always produces a best-effort frontier.
/// Only configuration, baseline and ledger problems surface here.
#[derive(Debug, thiserror::Error)]
pub enum FrontierError {
    // === Configuration errors ===
    /// A configuration value is invalid.
    #[error("Invalid config: {field} = \"{value}\" — {reason}")]
    InvalidConfig {
        /// Which config field.
        field: String,
        /// The invalid value.
        value: String,
        /// Why it is invalid.
        reason: String,
    },

    /// The baseline stratification is malformed and cannot drive an estimate.
    #[error(
        "Invalid baseline stratum {stratum}: {reason}. Fix the baseline file before running an update."
    )]
    InvalidBaseline {
        /// Stratum identifier (or `<baseline>` for document-level problems).
        stratum: String,
        /// What is wrong with it.
        reason: String,
    },

    // === History ledger errors ===
    /// The history file exists but could not be parsed.
    #[error("History ledger at {path} is corrupted: {detail}. Restore it from version control.")]
    HistoryCorrupted {
        /// Path to the ledger file.
        path: PathBuf,
        /// Parse failure detail.
        detail: String,
    },

    /// An upsert would have inserted a date before the newest entry.
    #[error(
        "History entry for {attempted} is older than the latest entry {last}; the ledger is append-or-overwrite-last only."
    )]
    HistoryOutOfOrder {
        /// Date of the newest entry in the ledger.
        last: String,
        /// Date that was rejected.
        attempted: String,
    },

    /// Another writer holds the ledger lock.
    #[error("History ledger {path} is locked by another update run. Wait for it to finish.")]
    HistoryLocked {
        /// Path of the lock file.
        path: PathBuf,
    },

    // === I/O and serialization ===
    /// Wraps `std::io::Error` for file operations.
    #[error("I/O error: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed.
    #[error("Serialization failed for {context}: {source}")]
    Serialization {
        /// What was being (de)serialized.
        context: String,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },

    // === Subsystem errors ===
    /// Wraps errors from collaborating subsystems (HTTP client setup, etc.).
    #[error("{subsystem} error: {source}")]
    SubsystemError {
        /// Which subsystem produced the error (e.g., "oracle").
        subsystem: &'static str,
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Convenience alias used throughout the frontierwatch crates.
pub type FrontierResult<T> = Result<T, FrontierError>;

impl FrontierError {
    /// Build an [`FrontierError::InvalidBaseline`] for a stratum.
    #[must_use]
    pub fn baseline(stratum: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidBaseline {
            stratum: stratum.into(),
            reason: reason.into(),
        }
    }

    /// Build an [`FrontierError::InvalidConfig`].
    #[must_use]
    pub fn config(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}
