//! Bounded retries around an [`ExistenceOracle`], sharing one deadline.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::{Clock, Deadline, DeadlineExceeded};
use crate::oracle::{AccountMetadata, ExistenceOracle, Outcome, TransientFailure};

/// What to report for an ID whose retries all failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustedRetryPolicy {
    /// Fail closed: report the ID as absent so the search keeps moving.
    ///
    /// Under a sustained partial outage this can understate the frontier.
    #[default]
    TreatAsAbsent,
    /// Report [`Verdict::Unknown`]; the search neither advances on it nor
    /// uses it as an overshoot bound.
    TreatAsUnknown,
}

/// Retry limits for one ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts per ID, whatever the failure type. At least 1.
    pub max_attempts: u32,
    /// Backoff after a failure that carries no wait hint.
    pub transient_backoff: Duration,
    pub exhausted: ExhaustedRetryPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            transient_backoff: Duration::from_secs(5),
            exhausted: ExhaustedRetryPolicy::TreatAsAbsent,
        }
    }
}

/// Final classification of one probed ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Exists,
    NotExists,
    Unknown,
}

/// Result of [`RetryGovernor::check_with_retry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovernedOutcome {
    pub verdict: Verdict,
    pub metadata: Option<AccountMetadata>,
    /// Oracle calls spent on this ID.
    pub attempts: u32,
    /// True when the verdict came from [`ExhaustedRetryPolicy`], not the oracle.
    pub exhausted: bool,
}

/// Wraps oracle calls with bounded retries and the search-wide deadline.
#[derive(Debug)]
pub struct RetryGovernor<'a, O: ?Sized, C: ?Sized> {
    oracle: &'a O,
    clock: &'a C,
    config: RetryConfig,
}

impl<'a, O, C> RetryGovernor<'a, O, C>
where
    O: ExistenceOracle + ?Sized,
    C: Clock + ?Sized,
{
    #[must_use]
    pub fn new(oracle: &'a O, clock: &'a C, config: RetryConfig) -> Self {
        Self {
            oracle,
            clock,
            config,
        }
    }

    #[must_use]
    pub fn clock(&self) -> &'a C {
        self.clock
    }

    /// Check `id`, retrying transient failures within the attempt cap.
    ///
    /// The deadline is checked before every attempt. Rate-limit waits honor
    /// the server hint, other failures wait `transient_backoff`; both are
    /// clamped to the time left. No wait follows the final attempt.
    ///
    /// # Errors
    ///
    /// Returns [`DeadlineExceeded`] when the deadline passes before an
    /// attempt could be made.
    pub fn check_with_retry(
        &self,
        id: u64,
        deadline: &Deadline,
    ) -> Result<GovernedOutcome, DeadlineExceeded> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_failure = None;

        for attempt in 1..=max_attempts {
            deadline.check(self.clock.now())?;

            match self.oracle.check(id) {
                Ok(Outcome::Exists(metadata)) => {
                    return Ok(GovernedOutcome {
                        verdict: Verdict::Exists,
                        metadata,
                        attempts: attempt,
                        exhausted: false,
                    });
                }
                Ok(Outcome::NotExists) => {
                    return Ok(GovernedOutcome {
                        verdict: Verdict::NotExists,
                        metadata: None,
                        attempts: attempt,
                        exhausted: false,
                    });
                }
                Err(failure) => {
                    if attempt < max_attempts {
                        self.back_off(id, attempt, &failure, deadline);
                    }
                    last_failure = Some(failure);
                }
            }
        }

        let verdict = match self.config.exhausted {
            ExhaustedRetryPolicy::TreatAsAbsent => Verdict::NotExists,
            ExhaustedRetryPolicy::TreatAsUnknown => Verdict::Unknown,
        };
        warn!(
            id,
            attempts = max_attempts,
            last_failure = ?last_failure,
            ?verdict,
            "retries exhausted"
        );
        Ok(GovernedOutcome {
            verdict,
            metadata: None,
            attempts: max_attempts,
            exhausted: true,
        })
    }

    fn back_off(&self, id: u64, attempt: u32, failure: &TransientFailure, deadline: &Deadline) {
        let wanted = failure
            .wait_hint()
            .unwrap_or(self.config.transient_backoff);
        let wait = deadline.clamp(self.clock.now(), wanted);
        let wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX);

        match failure {
            TransientFailure::RateLimited { .. } => {
                warn!(id, attempt, wait_ms, "rate limited, waiting before retry");
            }
            TransientFailure::Unavailable { detail } => {
                debug!(id, attempt, wait_ms, detail = %detail, "oracle unavailable, backing off");
            }
        }
        self.clock.sleep(wait);
    }
}
