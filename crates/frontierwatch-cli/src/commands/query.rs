//! On-demand frontier queries: a bounded scan from a caller-supplied seed, or
//! a single-ID existence check.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use frontierwatch_core::{Baseline, EstimateSnapshot, FrontierAnomaly, FrontierResult, recompute};
use frontierwatch_probe::{
    AccountMetadata, Clock, Deadline, ExistenceOracle, FrontierSearch, Probe, RetryConfig,
    RetryGovernor, SearchBudget, Verdict,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeMode {
    #[default]
    Scan,
    Verify,
}

impl FromStr for ProbeMode {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "scan" => Ok(Self::Scan),
            "verify" => Ok(Self::Verify),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeQuery {
    /// Previously known frontier; the scan seed.
    pub last: u64,
    pub mode: ProbeMode,
    /// Verify target. Falls back to `last`.
    pub id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanResponse {
    pub frontier: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frontier_account: Option<AccountMetadata>,
    pub estimated_total: u64,
    pub ci_lower: Option<u64>,
    pub ci_upper: Option<u64>,
    pub probes_count: usize,
    pub probes: Vec<Probe>,
    pub elapsed_ms: u64,
    pub truncated: bool,
    /// False when `last` itself did not check out; a frontier equal to
    /// `last` is then only as good as the caller's seed.
    pub seed_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly: Option<FrontierAnomaly>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifyResponse {
    pub id: u64,
    pub exists: bool,
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<AccountMetadata>,
    /// Estimate if `id` were the frontier.
    pub estimated_total: u64,
    pub attempts: u32,
    pub elapsed_ms: u64,
    /// The deadline passed before the check completed.
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly: Option<FrontierAnomaly>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum QueryResponse {
    Scan(ScanResponse),
    Verify(VerifyResponse),
}

/// Answers [`ProbeQuery`] requests against a shared oracle and baseline.
///
/// Holds no per-request state, so concurrent requests do not interfere.
pub struct QueryService<'a, O: ?Sized, C: ?Sized> {
    oracle: &'a O,
    clock: &'a C,
    baseline: &'a Baseline,
    retry: RetryConfig,
    budget: SearchBudget,
}

impl<'a, O, C> QueryService<'a, O, C>
where
    O: ExistenceOracle + ?Sized,
    C: Clock + ?Sized,
{
    /// # Errors
    ///
    /// Returns `FrontierError::InvalidConfig` if `budget` is unusable.
    pub fn new(
        oracle: &'a O,
        clock: &'a C,
        baseline: &'a Baseline,
        retry: RetryConfig,
        budget: SearchBudget,
    ) -> FrontierResult<Self> {
        budget.validate()?;
        Ok(Self {
            oracle,
            clock,
            baseline,
            retry,
            budget,
        })
    }

    #[instrument(name = "frontierwatch::interactive_query", skip(self), fields(mode = ?query.mode))]
    pub fn handle(&self, query: ProbeQuery) -> QueryResponse {
        match query.mode {
            ProbeMode::Scan => QueryResponse::Scan(self.scan(query.last)),
            ProbeMode::Verify => QueryResponse::Verify(self.verify(query.id.unwrap_or(query.last))),
        }
    }

    fn scan(&self, last: u64) -> ScanResponse {
        let search = FrontierSearch::new(self.oracle, self.clock, self.retry, self.budget);
        let result = search.run(last);
        let snapshot = EstimateSnapshot::with_interval(self.baseline, result.frontier, Utc::now());

        if !result.seed_verified && result.frontier == last {
            warn!(last, "no account found at or above the supplied seed; it may be stale");
        }

        ScanResponse {
            frontier: result.frontier,
            frontier_account: result.frontier_metadata,
            estimated_total: snapshot.point_estimate,
            ci_lower: snapshot.ci_lower,
            ci_upper: snapshot.ci_upper,
            probes_count: result.trace.len(),
            probes: result.trace,
            elapsed_ms: result.elapsed_ms,
            truncated: result.truncated,
            seed_verified: result.seed_verified,
            anomaly: snapshot.anomaly,
            timestamp: snapshot.timestamp,
        }
    }

    fn verify(&self, id: u64) -> VerifyResponse {
        let governor = RetryGovernor::new(self.oracle, self.clock, self.retry);
        let started = self.clock.now();
        let deadline = Deadline::new(started, self.budget.deadline);
        let recomputed = recompute(self.baseline, id);

        let (verdict, account, attempts, truncated) =
            match governor.check_with_retry(id, &deadline) {
                Ok(outcome) => (outcome.verdict, outcome.metadata, outcome.attempts, false),
                Err(exceeded) => {
                    warn!(id, error = %exceeded, "verify ran out of time");
                    (Verdict::Unknown, None, 0, true)
                }
            };

        let elapsed = self.clock.now().saturating_duration_since(started);
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        info!(id, ?verdict, attempts, elapsed_ms, "verify finished");

        VerifyResponse {
            id,
            exists: verdict == Verdict::Exists,
            verdict,
            account,
            estimated_total: recomputed.point_estimate,
            attempts,
            elapsed_ms,
            truncated,
            anomaly: recomputed.anomaly,
            timestamp: Utc::now(),
        }
    }
}
