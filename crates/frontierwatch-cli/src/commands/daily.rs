//! The daily batch: search from yesterday's frontier, recompute, and record
//! today's ledger entry.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use frontierwatch_core::{
    Baseline, EstimateSnapshot, FrontierAnomaly, FrontierResult, HistoryLedger, LedgerLock,
    UpsertAction,
};
use frontierwatch_probe::{Clock, ExistenceOracle, FrontierSearch, RetryConfig, SearchBudget};
use serde::Serialize;
use tracing::{info, instrument};

/// Summary of one daily run, printed by `frontierwatch update`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyReport {
    pub date: NaiveDate,
    pub seed: u64,
    pub frontier_id: u64,
    pub estimated_total: u64,
    pub daily_new_ids: i64,
    pub action: UpsertAction,
    pub seed_verified: bool,
    pub truncated: bool,
    pub probes: usize,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly: Option<FrontierAnomaly>,
    pub history_path: PathBuf,
}

pub struct DailyUpdate<'a, O: ?Sized, C: ?Sized> {
    oracle: &'a O,
    clock: &'a C,
    baseline: &'a Baseline,
    retry: RetryConfig,
    budget: SearchBudget,
    history_path: PathBuf,
}

impl<'a, O, C> DailyUpdate<'a, O, C>
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
        history_path: impl Into<PathBuf>,
    ) -> FrontierResult<Self> {
        budget.validate()?;
        Ok(Self {
            oracle,
            clock,
            baseline,
            retry,
            budget,
            history_path: history_path.into(),
        })
    }

    /// Run the update for the UTC day of `now`.
    ///
    /// The ledger lock is held from the read of the seed until the new entry
    /// is on disk.
    ///
    /// # Errors
    ///
    /// Returns `FrontierError::HistoryLocked` if another run holds the lock,
    /// `HistoryCorrupted`/`HistoryOutOfOrder` for ledger problems, and `Io`
    /// for filesystem failures. Oracle trouble never fails the run.
    #[instrument(
        name = "frontierwatch::daily_update",
        skip_all,
        fields(history = %self.history_path.display(), date = %now.date_naive())
    )]
    pub fn run(&self, now: DateTime<Utc>) -> FrontierResult<DailyReport> {
        let _lock = LedgerLock::acquire(&self.history_path)?;
        let mut ledger = HistoryLedger::load(&self.history_path)?;

        let fallback = self.baseline.baseline_frontier();
        let seed = ledger.last_frontier_or(fallback);
        info!(seed, entries = ledger.entries().len(), "starting daily frontier search");

        let search = FrontierSearch::new(self.oracle, self.clock, self.retry, self.budget);
        let result = search.run(seed);

        let snapshot = EstimateSnapshot::point(self.baseline, result.frontier, now)
            .flag_regression(seed);
        let outcome = ledger.upsert(
            now.date_naive(),
            result.frontier,
            snapshot.point_estimate,
            fallback,
        )?;
        ledger.save()?;

        info!(
            frontier = outcome.entry.frontier,
            estimate = outcome.entry.estimate,
            delta = outcome.entry.delta,
            truncated = result.truncated,
            "daily update recorded"
        );

        Ok(DailyReport {
            date: outcome.entry.date,
            seed,
            frontier_id: outcome.entry.frontier,
            estimated_total: outcome.entry.estimate,
            daily_new_ids: outcome.entry.delta,
            action: outcome.action,
            seed_verified: result.seed_verified,
            truncated: result.truncated,
            probes: result.trace.len(),
            elapsed_ms: result.elapsed_ms,
            anomaly: snapshot.anomaly,
            history_path: self.history_path.clone(),
        })
    }
}
