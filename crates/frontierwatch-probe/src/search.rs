//! Adaptive frontier search.
//!
//! Four sequential phases, never revisited:
//!
//! 1. **Seed**: re-check the previously known frontier `F0`. A miss is
//!    logged; the search still moves forward from `F0`.
//! 2. **Exponential**: probe `F0 + step`, doubling `step` on every hit, until
//!    the first miss (the overshoot) or the iteration bound.
//! 3. **Binary**: bisect `[best_known_good, overshoot]` while the gap exceeds
//!    the minimum resolution, for a bounded number of iterations.
//! 4. **Fine**: step forward in fixed increments from the best known good ID
//!    until a run of consecutive misses.
//!
//! IDs are not allocated contiguously, so one miss never proves the frontier
//! was reached. With `miss_confirmations > 0` a miss in phases 2 and 3 is
//! only trusted after the next few IDs miss as well.
//!
//! A deadline breach at any point ends the search with the best frontier
//! found so far; [`FrontierSearch::run`] never fails.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::budget::SearchBudget;
use crate::clock::{Clock, Deadline, DeadlineExceeded};
use crate::governor::{RetryConfig, RetryGovernor, Verdict};
use crate::oracle::{AccountMetadata, ExistenceOracle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Seed,
    Exponential,
    Binary,
    Fine,
}

impl Phase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Seed => "seed",
            Self::Exponential => "exponential",
            Self::Binary => "binary",
            Self::Fine => "fine",
        }
    }
}

/// One probed ID in the search trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Probe {
    pub id: u64,
    pub verdict: Verdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AccountMetadata>,
    pub phase: Phase,
    pub attempts: u32,
}

impl Probe {
    #[must_use]
    pub fn exists(&self) -> bool {
        self.verdict == Verdict::Exists
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Every phase ran to its natural end.
    Completed,
    /// The wall-clock budget ran out mid-search.
    DeadlineExceeded,
}

/// Outcome of one search. `frontier` is always a usable lower bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub frontier: u64,
    /// Metadata of `frontier`, when the oracle returned it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontier_metadata: Option<AccountMetadata>,
    pub trace: Vec<Probe>,
    pub elapsed_ms: u64,
    pub truncated: bool,
    pub seed_verified: bool,
    /// First miss seen by exponential probing. `None` with a completed
    /// search means the gap outran the exponential bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overshoot: Option<u64>,
    pub termination: Termination,
}

impl SearchResult {
    #[must_use]
    pub fn probes_in(&self, phase: Phase) -> usize {
        self.trace.iter().filter(|probe| probe.phase == phase).count()
    }
}

/// Mutable state owned by a single in-flight search.
#[derive(Debug, Clone)]
struct SearchState {
    seed: u64,
    best_known_good: u64,
    best_metadata: Option<AccountMetadata>,
    seed_verified: bool,
    overshoot: Option<u64>,
    trace: Vec<Probe>,
    deadline: Deadline,
}

impl SearchState {
    const fn new(seed: u64, deadline: Deadline) -> Self {
        Self {
            seed,
            best_known_good: seed,
            best_metadata: None,
            seed_verified: false,
            overshoot: None,
            trace: Vec::new(),
            deadline,
        }
    }

    fn record(&mut self, probe: Probe) {
        if probe.exists() && probe.id > self.best_known_good {
            self.best_known_good = probe.id;
            self.best_metadata.clone_from(&probe.metadata);
        }
        self.trace.push(probe);
    }

    fn finish(self, started: Instant, now: Instant, termination: Termination) -> SearchResult {
        let elapsed = now.saturating_duration_since(started);
        SearchResult {
            frontier: self.best_known_good,
            frontier_metadata: self.best_metadata,
            trace: self.trace,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            truncated: termination == Termination::DeadlineExceeded,
            seed_verified: self.seed_verified,
            overshoot: self.overshoot,
            termination,
        }
    }
}

/// The three-phase search engine, parameterized by a [`SearchBudget`].
pub struct FrontierSearch<'a, O: ?Sized, C: ?Sized> {
    governor: RetryGovernor<'a, O, C>,
    budget: SearchBudget,
}

impl<'a, O, C> FrontierSearch<'a, O, C>
where
    O: ExistenceOracle + ?Sized,
    C: Clock + ?Sized,
{
    #[must_use]
    pub fn new(oracle: &'a O, clock: &'a C, retry: RetryConfig, budget: SearchBudget) -> Self {
        Self {
            governor: RetryGovernor::new(oracle, clock, retry),
            budget,
        }
    }

    /// Search forward from `seed` and return the best frontier found.
    #[instrument(
        name = "frontierwatch::frontier_search",
        skip(self),
        fields(deadline_ms = u64::try_from(self.budget.deadline.as_millis()).unwrap_or(u64::MAX))
    )]
    pub fn run(&self, seed: u64) -> SearchResult {
        let clock = self.governor.clock();
        let started = clock.now();
        let mut state = SearchState::new(seed, Deadline::new(started, self.budget.deadline));

        let termination = match self.drive(&mut state) {
            Ok(()) => Termination::Completed,
            Err(exceeded) => {
                warn!(
                    frontier = state.best_known_good,
                    elapsed_ms = u64::try_from(exceeded.elapsed.as_millis()).unwrap_or(u64::MAX),
                    "search deadline reached, returning best frontier so far"
                );
                Termination::DeadlineExceeded
            }
        };

        let result = state.finish(started, clock.now(), termination);
        info!(
            frontier = result.frontier,
            probes = result.trace.len(),
            elapsed_ms = result.elapsed_ms,
            truncated = result.truncated,
            "frontier search finished"
        );
        result
    }

    fn drive(&self, state: &mut SearchState) -> Result<(), DeadlineExceeded> {
        self.check_seed(state)?;
        if let Some(overshoot) = self.probe_exponentially(state)? {
            self.bisect(state, overshoot)?;
        }
        self.scan_forward(state)
    }

    fn probe(
        &self,
        state: &mut SearchState,
        id: u64,
        phase: Phase,
    ) -> Result<Verdict, DeadlineExceeded> {
        let outcome = self.governor.check_with_retry(id, &state.deadline)?;
        debug!(
            id,
            phase = phase.as_str(),
            verdict = ?outcome.verdict,
            attempts = outcome.attempts,
            "probe"
        );
        let verdict = outcome.verdict;
        state.record(Probe {
            id,
            verdict,
            metadata: outcome.metadata,
            phase,
            attempts: outcome.attempts,
        });
        Ok(verdict)
    }

    fn check_seed(&self, state: &mut SearchState) -> Result<(), DeadlineExceeded> {
        let seed = state.seed;
        if self.probe(state, seed, Phase::Seed)? == Verdict::Exists {
            state.seed_verified = true;
            if let Some(probe) = state.trace.last() {
                state.best_metadata.clone_from(&probe.metadata);
            }
        } else {
            warn!(seed, "seed frontier did not verify, searching forward anyway");
        }
        Ok(())
    }

    /// Returns the overshoot, if one was found.
    fn probe_exponentially(&self, state: &mut SearchState) -> Result<Option<u64>, DeadlineExceeded> {
        let seed = state.seed;
        let ceiling = self.budget.ceiling(seed);
        let mut step = self.budget.initial_step;
        let mut last_target = seed;

        for _ in 0..self.budget.max_exponential_iterations {
            let target = seed.saturating_add(step).min(ceiling);
            if target <= last_target {
                break;
            }
            last_target = target;

            match self.probe(state, target, Phase::Exponential)? {
                Verdict::Exists => step = step.saturating_mul(2),
                Verdict::NotExists => {
                    if self
                        .confirm_miss(state, target, ceiling, Phase::Exponential)?
                        .is_some()
                    {
                        step = step.saturating_mul(2);
                        continue;
                    }
                    state.overshoot = Some(target);
                    return Ok(Some(target));
                }
                Verdict::Unknown => {
                    debug!(id = target, "unknown probe ends exponential phase without a bound");
                    return Ok(None);
                }
            }
        }

        warn!(
            best_known_good = state.best_known_good,
            last_target, "no overshoot within exponential bound, falling through to fine scan"
        );
        Ok(None)
    }

    fn bisect(&self, state: &mut SearchState, overshoot: u64) -> Result<(), DeadlineExceeded> {
        let mut lo = state.best_known_good;
        let mut hi = overshoot;

        for _ in 0..self.budget.max_binary_iterations {
            if hi.saturating_sub(lo) <= self.budget.binary_search_min_gap {
                break;
            }
            let mid = lo + (hi - lo) / 2;
            match self.probe(state, mid, Phase::Binary)? {
                Verdict::Exists => lo = mid,
                Verdict::NotExists => {
                    match self.confirm_miss(state, mid, hi - 1, Phase::Binary)? {
                        Some(hit) => lo = hit,
                        None => hi = mid,
                    }
                }
                Verdict::Unknown => break,
            }
        }
        Ok(())
    }

    /// Probe up to `miss_confirmations` IDs after the miss at `id`, never
    /// past `max_id`. Returns the first that exists.
    fn confirm_miss(
        &self,
        state: &mut SearchState,
        id: u64,
        max_id: u64,
        phase: Phase,
    ) -> Result<Option<u64>, DeadlineExceeded> {
        for offset in 1..=u64::from(self.budget.miss_confirmations) {
            let Some(next) = id.checked_add(offset).filter(|&next| next <= max_id) else {
                break;
            };
            if self.probe(state, next, phase)? == Verdict::Exists {
                debug!(miss = id, hit = next, phase = phase.as_str(), "miss was a gap");
                return Ok(Some(next));
            }
        }
        Ok(None)
    }

    fn scan_forward(&self, state: &mut SearchState) -> Result<(), DeadlineExceeded> {
        let ceiling = self.budget.ceiling(state.seed);
        let step = self.budget.fine_step_size.max(1);
        let mut cursor = state.best_known_good;
        let mut misses = 0_u32;
        let mut iterations = 0_u32;

        while misses < self.budget.miss_tolerance {
            if let Some(max) = self.budget.max_fine_iterations
                && iterations >= max
            {
                break;
            }
            let Some(next) = cursor.checked_add(step).filter(|&id| id <= ceiling) else {
                break;
            };
            iterations += 1;
            cursor = next;

            if self.probe(state, next, Phase::Fine)? == Verdict::Exists {
                misses = 0;
            } else {
                misses += 1;
            }
        }
        Ok(())
    }
}
