//! Phase bounds and deadline for one frontier search.

use std::time::Duration;

use frontierwatch_core::{FrontierError, FrontierResult};

/// Parameters of the three-phase frontier search.
///
/// The interactive and daily searches run the same engine; they differ only
/// in these numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchBudget {
    /// First exponential offset from the seed; doubles on every hit.
    pub initial_step: u64,
    pub max_exponential_iterations: u32,
    /// IDs after an exponential or binary miss that are probed before the
    /// miss counts as past the frontier. Any hit among them moves the lower
    /// bound up instead.
    pub miss_confirmations: u32,
    /// Binary search only runs while `overshoot - best_known_good` exceeds this.
    pub binary_search_min_gap: u64,
    pub max_binary_iterations: u32,
    pub fine_step_size: u64,
    /// `None` scans until the miss tolerance is reached.
    pub max_fine_iterations: Option<u32>,
    /// Consecutive fine-scan misses that end the search.
    pub miss_tolerance: u32,
    /// Wall-clock budget for the whole search.
    pub deadline: Duration,
    /// Probes never target IDs above `seed + max_window`.
    pub max_window: Option<u64>,
}

impl SearchBudget {
    /// Bounded on-demand scan: about a dozen probes in single-digit seconds.
    #[must_use]
    pub const fn interactive() -> Self {
        Self {
            initial_step: 1_000,
            max_exponential_iterations: 6,
            miss_confirmations: 0,
            binary_search_min_gap: 200,
            max_binary_iterations: 4,
            fine_step_size: 100,
            max_fine_iterations: Some(3),
            miss_tolerance: 2,
            deadline: Duration::from_secs(9),
            max_window: None,
        }
    }

    /// Offline daily run: converges to single-ID resolution inside a
    /// 5,000,000-ID window, under an 8-minute cap.
    #[must_use]
    pub const fn daily() -> Self {
        Self {
            initial_step: 1_000,
            max_exponential_iterations: 14,
            miss_confirmations: 2,
            binary_search_min_gap: 1,
            max_binary_iterations: 32,
            fine_step_size: 1,
            max_fine_iterations: None,
            miss_tolerance: 5,
            deadline: Duration::from_secs(8 * 60),
            max_window: Some(5_000_000),
        }
    }

    #[must_use]
    pub const fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    #[must_use]
    pub const fn with_max_window(mut self, max_window: Option<u64>) -> Self {
        self.max_window = max_window;
        self
    }

    /// Highest ID this budget allows probing from `seed`.
    #[must_use]
    pub fn ceiling(&self, seed: u64) -> u64 {
        self.max_window
            .map_or(u64::MAX, |window| seed.saturating_add(window))
    }

    /// # Errors
    ///
    /// Returns [`FrontierError::InvalidConfig`] for zero step sizes, a zero
    /// miss tolerance or a zero deadline.
    pub fn validate(&self) -> FrontierResult<()> {
        if self.initial_step == 0 {
            return Err(FrontierError::config(
                "search.initial_step",
                "0",
                "must be at least 1",
            ));
        }
        if self.fine_step_size == 0 {
            return Err(FrontierError::config(
                "search.fine_step_size",
                "0",
                "must be at least 1",
            ));
        }
        if self.miss_tolerance == 0 {
            return Err(FrontierError::config(
                "search.miss_tolerance",
                "0",
                "must be at least 1 or the fine scan never probes",
            ));
        }
        if self.deadline.is_zero() {
            return Err(FrontierError::config(
                "search.deadline",
                "0",
                "must be positive",
            ));
        }
        Ok(())
    }
}

impl Default for SearchBudget {
    fn default() -> Self {
        Self::interactive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        SearchBudget::interactive().validate().unwrap();
        SearchBudget::daily().validate().unwrap();
    }

    #[test]
    fn interactive_preset_matches_probe_route() {
        let budget = SearchBudget::interactive();
        assert_eq!(budget.initial_step, 1_000);
        assert_eq!(budget.max_exponential_iterations, 6);
        assert_eq!(budget.miss_confirmations, 0);
        assert_eq!(budget.binary_search_min_gap, 200);
        assert_eq!(budget.max_binary_iterations, 4);
        assert_eq!(budget.fine_step_size, 100);
        assert_eq!(budget.max_fine_iterations, Some(3));
        assert_eq!(budget.miss_tolerance, 2);
        assert!(budget.max_window.is_none());
    }

    #[test]
    fn daily_exponential_phase_covers_window() {
        let budget = SearchBudget::daily();
        let reach = budget.initial_step << (budget.max_exponential_iterations - 1);
        assert!(reach >= budget.max_window.unwrap());
        assert_eq!(budget.miss_tolerance, 5);
        assert_eq!(budget.miss_confirmations, 2);
        assert_eq!(budget.deadline, Duration::from_secs(480));
    }

    #[test]
    fn ceiling_respects_window() {
        assert_eq!(SearchBudget::daily().ceiling(100), 5_000_100);
        assert_eq!(SearchBudget::interactive().ceiling(100), u64::MAX);
        let wide = SearchBudget::daily().with_max_window(Some(u64::MAX));
        assert_eq!(wide.ceiling(10), u64::MAX);
    }

    #[test]
    fn zero_values_are_rejected() {
        let mut budget = SearchBudget::interactive();
        budget.miss_tolerance = 0;
        assert!(budget.validate().is_err());

        let budget = SearchBudget::interactive().with_deadline(Duration::ZERO);
        let err = budget.validate().unwrap_err();
        assert!(err.to_string().contains("search.deadline"));
    }
}
