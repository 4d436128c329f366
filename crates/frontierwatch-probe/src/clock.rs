//! Time source and wall-clock deadline shared by one search invocation.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Monotonic time source with an explicit sleep.
///
/// Backoff waits go through [`Clock::sleep`] so tests can advance virtual
/// time instead of blocking.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Real wall clock backed by [`std::thread::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Virtual clock: `sleep` advances time instantly and is recorded.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    state: Mutex<ManualState>,
}

#[derive(Debug, Default)]
struct ManualState {
    offset: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Mutex::new(ManualState::default()),
        }
    }

    /// Move virtual time forward without recording a sleep (simulated latency).
    pub fn advance(&self, duration: Duration) {
        let mut state = self.lock();
        state.offset = state.offset.saturating_add(duration);
    }

    /// Virtual time elapsed since construction.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.lock().offset
    }

    /// Every sleep requested so far, in order.
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.lock().offset
    }

    fn sleep(&self, duration: Duration) {
        let mut state = self.lock();
        state.offset = state.offset.saturating_add(duration);
        state.sleeps.push(duration);
    }
}

/// Raised when a search runs past its wall-clock budget.
///
/// This is a control-flow signal, not a failure: the search engine catches
/// it and reports the best frontier found so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("search deadline of {budget:?} exceeded after {elapsed:?}")]
pub struct DeadlineExceeded {
    pub elapsed: Duration,
    pub budget: Duration,
}

/// Global wall-clock budget for one search, checked before every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    #[must_use]
    pub const fn new(started: Instant, budget: Duration) -> Self {
        Self { started, budget }
    }

    #[must_use]
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }

    #[must_use]
    pub fn remaining(&self, now: Instant) -> Duration {
        self.budget.saturating_sub(self.elapsed(now))
    }

    /// # Errors
    ///
    /// Returns [`DeadlineExceeded`] once the budget is used up.
    pub fn check(&self, now: Instant) -> Result<(), DeadlineExceeded> {
        let elapsed = self.elapsed(now);
        if elapsed >= self.budget {
            return Err(DeadlineExceeded {
                elapsed,
                budget: self.budget,
            });
        }
        Ok(())
    }

    /// Shorten `wait` so it never ends past the deadline.
    #[must_use]
    pub fn clamp(&self, now: Instant, wait: Duration) -> Duration {
        wait.min(self.remaining(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_sleep_advances_and_records() {
        let clock = ManualClock::new();
        let start = clock.now();
        clock.sleep(Duration::from_secs(2));
        clock.advance(Duration::from_millis(500));

        assert_eq!(clock.now() - start, Duration::from_millis(2500));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(2)]);
        assert_eq!(clock.elapsed(), Duration::from_millis(2500));
    }

    #[test]
    fn deadline_check_trips_at_budget() {
        let clock = ManualClock::new();
        let deadline = Deadline::new(clock.now(), Duration::from_secs(1));
        assert!(deadline.check(clock.now()).is_ok());

        clock.advance(Duration::from_millis(999));
        assert!(deadline.check(clock.now()).is_ok());

        clock.advance(Duration::from_millis(1));
        let err = deadline.check(clock.now()).unwrap_err();
        assert_eq!(err.budget, Duration::from_secs(1));
        assert_eq!(err.elapsed, Duration::from_secs(1));
    }

    #[test]
    fn zero_budget_is_already_expired() {
        let clock = ManualClock::new();
        let deadline = Deadline::new(clock.now(), Duration::ZERO);
        assert!(deadline.check(clock.now()).is_err());
    }

    #[test]
    fn clamp_never_exceeds_remaining() {
        let clock = ManualClock::new();
        let deadline = Deadline::new(clock.now(), Duration::from_secs(10));
        clock.advance(Duration::from_secs(7));

        assert_eq!(
            deadline.clamp(clock.now(), Duration::from_secs(60)),
            Duration::from_secs(3)
        );
        assert_eq!(
            deadline.clamp(clock.now(), Duration::from_secs(1)),
            Duration::from_secs(1)
        );
        assert_eq!(deadline.remaining(clock.now()), Duration::from_secs(3));
    }

    #[test]
    fn deadline_exceeded_message_names_budget() {
        let err = DeadlineExceeded {
            elapsed: Duration::from_secs(9),
            budget: Duration::from_secs(8),
        };
        assert!(err.to_string().contains("8s"));
    }
}
