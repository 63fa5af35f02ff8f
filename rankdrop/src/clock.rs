//! Wall-clock abstraction.
//!
//! Submission timestamps take part in the ranking order, so every component
//! reads time through a [`Clock`] instead of calling `Utc::now()` directly.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Source of the current UTC time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replays.
///
/// Every call to [`Clock::now`] returns the current instant and then advances
/// it by the configured step, so consecutive submissions get distinct,
/// increasing timestamps.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<ManualState>,
}

#[derive(Debug)]
struct ManualState {
    now: DateTime<Utc>,
    step: Duration,
}

impl ManualClock {
    /// Creates a clock starting at `start` that advances by `step` per read.
    pub fn new(start: DateTime<Utc>, step: Duration) -> Self {
        Self {
            state: Mutex::new(ManualState { now: start, step }),
        }
    }

    /// Creates a clock frozen at `start`.
    pub fn frozen(start: DateTime<Utc>) -> Self {
        Self::new(start, Duration::zero())
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.now = now;
    }

    /// Advances the clock by `by`.
    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.now += by;
    }

    /// Returns the instant the next read will produce, without advancing.
    pub fn peek(&self) -> DateTime<Utc> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).now
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = state.now;
        let step = state.step;
        state.now += step;
        now
    }
}
