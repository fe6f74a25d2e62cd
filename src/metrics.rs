//! Lightweight counters for a running [`WheelTimer`](crate::timer::WheelTimer).

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonically increasing counters.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Entries successfully accepted by `add`/`after`.
    pub submitted: AtomicU64,
    /// Entries actually handed to the dispatcher for execution. An entry
    /// demoted from an overflow level into a finer one is not counted here
    /// until it is dispatched — only the fire-now path increments this.
    pub fired: AtomicU64,
    /// Submissions rejected with [`crate::error::Error::TooManyLevels`].
    pub too_many_levels: AtomicU64,
}

impl Metrics {
    /// Read every counter into a plain, `Copy`-able snapshot.
    ///
    /// `overflow_wheels_created` is always `0` in the returned value — the
    /// caller (`WheelTimer::stats`) fills it in from the wheel hierarchy's
    /// own counter, which is the source of truth.
    pub fn snapshot(&self) -> WheelTimerStats {
        WheelTimerStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            fired: self.fired.load(Ordering::Relaxed),
            too_many_levels: self.too_many_levels.load(Ordering::Relaxed),
            overflow_wheels_created: 0,
        }
    }
}

/// Point-in-time counters returned by
/// [`WheelTimer::stats`](crate::timer::WheelTimer::stats).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WheelTimerStats {
    /// Entries successfully accepted by `add`/`after`.
    pub submitted: u64,
    /// Entries whose action has been handed to the dispatcher.
    pub fired: u64,
    /// Submissions rejected with [`crate::error::Error::TooManyLevels`].
    pub too_many_levels: u64,
    /// Overflow wheels lazily created across the hierarchy's lifetime.
    pub overflow_wheels_created: u64,
}
