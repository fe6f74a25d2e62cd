//! Error types for the timing wheel.

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the public API.
///
/// Internal anomalies that are not caller mistakes (a negative computed
/// delay from clock regression, a worker channel closing because its peer
/// already exited) are recovered locally and never surface here — see
/// `dispatch` and `timer::wheel_timer` for how those are handled.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The entry's expiration is further in the future than the deepest
    /// wheel level can represent (`tick_ms * wheel_size^7`).
    #[error("too many levels of timing wheel needed for this expiration")]
    TooManyLevels,

    /// `start()` was called on a `WheelTimer` that is already running.
    #[error("wheel timer already started")]
    AlreadyStarted,

    /// `add`/`after` was called on a `WheelTimer` that was never started.
    #[error("wheel timer not started")]
    NotStarted,

    /// `add`/`after` was called on a `WheelTimer` after `stop()` returned.
    /// Late submissions are rejected synchronously rather than silently
    /// dropped, so a caller racing shutdown finds out immediately.
    #[error("wheel timer already stopped")]
    AlreadyStopped,

    /// A [`WheelTimerConfig`](crate::config::WheelTimerConfig) value cannot
    /// produce a working wheel (zero-sized wheel, zero-length tick, or a
    /// zero-worker pool dispatcher).
    #[error("invalid wheel timer configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of what made the configuration invalid.
        reason: String,
    },
}

impl Error {
    /// Construct an [`Error::InvalidConfig`].
    pub fn invalid_config<S: Into<String>>(reason: S) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Stable category string for logging and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::TooManyLevels => "too_many_levels",
            Self::AlreadyStarted => "already_started",
            Self::NotStarted => "not_started",
            Self::AlreadyStopped => "already_stopped",
            Self::InvalidConfig { .. } => "invalid_config",
        }
    }
}
