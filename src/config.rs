//! Configuration for the timing wheel.
//!
//! The crate never reads a file itself — configuration parsing is left to
//! the embedding application — but `WheelTimerConfig` is
//! `serde`-deserializable so an embedding application can load it from
//! TOML (or any other `serde` format) and hand it to
//! [`WheelTimer::with_config`](crate::timer::WheelTimer::with_config).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default base-level wheel size: 20 buckets per level.
pub const DEFAULT_WHEEL_SIZE: u64 = 20;
/// Default base-level tick granularity, in milliseconds.
pub const DEFAULT_TICK_MS: u64 = 1;
/// Default capacity for the coordinator and re-insertion channels — large
/// enough to absorb one coordinator cycle's worth of fires without
/// blocking a bucket worker on send.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;
/// Hard ceiling on wheel levels: a level never exceeds this.
pub const MAX_LEVEL: u8 = 7;

/// Configuration for a [`WheelTimer`](crate::timer::WheelTimer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WheelTimerConfig {
    /// Number of buckets per wheel level.
    pub wheel_size: u64,
    /// Tick granularity of the base level, in milliseconds.
    pub tick_ms: u64,
    /// Bounded channel capacity for bucket-fired signals and drained-chain
    /// handoff between the coordinator and the re-insertion pump.
    pub channel_capacity: usize,
    /// How user actions are dispatched once they fire.
    pub dispatch: DispatchMode,
}

/// Selects the action-dispatch mechanism. Dispatched actions may run
/// concurrently with each other.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchMode {
    /// Spawn a fresh OS thread per dispatched action. Simplest, and fine for
    /// coarse-grained, infrequent actions.
    Spawn,
    /// A fixed pool of worker threads fed by a bounded channel. Scales
    /// better under a high fire rate.
    Pool {
        /// Number of worker threads in the pool.
        workers: usize,
    },
}

impl Default for WheelTimerConfig {
    fn default() -> Self {
        Self {
            wheel_size: DEFAULT_WHEEL_SIZE,
            tick_ms: DEFAULT_TICK_MS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            dispatch: DispatchMode::Spawn,
        }
    }
}

impl WheelTimerConfig {
    /// Validate the configuration, returning a descriptive [`Error`] if it
    /// cannot produce a working wheel.
    pub fn validate(&self) -> Result<()> {
        if self.wheel_size == 0 {
            return Err(Error::invalid_config("wheel_size must be non-zero"));
        }
        if self.tick_ms == 0 {
            return Err(Error::invalid_config("tick_ms must be non-zero"));
        }
        if let DispatchMode::Pool { workers } = &self.dispatch {
            if *workers == 0 {
                return Err(Error::invalid_config("pool dispatch requires at least one worker"));
            }
        }
        Ok(())
    }

    /// The total span covered by the deepest possible wheel level, i.e.
    /// `tick_ms * wheel_size ^ MAX_LEVEL` — entries past this horizon are
    /// rejected with [`Error::TooManyLevels`].
    pub fn max_horizon_ms(&self) -> u128 {
        let mut horizon = self.tick_ms as u128;
        for _ in 0..MAX_LEVEL {
            horizon = horizon.saturating_mul(self.wheel_size as u128);
        }
        horizon
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_reference_constants() {
        let cfg = WheelTimerConfig::default();
        assert_eq!(cfg.wheel_size, 20);
        assert_eq!(cfg.tick_ms, 1);
    }

    #[test]
    fn rejects_zero_wheel_size() {
        let mut cfg = WheelTimerConfig::default();
        cfg.wheel_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_pool_workers() {
        let mut cfg = WheelTimerConfig::default();
        cfg.dispatch = DispatchMode::Pool { workers: 0 };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn deserializes_from_toml() {
        let toml_src = r#"
            wheel_size = 32
            tick_ms = 5
            channel_capacity = 50

            [dispatch]
            kind = "pool"
            workers = 4
        "#;
        let cfg: WheelTimerConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(cfg.wheel_size, 32);
        assert_eq!(cfg.tick_ms, 5);
        match cfg.dispatch {
            DispatchMode::Pool { workers } => assert_eq!(workers, 4),
            _ => panic!("expected pool dispatch"),
        }
    }
}
