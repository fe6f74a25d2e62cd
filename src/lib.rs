//! # cyclone-timer: a hierarchical timing wheel
//!
//! A timing wheel for managing very large populations (hundreds of
//! thousands to millions) of coarse-grained, one-shot deferred actions at
//! millisecond resolution — a drop-in replacement for per-timer OS
//! primitives once the timer count makes kernel timers memory- or
//! scheduler-prohibitive.
//!
//! ## Quick start
//!
//! ```no_run
//! use cyclone_timer::WheelTimer;
//!
//! let timer = WheelTimer::new();
//! timer.start().unwrap();
//! timer.after(10, Box::new(|| println!("fired"))).unwrap();
//! # std::thread::sleep(std::time::Duration::from_millis(50));
//! timer.stop();
//! ```
//!
//! ## Architecture
//!
//! Submissions descend a hierarchy of fixed-size wheels (coarser tick
//! granularity at each level) until they land in a bucket whose tick span
//! covers their expiration. Each bucket owns a one-shot delay primitive
//! that, on firing, hands the bucket off to a single clock-advance
//! coordinator; the coordinator drains the bucket, advances the base
//! wheel's notion of "now," and forwards the drained entries to a
//! re-insertion pump that demotes them into the levels that now cover
//! their remaining wait. See `timer::wheel` and `timer::wheel_timer` for
//! the concrete machinery.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]

pub mod clock;
pub mod config;
pub mod delay;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod timer;

pub use clock::{Clock, SystemClock};
pub use config::{DispatchMode, WheelTimerConfig};
pub use dispatch::Action;
pub use error::{Error, Result};
pub use metrics::WheelTimerStats;
pub use timer::WheelTimer;
