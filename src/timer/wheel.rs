//! `Wheel` and the wheel hierarchy: a fixed-size circular array of buckets
//! at one tick granularity, with a lazily created overflow wheel covering
//! the next, coarser granularity.

use crate::config::MAX_LEVEL;
use crate::dispatch::ActionDispatcher;
use crate::error::{Error, Result};
use crate::timer::bucket::Bucket;
use crate::timer::entry::TaskEntry;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::JoinHandle;

/// One level of the hierarchy.
///
/// `level == 0` is the base wheel owned directly by the
/// [`WheelTimer`](crate::timer::wheel_timer::WheelTimer); every other
/// level is created lazily the first time an entry needs it, so a
/// hierarchy that never sees a far-future expiration never pays for levels
/// it doesn't use.
pub struct Wheel {
    level: u8,
    tick_ms: u64,
    wheel_size: u64,
    interval: i64,
    current_time_ms: AtomicI64,
    buckets: Vec<Arc<Bucket>>,
    bucket_stop: Vec<Sender<()>>,
    bucket_workers: Mutex<Vec<JoinHandle<()>>>,
    /// Populated at construction when `start_buckets_immediately` was
    /// `false`; drained by `start_buckets` when the dispatcher explicitly
    /// starts this (necessarily base, `level == 0`) wheel.
    pending_bucket_starts: Mutex<Vec<(Arc<Bucket>, Receiver<()>)>>,
    /// Lazily, uniquely installed overflow wheel. `OnceLock::get_or_init`
    /// gives "at most one overflow wheel per level, even under concurrent
    /// first-touch" for free — see `DESIGN.md`.
    overflow: OnceLock<Arc<Wheel>>,
    /// Non-owning handle used solely to signal this level's buckets firing
    /// up to the clock-advance coordinator.
    coordinator_tx: Sender<Arc<Bucket>>,
    /// Shared counter bumped once per lazily-created overflow wheel,
    /// surfaced via [`crate::metrics::WheelTimerStats::overflow_wheels_created`].
    overflow_wheels_created: Arc<AtomicU64>,
}

impl Wheel {
    /// Construct a wheel level.
    ///
    /// `start_buckets_immediately` should be `false` only for the base
    /// (`level == 0`) wheel, whose buckets are started explicitly by
    /// [`WheelTimer::start`](crate::timer::wheel_timer::WheelTimer::start).
    /// Every wheel created afterwards — i.e. every overflow level — starts
    /// its own buckets immediately, since by construction time the
    /// dispatcher's one "start everything that exists" pass has already
    /// run.
    pub fn new(
        level: u8,
        tick_ms: u64,
        wheel_size: u64,
        coordinator_tx: Sender<Arc<Bucket>>,
        now_ms: i64,
        start_buckets_immediately: bool,
    ) -> Self {
        Self::new_with_counter(
            level,
            tick_ms,
            wheel_size,
            coordinator_tx,
            now_ms,
            start_buckets_immediately,
            Arc::new(AtomicU64::new(0)),
        )
    }

    /// As [`Self::new`], but sharing an existing overflow-creation counter —
    /// used when constructing an overflow level so every level in a
    /// hierarchy reports into the same counter.
    fn new_with_counter(
        level: u8,
        tick_ms: u64,
        wheel_size: u64,
        coordinator_tx: Sender<Arc<Bucket>>,
        now_ms: i64,
        start_buckets_immediately: bool,
        overflow_wheels_created: Arc<AtomicU64>,
    ) -> Self {
        let interval = tick_ms as i64 * wheel_size as i64;
        let current_time_ms = now_ms - now_ms.rem_euclid(tick_ms as i64);

        let mut buckets = Vec::with_capacity(wheel_size as usize);
        let mut bucket_stop = Vec::with_capacity(wheel_size as usize);
        let mut bucket_workers = Vec::with_capacity(wheel_size as usize);
        let mut pending_bucket_starts = Vec::new();

        for i in 0..wheel_size as usize {
            let index = level as usize * wheel_size as usize + i;
            let bucket = Arc::new(Bucket::new(index));
            let (stop_tx, stop_rx) = bounded::<()>(1);
            bucket_stop.push(stop_tx);
            if start_buckets_immediately {
                bucket_workers.push(Bucket::spawn_worker(
                    bucket.clone(),
                    coordinator_tx.clone(),
                    stop_rx,
                ));
            } else {
                pending_bucket_starts.push((bucket.clone(), stop_rx));
            }
            buckets.push(bucket);
        }

        Self {
            level,
            tick_ms,
            wheel_size,
            interval,
            current_time_ms: AtomicI64::new(current_time_ms),
            buckets,
            bucket_stop,
            bucket_workers: Mutex::new(bucket_workers),
            pending_bucket_starts: Mutex::new(pending_bucket_starts),
            overflow: OnceLock::new(),
            coordinator_tx,
            overflow_wheels_created,
        }
    }

    /// Total overflow wheels lazily created across this level and every
    /// level beneath it, for metrics purposes.
    pub fn overflow_wheels_created(&self) -> u64 {
        self.overflow_wheels_created.load(Ordering::Relaxed)
    }

    /// The wheel's notion of "now": the largest tick instant observed so
    /// far, rounded down to `tick_ms`.
    pub fn current_time_ms(&self) -> i64 {
        self.current_time_ms.load(Ordering::SeqCst)
    }

    /// Move this level's notion of "now" forward if `time_ms` has crossed
    /// into a new tick, then propagate to the overflow wheel if one exists.
    /// Called only by the coordinator, while holding the write side of the
    /// clock-advance synchronizer.
    pub fn advance_clock(&self, time_ms: i64) {
        let tick = self.tick_ms as i64;
        let current = self.current_time_ms.load(Ordering::SeqCst);
        if time_ms >= current + tick {
            let new_current = time_ms - time_ms.rem_euclid(tick);
            self.current_time_ms.store(new_current, Ordering::SeqCst);
            if let Some(overflow) = self.overflow.get() {
                overflow.advance_clock(time_ms);
            }
        }
    }

    /// Classify `entry` as fire-now, fits-this-level, or overflow, and
    /// route it accordingly. `now_ms` is the caller's fresh clock reading,
    /// forwarded down so a bucket that ends up arming its delay computes an
    /// accurate remaining duration. Returns `Ok(true)` if the entry was
    /// dispatched immediately (fire-now), `Ok(false)` if it was queued into
    /// a bucket for later.
    pub fn add_entry(
        &self,
        mut entry: TaskEntry,
        now_ms: i64,
        dispatcher: &dyn ActionDispatcher,
    ) -> Result<bool> {
        let current = self.current_time_ms.load(Ordering::SeqCst);
        let tick = self.tick_ms as i64;

        if entry.expiration_ms < current + tick {
            dispatcher.dispatch(entry.take_action());
            Ok(true)
        } else if entry.expiration_ms < current + self.interval {
            let idx = (entry.expiration_ms / tick).rem_euclid(self.wheel_size as i64) as usize;
            self.buckets[idx].add(entry, self.tick_ms, now_ms);
            Ok(false)
        } else {
            if self.level + 1 >= MAX_LEVEL {
                return Err(Error::TooManyLevels);
            }
            let overflow = self.overflow.get_or_init(|| {
                self.overflow_wheels_created.fetch_add(1, Ordering::Relaxed);
                Arc::new(Wheel::new_with_counter(
                    self.level + 1,
                    self.interval as u64,
                    self.wheel_size,
                    self.coordinator_tx.clone(),
                    now_ms,
                    true,
                    self.overflow_wheels_created.clone(),
                ))
            });
            overflow.add_entry(entry, now_ms, dispatcher)
        }
    }

    /// Start this level's buckets. Only ever called for the base wheel,
    /// exactly once, from `WheelTimer::start`.
    pub fn start_buckets(&self) {
        let mut pending = self.pending_bucket_starts.lock().unwrap();
        let mut handles = self.bucket_workers.lock().unwrap();
        for (bucket, stop_rx) in pending.drain(..) {
            handles.push(Bucket::spawn_worker(bucket, self.coordinator_tx.clone(), stop_rx));
        }
    }

    /// Stop this level's buckets and recursively stop the overflow wheel,
    /// awaiting every worker thread before returning.
    pub fn stop(&self) {
        if let Some(overflow) = self.overflow.get() {
            overflow.stop();
        }
        for stop_tx in &self.bucket_stop {
            let _ = stop_tx.send(());
        }
        let mut handles = self.bucket_workers.lock().unwrap();
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
    }

    /// Read-only access to a bucket by slot index — used by tests.
    #[cfg(test)]
    pub fn bucket(&self, idx: usize) -> &Arc<Bucket> {
        &self.buckets[idx]
    }

    #[cfg(test)]
    pub fn level(&self) -> u8 {
        self.level
    }

    #[cfg(test)]
    pub fn has_overflow(&self) -> bool {
        self.overflow.get().is_some()
    }
}
