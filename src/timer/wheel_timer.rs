//! `WheelTimer`: the dispatcher. Owns the base wheel, runs the clock-advance
//! coordinator and the re-insertion pump, and exposes the public
//! `add`/`after`/`start`/`stop` surface.

use crate::clock::{Clock, SystemClock};
use crate::config::WheelTimerConfig;
use crate::dispatch::{Action, ActionDispatcher, PoolDispatcher, SpawnDispatcher};
use crate::error::{Error, Result};
use crate::metrics::{WheelTimerStats, Metrics};
use crate::timer::bucket::Bucket;
use crate::timer::entry::TaskEntry;
use crate::timer::wheel::Wheel;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// A drained bucket chain handed from the coordinator to the re-insertion
/// pump.
type DrainedChains = Vec<std::collections::VecDeque<TaskEntry>>;

enum DispatchBackend {
    Spawn(SpawnDispatcher),
    Pool(PoolDispatcher),
}

impl ActionDispatcher for DispatchBackend {
    fn dispatch(&self, action: Action) {
        match self {
            Self::Spawn(d) => d.dispatch(action),
            Self::Pool(d) => d.dispatch(action),
        }
    }
}

/// Owns the wheel hierarchy and its background workers.
///
/// `WheelTimer::new()` constructs a timer with default settings
/// (`wheel_size = 20`, `tick_ms = 1`). See `DESIGN.md` for why lifecycle
/// state is tracked with two booleans rather than a three-state enum
/// behind a single lock.
pub struct WheelTimer {
    config: WheelTimerConfig,
    clock: Arc<dyn Clock>,
    dispatcher: Arc<DispatchBackend>,
    base: Arc<Wheel>,
    /// Clock-advance synchronizer: write side held only by the coordinator
    /// across its drain/advance critical section, read side held by every
    /// `add`/`after` and by the re-insertion pump's per-entry insert.
    clock_advance: Arc<RwLock<()>>,
    coordinator_rx: Mutex<Option<Receiver<Arc<Bucket>>>>,
    /// Moved into the coordinator's closure by `start()`, without being
    /// cloned first — the re-insertion pump's `recv()` only returns `Err`
    /// once every sender is gone, so this struct must not hold a spare
    /// clone alongside the one the coordinator owns.
    reinsert_tx: Mutex<Option<Sender<DrainedChains>>>,
    reinsert_rx: Mutex<Option<Receiver<DrainedChains>>>,
    coordinator_stop: Sender<()>,
    coordinator_stop_rx: Mutex<Option<Receiver<()>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    stopped: AtomicBool,
    metrics: Arc<Metrics>,
}

impl WheelTimer {
    /// Construct a timer with default settings (`wheel_size = 20`,
    /// `tick_ms = 1`, spawn-per-action dispatch), backed by the system
    /// wall clock.
    pub fn new() -> Self {
        Self::with_config(WheelTimerConfig::default())
    }

    /// Construct a timer from an explicit, pre-validated configuration,
    /// backed by the system wall clock.
    ///
    /// # Panics
    /// Panics if `config` fails [`WheelTimerConfig::validate`] — an invalid
    /// configuration is a caller programming error, not a runtime
    /// condition, so callers are expected to validate at the load boundary,
    /// not per call.
    pub fn with_config(config: WheelTimerConfig) -> Self {
        Self::with_config_and_clock(config, Arc::new(SystemClock))
    }

    /// Construct a timer with default settings, backed by `clock` instead
    /// of the system wall clock. Lets a test drive the wheel with a
    /// [`FakeClock`](crate::clock::FakeClock) rather than racing real time.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_config_and_clock(WheelTimerConfig::default(), clock)
    }

    /// Construct a timer from an explicit, pre-validated configuration,
    /// backed by `clock` instead of the system wall clock.
    ///
    /// # Panics
    /// Panics if `config` fails [`WheelTimerConfig::validate`] — see
    /// [`Self::with_config`].
    pub fn with_config_and_clock(config: WheelTimerConfig, clock: Arc<dyn Clock>) -> Self {
        config
            .validate()
            .expect("WheelTimerConfig must be valid; validate() before constructing a WheelTimer");

        let now_ms = clock.now_ms();

        let (coordinator_tx, coordinator_rx) = bounded::<Arc<Bucket>>(config.channel_capacity);
        let (reinsert_tx, reinsert_rx) = bounded::<DrainedChains>(config.channel_capacity);
        let (coordinator_stop_tx, coordinator_stop_rx) = bounded::<()>(1);

        let base = Arc::new(Wheel::new(
            0,
            config.tick_ms,
            config.wheel_size,
            coordinator_tx.clone(),
            now_ms,
            false,
        ));

        let dispatcher = Arc::new(match &config.dispatch {
            crate::config::DispatchMode::Spawn => DispatchBackend::Spawn(SpawnDispatcher),
            crate::config::DispatchMode::Pool { workers } => {
                DispatchBackend::Pool(PoolDispatcher::new(*workers, config.channel_capacity))
            }
        });

        Self {
            config,
            clock,
            dispatcher,
            base,
            clock_advance: Arc::new(RwLock::new(())),
            coordinator_rx: Mutex::new(Some(coordinator_rx)),
            reinsert_tx: Mutex::new(Some(reinsert_tx)),
            reinsert_rx: Mutex::new(Some(reinsert_rx)),
            coordinator_stop: coordinator_stop_tx,
            coordinator_stop_rx: Mutex::new(Some(coordinator_stop_rx)),
            workers: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            metrics: Arc::new(Metrics::default()),
        }
    }

    /// Spawn the coordinator, the re-insertion pump, and every bucket
    /// worker that already exists (the base level; higher levels start
    /// their own workers immediately at creation time). Calling `start`
    /// twice is disallowed.
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyStarted);
        }

        self.base.start_buckets();

        let coordinator_rx = self
            .coordinator_rx
            .lock()
            .unwrap()
            .take()
            .expect("coordinator receiver taken exactly once by start()");
        let coordinator_stop_rx = self
            .coordinator_stop_rx
            .lock()
            .unwrap()
            .take()
            .expect("coordinator stop receiver taken exactly once by start()");
        let reinsert_rx = self
            .reinsert_rx
            .lock()
            .unwrap()
            .take()
            .expect("reinsert receiver taken exactly once by start()");
        let reinsert_tx = self
            .reinsert_tx
            .lock()
            .unwrap()
            .take()
            .expect("reinsert sender taken exactly once by start()");

        let coordinator_handle = spawn_coordinator(
            coordinator_rx,
            coordinator_stop_rx,
            reinsert_tx,
            self.base.clone(),
            self.clock_advance.clone(),
        );
        let pump_handle = spawn_reinsert_pump(
            reinsert_rx,
            self.base.clone(),
            self.clock_advance.clone(),
            self.dispatcher.clone(),
            self.metrics.clone(),
        );

        let mut workers = self.workers.lock().unwrap();
        workers.push(coordinator_handle);
        workers.push(pump_handle);

        info!(
            wheel_size = self.config.wheel_size,
            tick_ms = self.config.tick_ms,
            "wheel timer started"
        );
        Ok(())
    }

    /// Submit `action` to fire at or after `expiration_ms` on the shared
    /// clock.
    pub fn add(&self, expiration_ms: i64, action: Action) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(Error::AlreadyStopped);
        }
        if !self.started.load(Ordering::SeqCst) {
            return Err(Error::NotStarted);
        }

        let entry = TaskEntry::new(expiration_ms, action);
        let now_ms = self.clock.now_ms();

        // Read side of the clock-advance sync: many submissions proceed
        // concurrently, blocked only by the coordinator's write-side
        // critical section.
        let _guard = self.clock_advance.read().unwrap();
        let result = self.base.add_entry(entry, now_ms, self.dispatcher.as_ref());
        match result {
            Ok(dispatched) => {
                self.metrics.submitted.fetch_add(1, Ordering::Relaxed);
                if dispatched {
                    self.metrics.fired.fetch_add(1, Ordering::Relaxed);
                }
                Ok(())
            }
            Err(e) => {
                self.metrics.too_many_levels.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Convenience wrapper over [`Self::add`] with
    /// `expiration_ms = now + delay_ms`.
    pub fn after(&self, delay_ms: u64, action: Action) -> Result<()> {
        let now_ms = self.clock.now_ms();
        self.add(now_ms + delay_ms as i64, action)
    }

    /// Signal every bucket worker on every level, the coordinator, and the
    /// re-insertion pump to stop, then await all of them. After `stop`
    /// returns, no further action will be dispatched and subsequent
    /// `add`/`after` calls return [`Error::AlreadyStopped`].
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        // Bucket workers on every level first, then the coordinator, then
        // (implicitly) the re-insertion pump.
        self.base.stop();

        // The coordinator owns the sole sender to the re-insertion pump;
        // when its thread exits after seeing this signal, that sender
        // drops, the pump's `recv()` returns `Err`, and the pump exits too.
        let _ = self.coordinator_stop.send(());

        let mut workers = self.workers.lock().unwrap();
        for handle in workers.drain(..) {
            if let Err(e) = handle.join() {
                error!("wheel timer background worker panicked: {e:?}");
            }
        }

        info!("wheel timer stopped");
    }

    /// Point-in-time counters.
    pub fn stats(&self) -> WheelTimerStats {
        let mut stats = self.metrics.snapshot();
        stats.overflow_wheels_created = self.base.overflow_wheels_created();
        stats
    }
}

impl Default for WheelTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// The clock-advance coordinator: drains every bucket that has fired,
/// advances the base wheel's notion of "now" to the latest expiration seen,
/// and hands the drained chains to the re-insertion pump.
fn spawn_coordinator(
    fired_rx: Receiver<Arc<Bucket>>,
    stop_rx: Receiver<()>,
    reinsert_tx: Sender<DrainedChains>,
    base: Arc<Wheel>,
    clock_advance: Arc<RwLock<()>>,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("cyclone-timer-coordinator".into())
        .spawn(move || loop {
            crossbeam_channel::select! {
                recv(fired_rx) -> msg => {
                    let bucket = match msg {
                        Ok(bucket) => bucket,
                        Err(_) => return,
                    };
                    let mut heads = Vec::new();
                    let mut max_expiration = i64::MIN;

                    if let Some(drained) = bucket.drain() {
                        max_expiration = drained.expiration_ms;
                        heads.push(drained.entries);
                    }

                    // Coalesce: non-blockingly drain any other buckets that
                    // have already fired, batching the write-lock critical
                    // section.
                    while let Ok(bucket) = fired_rx.try_recv() {
                        if let Some(drained) = bucket.drain() {
                            max_expiration = max_expiration.max(drained.expiration_ms);
                            heads.push(drained.entries);
                        }
                    }

                    if heads.is_empty() {
                        // Spurious wake: the bucket had already been
                        // drained by the time we got to it.
                        continue;
                    }

                    {
                        let _write_guard = clock_advance.write().unwrap();
                        base.advance_clock(max_expiration);
                    }

                    if reinsert_tx.send(heads).is_err() {
                        warn!("re-insertion pump gone; coordinator exiting");
                        return;
                    }
                }
                recv(stop_rx) -> _ => {
                    debug!("coordinator received stop signal");
                    return;
                }
            }
        })
        .expect("failed to spawn coordinator thread")
}

/// The re-insertion pump: takes each drained chain from the coordinator and
/// re-submits every entry into the base wheel, where it either dispatches
/// immediately (its wait has elapsed) or is demoted into whichever level
/// now covers its remaining wait.
fn spawn_reinsert_pump(
    reinsert_rx: Receiver<DrainedChains>,
    base: Arc<Wheel>,
    clock_advance: Arc<RwLock<()>>,
    dispatcher: Arc<DispatchBackend>,
    metrics: Arc<Metrics>,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("cyclone-timer-reinsert".into())
        .spawn(move || {
            while let Ok(heads) = reinsert_rx.recv() {
                for mut chain in heads {
                    while let Some(entry) = chain.pop_front() {
                        let _guard = clock_advance.read().unwrap();
                        let now_ms = base.current_time_ms();
                        match base.add_entry(entry, now_ms, dispatcher.as_ref()) {
                            Ok(dispatched) => {
                                if dispatched {
                                    metrics.fired.fetch_add(1, Ordering::Relaxed);
                                }
                            }
                            Err(e) => {
                                // Unreachable for entries that were
                                // previously admissible and are only being
                                // demoted, but recorded rather than
                                // silently dropped.
                                error!("re-insertion failed: {e}");
                                metrics.too_many_levels.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    }
                }
            }
        })
        .expect("failed to spawn re-insertion pump thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[test]
    fn minimal_scenario_fires_within_a_few_ticks() {
        let timer = WheelTimer::new();
        timer.start().unwrap();
        let fired = Arc::new(AtomicBool::new(false));
        let f = fired.clone();
        let now = crate::clock::SystemClock.now_ms();
        timer.add(now + 1, Box::new(move || f.store(true, Ordering::SeqCst))).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert!(fired.load(Ordering::SeqCst));
        timer.stop();
    }

    #[test]
    fn two_level_scenario_fires_in_order() {
        let timer = WheelTimer::new();
        timer.start().unwrap();
        let order = Arc::new(StdMutex::new(Vec::new()));
        let o1 = order.clone();
        let o2 = order.clone();
        timer.after(5, Box::new(move || o1.lock().unwrap().push("a"))).unwrap();
        timer.after(30, Box::new(move || o2.lock().unwrap().push("b"))).unwrap();
        thread::sleep(Duration::from_millis(150));
        assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);
        timer.stop();
    }

    #[test]
    fn rejection_scenario_returns_too_many_levels() {
        let timer = WheelTimer::new();
        timer.start().unwrap();
        let now = crate::clock::SystemClock.now_ms();
        let result = timer.add(now + 8_000_000_000_000_000_000, Box::new(|| {}));
        assert!(matches!(result, Err(Error::TooManyLevels)));
        timer.stop();
    }

    #[test]
    fn add_before_start_is_rejected() {
        let timer = WheelTimer::new();
        let result = timer.add(0, Box::new(|| {}));
        assert!(matches!(result, Err(Error::NotStarted)));
    }

    #[test]
    fn starting_twice_is_rejected() {
        let timer = WheelTimer::new();
        timer.start().unwrap();
        assert!(matches!(timer.start(), Err(Error::AlreadyStarted)));
        timer.stop();
    }

    #[test]
    fn stop_immediacy_no_action_runs_after_stop_returns() {
        let timer = WheelTimer::new();
        timer.start().unwrap();
        let fired = Arc::new(AtomicBool::new(false));
        let f = fired.clone();
        timer.after(10, Box::new(move || f.store(true, Ordering::SeqCst))).unwrap();
        timer.stop();
        let fired_at_stop = fired.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(fired.load(Ordering::SeqCst), fired_at_stop);
    }

    #[test]
    fn add_after_stop_is_rejected() {
        let timer = WheelTimer::new();
        timer.start().unwrap();
        timer.stop();
        let result = timer.add(0, Box::new(|| {}));
        assert!(matches!(result, Err(Error::AlreadyStopped)));
    }

    #[test]
    fn load_scenario_every_index_fires_exactly_once() {
        let timer = WheelTimer::new();
        timer.start().unwrap();
        const N: usize = 2_000;
        let counts: Arc<Vec<AtomicUsize>> =
            Arc::new((0..N).map(|_| AtomicUsize::new(0)).collect());
        let now = crate::clock::SystemClock.now_ms();
        for i in 0..N {
            let counts = counts.clone();
            let delay = (i % 5) as i64;
            timer
                .add(now + delay, Box::new(move || { counts[i].fetch_add(1, Ordering::SeqCst); }))
                .unwrap();
        }
        thread::sleep(Duration::from_millis(500));
        for c in counts.iter() {
            assert_eq!(c.load(Ordering::SeqCst), 1);
        }
        timer.stop();
    }

    #[test]
    fn with_clock_drives_expiration_arithmetic_from_the_injected_clock() {
        use crate::clock::FakeClock;

        // An arbitrary baseline nowhere near the real wall clock: if any
        // code path fell back to `SystemClock` instead of this injected
        // clock, the resulting gap between the wheel's `current_time` and
        // the computed expiration would exceed the deepest level's span
        // and this would return `TooManyLevels` instead of firing.
        let clock = Arc::new(FakeClock::new(1_000_000));
        let timer = WheelTimer::with_clock(clock.clone());
        timer.start().unwrap();

        let fired = Arc::new(AtomicBool::new(false));
        let f = fired.clone();
        timer.after(5, Box::new(move || f.store(true, Ordering::SeqCst))).unwrap();

        thread::sleep(Duration::from_millis(50));
        assert!(fired.load(Ordering::SeqCst));
        timer.stop();
    }

    #[test]
    fn concurrent_insert_during_advance_no_deadlock() {
        let timer = Arc::new(WheelTimer::new());
        timer.start().unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let timer = timer.clone();
                let fired = fired.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        let f = fired.clone();
                        let _ = timer.after(1, Box::new(move || { f.fetch_add(1, Ordering::SeqCst); }));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        thread::sleep(Duration::from_millis(300));
        assert_eq!(fired.load(Ordering::SeqCst), 1600);
        timer.stop();
    }
}
