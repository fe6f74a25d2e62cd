//! Action-dispatch mechanism: hands a fired entry's closure off for
//! execution, exactly once, possibly concurrently with other fired actions.

use crossbeam_channel::{bounded, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;
use tracing::error;

/// An opaque, parameterless user action.
pub type Action = Box<dyn FnOnce() + Send + 'static>;

/// Dispatches a fired action for execution.
///
/// A panicking action must never take down a dispatcher worker or the
/// wheel's background threads — implementations are expected to isolate
/// panics with [`catch_unwind`].
pub trait ActionDispatcher: Send + Sync {
    /// Hand `action` off for execution. Returns immediately; the action
    /// itself may still be running (or queued) when this returns.
    fn dispatch(&self, action: Action);
}

fn run_isolated(action: Action) {
    if catch_unwind(AssertUnwindSafe(action)).is_err() {
        error!("timer action panicked; isolated by the dispatcher");
    }
}

/// Spawns a fresh, detached OS thread per dispatched action.
///
/// The simplest faithful dispatcher — adequate for coarse-grained,
/// infrequent actions; a high fire-rate workload should prefer
/// [`PoolDispatcher`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SpawnDispatcher;

impl ActionDispatcher for SpawnDispatcher {
    fn dispatch(&self, action: Action) {
        let builder = thread::Builder::new().name("cyclone-timer-action".into());
        if let Err(e) = builder.spawn(move || run_isolated(action)) {
            error!("failed to spawn action thread: {e}");
        }
    }
}

/// A fixed pool of worker threads fed by a bounded channel.
///
/// Scales better than [`SpawnDispatcher`] once the fire rate is high enough
/// that a fresh OS thread per action becomes the bottleneck.
pub struct PoolDispatcher {
    tx: Option<Sender<Action>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl PoolDispatcher {
    /// Spawn `workers` threads, each pulling actions off a bounded channel
    /// of capacity `queue_capacity`.
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        assert!(workers > 0, "PoolDispatcher requires at least one worker");
        let (tx, rx) = bounded::<Action>(queue_capacity.max(1));

        let handles = (0..workers)
            .map(|i| {
                let rx = rx.clone();
                thread::Builder::new()
                    .name(format!("cyclone-timer-pool-{i}"))
                    .spawn(move || {
                        while let Ok(action) = rx.recv() {
                            run_isolated(action);
                        }
                    })
                    .expect("failed to spawn pool dispatcher worker")
            })
            .collect();

        Self { tx: Some(tx), workers: handles }
    }
}

impl ActionDispatcher for PoolDispatcher {
    fn dispatch(&self, action: Action) {
        match &self.tx {
            Some(tx) if tx.send(action).is_ok() => {}
            _ => error!("pool dispatcher queue is gone; dropping action"),
        }
    }
}

impl Drop for PoolDispatcher {
    fn drop(&mut self) {
        // Drop the sender first so every worker's blocking `recv()` sees a
        // closed channel once the queue drains, instead of joining threads
        // that are still waiting for work that can never arrive.
        self.tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}
