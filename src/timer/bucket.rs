//! `Bucket`: a tick-sized slot holding every entry that rounds down to the
//! same tick instant at a given wheel level, plus the one-shot delay that
//! arms when the bucket becomes non-empty.

use crate::delay::{DelayLine, ThreadDelayLine};
use crate::timer::entry::TaskEntry;
use crossbeam_channel::{Receiver, Sender};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;

struct BucketState {
    chain: VecDeque<TaskEntry>,
    /// The bucket's own tick instant, set when the chain transitions from
    /// empty to non-empty and cleared on drain. `None` while empty.
    expiration_ms: Option<i64>,
    /// Mirrors whether the delay line currently has an outstanding arm.
    /// Cleared by the bucket's own worker on observed fire, never by
    /// `add`/`drain` — clearing it from either of those would let a late
    /// caller to `add` race an in-flight wake and wrongly conclude the
    /// bucket is unarmed.
    armed: bool,
}

/// A drained chain, paired with the tick instant it was armed for — this
/// is what the coordinator needs to compute `max_expiration` without a
/// second, separately-locked read.
pub struct Drained {
    /// The bucket's tick instant at the moment of drain.
    pub expiration_ms: i64,
    /// Every entry that was chained in this bucket.
    pub entries: VecDeque<TaskEntry>,
}

/// A tick-sized slot in a [`Wheel`](crate::timer::wheel::Wheel) level.
pub struct Bucket {
    /// Stable identifier for debugging.
    index: usize,
    delay: Arc<dyn DelayLine>,
    state: Mutex<BucketState>,
}

impl Bucket {
    /// Construct an empty, unarmed bucket.
    pub fn new(index: usize) -> Self {
        Self {
            index,
            delay: Arc::new(ThreadDelayLine::new()),
            state: Mutex::new(BucketState {
                chain: VecDeque::new(),
                expiration_ms: None,
                armed: false,
            }),
        }
    }

    /// Stable debugging identifier.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Append `entry` to this bucket's chain. If the chain was empty,
    /// compute the bucket's tick instant (`entry.expiration_ms` rounded
    /// down to `tick_ms`) and arm the delay for it. Otherwise the existing
    /// delay is left untouched — it already covers every entry sharing
    /// this tick.
    pub fn add(&self, entry: TaskEntry, tick_ms: u64, now_ms: i64) {
        let mut st = self.state.lock().unwrap();
        if st.chain.is_empty() {
            let tick = tick_ms as i64;
            let expiration = entry.expiration_ms - entry.expiration_ms.rem_euclid(tick);
            let delay_ms = (expiration - now_ms).max(0) as u64;
            self.delay.arm(delay_ms);
            st.expiration_ms = Some(expiration);
            st.armed = true;
        }
        st.chain.push_back(entry);
    }

    /// Detach and return the chain atomically, along with the tick instant
    /// it was armed for. Returns `None` on an empty chain — drains must be
    /// tolerant of spurious wakes.
    pub fn drain(&self) -> Option<Drained> {
        let mut st = self.state.lock().unwrap();
        if st.chain.is_empty() {
            return None;
        }
        let expiration_ms = st
            .expiration_ms
            .take()
            .expect("non-empty chain implies a set expiration");
        Some(Drained {
            expiration_ms,
            entries: std::mem::take(&mut st.chain),
        })
    }

    fn clear_armed(&self) {
        self.state.lock().unwrap().armed = false;
    }

    fn is_armed(&self) -> bool {
        self.state.lock().unwrap().armed
    }

    /// Spawn this bucket's independent worker thread. `coordinator_tx` is a
    /// non-owning handle used solely to signal the fired bucket to the
    /// clock-advance coordinator; `stop_rx` is this bucket's private stop
    /// channel.
    pub fn spawn_worker(
        bucket: Arc<Bucket>,
        coordinator_tx: Sender<Arc<Bucket>>,
        stop_rx: Receiver<()>,
    ) -> thread::JoinHandle<()> {
        thread::Builder::new()
            .name(format!("cyclone-timer-bucket-{}", bucket.index))
            .spawn(move || loop {
                crossbeam_channel::select! {
                    recv(bucket.delay.fired()) -> _ => {
                        let _ = coordinator_tx.send(bucket.clone());
                        bucket.clear_armed();
                    }
                    recv(stop_rx) -> _ => {
                        bucket.delay.cancel();
                        if bucket.is_armed() {
                            let _ = bucket.delay.fired().try_recv();
                        }
                        return;
                    }
                }
            })
            .expect("failed to spawn bucket worker thread")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    fn entry(expiration_ms: i64) -> TaskEntry {
        TaskEntry::new(expiration_ms, Box::new(|| {}))
    }

    #[test]
    fn add_to_empty_bucket_sets_expiration_rounded_down() {
        let bucket = Bucket::new(0);
        bucket.add(entry(1234), 100, 0);
        let drained = bucket.drain().unwrap();
        assert_eq!(drained.expiration_ms, 1200);
        assert_eq!(drained.entries.len(), 1);
    }

    #[test]
    fn add_to_nonempty_bucket_leaves_expiration_untouched() {
        let bucket = Bucket::new(0);
        bucket.add(entry(1234), 100, 0);
        bucket.add(entry(1290), 100, 0);
        let drained = bucket.drain().unwrap();
        assert_eq!(drained.expiration_ms, 1200);
        assert_eq!(drained.entries.len(), 2);
    }

    #[test]
    fn drain_on_empty_bucket_is_a_no_op() {
        let bucket = Bucket::new(0);
        assert!(bucket.drain().is_none());
    }

    #[test]
    fn worker_forwards_fire_to_coordinator_and_clears_armed() {
        let bucket = Arc::new(Bucket::new(0));
        bucket.add(entry(0), 1, 0);
        let (coord_tx, coord_rx) = bounded::<Arc<Bucket>>(4);
        let (_stop_tx, stop_rx) = bounded::<()>(1);
        let handle = Bucket::spawn_worker(bucket.clone(), coord_tx, stop_rx);

        let fired = coord_rx.recv_timeout(std::time::Duration::from_millis(200)).unwrap();
        assert_eq!(fired.index(), 0);
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(!bucket.is_armed());

        bucket.delay.cancel();
        drop(handle);
    }

    #[test]
    fn stop_cancels_delay_and_exits() {
        let bucket = Arc::new(Bucket::new(0));
        let (coord_tx, _coord_rx) = bounded::<Arc<Bucket>>(4);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = Bucket::spawn_worker(bucket.clone(), coord_tx, stop_rx);
        stop_tx.send(()).unwrap();
        handle.join().unwrap();
    }
}
