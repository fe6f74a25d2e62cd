//! Single-shot, cancel-and-resettable delay primitive: each bucket owns one,
//! arming it for its own tick instant once the bucket becomes non-empty.
//!
//! [`ThreadDelayLine`] is the concrete implementation backing each
//! [`Bucket`](crate::timer::bucket::Bucket): one dedicated OS thread per
//! instance, parked on a channel recv-with-timeout rather than a condvar,
//! so the "fire" event is itself a channel the bucket worker can
//! `select!` against alongside its own stop signal.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

enum Command {
    Arm(Duration),
    Stop,
}

/// Arm-with-delay, observable-fire, cancel primitive.
///
/// `fired()` exposes the receiving end of the fire channel so a caller can
/// `select!` on it alongside other events.
pub trait DelayLine: Send + Sync {
    /// Arm the delay to fire `delay_ms` milliseconds from now. Armed state
    /// replaces any previous arm; the owning bucket only calls this while
    /// transitioning from empty to non-empty, never concurrently with an
    /// in-flight arm.
    fn arm(&self, delay_ms: u64);

    /// The channel on which a single `()` is sent when the delay fires.
    fn fired(&self) -> &Receiver<()>;

    /// Cooperatively cancel. If a fire raced with cancellation and already
    /// landed in the `fired()` channel, the caller is responsible for
    /// draining it (see `Bucket`'s worker loop) — cancellation here only
    /// stops the background thread and future fires.
    fn cancel(&self);
}

/// The default [`DelayLine`]: one background thread per bucket, parked via
/// `recv_timeout` on its command channel.
pub struct ThreadDelayLine {
    commands: Sender<Command>,
    fire_rx: Receiver<()>,
    worker: Option<thread::JoinHandle<()>>,
}

impl ThreadDelayLine {
    /// Spawn the background worker thread. The delay starts unarmed: the
    /// worker blocks on `commands.recv()` until the first `arm`.
    pub fn new() -> Self {
        let (cmd_tx, cmd_rx) = bounded::<Command>(1);
        let (fire_tx, fire_rx) = bounded::<()>(1);

        let worker = thread::Builder::new()
            .name("cyclone-timer-delay".into())
            .spawn(move || Self::run(cmd_rx, fire_tx))
            .expect("failed to spawn delay-line worker thread");

        Self {
            commands: cmd_tx,
            fire_rx,
            worker: Some(worker),
        }
    }

    fn run(commands: Receiver<Command>, fired: Sender<()>) {
        loop {
            match commands.recv() {
                Ok(Command::Arm(mut remaining)) => loop {
                    match commands.recv_timeout(remaining) {
                        Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => return,
                        Ok(Command::Arm(new_delay)) => {
                            // A re-arm while already armed is not part of
                            // the spec's bucket protocol, but honoring it
                            // keeps this primitive correct standalone.
                            remaining = new_delay;
                            continue;
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            let _ = fired.send(());
                            break;
                        }
                    }
                },
                Ok(Command::Stop) | Err(_) => return,
            }
        }
    }
}

impl Default for ThreadDelayLine {
    fn default() -> Self {
        Self::new()
    }
}

impl DelayLine for ThreadDelayLine {
    fn arm(&self, delay_ms: u64) {
        let _ = self.commands.send(Command::Arm(Duration::from_millis(delay_ms)));
    }

    fn fired(&self) -> &Receiver<()> {
        &self.fire_rx
    }

    fn cancel(&self) {
        let _ = self.commands.send(Command::Stop);
    }
}

impl Drop for ThreadDelayLine {
    fn drop(&mut self) {
        self.cancel();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn fires_after_the_armed_delay() {
        let delay = ThreadDelayLine::new();
        let start = Instant::now();
        delay.arm(20);
        delay.fired().recv_timeout(Duration::from_millis(200)).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn cancel_before_fire_suppresses_the_fire() {
        let delay = ThreadDelayLine::new();
        delay.arm(500);
        delay.cancel();
        assert_eq!(
            delay.fired().recv_timeout(Duration::from_millis(50)),
            Err(RecvTimeoutError::Timeout)
        );
    }

    #[test]
    fn cancel_after_fire_does_not_panic_and_fire_is_still_observable() {
        let delay = ThreadDelayLine::new();
        delay.arm(5);
        delay.fired().recv_timeout(Duration::from_millis(200)).unwrap();
        delay.cancel();
    }
}
