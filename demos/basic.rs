//! Basic `WheelTimer` usage: schedule a handful of actions at different
//! delays and watch them fire in order.
//!
//! Run with: `cargo run --example basic` (place under a `[[example]]` entry
//! pointing at this file, or copy it into `examples/` in a consuming crate).

use cyclone_timer::WheelTimer;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

fn main() {
    tracing_subscriber::fmt::init();

    let timer = WheelTimer::new();
    timer.start().expect("start a fresh wheel timer");

    let fired = Arc::new(AtomicUsize::new(0));

    for (name, delay_ms) in [("fast", 5u64), ("medium", 50), ("slow", 200)] {
        let fired = fired.clone();
        timer
            .after(
                delay_ms,
                Box::new(move || {
                    let n = fired.fetch_add(1, Ordering::SeqCst) + 1;
                    info!("timer '{name}' fired (#{n} overall)");
                }),
            )
            .expect("submit within the wheel's horizon");
    }

    std::thread::sleep(Duration::from_millis(300));
    info!("stats: {:?}", timer.stats());
    timer.stop();
}
