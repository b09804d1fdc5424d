//! Wall-clock pacing for the tick loop.
//!
//! The interpreter core couples its timers 1:1 to ticks and leaves
//! rate limiting to the driver; this clock is that rate limit.
use std::{
    thread,
    time::{Duration, Instant},
};

pub struct Clock {
    start: Instant,
    cycle: Duration,
}

impl Clock {
    /// Creates a new clock with the current time as internal state.
    pub fn new(cycle: Duration) -> Self {
        Self {
            start: Instant::now(),
            cycle,
        }
    }

    /// Set the clock state back to zero.
    pub fn reset(&mut self) {
        self.start = Instant::now()
    }

    /// Block the current thread until the next clock cycle.
    ///
    /// A zero cycle time means the clock is unthrottled.
    pub fn wait(&mut self) {
        if self.cycle.is_zero() {
            return;
        }

        loop {
            if self.start.elapsed() < self.cycle {
                // Sleep does not have enough resolution, and causes
                // the clock to run at 30 FPS.
                //
                // Spinning a loop causes high CPU usage and fan madness.
                //
                // Yielding in a loop is the best alternative.
                thread::yield_now();
            } else {
                // Reset back to zero, rather than trying to catch up.
                self.reset();
                return;
            }
        }
    }
}
