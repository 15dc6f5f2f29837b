//! Wait strategies for polling loops

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// How a polling loop pauses between polls and measures elapsed time
pub trait WaitStrategy: Send + Sync {
    fn pause(&self, interval: Duration);

    /// Time since the strategy was created
    fn elapsed(&self) -> Duration;
}

/// Real clock: sleeps the calling thread
#[derive(Debug)]
pub struct SleepWait {
    started: Instant,
}

impl SleepWait {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SleepWait {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for SleepWait {
    fn pause(&self, interval: Duration) {
        std::thread::sleep(interval);
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Virtual clock advanced by each pause; never sleeps
#[derive(Debug, Default)]
pub struct ImmediateWait {
    state: Mutex<(Duration, usize)>,
}

impl ImmediateWait {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pauses taken so far
    pub fn pauses(&self) -> usize {
        self.state.lock().1
    }
}

impl WaitStrategy for ImmediateWait {
    fn pause(&self, interval: Duration) {
        {
            let mut state = self.state.lock();
            state.0 += interval;
            state.1 += 1;
        }
        std::thread::yield_now();
    }

    fn elapsed(&self) -> Duration {
        self.state.lock().0
    }
}
