//! Wall-clock accumulators for the timed repetition loops.

use std::time::{Duration, Instant};

/// Sums the time spent in the computation part of each repetition,
/// excluding the collectives around it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ComputeTimer {
    elapsed: Duration,
}

impl ComputeTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` and add its duration to the total.
    pub fn measure<T>(&mut self, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.elapsed += start.elapsed();
        out
    }

    pub fn seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// Elapsed time between two instants.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    start: Instant,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn seconds(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}
