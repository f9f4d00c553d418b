//! Pacing for reopening watch streams.
//!
//! A watch stream usually ends because the API server went away. All node
//! watchers of that cluster see the end at about the same time, so reopening
//! immediately turns one outage into a burst of list calls per node. Delays
//! follow the Fibonacci sequence: the first reopen is fast, a cluster that
//! stays down is retried at most once a minute. A stream that finishes its
//! initial listing counts as healthy and starts the sequence over.

use std::time::Duration;

/// Delays between reopen attempts: 1s, 1s, 2s, 3s, 5s, ... capped at the maximum
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    first: Duration,
    max: Duration,
    prev: Duration,
    current: Duration,
}

impl Default for FibonacciBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

impl FibonacciBackoff {
    /// Sequence starting at `first` that never exceeds `max`
    #[must_use]
    pub fn new(first: Duration, max: Duration) -> Self {
        Self {
            first,
            max,
            prev: Duration::ZERO,
            current: first.min(max),
        }
    }

    /// Delay before the next reopen
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.prev + self.current).min(self.max);
        self.prev = delay;
        delay
    }

    /// Start over after a healthy stream
    pub fn reset(&mut self) {
        *self = Self::new(self.first, self.max);
    }
}
