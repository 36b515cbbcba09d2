//! Runtime tuning.

use std::time::Duration;

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Frames buffered between the reader task and the processing loop
    pub fifo_capacity: usize,
    /// Longest the processing loop waits before a timeout sweep when the bus
    /// is silent
    pub sweep_interval: Duration,
    /// Events buffered per subscriber before slow subscribers start lagging
    pub event_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            fifo_capacity: 256,
            sweep_interval: Duration::from_millis(100),
            event_capacity: 64,
        }
    }
}
