// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable timestamps
//!
//! Timestamps are recorded into WAL payloads as microseconds since the Unix
//! epoch, so replaying a log never consults the clock again.

use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A clock that provides the current wall time
pub trait Clock: Send + Sync {
    /// Microseconds since the Unix epoch
    fn now_micros(&self) -> u64;
}

/// Real system clock
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_micros(&self) -> u64 {
        chrono::Utc::now().timestamp_micros().max(0) as u64
    }
}

/// Fake clock for testing with controllable time
#[derive(Clone)]
pub struct FakeClock {
    current: Arc<Mutex<u64>>,
}

impl FakeClock {
    /// Start the clock at 2026-01-01T00:00:00Z
    pub fn new() -> Self {
        Self::starting_at(1_767_225_600_000_000)
    }

    pub fn starting_at(micros: u64) -> Self {
        Self {
            current: Arc::new(Mutex::new(micros)),
        }
    }

    /// Advance the clock by the given duration
    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current += duration.as_micros() as u64;
    }

    /// Set the clock to a specific timestamp
    pub fn set(&self, micros: u64) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current = micros;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now_micros(&self) -> u64 {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
