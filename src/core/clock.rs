//! Simulated wall clock coupled to a block counter.
//!
//! Time has millisecond precision and never goes negative. The block number follows
//! the timestamp at a fixed ratio of one block per [`BLOCK_INTERVAL_MS`] and may be
//! fractional; it only moves through `add_time`, `subtract_time` and `add_blocks`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::error::SimError;

/// Simulated block interval.
pub const BLOCK_INTERVAL_MS: u64 = 500;

/// Errors produced by clock mutation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClockError {
    #[error("Blockchain time must not go negative: current {current_ms} ms, subtracting {requested_ms} ms")]
    NegativeTime { current_ms: u64, requested_ms: u64 },

    #[error("Blockchain time overflow: current {current_ms} ms, adding {requested_ms} ms")]
    Overflow { current_ms: u64, requested_ms: u64 },
}

impl From<ClockError> for SimError {
    fn from(err: ClockError) -> Self {
        match err {
            ClockError::NegativeTime { current_ms, requested_ms } => SimError::NegativeTime {
                current_ms,
                requested_ms,
            },
            other => SimError::Clock(other.to_string()),
        }
    }
}

/// A point in simulated time, in milliseconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TimePoint(u64);

impl TimePoint {
    pub const fn from_millis(ms: u64) -> Self {
        TimePoint(ms)
    }

    pub const fn from_secs(secs: u64) -> Self {
        TimePoint(secs * 1000)
    }

    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    pub const fn as_secs(&self) -> u64 {
        self.0 / 1000
    }
}

impl fmt::Display for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clock {
    timestamp: TimePoint,
    block_num: f64,
}

impl Clock {
    pub fn new(timestamp: TimePoint, block_num: f64) -> Self {
        Self { timestamp, block_num }
    }

    pub fn timestamp(&self) -> TimePoint {
        self.timestamp
    }

    pub fn block_num(&self) -> f64 {
        self.block_num
    }

    /// Sets the timestamp. The block number is left where it is.
    pub fn set_time(&mut self, time: TimePoint) {
        self.timestamp = time;
    }

    pub fn add_time(&mut self, delta: TimePoint) -> Result<(), ClockError> {
        let ms = delta.as_millis();
        let next = self
            .timestamp
            .as_millis()
            .checked_add(ms)
            .ok_or(ClockError::Overflow {
                current_ms: self.timestamp.as_millis(),
                requested_ms: ms,
            })?;
        self.block_num += ms as f64 / BLOCK_INTERVAL_MS as f64;
        self.timestamp = TimePoint::from_millis(next);
        Ok(())
    }

    /// Fails with `NegativeTime`, leaving the clock untouched, if `delta` exceeds the current time.
    pub fn subtract_time(&mut self, delta: TimePoint) -> Result<(), ClockError> {
        let ms = delta.as_millis();
        let current = self.timestamp.as_millis();
        if current < ms {
            return Err(ClockError::NegativeTime {
                current_ms: current,
                requested_ms: ms,
            });
        }
        self.block_num -= ms as f64 / BLOCK_INTERVAL_MS as f64;
        self.timestamp = TimePoint::from_millis(current - ms);
        Ok(())
    }

    pub fn add_blocks(&mut self, count: u64) -> Result<(), ClockError> {
        let ms = count.checked_mul(BLOCK_INTERVAL_MS).ok_or(ClockError::Overflow {
            current_ms: self.timestamp.as_millis(),
            requested_ms: u64::MAX,
        })?;
        self.add_time(TimePoint::from_millis(ms))
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(TimePoint::default(), 0.0)
    }
}
