//! Monotonic clock source with skew mitigation
//!
//! Provides a wall-clock microsecond timestamp that never goes backward,
//! and a configurable safety margin for retention decisions.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

/// A clock source that guarantees monotonically increasing timestamps
/// and provides skew-aware cutoffs for retention decisions.
pub struct BoundedClock {
    /// High-water mark: the largest timestamp we've ever returned (micros)
    high_water_micros: AtomicI64,
    /// Maximum tolerated clock skew (micros). Applied as a safety margin
    /// when computing retention cutoffs to avoid premature deletion.
    max_skew_micros: i64,
}

impl BoundedClock {
    /// Create a new BoundedClock with the given maximum skew tolerance.
    pub fn new(max_skew: std::time::Duration) -> Self {
        Self {
            high_water_micros: AtomicI64::new(0),
            max_skew_micros: max_skew.as_micros() as i64,
        }
    }

    /// Returns a monotonically increasing microsecond timestamp.
    ///
    /// If the wall clock has gone backward (e.g. NTP adjustment),
    /// returns the previous high-water mark + 1us instead.
    pub fn now_micros(&self) -> i64 {
        let wall = Utc::now().timestamp_micros();
        loop {
            let prev = self.high_water_micros.load(Ordering::Acquire);
            let ts = wall.max(prev + 1);
            match self.high_water_micros.compare_exchange_weak(
                prev,
                ts,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return ts,
                Err(_) => continue, // CAS failed, retry
            }
        }
    }

    /// Returns a retention cutoff timestamp that accounts for clock skew.
    ///
    /// The cutoff is shifted earlier by `max_skew` so that chunks whose
    /// timestamps were recorded on a clock running ahead are not deleted
    /// prematurely.
    pub fn retention_cutoff_micros(&self, retention_micros: i64) -> i64 {
        let now = self.now_micros();
        now - retention_micros - self.max_skew_micros
    }

    /// Returns the lateness cutoff: samples strictly older are rejected.
    pub fn lateness_cutoff_micros(&self, lateness_micros: i64) -> i64 {
        self.now_micros() - lateness_micros
    }

    /// Returns the configured max skew tolerance.
    pub fn max_skew(&self) -> std::time::Duration {
        std::time::Duration::from_micros(self.max_skew_micros as u64)
    }
}

impl Default for BoundedClock {
    fn default() -> Self {
        // 30 second default, generous enough for most NTP-synced environments
        Self::new(std::time::Duration::from_secs(30))
    }
}
