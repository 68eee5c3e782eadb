//! # Exponential Backoff
//!
//! Doubling backoff for retryable reconcile failures.
//!
//! Each failure doubles the delay until it reaches the ceiling; a success
//! resets the sequence.
//!
//! ## Usage
//!
//! ```rust
//! use secret_sync_controller::controller::backoff::ExponentialBackoff;
//! use std::time::Duration;
//!
//! let mut backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(5));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(4));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(5)); // capped
//! ```

use std::time::Duration;

/// Exponential backoff calculator
///
/// Each object owns one; backoff state is never shared between objects.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// First delay (also the value after a reset)
    start: Duration,
    /// Delay returned by the next call
    current: Duration,
    /// Ceiling
    max: Duration,
    /// Failures since the last reset
    attempts: u32,
}

impl ExponentialBackoff {
    /// Create a backoff starting at `start` and capped at `max`
    ///
    /// A zero `start` still advances: it is treated as one millisecond.
    #[must_use]
    pub fn new(start: Duration, max: Duration) -> Self {
        let start = start.max(Duration::from_millis(1));
        Self {
            start,
            current: start.min(max),
            max,
            attempts: 0,
        }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        self.attempts = self.attempts.saturating_add(1);
        result
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.current = self.start.min(self.max);
        self.attempts = 0;
    }

    /// Failures since the last reset
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
