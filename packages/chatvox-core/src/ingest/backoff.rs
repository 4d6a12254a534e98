//! Exponential reconnect backoff.

use std::time::Duration;

use crate::protocol_constants::{RECONNECT_BASE_DELAY_MS, RECONNECT_MAX_DELAY_MS};

/// Reconnect delay schedule: `min(base * 2^attempt, max)`.
///
/// The attempt counter grows after every failed or closed connection and is
/// reset only once a connection opens successfully.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(RECONNECT_BASE_DELAY_MS),
            Duration::from_millis(RECONNECT_MAX_DELAY_MS),
        )
    }
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            attempt: 0,
        }
    }

    /// Number of consecutive failures so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay for a given attempt number, saturating at `max`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        1u32.checked_shl(attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Returns the delay for the current attempt and counts the failure.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.delay_for(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Called after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
