//! Exponential backoff policy shared by request retries and socket reconnects.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Capped exponential backoff: `delay(n) = min(base * 2^(n-1), cap)`.
///
/// `max_attempts` is interpreted by the caller. The retry step treats it as
/// the total number of transport attempts; the streaming client treats it as
/// the number of scheduled reconnects before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    base: Duration,
    cap: Duration,
    max_attempts: u32,
}

impl BackoffPolicy {
    pub const fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            cap,
            max_attempts,
        }
    }

    /// Request retry policy: 1s, 2s, 4s cap, 3 total attempts.
    pub const fn request_retry() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(4), 3)
    }

    /// Streaming reconnect policy: 2s doubling to a 32s cap, 5 reconnects.
    pub const fn reconnect() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(32), 5)
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn cap(&self) -> Duration {
        self.cap
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the given 1-indexed attempt. Attempt 0 is treated as 1.
    ///
    /// Saturates at `cap` instead of overflowing for large attempt numbers.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.max(1) - 1;
        let scaled = 1u32
            .checked_shl(exponent)
            .and_then(|factor| self.base.checked_mul(factor));
        match scaled {
            Some(delay) => delay.min(self.cap),
            None => self.cap,
        }
    }

    /// Delays for attempts `1..=max_attempts`.
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..=self.max_attempts).map(move |attempt| self.delay(attempt))
    }
}
