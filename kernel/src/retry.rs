//! Bounded retry of operations that can fail transiently.

use core::time::Duration;

use crate::{code::*, error::KernelResult as Result, time};

/// How often, and how patiently, to retry an operation that reports `EBUSY` or `EAGAIN`.
///
/// Attempt `n` (counting from zero) is preceded by a sleep of
/// `initial_delay * multiplier^(n - 1)`, capped at `max_delay`. Other errors are returned
/// at once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
}

impl RetryPolicy {
    /// A single attempt.
    pub const fn none() -> Self {
        RetryPolicy {
            attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1,
        }
    }

    /// `attempts` tries, `delay` apart.
    pub const fn fixed(attempts: u32, delay: Duration) -> Self {
        RetryPolicy {
            attempts,
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1,
        }
    }

    /// `attempts` tries, the pause doubling each time up to `max_delay`.
    pub const fn exponential(attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        RetryPolicy {
            attempts,
            initial_delay,
            max_delay,
            multiplier: 2,
        }
    }

    /// Pause before attempt `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = self.multiplier.max(1).saturating_pow(attempt - 1);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
            .min(self.max_delay.max(self.initial_delay))
    }

    /// Runs `f` until it succeeds, fails with something other than `EBUSY`/`EAGAIN`, or the
    /// attempts run out. `f` gets the attempt number.
    ///
    /// A policy with zero attempts still runs `f` once.
    pub fn run<T>(&self, what: &str, mut f: impl FnMut(u32) -> Result<T>) -> Result<T> {
        let attempts = self.attempts.max(1);
        let mut attempt = 0;
        loop {
            time::fsleep(self.delay_for(attempt));
            match f(attempt) {
                Err(e) if (e == EBUSY || e == EAGAIN) && attempt + 1 < attempts => {
                    log::warn!(
                        "{}: {:?} on attempt {}/{}, retrying",
                        what,
                        e,
                        attempt + 1,
                        attempts
                    );
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}
