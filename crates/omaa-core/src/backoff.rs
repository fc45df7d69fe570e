//! # Retry Policy
//!
//! Pure backoff arithmetic for retryable delivery failures.
//!
//! ## Schedule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Exponential Backoff (defaults)                       │
//! │                                                                         │
//! │  failure #   delay          failure #   delay                           │
//! │  ─────────   ─────          ─────────   ─────                           │
//! │      1        1s                6        32s                            │
//! │      2        2s                7        64s                            │
//! │      3        4s                8       128s                            │
//! │      4        8s                9       256s                            │
//! │      5       16s               10       DEAD LETTER                     │
//! │                                                                         │
//! │  delay(n) = min(BASE_DELAY × 2^(n-1), MAX_DELAY)                        │
//! │  n ≥ MAX_RETRIES  → item is dropped and audited as ERROR               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No jitter: the queue has a single worker, so there is no herd to spread.

use std::time::Duration;

use crate::{BASE_DELAY_MS, MAX_DELAY_SECS, MAX_RETRIES};

/// What to do with an item after a retryable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Make the item eligible again after the delay.
    RetryAfter(Duration),
    /// Retry budget exhausted.
    DeadLetter,
}

/// Backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay after the first failure.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Attempt count at which an item is dead-lettered.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            base_delay: Duration::from_millis(BASE_DELAY_MS),
            max_delay: Duration::from_secs(MAX_DELAY_SECS),
            max_retries: MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy from explicit parameters.
    pub const fn new(base_delay: Duration, max_delay: Duration, max_retries: u32) -> Self {
        RetryPolicy {
            base_delay,
            max_delay,
            max_retries,
        }
    }

    /// Delay before the next attempt, given the number of attempts made so far.
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use omaa_core::backoff::RetryPolicy;
    ///
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.delay_for(1), Duration::from_secs(1));
    /// assert_eq!(policy.delay_for(4), Duration::from_secs(8));
    /// assert_eq!(policy.delay_for(40), Duration::from_secs(3600));
    /// ```
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1);
        // 2^32 already exceeds any sane cap, so clamp before shifting.
        let factor = 1u32.checked_shl(exponent.min(31)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Decides between rescheduling and dead-lettering.
    ///
    /// `attempts` is the count *after* the failed attempt was recorded.
    pub fn decide(&self, attempts: u32) -> RetryDecision {
        if attempts >= self.max_retries {
            RetryDecision::DeadLetter
        } else {
            RetryDecision::RetryAfter(self.delay_for(attempts))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_schedule_doubles_from_one_second() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (1..=9).map(|n| policy.delay_for(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 64, 128, 256]);
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(13), Duration::from_secs(3600));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(3600));
    }

    #[test]
    fn test_dead_letter_at_max_retries() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(9), RetryDecision::RetryAfter(Duration::from_secs(256)));
        assert_eq!(policy.decide(10), RetryDecision::DeadLetter);
        assert_eq!(policy.decide(11), RetryDecision::DeadLetter);
    }

    #[test]
    fn test_custom_policy() {
        let policy = RetryPolicy::new(Duration::from_millis(250), Duration::from_secs(1), 3);
        assert_eq!(policy.delay_for(1), Duration::from_millis(250));
        assert_eq!(policy.delay_for(3), Duration::from_secs(1));
        assert_eq!(policy.decide(3), RetryDecision::DeadLetter);
    }
}
