use std::{num::NonZeroU32, time::Duration};

use nonzero_ext::nonzero;

/// Bounded retry with exponential backoff.
///
/// Attempt 1 is sent immediately; the delay before attempt *k* (k ≥ 2) is
/// `base_backoff × 2^(k-2)`, so a budget of 3 with a 1s base waits 1s then 2s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub attempt_budget: NonZeroU32,
    /// Delay before the second attempt.
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub const fn new(attempt_budget: NonZeroU32, base_backoff: Duration) -> Self {
        Self {
            attempt_budget,
            base_backoff,
        }
    }

    /// Delay to wait before `attempt` (1-indexed). `None` for the first attempt.
    pub fn delay_before(&self, attempt: u32) -> Option<Duration> {
        if attempt < 2 {
            return None;
        }
        let exp = (attempt - 2).min(31);
        Some(self.base_backoff.saturating_mul(1u32 << exp))
    }

    /// Sum of every backoff delay a fully exhausted budget sleeps through.
    pub fn total_backoff(&self) -> Duration {
        (2..=self.attempt_budget.get())
            .filter_map(|attempt| self.delay_before(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(nonzero!(3u32), Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_from_the_second_attempt() {
        let b = Duration::from_millis(250);
        let policy = RetryPolicy::new(nonzero!(5u32), b);
        assert_eq!(policy.delay_before(1), None);
        assert_eq!(policy.delay_before(2), Some(b));
        assert_eq!(policy.delay_before(3), Some(b * 2));
        assert_eq!(policy.delay_before(4), Some(b * 4));
        assert_eq!(policy.delay_before(5), Some(b * 8));
        assert_eq!(policy.total_backoff(), b * 15);
    }

    #[test]
    fn single_attempt_never_sleeps() {
        let policy = RetryPolicy::new(nonzero!(1u32), Duration::from_secs(1));
        assert_eq!(policy.total_backoff(), Duration::ZERO);
    }

    #[test]
    fn huge_attempt_numbers_saturate() {
        let policy = RetryPolicy::new(nonzero!(3u32), Duration::from_secs(1));
        assert!(policy.delay_before(u32::MAX).is_some());
    }

    #[test]
    fn default_is_three_attempts_one_second() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempt_budget.get(), 3);
        assert_eq!(policy.total_backoff(), Duration::from_secs(3));
    }
}
