use std::time::Duration;

/// Delay before the first reconnection attempt.
pub const BASE_DELAY: Duration = Duration::from_millis(1_000);
/// Upper bound for any reconnection delay.
pub const MAX_DELAY: Duration = Duration::from_millis(30_000);
/// Floor for a configured base delay; zero would reconnect in a hot loop.
pub const MIN_BASE_DELAY: Duration = Duration::from_millis(1);

/// # Backoff Policy
///
/// `delay(n) = min(base * 2^n, max)`, no jitter. The same failure count always
/// yields the same delay, and the exponent saturates at `max` instead of
/// overflowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: BASE_DELAY,
            max: MAX_DELAY,
        }
    }
}

impl Backoff {
    /// `base` is at least one millisecond, and a `max` below `base` is
    /// raised to `base`.
    pub fn new(base: Duration, max: Duration) -> Self {
        let base = base.max(MIN_BASE_DELAY);
        Self {
            base,
            max: max.max(base),
        }
    }

    pub fn from_millis(base_ms: u64, max_ms: u64) -> Self {
        Self::new(Duration::from_millis(base_ms), Duration::from_millis(max_ms))
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Delay to wait after `failure_count` consecutive failures.
    pub fn delay(&self, failure_count: u32) -> Duration {
        1u32.checked_shl(failure_count)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }
}
