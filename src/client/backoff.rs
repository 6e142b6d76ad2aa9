//! Reconnection backoff policy

use std::time::Duration;

/// Exponential backoff with a cap
///
/// `delay(attempt) = min(base × 2^attempt, cap)`. The attempt counter is
/// owned by the session manager and reset after a fully successful
/// reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub base: Duration,

    /// Upper bound on any retry delay
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    /// Create a policy with explicit base and cap
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Delay for the given zero-based attempt index
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base.saturating_mul(factor).min(self.cap)
    }
}
