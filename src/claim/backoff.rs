// ============================================================================
// Backoff Policies
// ============================================================================
//
// pacing()          delay after every committed message (dead-letter mode)
// retry_delay(n)    delay before the n-th redelivery of the same message
//
// ============================================================================

use std::time::Duration;

pub trait BackoffPolicy: Send + Sync {
    fn pacing(&self) -> Duration;

    /// `attempt` starts at 1 for the first redelivery
    fn retry_delay(&self, attempt: u32) -> Duration;
}

/// Same interval for pacing and every retry
#[derive(Debug, Clone, Copy)]
pub struct FixedBackoff {
    interval: Duration,
}

impl FixedBackoff {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl BackoffPolicy for FixedBackoff {
    fn pacing(&self) -> Duration {
        self.interval
    }

    fn retry_delay(&self, _attempt: u32) -> Duration {
        self.interval
    }
}

/// Doubling retry delay, capped at `max`; pacing stays fixed
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    pacing: Duration,
    base: Duration,
    max: Duration,
}

impl ExponentialBackoff {
    pub fn new(pacing: Duration, base: Duration, max: Duration) -> Self {
        Self { pacing, base, max }
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn pacing(&self) -> Duration {
        self.pacing
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << shift)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}
