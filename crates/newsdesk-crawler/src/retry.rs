//! Retry decisions for failed fetches.
//!
//! The policy is pure: it looks at a [`FetchFailure`] and the attempt number
//! and says whether to try again and after how long. Callers own the sleeping.
//!
//! # Backoff schedule (example with `base = 1s`, `max_delay = 30s`)
//!
//! | Failed attempt | Delay before next attempt (before jitter) |
//! |----------------|-------------------------------------------|
//! | 1 | 1 s |
//! | 2 | 2 s |
//! | 3 | 4 s |
//! | 6 | 30 s (capped) |
//!
//! Jitter in `[0, base)` is added on top and the sum is clamped to `max_delay`.

use std::time::Duration;

use rand::Rng;

use crate::fetch::FetchFailure;

/// HTTP statuses worth retrying. Every other HTTP error is permanent.
pub const TRANSIENT_STATUSES: [u16; 4] = [429, 502, 503, 504];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUpReason {
    PermanentStatus(u16),
    MaxAttemptsExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { after: Duration },
    GiveUp(GiveUpReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries per url, including the first one. Always at least 1.
    pub max_attempts: u32,
    pub base: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, base: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base,
            max_delay,
        }
    }

    #[must_use]
    pub fn is_transient(failure: &FetchFailure) -> bool {
        match failure {
            FetchFailure::Timeout | FetchFailure::NetworkError(_) => true,
            FetchFailure::HttpError(status) => TRANSIENT_STATUSES.contains(status),
        }
    }

    /// Decide what to do after `attempt` (1-based) failed with `failure`.
    #[must_use]
    pub fn decide(&self, failure: &FetchFailure, attempt: u32) -> RetryDecision {
        self.decide_with_jitter(failure, attempt, self.jitter())
    }

    /// [`decide`](Self::decide) with caller-supplied jitter.
    #[must_use]
    pub fn decide_with_jitter(
        &self,
        failure: &FetchFailure,
        attempt: u32,
        jitter: Duration,
    ) -> RetryDecision {
        if let FetchFailure::HttpError(status) = failure {
            if !Self::is_transient(failure) {
                return RetryDecision::GiveUp(GiveUpReason::PermanentStatus(*status));
            }
        }
        if attempt >= self.max_attempts {
            return RetryDecision::GiveUp(GiveUpReason::MaxAttemptsExceeded);
        }
        RetryDecision::Retry {
            after: (self.backoff(attempt) + jitter).min(self.max_delay),
        }
    }

    /// `base * 2^(attempt-1)` capped at `max_delay`, without jitter.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Backoff plus fresh jitter, clamped to `max_delay`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        (self.backoff(attempt) + self.jitter()).min(self.max_delay)
    }

    fn jitter(&self) -> Duration {
        let base_ms = u64::try_from(self.base.as_millis()).unwrap_or(u64::MAX);
        if base_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..base_ms))
    }
}
