//! Retry policy for failed generation attempts.
//!
//! [`RetryPolicy::decide`] is a pure function from (attempt, error kind) to
//! a decision: retry after a delay, or send to the dead-letter channel.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Default maximum number of processing attempts before dead-lettering.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay for the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(5);

/// Default cap on the retry delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Classification of a generation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Retryable: network faults, timeouts, provider rate limits.
    Transient,

    /// Not retryable: invalid prompt, deleted user, rejected request.
    Permanent,
}

/// Decision returned by [`RetryPolicy::decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Redeliver the message after the given delay.
    Retry(Duration),

    /// Stop retrying and route the message to the dead-letter channel.
    DeadLetter,
}

/// Bounded exponential backoff policy.
///
/// Transient errors retry up to `max_attempts` with delay
/// `base * 2^(attempt - 1)`, capped at `max_delay`. Exponential backoff
/// keeps a fleet of workers from hammering a rate-limited provider in
/// lockstep. Permanent errors dead-letter immediately.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (inclusive) before dead-lettering.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Upper bound on any retry delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Decide what to do after a failed attempt.
    ///
    /// `attempt` is the attempt number that just failed, starting at 1 and
    /// sourced from the message's redelivery header so it survives process
    /// restarts.
    #[must_use]
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if kind == ErrorKind::Permanent || attempt >= self.max_attempts {
            return RetryDecision::DeadLetter;
        }
        RetryDecision::Retry(self.delay_for(attempt))
    }

    /// Delay for the retry following the given failed attempt.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self.base_delay.saturating_mul(1u32 << exponent);
        delay.min(self.max_delay)
    }
}
