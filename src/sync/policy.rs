use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::models::{ItemState, QueueItem};

/// Exponential backoff with a ceiling on attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failed attempts before an item is dead-lettered. 0 retries forever.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Add up to 10% random delay so a fleet coming back online does not retry in lockstep.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(3600),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Retry immediately, forever. The behaviour of the old client.
    pub fn unbounded() -> Self {
        Self {
            max_attempts: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// Delay before the next attempt after `attempts` failures: base * 2^(attempts-1), capped.
    pub fn backoff(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }
        let exponent = (attempts - 1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let spread = (delay.as_millis() / 10) as u64;
        delay + Duration::from_millis(rand::rng().random_range(0..=spread))
    }

    /// Record a failed attempt on `item`, scheduling the next one or
    /// moving it to the dead-letter state.
    pub fn record_failure(&self, item: &mut QueueItem, error: &str, now: DateTime<Utc>) {
        item.attempts = item.attempts.saturating_add(1);
        item.last_error = Some(error.to_string());

        if self.max_attempts > 0 && item.attempts >= self.max_attempts {
            item.state = ItemState::DeadLetter;
            item.next_attempt_at = None;
            return;
        }

        let delay = self.jittered(self.backoff(item.attempts));
        item.next_attempt_at = if delay.is_zero() {
            None
        } else {
            chrono::Duration::from_std(delay).ok().map(|d| now + d)
        };
    }
}
