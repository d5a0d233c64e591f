//! Bounded exponential backoff policy.

use std::time::Duration;

use grocer_core::RetrySettings;

use crate::error::ScraperError;

/// Longest single backoff the policy will ever ask for.
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// How many times a request is attempted and how long to wait in between.
///
/// Attempt `k` (1-indexed) that fails with a retriable error is followed by a
/// wait of `base_delay * multiplier^(k-1)`, capped at five minutes, before
/// attempt `k + 1`. No wait follows the final attempt.
///
/// | Attempt | Wait before next (`base = 1s`, `multiplier = 2`) |
/// |---------|--------------------------------------------------|
/// | 1       | 1 s                                              |
/// | 2       | 2 s                                              |
/// | 3       | 4 s                                              |
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    multiplier: f64,
}

impl RetryPolicy {
    /// # Errors
    ///
    /// Returns [`ScraperError::InvalidConfig`] if `max_attempts` is zero or
    /// `multiplier` is not a finite number `>= 1`.
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        multiplier: f64,
    ) -> Result<Self, ScraperError> {
        if max_attempts == 0 {
            return Err(ScraperError::InvalidConfig(
                "retry max_attempts must be at least 1".to_string(),
            ));
        }
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ScraperError::InvalidConfig(format!(
                "retry multiplier must be a finite number >= 1, got {multiplier}"
            )));
        }
        Ok(Self {
            max_attempts,
            base_delay,
            multiplier,
        })
    }

    /// A policy that makes exactly one attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait after failed attempt `attempt` (1-indexed).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= MAX_BACKOFF.as_secs_f64() {
            return MAX_BACKOFF;
        }
        Duration::from_secs_f64(secs)
    }
}

impl TryFrom<&RetrySettings> for RetryPolicy {
    type Error = ScraperError;

    fn try_from(settings: &RetrySettings) -> Result<Self, Self::Error> {
        Self::new(
            settings.max_attempts,
            Duration::from_millis(settings.base_delay_ms),
            settings.multiplier,
        )
    }
}
