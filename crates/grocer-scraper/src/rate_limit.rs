//! Request budget and spacing for one retailer stream.
//!
//! [`RateGovernor::acquire`] is called before every HTTP attempt. It blocks
//! while the budget is exhausted and keeps a minimum gap between requests.
//! [`RateGovernor::observe`] folds rate-limit headers from each completed
//! exchange back into the budget.

use std::sync::Arc;
use std::time::{Duration, Instant};

use grocer_core::RateLimitSettings;
use reqwest::header::HeaderMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::clock::{sleep_or_cancel, Clock};
use crate::error::Cancelled;

/// Upper bound of the random spacing added on top of `min_interval`.
const JITTER_FRACTION: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Budget restored after a cool-down.
    pub default_budget: u32,
    pub reset_after: Duration,
    pub min_interval: Duration,
    pub jitter: bool,
    pub remaining_header: String,
    pub reset_header: String,
}

impl RateLimitConfig {
    /// Spacing to enforce before the next request: `min_interval`, plus up to
    /// 50% uniform jitter when enabled.
    fn next_interval(&self) -> Duration {
        if !self.jitter || self.min_interval.is_zero() {
            return self.min_interval;
        }
        self.min_interval
            .mul_f64(1.0 + rand::random::<f64>() * JITTER_FRACTION)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::from(&RateLimitSettings::default())
    }
}

impl From<&RateLimitSettings> for RateLimitConfig {
    fn from(settings: &RateLimitSettings) -> Self {
        Self {
            default_budget: settings.budget,
            reset_after: Duration::from_secs(settings.reset_secs),
            min_interval: Duration::from_millis(settings.min_interval_ms),
            jitter: settings.jitter,
            remaining_header: settings.remaining_header.clone(),
            reset_header: settings.reset_header.clone(),
        }
    }
}

/// Requests left in the current window and how long a cool-down lasts once
/// they run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestBudget {
    pub remaining: u32,
    pub reset_after: Duration,
}

#[derive(Debug)]
struct GovernorState {
    budget: RequestBudget,
    last_request: Option<Instant>,
}

/// Serializes one stream's requests under its budget.
///
/// The state sits behind an async mutex that is held across the waits in
/// [`Self::acquire`], so concurrent callers queue rather than race past the
/// budget check.
pub struct RateGovernor {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<GovernorState>,
}

impl RateGovernor {
    #[must_use]
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        let budget = RequestBudget {
            remaining: config.default_budget,
            reset_after: config.reset_after,
        };
        Self {
            config,
            clock,
            state: Mutex::new(GovernorState {
                budget,
                last_request: None,
            }),
        }
    }

    #[must_use]
    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Snapshot of the current budget.
    pub async fn budget(&self) -> RequestBudget {
        self.state.lock().await.budget
    }

    /// Waits until a request may be sent.
    ///
    /// An exhausted budget costs a full `reset_after` cool-down, after which
    /// the budget is optimistically restored to its configured default. The
    /// minimum spacing since the previous request is enforced either way.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if `cancel` fires during a wait.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        let mut state = self.state.lock().await;

        if state.budget.remaining == 0 {
            let wait = state.budget.reset_after;
            tracing::warn!(
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                "request budget exhausted — waiting for reset"
            );
            sleep_or_cancel(self.clock(), wait, cancel).await?;
            state.budget = RequestBudget {
                remaining: self.config.default_budget,
                reset_after: self.config.reset_after,
            };
        }

        if let Some(last) = state.last_request {
            let required = self.config.next_interval();
            let elapsed = self.clock.now().saturating_duration_since(last);
            if elapsed < required {
                let wait = required - elapsed;
                tracing::debug!(
                    wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                    "spacing request"
                );
                sleep_or_cancel(self.clock(), wait, cancel).await?;
            }
        }

        state.last_request = Some(self.clock.now());
        Ok(())
    }

    /// Restarts the spacing window once an exchange has finished, so the gap
    /// is measured from completion rather than from dispatch.
    pub(crate) async fn mark_completed(&self) {
        self.state.lock().await.last_request = Some(self.clock.now());
    }

    /// Updates the budget from rate-limit response headers.
    ///
    /// Each hint is applied only if present and parseable as a non-negative
    /// number; anything else leaves the corresponding field untouched.
    pub async fn observe(&self, headers: &HeaderMap) {
        let remaining = header_number(headers, &self.config.remaining_header)
            .and_then(|n| (n.fract() == 0.0).then_some(n))
            .map(|n| {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let clamped = n.min(f64::from(u32::MAX)) as u32;
                clamped
            });
        let reset_after = header_number(headers, &self.config.reset_header)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok());

        if remaining.is_none() && reset_after.is_none() {
            return;
        }

        let mut state = self.state.lock().await;
        if let Some(remaining) = remaining {
            state.budget.remaining = remaining;
        }
        if let Some(reset_after) = reset_after {
            state.budget.reset_after = reset_after;
        }
        tracing::debug!(
            remaining = state.budget.remaining,
            reset_secs = state.budget.reset_after.as_secs(),
            "rate-limit budget updated from response headers"
        );
    }
}

/// Reads `name` from `headers` as a finite, non-negative number.
fn header_number(headers: &HeaderMap, name: &str) -> Option<f64> {
    let raw = headers.get(name)?.to_str().ok()?.trim();
    let value = raw.parse::<f64>().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}
