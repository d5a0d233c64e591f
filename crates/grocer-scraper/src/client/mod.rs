//! Retrying JSON fetch client shared by every retailer walker.

mod origin;
mod request;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use grocer_core::RetailerConfig;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::clock::{sleep_or_cancel, Clock, TokioClock};
use crate::error::{FetchFailure, ScraperError};
use crate::identity::{Identity, IdentityPool};
use crate::rate_limit::{RateGovernor, RateLimitConfig};
use crate::retry::RetryPolicy;

pub use origin::resolve_url;

/// Result of one logical fetch, after any retries.
///
/// Failures are ordinary data here; the caller decides whether a failed page
/// aborts a category, a run, or nothing at all.
#[derive(Debug)]
pub enum FetchOutcome {
    Success(Value),
    /// Transient failure that survived every allowed attempt.
    RetryableFailure(FetchFailure),
    FatalFailure(FetchFailure),
    /// The run's cancellation token fired before a payload arrived.
    Cancelled,
}

impl FetchOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The failure carried by this outcome, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&FetchFailure> {
        match self {
            Self::RetryableFailure(f) | Self::FatalFailure(f) => Some(f),
            Self::Success(_) | Self::Cancelled => None,
        }
    }
}

/// HTTP client that issues JSON `GET`s under a [`RateGovernor`], retries
/// transient failures per a [`RetryPolicy`], and rotates identities from an
/// [`IdentityPool`].
///
/// One client serves one retailer stream. Independent streams should each
/// build their own client so their budgets never interfere.
pub struct FetchClient {
    direct: Client,
    /// One `reqwest::Client` per distinct proxy in the identity pool.
    proxied: HashMap<String, Client>,
    governor: RateGovernor,
    identities: IdentityPool,
    retry: RetryPolicy,
    static_headers: HeaderMap,
    cancel: CancellationToken,
}

impl FetchClient {
    /// Creates a client with the given per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if a `reqwest::Client` cannot be built,
    /// e.g. because an identity's proxy URL is invalid.
    pub fn new(
        timeout: Duration,
        governor: RateGovernor,
        identities: IdentityPool,
        retry: RetryPolicy,
    ) -> Result<Self, ScraperError> {
        let direct = build_http_client(timeout, None)?;
        let mut proxied = HashMap::new();
        for proxy in identities.identities().iter().filter_map(|i| i.proxy.as_deref()) {
            if !proxied.contains_key(proxy) {
                proxied.insert(proxy.to_owned(), build_http_client(timeout, Some(proxy))?);
            }
        }

        Ok(Self {
            direct,
            proxied,
            governor,
            identities,
            retry,
            static_headers: HeaderMap::new(),
            cancel: CancellationToken::new(),
        })
    }

    /// Builds a client from a retailer's registry entry, running on the
    /// tokio clock.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::InvalidConfig`] for an empty identity pool,
    /// an invalid retry policy or an invalid static header, and
    /// [`ScraperError::Http`] if an HTTP client cannot be built.
    pub fn from_retailer(
        config: &RetailerConfig,
        timeout: Duration,
    ) -> Result<Self, ScraperError> {
        Self::from_retailer_with_clock(config, timeout, Arc::new(TokioClock))
    }

    /// Like [`Self::from_retailer`] with an explicit time source.
    ///
    /// # Errors
    ///
    /// See [`Self::from_retailer`].
    pub fn from_retailer_with_clock(
        config: &RetailerConfig,
        timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ScraperError> {
        let governor = RateGovernor::new(RateLimitConfig::from(&config.rate_limit), clock);
        let identities = IdentityPool::new(
            config.identities.iter().map(Identity::from).collect(),
            config.rotate_identity,
        )?;
        let retry = RetryPolicy::try_from(&config.retry)?;

        Self::new(timeout, governor, identities, retry)?.with_static_headers(&config.headers)
    }

    /// Adds headers sent with every request, e.g. an API key.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::InvalidConfig`] if a name or value is not a
    /// valid HTTP header.
    pub fn with_static_headers(
        mut self,
        headers: &BTreeMap<String, String>,
    ) -> Result<Self, ScraperError> {
        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ScraperError::InvalidConfig(format!("invalid header name '{name}': {e}"))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| {
                ScraperError::InvalidConfig(format!("invalid value for header '{name}': {e}"))
            })?;
            self.static_headers.insert(header_name, header_value);
        }
        Ok(self)
    }

    /// Ties every wait and attempt of this client to `token`.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    #[must_use]
    pub fn governor(&self) -> &RateGovernor {
        &self.governor
    }

    /// Fetches `url` under an identity drawn from the pool.
    pub async fn fetch(&self, url: &str) -> FetchOutcome {
        let identity = self.identities.pick().clone();
        self.fetch_json(url, &identity).await
    }

    /// Fetches `url` as JSON, making at most `max_attempts` attempts.
    ///
    /// Every attempt first passes through [`RateGovernor::acquire`]. Transient
    /// failures (transport errors, HTTP 429/403) back off per the retry
    /// policy and, when rotation is enabled, switch to a freshly drawn
    /// identity. Any other failure is returned on the spot.
    pub async fn fetch_json(&self, url: &str, identity: &Identity) -> FetchOutcome {
        let max_attempts = self.retry.max_attempts();
        let mut identity = identity.clone();
        let mut attempt = 1u32;

        loop {
            if self.governor.acquire(&self.cancel).await.is_err() {
                tracing::info!(url, attempt, "fetch cancelled while waiting for rate governor");
                return FetchOutcome::Cancelled;
            }

            let result = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    tracing::info!(url, attempt, "fetch cancelled mid-request");
                    return FetchOutcome::Cancelled;
                }
                result = self.attempt(url, &identity) => result,
            };
            self.governor.mark_completed().await;

            let failure = match result {
                Ok(payload) => return FetchOutcome::Success(payload),
                Err(failure) => failure,
            };

            if !failure.is_retriable() {
                tracing::warn!(url, attempt, error = %failure, "fatal fetch error — not retrying");
                return FetchOutcome::FatalFailure(failure);
            }

            if attempt >= max_attempts {
                tracing::warn!(
                    url,
                    attempt,
                    max_attempts,
                    error = %failure,
                    "transient fetch error — retries exhausted"
                );
                return FetchOutcome::RetryableFailure(failure);
            }

            let delay = self.retry.delay_after(attempt);
            tracing::warn!(
                url,
                attempt,
                max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %failure,
                "transient fetch error — retrying after backoff"
            );
            if sleep_or_cancel(self.governor.clock(), delay, &self.cancel)
                .await
                .is_err()
            {
                tracing::info!(url, attempt, "fetch cancelled during backoff");
                return FetchOutcome::Cancelled;
            }

            if self.identities.rotates() {
                identity = self.identities.pick().clone();
            }
            attempt += 1;
        }
    }

    fn http_client(&self, identity: &Identity) -> &Client {
        identity
            .proxy
            .as_deref()
            .and_then(|proxy| self.proxied.get(proxy))
            .unwrap_or(&self.direct)
    }
}

fn build_http_client(timeout: Duration, proxy: Option<&str>) -> Result<Client, ScraperError> {
    let mut builder = Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10));
    if let Some(proxy) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
#[path = "../client_test.rs"]
mod tests;
