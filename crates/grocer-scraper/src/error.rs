use thiserror::Error;

/// Why a single fetch did not produce a JSON payload.
///
/// Failures are classified by [`FetchFailure::is_retriable`]: transport
/// errors and anti-bot statuses (429/403) are worth another attempt, the
/// rest are returned to the caller immediately.
#[derive(Debug, Error)]
pub enum FetchFailure {
    #[error("transport error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("rate-limited/blocked by {url} (HTTP {status})")]
    Blocked { url: String, status: u16 },

    #[error("HTTP {status} from {url}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    #[error("invalid JSON body from {url}: {source}")]
    InvalidJson {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid request URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl FetchFailure {
    /// Returns `true` if another attempt, possibly under a fresh identity,
    /// could succeed.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Blocked { .. })
    }

    /// HTTP status carried by the failure, if the server answered at all.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Blocked { status, .. } | Self::Status { status, .. } => Some(*status),
            Self::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            Self::InvalidJson { .. } | Self::InvalidUrl { .. } => None,
        }
    }
}

/// A wait or request was abandoned because the run's cancellation token fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid fetch configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("categories endpoint {url} failed: {source}")]
    Categories {
        url: String,
        #[source]
        source: FetchFailure,
    },

    #[error("unexpected payload shape for {context}: {reason}")]
    UnexpectedShape { context: String, reason: String },

    #[error("run cancelled before {context} completed")]
    Cancelled { context: String },

    #[error("normalization error for product {product_id}: {reason}")]
    Normalization { product_id: String, reason: String },
}
