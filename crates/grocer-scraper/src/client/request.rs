//! A single HTTP exchange, classified into a payload or a [`FetchFailure`].

use serde_json::Value;

use crate::error::FetchFailure;
use crate::identity::Identity;

use super::FetchClient;

/// Message reported when an error body carries no usable description.
const UNKNOWN_ERROR: &str = "unknown error";

impl FetchClient {
    /// Performs one `GET` of `url` as `identity`, with no retry.
    ///
    /// Rate-limit headers are folded into the governor for every response
    /// that arrives, successful or not.
    pub(super) async fn attempt(
        &self,
        url: &str,
        identity: &Identity,
    ) -> Result<Value, FetchFailure> {
        let parsed = reqwest::Url::parse(url).map_err(|e| FetchFailure::InvalidUrl {
            url: url.to_owned(),
            reason: e.to_string(),
        })?;

        let response = self
            .http_client(identity)
            .get(parsed)
            .headers(self.static_headers.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::USER_AGENT, &identity.user_agent)
            .send()
            .await
            .map_err(|source| FetchFailure::Transport {
                url: url.to_owned(),
                source,
            })?;

        self.governor.observe(response.headers()).await;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(FetchFailure::Blocked {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| FetchFailure::Transport {
                url: url.to_owned(),
                source,
            })?;

        if !status.is_success() {
            return Err(FetchFailure::Status {
                url: url.to_owned(),
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        serde_json::from_slice(&body).map_err(|source| FetchFailure::InvalidJson {
            url: url.to_owned(),
            source,
        })
    }
}

/// Pulls `message` (or `error`) out of a JSON error body.
fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "error"].into_iter().find_map(|key| {
                value
                    .get(key)
                    .and_then(Value::as_str)
                    .filter(|s| !s.trim().is_empty())
                    .map(str::to_owned)
            })
        })
        .unwrap_or_else(|| UNKNOWN_ERROR.to_owned())
}
