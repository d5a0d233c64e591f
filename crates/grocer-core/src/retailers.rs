//! Retailer registry loaded from `config/retailers.yaml`.
//!
//! Each entry describes one grocery API: where its categories live, how its
//! product listings paginate, and the request budget, retry policy and
//! identity pool the fetch client should use against it.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::ConfigError;

const DEFAULT_USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64)",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7)",
    "Mozilla/5.0 (X11; Linux x86_64)",
];

/// One outbound request identity: a `User-Agent` and an optional proxy URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub user_agent: String,
    #[serde(default)]
    pub proxy: Option<String>,
}

/// Request budget and spacing for one retailer API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Requests allowed per window before the governor must cool down.
    pub budget: u32,
    /// Cool-down applied when the budget hits zero.
    pub reset_secs: u64,
    /// Minimum spacing between consecutive requests.
    pub min_interval_ms: u64,
    /// Adds up to +50% random spacing on top of `min_interval_ms`.
    pub jitter: bool,
    pub remaining_header: String,
    pub reset_header: String,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            budget: 30,
            reset_secs: 60,
            min_interval_ms: 2_000,
            jitter: true,
            remaining_header: "x-ratelimit-remaining".to_string(),
            reset_header: "x-ratelimit-reset".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts per request, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationSettings {
    /// Query parameter carrying the 1-based page number.
    pub page_param: String,
    /// Field of the page payload holding the item array.
    pub items_field: String,
    pub page_size_param: Option<String>,
    pub page_size: Option<u32>,
    /// Optional boolean field; `false` marks the last page even when items
    /// are present.
    pub has_more_field: Option<String>,
    pub max_pages: u32,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            page_param: "page".to_string(),
            items_field: "products".to_string(),
            page_size_param: None,
            page_size: None,
            has_more_field: None,
            max_pages: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetailerConfig {
    pub name: String,
    pub base_url: String,
    #[serde(default = "default_categories_path")]
    pub categories_path: String,
    /// Field wrapping the category array. `None` means the response body is
    /// the array itself.
    #[serde(default)]
    pub categories_field: Option<String>,
    #[serde(default)]
    pub pagination: PaginationSettings,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default = "default_identities")]
    pub identities: Vec<IdentityConfig>,
    #[serde(default = "default_true")]
    pub rotate_identity: bool,
    /// Static headers sent with every request, e.g. an API key.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl RetailerConfig {
    /// Generate a URL-safe slug from the retailer name.
    #[must_use]
    pub fn slug(&self) -> String {
        self.name
            .to_lowercase()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' {
                    c
                } else if c == ' ' {
                    '-'
                } else {
                    '\0'
                }
            })
            .filter(|&c| c != '\0')
            .collect::<String>()
            .split('-')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("-")
    }

    /// Returns `true` if `key` names this retailer, by slug or by
    /// case-insensitive display name.
    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        self.slug() == key || self.name.eq_ignore_ascii_case(key)
    }
}

fn default_categories_path() -> String {
    "/api/categories".to_string()
}

fn default_identities() -> Vec<IdentityConfig> {
    DEFAULT_USER_AGENTS
        .iter()
        .map(|ua| IdentityConfig {
            user_agent: (*ua).to_string(),
            proxy: None,
        })
        .collect()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct RetailersFile {
    pub retailers: Vec<RetailerConfig>,
}

impl RetailersFile {
    /// Finds a retailer by slug or display name.
    #[must_use]
    pub fn find(&self, key: &str) -> Option<&RetailerConfig> {
        self.retailers.iter().find(|r| r.matches(key))
    }
}

/// Load and validate the retailer registry from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_retailers(path: &Path) -> Result<RetailersFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::RetailersFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_retailers(&content)
}

/// Parse and validate a retailer registry from YAML text.
///
/// # Errors
///
/// Returns `ConfigError` if the YAML is malformed or fails validation.
pub fn parse_retailers(content: &str) -> Result<RetailersFile, ConfigError> {
    let file: RetailersFile = serde_yaml::from_str(content)?;
    validate_retailers(&file)?;
    Ok(file)
}

fn validate_retailers(file: &RetailersFile) -> Result<(), ConfigError> {
    let mut seen_slugs = HashSet::new();

    for retailer in &file.retailers {
        let name = retailer.name.trim();
        if name.is_empty() {
            return Err(ConfigError::Validation(
                "retailer name must be non-empty".to_string(),
            ));
        }

        let slug = retailer.slug();
        if !seen_slugs.insert(slug.clone()) {
            return Err(ConfigError::Validation(format!(
                "duplicate retailer slug: '{slug}' (from retailer '{name}')"
            )));
        }

        validate_base_url(name, &retailer.base_url)?;

        if retailer.retry.max_attempts == 0 {
            return Err(ConfigError::Validation(format!(
                "retailer '{name}' has retry.max_attempts 0; must be at least 1"
            )));
        }

        if !retailer.retry.multiplier.is_finite() || retailer.retry.multiplier < 1.0 {
            return Err(ConfigError::Validation(format!(
                "retailer '{name}' has retry.multiplier {}; must be a finite number >= 1",
                retailer.retry.multiplier
            )));
        }

        if retailer.pagination.max_pages == 0 {
            return Err(ConfigError::Validation(format!(
                "retailer '{name}' has pagination.max_pages 0; must be at least 1"
            )));
        }

        if retailer.pagination.page_param.trim().is_empty()
            || retailer.pagination.items_field.trim().is_empty()
        {
            return Err(ConfigError::Validation(format!(
                "retailer '{name}' must set non-empty pagination.page_param and pagination.items_field"
            )));
        }

        if retailer.identities.is_empty() {
            return Err(ConfigError::Validation(format!(
                "retailer '{name}' has an empty identity pool"
            )));
        }

        if retailer
            .identities
            .iter()
            .any(|id| id.user_agent.trim().is_empty())
        {
            return Err(ConfigError::Validation(format!(
                "retailer '{name}' has an identity with an empty user_agent"
            )));
        }
    }

    Ok(())
}

/// `base_url` must be an absolute `http`/`https` URL with a host.
fn validate_base_url(name: &str, base_url: &str) -> Result<(), ConfigError> {
    let url = Url::parse(base_url).map_err(|e| {
        ConfigError::Validation(format!(
            "retailer '{name}' has invalid base_url '{base_url}': {e}"
        ))
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Validation(format!(
            "retailer '{name}' has base_url '{base_url}'; scheme must be http:// or https://"
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ConfigError::Validation(format!(
            "retailer '{name}' has base_url '{base_url}' without a host"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "retailers_test.rs"]
mod tests;
