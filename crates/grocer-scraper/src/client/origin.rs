//! URL helpers for retailer endpoints.

use reqwest::Url;

use crate::error::ScraperError;

/// Resolves `reference` (absolute, root-relative or relative) against
/// `base_url`.
///
/// A root-relative path such as `/api/categories/dairy` replaces the base
/// path entirely; absolute URLs are returned as-is.
///
/// # Errors
///
/// Returns [`ScraperError::InvalidUrl`] if `base_url` is not a valid URL or
/// the joined result cannot be parsed.
pub fn resolve_url(base_url: &str, reference: &str) -> Result<String, ScraperError> {
    let base = Url::parse(base_url).map_err(|e| ScraperError::InvalidUrl {
        url: base_url.to_owned(),
        reason: e.to_string(),
    })?;
    let joined = base.join(reference.trim()).map_err(|e| ScraperError::InvalidUrl {
        url: reference.to_owned(),
        reason: format!("cannot resolve against {base_url}: {e}"),
    })?;
    Ok(joined.to_string())
}
