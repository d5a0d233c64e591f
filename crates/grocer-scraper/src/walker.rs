//! Per-retailer category discovery and category scraping.

use std::future::Future;

use grocer_core::RetailerConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::{resolve_url, FetchClient, FetchOutcome};
use crate::error::{FetchFailure, ScraperError};
use crate::pagination::{PageStop, Paginated, PaginationConfig, Paginator};

/// A product category as listed by the retailer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub name: String,
    /// Absolute URL of the category's product listing.
    pub url: String,
}

/// What a retailer adapter must provide for a scrape run.
pub trait CategoryWalker {
    /// Display name of the retailer, used in reports and logs.
    fn retailer(&self) -> &str;

    /// Lists the retailer's categories.
    fn get_categories(
        &self,
    ) -> impl Future<Output = Result<Vec<CategoryRef>, ScraperError>> + Send;

    /// Fetches every product record of one category.
    ///
    /// Failures are reported through [`Paginated::stop`], never as an error,
    /// so one bad category does not end the run.
    fn scrape_category(
        &self,
        category: &CategoryRef,
    ) -> impl Future<Output = Paginated> + Send;
}

/// [`CategoryWalker`] for any retailer described by a registry entry.
pub struct RetailerWalker {
    name: String,
    base_url: String,
    categories_path: String,
    categories_field: Option<String>,
    pagination: PaginationConfig,
    client: FetchClient,
}

impl RetailerWalker {
    #[must_use]
    pub fn from_config(config: &RetailerConfig, client: FetchClient) -> Self {
        Self {
            name: config.name.clone(),
            base_url: config.base_url.clone(),
            categories_path: config.categories_path.clone(),
            categories_field: config.categories_field.clone(),
            pagination: PaginationConfig::from(&config.pagination),
            client,
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn parse_categories(
        &self,
        payload: &Value,
        url: &str,
    ) -> Result<Vec<CategoryRef>, ScraperError> {
        let listing = match &self.categories_field {
            Some(field) => payload.get(field).unwrap_or(&Value::Null),
            None => payload,
        };
        let entries = listing.as_array().ok_or_else(|| ScraperError::UnexpectedShape {
            context: format!("categories from {url}"),
            reason: match &self.categories_field {
                Some(field) => format!("field \"{field}\" is not an array"),
                None => "payload is not an array".to_string(),
            },
        })?;

        let mut categories = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let name = entry.get("name").and_then(Value::as_str).map(str::trim);
            let href = entry.get("url").and_then(Value::as_str).map(str::trim);
            let (Some(name), Some(href)) = (name, href) else {
                tracing::warn!(
                    retailer = %self.name,
                    index,
                    "skipping category entry without name or url"
                );
                continue;
            };
            if name.is_empty() || href.is_empty() {
                tracing::warn!(retailer = %self.name, index, "skipping blank category entry");
                continue;
            }
            match resolve_url(&self.base_url, href) {
                Ok(url) => categories.push(CategoryRef {
                    name: name.to_owned(),
                    url,
                }),
                Err(e) => {
                    tracing::warn!(
                        retailer = %self.name,
                        category = name,
                        error = %e,
                        "skipping category with unresolvable url"
                    );
                }
            }
        }
        Ok(categories)
    }
}

impl CategoryWalker for RetailerWalker {
    fn retailer(&self) -> &str {
        &self.name
    }

    async fn get_categories(&self) -> Result<Vec<CategoryRef>, ScraperError> {
        let url = resolve_url(&self.base_url, &self.categories_path)?;
        tracing::info!(retailer = %self.name, url = %url, "fetching categories");

        let payload = match self.client.fetch(&url).await {
            FetchOutcome::Success(payload) => payload,
            FetchOutcome::RetryableFailure(source) | FetchOutcome::FatalFailure(source) => {
                return Err(ScraperError::Categories { url, source });
            }
            FetchOutcome::Cancelled => {
                return Err(ScraperError::Cancelled {
                    context: format!("category listing for {}", self.name),
                });
            }
        };

        let categories = self.parse_categories(&payload, &url)?;
        tracing::info!(retailer = %self.name, count = categories.len(), "categories listed");
        Ok(categories)
    }

    async fn scrape_category(&self, category: &CategoryRef) -> Paginated {
        let paginator = Paginator::new(&self.client, &self.pagination);
        match paginator.paginate(&category.url).await {
            Ok(paginated) => paginated,
            Err(e) => {
                tracing::warn!(
                    retailer = %self.name,
                    category = %category.name,
                    error = %e,
                    "category url rejected"
                );
                Paginated {
                    items: Vec::new(),
                    pages_fetched: 0,
                    stop: PageStop::Failed {
                        page: 1,
                        failure: FetchFailure::InvalidUrl {
                            url: category.url.clone(),
                            reason: e.to_string(),
                        },
                        retryable: false,
                    },
                }
            }
        }
    }
}
