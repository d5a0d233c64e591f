//! Page-numbered pagination over a JSON listing endpoint.
//!
//! Each page is requested as `<base_url>?<page_param>=N` (plus an optional
//! page-size parameter) and its records are read from a configured field of
//! the payload, `products` by default. An empty or missing items array ends
//! the walk.
//!
//! ```text
//! GET /api/categories/dairy?page=1  → {"products": [..2 items..]}
//! GET /api/categories/dairy?page=2  → {"products": [..2 items..]}
//! GET /api/categories/dairy?page=3  → {"products": []}           (done)
//! ```

use grocer_core::PaginationSettings;
use reqwest::Url;
use serde_json::Value;

use crate::client::{FetchClient, FetchOutcome};
use crate::error::{FetchFailure, ScraperError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationConfig {
    pub page_param: String,
    pub items_field: String,
    pub page_size_param: Option<String>,
    pub page_size: Option<u32>,
    /// Optional boolean field that, when `false`, marks the last page.
    pub has_more_field: Option<String>,
    pub max_pages: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self::from(&PaginationSettings::default())
    }
}

impl From<&PaginationSettings> for PaginationConfig {
    fn from(settings: &PaginationSettings) -> Self {
        Self {
            page_param: settings.page_param.clone(),
            items_field: settings.items_field.clone(),
            page_size_param: settings.page_size_param.clone(),
            page_size: settings.page_size,
            has_more_field: settings.has_more_field.clone(),
            max_pages: settings.max_pages,
        }
    }
}

/// Records of one successfully fetched page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult {
    pub items: Vec<Value>,
    /// `false` when `items` is empty or the payload signals end-of-data.
    pub has_more: bool,
}

/// Why a pagination walk ended.
#[derive(Debug)]
pub enum PageStop {
    /// The endpoint ran out of records.
    Exhausted,
    /// `max_pages` pages were fetched and more may exist.
    Truncated { max_pages: u32 },
    /// `page` could not be fetched; earlier pages are kept.
    Failed {
        page: u32,
        failure: FetchFailure,
        retryable: bool,
    },
    /// The run was cancelled before `page` was fetched.
    Cancelled { page: u32 },
}

/// Everything a pagination walk gathered, and how it ended.
#[derive(Debug)]
pub struct Paginated {
    pub items: Vec<Value>,
    pub pages_fetched: u32,
    pub stop: PageStop,
}

impl Paginated {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self.stop, PageStop::Exhausted)
    }

    #[must_use]
    pub fn is_truncated(&self) -> bool {
        matches!(self.stop, PageStop::Truncated { .. })
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.stop, PageStop::Cancelled { .. })
    }

    #[must_use]
    pub fn failure(&self) -> Option<&FetchFailure> {
        match &self.stop {
            PageStop::Failed { failure, .. } => Some(failure),
            _ => None,
        }
    }
}

/// Walks page-numbered listings through a [`FetchClient`].
pub struct Paginator<'a> {
    client: &'a FetchClient,
    config: &'a PaginationConfig,
}

impl<'a> Paginator<'a> {
    #[must_use]
    pub fn new(client: &'a FetchClient, config: &'a PaginationConfig) -> Self {
        Self { client, config }
    }

    /// Starts a fresh walk of `base_url` from page 1.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::InvalidUrl`] if `base_url` does not parse.
    pub fn cursor(&self, base_url: &str) -> Result<PageCursor<'a>, ScraperError> {
        let base = Url::parse(base_url).map_err(|e| ScraperError::InvalidUrl {
            url: base_url.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(PageCursor {
            client: self.client,
            config: self.config,
            base,
            current_page: 1,
            pages_fetched: 0,
            exhausted: false,
            stop: None,
        })
    }

    /// Fetches every page of `base_url` and returns the accumulated records.
    ///
    /// A failed page ends the walk but keeps the records of earlier pages;
    /// inspect [`Paginated::stop`] to tell failure from truncation.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::InvalidUrl`] if `base_url` does not parse.
    pub async fn paginate(&self, base_url: &str) -> Result<Paginated, ScraperError> {
        let mut cursor = self.cursor(base_url)?;
        let mut items = Vec::new();

        loop {
            match cursor.advance().await {
                Step::Page(page) => items.extend(page.items),
                Step::Stopped(stop) => {
                    return Ok(Paginated {
                        items,
                        pages_fetched: cursor.pages_fetched,
                        stop,
                    });
                }
            }
        }
    }
}

enum Step {
    Page(PageResult),
    Stopped(PageStop),
}

/// Lazy, single-use walk over the pages of one listing.
///
/// Every call to [`PageCursor::next_page`] fetches at most one page. Once it
/// returns `None` the walk is over and [`PageCursor::stop`] says why.
pub struct PageCursor<'a> {
    client: &'a FetchClient,
    config: &'a PaginationConfig,
    base: Url,
    current_page: u32,
    pages_fetched: u32,
    exhausted: bool,
    stop: Option<PageStop>,
}

impl PageCursor<'_> {
    /// Fetches the next page, or `None` once the walk has ended.
    pub async fn next_page(&mut self) -> Option<PageResult> {
        if self.stop.is_some() {
            return None;
        }
        match self.advance().await {
            Step::Page(page) => Some(page),
            Step::Stopped(stop) => {
                self.stop = Some(stop);
                None
            }
        }
    }

    /// Why the walk ended, once it has.
    #[must_use]
    pub fn stop(&self) -> Option<&PageStop> {
        self.stop.as_ref()
    }

    #[must_use]
    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    async fn advance(&mut self) -> Step {
        if self.exhausted {
            return Step::Stopped(PageStop::Exhausted);
        }
        if self.current_page > self.config.max_pages {
            tracing::warn!(
                url = %self.base,
                max_pages = self.config.max_pages,
                "page limit reached — truncating results"
            );
            return Step::Stopped(PageStop::Truncated {
                max_pages: self.config.max_pages,
            });
        }

        let page = self.current_page;
        let url = self.page_url(page);
        tracing::debug!(url = %url, page, "fetching page");

        let payload = match self.client.fetch(url.as_str()).await {
            FetchOutcome::Success(payload) => payload,
            FetchOutcome::Cancelled => return Step::Stopped(PageStop::Cancelled { page }),
            FetchOutcome::RetryableFailure(failure) => {
                return Step::Stopped(PageStop::Failed {
                    page,
                    failure,
                    retryable: true,
                });
            }
            FetchOutcome::FatalFailure(failure) => {
                return Step::Stopped(PageStop::Failed {
                    page,
                    failure,
                    retryable: false,
                });
            }
        };
        self.pages_fetched += 1;

        let result = extract_page(&payload, self.config);
        if result.has_more {
            self.current_page += 1;
        } else {
            self.exhausted = true;
        }
        Step::Page(result)
    }

    fn page_url(&self, page: u32) -> Url {
        let mut url = self.base.clone();
        let page_param = self.config.page_param.as_str();
        let size_param = self.config.page_size_param.as_deref();
        let kept: Vec<(String, String)> = self
            .base
            .query_pairs()
            .filter(|(k, _)| *k != page_param && Some(&**k) != size_param)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        {
            let mut query = url.query_pairs_mut();
            query.clear();
            query.extend_pairs(kept);
            query.append_pair(page_param, &page.to_string());
            if let (Some(param), Some(size)) = (size_param, self.config.page_size) {
                query.append_pair(param, &size.to_string());
            }
        }
        url
    }
}

/// Reads the items array and end-of-data signal from one page payload.
///
/// A payload without the items field (or with a non-array value there) is
/// treated as an empty, final page.
fn extract_page(payload: &Value, config: &PaginationConfig) -> PageResult {
    let items = payload
        .get(&config.items_field)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let signalled_end = config
        .has_more_field
        .as_deref()
        .and_then(|field| payload.get(field))
        .and_then(Value::as_bool)
        == Some(false);

    PageResult {
        has_more: !items.is_empty() && !signalled_end,
        items,
    }
}
