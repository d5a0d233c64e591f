//! Drives a [`CategoryWalker`] over every category of one retailer.

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::ScraperError;
use crate::pagination::PageStop;
use crate::walker::{CategoryRef, CategoryWalker};

/// One raw product record, tagged with the category it was listed under.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedRecord {
    pub category: String,
    pub raw: Value,
}

/// Outcome of scraping a single category.
#[derive(Debug)]
pub struct CategoryReport {
    pub category: CategoryRef,
    pub items: usize,
    pub pages_fetched: u32,
    pub stop: PageStop,
}

impl CategoryReport {
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self.stop, PageStop::Failed { .. })
    }

    #[must_use]
    pub fn is_truncated(&self) -> bool {
        matches!(self.stop, PageStop::Truncated { .. })
    }
}

/// Everything one retailer run gathered, including partial results.
#[derive(Debug)]
pub struct RunReport {
    pub retailer: String,
    pub records: Vec<ScrapedRecord>,
    pub categories: Vec<CategoryReport>,
    /// Categories never started because the run was cancelled.
    pub not_started: Vec<CategoryRef>,
    pub cancelled: bool,
}

impl RunReport {
    pub fn failed(&self) -> impl Iterator<Item = &CategoryReport> {
        self.categories.iter().filter(|c| c.is_failed())
    }

    pub fn truncated(&self) -> impl Iterator<Item = &CategoryReport> {
        self.categories.iter().filter(|c| c.is_truncated())
    }
}

/// Scrapes every category (or only those matching `filter`) in listing order.
///
/// A failing category is recorded in the report and the run moves on. Once
/// `cancel` fires no further category is started; the records gathered so
/// far are still returned.
///
/// # Errors
///
/// Returns the walker's error if the category listing itself fails, since
/// without categories there is nothing to scrape. A listing cut short by
/// cancellation is not an error: it yields an empty, cancelled report.
pub async fn scrape_all<W: CategoryWalker + Sync>(
    walker: &W,
    filter: Option<&str>,
    cancel: &CancellationToken,
) -> Result<RunReport, ScraperError> {
    let retailer = walker.retailer().to_owned();
    let mut categories = match walker.get_categories().await {
        Ok(categories) => categories,
        Err(ScraperError::Cancelled { context }) => {
            tracing::info!(retailer = %retailer, context, "run cancelled during category listing");
            return Ok(RunReport {
                retailer,
                records: Vec::new(),
                categories: Vec::new(),
                not_started: Vec::new(),
                cancelled: true,
            });
        }
        Err(e) => return Err(e),
    };

    if let Some(wanted) = filter {
        categories.retain(|c| c.name.eq_ignore_ascii_case(wanted.trim()));
        if categories.is_empty() {
            tracing::warn!(retailer = %retailer, category = wanted, "no category matches filter");
        }
    }

    let mut report = RunReport {
        retailer,
        records: Vec::new(),
        categories: Vec::with_capacity(categories.len()),
        not_started: Vec::new(),
        cancelled: false,
    };

    let mut pending = categories.into_iter();
    for category in pending.by_ref() {
        if cancel.is_cancelled() {
            report.cancelled = true;
            report.not_started.push(category);
            break;
        }

        tracing::info!(
            retailer = %report.retailer,
            category = %category.name,
            "scraping category"
        );
        let paginated = walker.scrape_category(&category).await;

        match &paginated.stop {
            PageStop::Exhausted => {}
            PageStop::Truncated { max_pages } => tracing::warn!(
                retailer = %report.retailer,
                category = %category.name,
                max_pages,
                "category truncated at page limit"
            ),
            PageStop::Failed { page, failure, .. } => tracing::warn!(
                retailer = %report.retailer,
                category = %category.name,
                page,
                error = %failure,
                "category failed — keeping earlier pages and continuing"
            ),
            PageStop::Cancelled { .. } => report.cancelled = true,
        }

        let items = paginated.items.len();
        report.records.extend(paginated.items.into_iter().map(|raw| ScrapedRecord {
            category: category.name.clone(),
            raw,
        }));
        report.categories.push(CategoryReport {
            items,
            pages_fetched: paginated.pages_fetched,
            stop: paginated.stop,
            category,
        });

        if report.cancelled {
            break;
        }
    }
    report.not_started.extend(pending);

    tracing::info!(
        retailer = %report.retailer,
        records = report.records.len(),
        categories = report.categories.len(),
        failed = report.failed().count(),
        truncated = report.truncated().count(),
        cancelled = report.cancelled,
        "run finished"
    );
    Ok(report)
}
