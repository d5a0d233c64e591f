//! The `scrape` command: run every selected retailer, normalize what was
//! gathered and persist one snapshot per retailer.
//!
//! Retailers run concurrently up to `max_concurrent_retailers`, each with
//! its own fetch client and therefore its own budget and identity pool.
//! A failed retailer is reported and skipped; the command only fails when
//! every selected retailer failed.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use grocer_core::{write_snapshot, AppConfig, RetailerConfig, RetailersFile};
use grocer_scraper::{
    normalize_records, scrape_all, FetchClient, PageStop, RetailerWalker, RunReport,
    StoreContext,
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub(crate) struct ScrapeOptions<'a> {
    pub retailer: Option<&'a str>,
    pub category: Option<&'a str>,
    pub deadline: Option<Duration>,
    pub save: bool,
}

/// What one retailer run produced, reduced to what the summary prints.
#[derive(Debug, Default)]
pub(crate) struct RetailerSummary {
    pub retailer: String,
    pub products: usize,
    pub skipped: usize,
    pub categories: usize,
    /// `(category, reason)` for every category that stopped on a failure.
    pub failed: Vec<(String, String)>,
    pub truncated: Vec<String>,
    pub not_started: Vec<String>,
    pub cancelled: bool,
    pub snapshot: Option<PathBuf>,
}

/// Build a walker whose every wait and request is tied to `cancel`.
pub(crate) fn build_walker(
    retailer: &RetailerConfig,
    config: &AppConfig,
    cancel: CancellationToken,
) -> anyhow::Result<RetailerWalker> {
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let client = FetchClient::from_retailer(retailer, timeout)
        .map_err(|e| anyhow::anyhow!("failed to build fetch client for {}: {e}", retailer.name))?
        .with_cancellation(cancel);
    Ok(RetailerWalker::from_config(retailer, client))
}

/// Resolve the `--retailer` filter against the registry.
pub(crate) fn select_retailers<'a>(
    registry: &'a RetailersFile,
    filter: Option<&str>,
) -> anyhow::Result<Vec<&'a RetailerConfig>> {
    match filter {
        Some(key) => {
            let retailer = registry
                .find(key)
                .ok_or_else(|| anyhow::anyhow!("retailer '{key}' not found"))?;
            Ok(vec![retailer])
        }
        None if registry.retailers.is_empty() => anyhow::bail!("no retailers configured"),
        None => Ok(registry.retailers.iter().collect()),
    }
}

/// Run the `scrape` command.
///
/// # Errors
///
/// Returns an error if the retailer filter matches nothing or every selected
/// retailer failed. Per-retailer failures are logged and reported.
pub(crate) async fn run_scrape(
    config: &AppConfig,
    registry: &RetailersFile,
    options: &ScrapeOptions<'_>,
) -> anyhow::Result<()> {
    let retailers = select_retailers(registry, options.retailer)?;
    let cancel = CancellationToken::new();
    let watchers = spawn_cancel_watchers(&cancel, options.deadline);

    let max_concurrent = config.max_concurrent_retailers.max(1);
    let results: Vec<(&RetailerConfig, anyhow::Result<RetailerSummary>)> =
        stream::iter(retailers.iter().copied())
            .map(|retailer| {
                let cancel = cancel.clone();
                async move {
                    let outcome = scrape_retailer(retailer, config, options, cancel).await;
                    (retailer, outcome)
                }
            })
            .buffer_unordered(max_concurrent)
            .collect()
            .await;

    for watcher in watchers {
        watcher.abort();
    }

    let retailer_count = results.len();
    let mut failed_retailers = 0usize;
    for (retailer, outcome) in &results {
        match outcome {
            Ok(summary) => println!("{}", format_summary(summary)),
            Err(e) => {
                tracing::error!(retailer = %retailer.name, error = %e, "retailer run failed");
                println!("{}: FAILED — {e:#}", retailer.name);
                failed_retailers += 1;
            }
        }
    }

    if failed_retailers > 0 && failed_retailers == retailer_count {
        anyhow::bail!("all {failed_retailers} retailers failed");
    }
    Ok(())
}

async fn scrape_retailer(
    retailer: &RetailerConfig,
    config: &AppConfig,
    options: &ScrapeOptions<'_>,
    cancel: CancellationToken,
) -> anyhow::Result<RetailerSummary> {
    let walker = build_walker(retailer, config, cancel.clone())?;
    let report = scrape_all(&walker, options.category, &cancel).await?;

    let scraped_at = Utc::now();
    let ctx = StoreContext {
        store: &retailer.name,
        base_url: &retailer.base_url,
        scraped_at,
    };
    let (products, skipped) = normalize_records(&report.records, &ctx);

    let snapshot = if options.save && !products.is_empty() {
        let path = write_snapshot(&config.output_dir, &retailer.slug(), &products, scraped_at)?;
        tracing::info!(
            retailer = %retailer.name,
            products = products.len(),
            path = %path.display(),
            "snapshot written"
        );
        Some(path)
    } else {
        None
    };

    let mut summary = summarize(&report);
    summary.products = products.len();
    summary.skipped = skipped.len();
    summary.snapshot = snapshot;
    Ok(summary)
}

/// Cancel `cancel` on Ctrl-C and, if set, once `deadline` elapses.
fn spawn_cancel_watchers(
    cancel: &CancellationToken,
    deadline: Option<Duration>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let mut handles = Vec::with_capacity(2);

    let token = cancel.clone();
    handles.push(tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received — cancelling run");
            token.cancel();
        }
    }));

    if let Some(deadline) = deadline {
        let token = cancel.clone();
        handles.push(tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            tracing::warn!(
                deadline_secs = deadline.as_secs(),
                "run deadline reached — cancelling"
            );
            token.cancel();
        }));
    }

    handles
}

pub(crate) fn summarize(report: &RunReport) -> RetailerSummary {
    RetailerSummary {
        retailer: report.retailer.clone(),
        categories: report.categories.len(),
        failed: report
            .categories
            .iter()
            .filter_map(|c| match &c.stop {
                PageStop::Failed { page, failure, .. } => {
                    Some((c.category.name.clone(), format!("page {page}: {failure}")))
                }
                _ => None,
            })
            .collect(),
        truncated: report.truncated().map(|c| c.category.name.clone()).collect(),
        not_started: report.not_started.iter().map(|c| c.name.clone()).collect(),
        cancelled: report.cancelled,
        ..RetailerSummary::default()
    }
}

pub(crate) fn format_summary(summary: &RetailerSummary) -> String {
    let mut out = format!(
        "{}: {} products from {} categories ({} records skipped)",
        summary.retailer, summary.products, summary.categories, summary.skipped
    );
    if summary.cancelled {
        out.push_str(" [cancelled]");
    }
    for (category, reason) in &summary.failed {
        out.push_str(&format!("\n  failed:      {category} — {reason}"));
    }
    for category in &summary.truncated {
        out.push_str(&format!("\n  truncated:   {category} (page limit reached)"));
    }
    if !summary.not_started.is_empty() {
        out.push_str(&format!(
            "\n  not started: {}",
            summary.not_started.join(", ")
        ));
    }
    if let Some(path) = &summary.snapshot {
        out.push_str(&format!("\n  snapshot:    {}", path.display()));
    }
    out
}
