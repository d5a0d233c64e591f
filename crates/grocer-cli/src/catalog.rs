//! Read-only commands that inspect the retailer registry.

use grocer_core::{AppConfig, RetailersFile};
use grocer_scraper::CategoryWalker;
use tokio_util::sync::CancellationToken;

use crate::scrape::build_walker;

/// Print one line per configured retailer.
pub(crate) fn run_list_retailers(registry: &RetailersFile) -> anyhow::Result<()> {
    if registry.retailers.is_empty() {
        println!("no retailers configured");
        return Ok(());
    }
    for line in retailer_lines(registry) {
        println!("{line}");
    }
    Ok(())
}

pub(crate) fn retailer_lines(registry: &RetailersFile) -> Vec<String> {
    registry
        .retailers
        .iter()
        .map(|r| {
            format!(
                "{:<16} {:<20} {}  (identities: {}, rotate: {}, max_pages: {})",
                r.slug(),
                r.name,
                r.base_url,
                r.identities.len(),
                r.rotate_identity,
                r.pagination.max_pages,
            )
        })
        .collect()
}

/// Fetch and print the category listing of one retailer.
///
/// # Errors
///
/// Returns an error if the retailer is not configured, its fetch client
/// cannot be built, or the categories endpoint fails.
pub(crate) async fn run_list_categories(
    config: &AppConfig,
    registry: &RetailersFile,
    key: &str,
) -> anyhow::Result<()> {
    let retailer = registry.find(key).ok_or_else(|| {
        anyhow::anyhow!(
            "retailer '{key}' not found; check {}",
            config.retailers_path.display()
        )
    })?;

    let walker = build_walker(retailer, config, CancellationToken::new())?;
    let categories = walker.get_categories().await?;

    println!("{} categories for {}:", categories.len(), retailer.name);
    for category in &categories {
        println!("  {:<30} {}", category.name, category.url);
    }
    Ok(())
}
