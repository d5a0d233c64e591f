mod catalog;
mod scrape;

use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "grocer-cli")]
#[command(about = "Scrape product catalogs from grocery retailer JSON APIs")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List the retailers configured in the registry
    Retailers,
    /// Print the category listing of one retailer
    Categories {
        /// Retailer to query (by slug or name)
        #[arg(long)]
        retailer: String,
    },
    /// Scrape products from one or all configured retailers
    Scrape {
        /// Restrict the run to a single retailer (by slug or name)
        #[arg(long)]
        retailer: Option<String>,

        /// Restrict the run to a single category (by name)
        #[arg(long)]
        category: Option<String>,

        /// Cancel the run after this many seconds, keeping what was gathered
        #[arg(long)]
        deadline_secs: Option<u64>,

        /// Print the summary without writing snapshot files
        #[arg(long)]
        no_save: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = grocer_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let registry = grocer_core::load_retailers(&config.retailers_path)?;
    tracing::debug!(
        env = %config.env,
        retailers = registry.retailers.len(),
        path = %config.retailers_path.display(),
        "retailer registry loaded"
    );

    match command {
        Commands::Retailers => catalog::run_list_retailers(&registry),
        Commands::Categories { retailer } => {
            catalog::run_list_categories(&config, &registry, &retailer).await
        }
        Commands::Scrape {
            retailer,
            category,
            deadline_secs,
            no_save,
        } => {
            let options = scrape::ScrapeOptions {
                retailer: retailer.as_deref(),
                category: category.as_deref(),
                deadline: deadline_secs
                    .or(config.run_deadline_secs)
                    .map(Duration::from_secs),
                save: !no_save,
            };
            scrape::run_scrape(&config, &registry, &options).await
        }
    }
}
