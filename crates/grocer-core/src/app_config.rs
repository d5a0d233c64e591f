use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Process-level settings shared by every retailer run.
///
/// Per-retailer fetch behaviour (budgets, retry policy, identities) lives in
/// the retailers YAML file, see [`crate::RetailerConfig`].
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub log_level: String,
    pub retailers_path: PathBuf,
    pub output_dir: PathBuf,
    pub request_timeout_secs: u64,
    pub max_concurrent_retailers: usize,
    /// Overall wall-clock budget for one `scrape` invocation. `None` means
    /// the run is bounded only by retry and page limits.
    pub run_deadline_secs: Option<u64>,
}
