pub mod client;
pub mod clock;
pub mod error;
pub mod identity;
pub mod normalize;
pub mod pagination;
pub mod rate_limit;
pub mod retry;
pub mod run;
pub mod walker;

pub use client::{FetchClient, FetchOutcome};
pub use clock::{Clock, ManualClock, TokioClock};
pub use error::{Cancelled, FetchFailure, ScraperError};
pub use identity::{Identity, IdentityPool};
pub use normalize::{normalize_product, normalize_records, SkippedRecord, StoreContext};
pub use pagination::{PageCursor, PageResult, PageStop, Paginated, PaginationConfig, Paginator};
pub use rate_limit::{RateGovernor, RateLimitConfig, RequestBudget};
pub use retry::RetryPolicy;
pub use run::{scrape_all, CategoryReport, RunReport, ScrapedRecord};
pub use walker::{CategoryRef, CategoryWalker, RetailerWalker};
