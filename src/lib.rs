pub mod aggregator;
pub mod config;
pub mod error;
pub mod log;
pub mod model;
pub mod names;
pub mod price;
pub mod providers;
pub mod record;
pub mod retry;
pub mod units;

pub use aggregator::{Aggregator, SortOrder};
pub use error::{Error, Result};

pub(crate) const USER_AGENT: &str = "chainfolio/0.2";

/// Per-request deadline for every provider call; bounds how long one
/// origin can stall an aggregation pass.
pub(crate) const HTTP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
