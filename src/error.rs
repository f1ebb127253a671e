//! Error taxonomy shared across the aggregation pipeline

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid numeric value: {0}")]
    InvalidNumeric(String),

    #[error("price lookup failed: {0}")]
    PriceLookup(String),

    #[error("{provider} rate limit reached")]
    RateLimited { provider: &'static str },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Provider signalled "no data for this query". Classified as a
    /// successful empty result by the retry layer, never surfaced as-is.
    #[error("{provider} returned no data: {message}")]
    EmptyResult {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} API error: {message}")]
    Api {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} call failed after {attempts} attempts")]
    RetryExhausted {
        provider: &'static str,
        attempts: usize,
    },

    #[error("provider {origin} failed: {source}")]
    Provider {
        origin: String,
        #[source]
        source: Box<Error>,
    },

    #[error("malformed response: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wraps an adapter-level failure with the origin it came from.
    pub fn for_origin(self, origin: &str) -> Error {
        Error::Provider {
            origin: origin.to_string(),
            source: Box::new(self),
        }
    }
}
