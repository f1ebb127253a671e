//! Batched spot-rate lookup against a CryptoCompare-style price API

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::error::{Error, Result};

/// ticker -> fiat currency -> spot rate
pub type RateMap = HashMap<String, HashMap<String, Decimal>>;

#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Resolves current rates for a batch of tickers against one fiat
    /// currency. Callers batch all tickers for one provider pass into a
    /// single call; a ticker missing from the result is unresolvable, not
    /// an error.
    async fn rates(&self, symbols: &[String], fiat: &str) -> Result<RateMap>;
}

/// Rate for one ticker, zero when the batch did not resolve it.
pub fn rate_for(rates: &RateMap, symbol: &str, fiat: &str) -> Decimal {
    rates
        .get(symbol)
        .and_then(|quotes| quotes.get(fiat))
        .copied()
        .unwrap_or(Decimal::ZERO)
}

pub struct CryptoCompareProvider {
    base_url: String,
    cache: Arc<Mutex<HashMap<String, RateMap>>>,
}

impl CryptoCompareProvider {
    pub fn new(base_url: &str) -> Self {
        CryptoCompareProvider {
            base_url: base_url.to_string(),
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl RateProvider for CryptoCompareProvider {
    #[instrument(name = "PriceBatch", skip(self, symbols), fields(count = symbols.len(), fiat = %fiat))]
    async fn rates(&self, symbols: &[String], fiat: &str) -> Result<RateMap> {
        if symbols.is_empty() {
            return Ok(RateMap::new());
        }

        let mut tickers: Vec<String> = symbols.to_vec();
        tickers.sort();
        tickers.dedup();
        let batch = tickers.join(",");
        let cache_key = format!("{batch}|{fiat}");

        {
            let cache = self.cache.lock().await;
            if let Some(cached) = cache.get(&cache_key) {
                debug!("Cache hit for price batch");
                return Ok(cached.clone());
            }
        }

        let url = format!(
            "{}/data/pricemulti?fsyms={}&tsyms={}",
            self.base_url, batch, fiat
        );
        debug!("Requesting rates from {}", url);

        let client = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .timeout(crate::HTTP_TIMEOUT)
            .build()?;
        let response = client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(Error::PriceLookup(format!(
                "HTTP {} for batch {}",
                response.status(),
                batch
            )));
        }

        let text = response.text().await?;
        let rates: RateMap = serde_json::from_str(&text).map_err(|e| {
            Error::PriceLookup(format!("malformed payload for batch {batch}: {e}"))
        })?;

        let mut cache = self.cache.lock().await;
        cache.insert(cache_key, rates.clone());
        Ok(rates)
    }
}
