//! Ticker to display-name resolution.
//!
//! The lookup itself belongs to an external collaborator; the built-in
//! resolver covers common tickers so the CLI is useful on its own. A miss
//! is not a failure — callers fall back to the configured default string.

use async_trait::async_trait;
use std::collections::HashMap;

#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn resolve(&self, ticker: &str) -> Option<String>;
}

/// Resolves a ticker to a display name, applying the configured fallback.
pub async fn display_name(resolver: &dyn NameResolver, ticker: &str, fallback: &str) -> String {
    match resolver.resolve(ticker).await {
        Some(name) => name,
        None => fallback.to_string(),
    }
}

pub struct StaticNameResolver {
    names: HashMap<&'static str, &'static str>,
}

impl StaticNameResolver {
    pub fn new() -> Self {
        let names = HashMap::from([
            ("BTC", "Bitcoin"),
            ("ETH", "Ethereum"),
            ("BNB", "BNB"),
            ("USDT", "Tether"),
            ("USDC", "USD Coin"),
            ("XRP", "XRP"),
            ("ADA", "Cardano"),
            ("SOL", "Solana"),
            ("DOT", "Polkadot"),
            ("DOGE", "Dogecoin"),
            ("LTC", "Litecoin"),
            ("MATIC", "Polygon"),
            ("LINK", "Chainlink"),
            ("ATOM", "Cosmos"),
            ("XMR", "Monero"),
        ]);
        StaticNameResolver { names }
    }
}

impl Default for StaticNameResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NameResolver for StaticNameResolver {
    async fn resolve(&self, ticker: &str) -> Option<String> {
        self.names
            .get(ticker.to_uppercase().as_str())
            .map(|name| name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_known_ticker_resolves() {
        let resolver = StaticNameResolver::new();
        assert_eq!(resolver.resolve("btc").await.as_deref(), Some("Bitcoin"));
        assert_eq!(resolver.resolve("ETH").await.as_deref(), Some("Ethereum"));
    }

    #[tokio::test]
    async fn test_unknown_ticker_uses_fallback() {
        let resolver = StaticNameResolver::new();
        assert_eq!(resolver.resolve("OBSCURECOIN").await, None);
        assert_eq!(
            display_name(&resolver, "OBSCURECOIN", "").await,
            "".to_string()
        );
        assert_eq!(
            display_name(&resolver, "OBSCURECOIN", "(unknown)").await,
            "(unknown)".to_string()
        );
    }
}
