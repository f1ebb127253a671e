use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeKind {
    Binance,
    Kraken,
    Bitfinex,
    CryptoCom,
    /// Credential for an exchange this build has no adapter for.
    #[serde(other)]
    Unsupported,
}

impl Display for ExchangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExchangeKind::Binance => "Binance",
            ExchangeKind::Kraken => "Kraken",
            ExchangeKind::Bitfinex => "Bitfinex",
            ExchangeKind::CryptoCom => "CryptoCom",
            ExchangeKind::Unsupported => "Unsupported",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainKind {
    Bitcoin,
    Ethereum,
    Bsc,
    // Recognized in configuration but without a registered adapter yet;
    // wallets on these chains are skipped by the aggregator.
    Polygon,
    Solana,
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Wallet {
    pub name: String,
    pub address: String,
    pub chain: ChainKind,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExchangeCredential {
    pub exchange: ExchangeKind,
    pub api_key: String,
    pub api_secret: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

/// The user's configured origins, consumed read-only by the aggregator.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Accounts {
    #[serde(default)]
    pub exchanges: Vec<ExchangeCredential>,
    #[serde(default)]
    pub wallets: Vec<Wallet>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExchangeEndpoint {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChainEndpoint {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PriceConfig {
    pub base_url: String,
}

impl Default for PriceConfig {
    fn default() -> Self {
        PriceConfig {
            base_url: "https://min-api.cryptocompare.com".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    #[serde(default = "default_binance")]
    pub binance: ExchangeEndpoint,
    #[serde(default = "default_kraken")]
    pub kraken: ExchangeEndpoint,
    #[serde(default = "default_bitfinex")]
    pub bitfinex: ExchangeEndpoint,
    #[serde(default = "default_cryptocom")]
    pub cryptocom: ExchangeEndpoint,
    #[serde(default = "default_bitcoin")]
    pub bitcoin: ChainEndpoint,
    #[serde(default = "default_ethereum")]
    pub ethereum: ChainEndpoint,
    #[serde(default = "default_bsc")]
    pub bsc: ChainEndpoint,
}

fn default_true() -> bool {
    true
}

fn default_binance() -> ExchangeEndpoint {
    ExchangeEndpoint {
        enabled: true,
        base_url: "https://api.binance.com".to_string(),
    }
}

fn default_kraken() -> ExchangeEndpoint {
    ExchangeEndpoint {
        enabled: true,
        base_url: "https://api.kraken.com".to_string(),
    }
}

fn default_bitfinex() -> ExchangeEndpoint {
    ExchangeEndpoint {
        enabled: true,
        base_url: "https://api.bitfinex.com".to_string(),
    }
}

fn default_cryptocom() -> ExchangeEndpoint {
    ExchangeEndpoint {
        enabled: true,
        base_url: "https://api.crypto.com/exchange/v1".to_string(),
    }
}

fn default_bitcoin() -> ChainEndpoint {
    ChainEndpoint {
        enabled: true,
        base_url: "https://chain.api.btc.com/v3".to_string(),
        api_key: None,
    }
}

fn default_ethereum() -> ChainEndpoint {
    ChainEndpoint {
        enabled: true,
        base_url: "https://api.etherscan.io/api".to_string(),
        api_key: None,
    }
}

fn default_bsc() -> ChainEndpoint {
    ChainEndpoint {
        enabled: true,
        base_url: "https://api.bscscan.com/api".to_string(),
        api_key: None,
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            binance: default_binance(),
            kraken: default_kraken(),
            bitfinex: default_bitfinex(),
            cryptocom: default_cryptocom(),
            bitcoin: default_bitcoin(),
            ethereum: default_ethereum(),
            bsc: default_bsc(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Fiat currency all asset values are quoted in.
    pub currency: String,
    /// When set, the first provider failure aborts the whole aggregation.
    #[serde(default)]
    pub fail_fast: bool,
    /// Display name used when a ticker cannot be resolved.
    #[serde(default)]
    pub fallback_asset_name: String,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub price: PriceConfig,
    #[serde(default)]
    pub accounts: Accounts,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "chainfolio", "chainfolio")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
currency: "EUR"
fail_fast: true
accounts:
  exchanges:
    - exchange: Kraken
      api_key: "key"
      api_secret: "secret"
    - exchange: Binance
      api_key: "key2"
      api_secret: "secret2"
      active: false
  wallets:
    - name: "cold storage"
      address: "bc1qexample"
      chain: Bitcoin
    - name: "hot wallet"
      address: "0xabc"
      chain: Ethereum
      active: false
providers:
  ethereum:
    base_url: "http://example.com/etherscan"
    api_key: "ETHKEY"
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        assert_eq!(config.currency, "EUR");
        assert!(config.fail_fast);
        assert_eq!(config.accounts.exchanges.len(), 2);
        assert_eq!(config.accounts.exchanges[0].exchange, ExchangeKind::Kraken);
        assert!(config.accounts.exchanges[0].active);
        assert!(!config.accounts.exchanges[1].active);
        assert_eq!(config.accounts.wallets[0].chain, ChainKind::Bitcoin);
        assert!(config.accounts.wallets[0].active);
        assert!(!config.accounts.wallets[1].active);

        // Overridden section keeps its value, untouched sections default.
        assert_eq!(
            config.providers.ethereum.base_url,
            "http://example.com/etherscan"
        );
        assert_eq!(config.providers.ethereum.api_key.as_deref(), Some("ETHKEY"));
        assert_eq!(config.providers.kraken.base_url, "https://api.kraken.com");
        assert_eq!(config.price.base_url, "https://min-api.cryptocompare.com");
    }

    #[test]
    fn test_unknown_kinds_fall_back_to_unsupported() {
        let yaml_str = r#"
currency: "USD"
accounts:
  exchanges:
    - exchange: Coinbase
      api_key: "k"
      api_secret: "s"
  wallets:
    - name: "tron wallet"
      address: "TExample"
      chain: Tron
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        assert_eq!(
            config.accounts.exchanges[0].exchange,
            ExchangeKind::Unsupported
        );
        assert_eq!(config.accounts.wallets[0].chain, ChainKind::Unsupported);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("currency: \"USD\"").unwrap();
        assert!(!config.fail_fast);
        assert_eq!(config.fallback_asset_name, "");
        assert!(config.accounts.exchanges.is_empty());
        assert!(config.providers.binance.enabled);
        assert_eq!(
            config.providers.bitcoin.base_url,
            "https://chain.api.btc.com/v3"
        );
    }
}
