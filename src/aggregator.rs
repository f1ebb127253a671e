//! Fans out to every configured origin and merges the results.
//!
//! Origins are independent, so one task runs per origin; failures are
//! isolated per origin unless fail-fast mode is enabled. Final activity
//! order is decided solely by the sort step, never by task completion.

use futures::future::{self, BoxFuture};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::config::{Accounts, AppConfig, ChainKind, ExchangeCredential, ExchangeKind, Wallet};
use crate::error::Result;
use crate::model::{Activity, Asset};
use crate::names::{NameResolver, StaticNameResolver};
use crate::price::{CryptoCompareProvider, RateProvider};
use crate::providers::binance::BinanceProvider;
use crate::providers::bitcoin::BitcoinProvider;
use crate::providers::bitfinex::BitfinexProvider;
use crate::providers::cryptocom::CryptoComProvider;
use crate::providers::evm::{self, EvmProvider};
use crate::providers::kraken::KrakenProvider;
use crate::providers::{Provider, ProviderContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

pub struct Aggregator {
    config: AppConfig,
    rates: Arc<dyn RateProvider>,
    names: Arc<dyn NameResolver>,
}

impl Aggregator {
    pub fn new(config: AppConfig) -> Self {
        let rates = Arc::new(CryptoCompareProvider::new(&config.price.base_url));
        Aggregator {
            config,
            rates,
            names: Arc::new(StaticNameResolver::new()),
        }
    }

    /// Seam for swapping the pricing or naming collaborator.
    pub fn with_collaborators(
        config: AppConfig,
        rates: Arc<dyn RateProvider>,
        names: Arc<dyn NameResolver>,
    ) -> Self {
        Aggregator {
            config,
            rates,
            names,
        }
    }

    fn context(&self) -> ProviderContext {
        ProviderContext {
            fiat: self.config.currency.clone(),
            fallback_name: self.config.fallback_asset_name.clone(),
            rates: Arc::clone(&self.rates),
            names: Arc::clone(&self.names),
        }
    }

    fn exchange_adapter(&self, credential: &ExchangeCredential) -> Option<Box<dyn Provider>> {
        let endpoints = &self.config.providers;
        match credential.exchange {
            ExchangeKind::Binance if endpoints.binance.enabled => Some(Box::new(
                BinanceProvider::new(&endpoints.binance.base_url, credential, self.context()),
            )),
            ExchangeKind::Kraken if endpoints.kraken.enabled => Some(Box::new(
                KrakenProvider::new(&endpoints.kraken.base_url, credential, self.context()),
            )),
            ExchangeKind::Bitfinex if endpoints.bitfinex.enabled => Some(Box::new(
                BitfinexProvider::new(&endpoints.bitfinex.base_url, credential, self.context()),
            )),
            ExchangeKind::CryptoCom if endpoints.cryptocom.enabled => Some(Box::new(
                CryptoComProvider::new(&endpoints.cryptocom.base_url, credential, self.context()),
            )),
            _ => None,
        }
    }

    fn wallet_adapter(&self, wallet: &Wallet) -> Option<Box<dyn Provider>> {
        let endpoints = &self.config.providers;
        match wallet.chain {
            ChainKind::Bitcoin if endpoints.bitcoin.enabled => Some(Box::new(
                BitcoinProvider::new(&endpoints.bitcoin.base_url, wallet, self.context()),
            )),
            ChainKind::Ethereum if endpoints.ethereum.enabled => Some(Box::new(EvmProvider::new(
                &endpoints.ethereum.base_url,
                endpoints.ethereum.api_key.clone(),
                wallet,
                evm::ETHEREUM,
                self.context(),
            ))),
            ChainKind::Bsc if endpoints.bsc.enabled => Some(Box::new(EvmProvider::new(
                &endpoints.bsc.base_url,
                endpoints.bsc.api_key.clone(),
                wallet,
                evm::BSC,
                self.context(),
            ))),
            // No adapter registered for the remaining chains.
            _ => None,
        }
    }

    /// Adapters for every active, enabled origin: exchanges first, then
    /// wallets. Inactive origins, disabled provider types and kinds without
    /// a registered adapter are skipped.
    fn adapters(&self, accounts: &Accounts) -> Vec<Box<dyn Provider>> {
        let mut adapters = Vec::new();

        for credential in &accounts.exchanges {
            if !credential.active {
                debug!(exchange = %credential.exchange, "skipping inactive exchange");
                continue;
            }
            match self.exchange_adapter(credential) {
                Some(adapter) => adapters.push(adapter),
                None => debug!(exchange = %credential.exchange, "no enabled adapter"),
            }
        }
        for wallet in &accounts.wallets {
            if !wallet.active {
                debug!(wallet = %wallet.name, "skipping inactive wallet");
                continue;
            }
            match self.wallet_adapter(wallet) {
                Some(adapter) => adapters.push(adapter),
                None => debug!(wallet = %wallet.name, chain = ?wallet.chain, "no enabled adapter"),
            }
        }

        adapters
    }

    #[instrument(name = "AssetList", skip(self, accounts))]
    pub async fn asset_list(&self, accounts: &Accounts) -> Result<Vec<Asset>> {
        let adapters = self.adapters(accounts);
        let origins: Vec<(String, BoxFuture<'_, Result<Vec<Asset>>>)> = adapters
            .iter()
            .map(|adapter| (adapter.origin_name().to_string(), adapter.all_assets()))
            .collect();
        run_origins(origins, self.config.fail_fast).await
    }

    #[instrument(name = "Activities", skip(self, accounts))]
    pub async fn activities(&self, accounts: &Accounts, order: SortOrder) -> Result<Vec<Activity>> {
        let adapters = self.adapters(accounts);
        let origins: Vec<(String, BoxFuture<'_, Result<Vec<Activity>>>)> = adapters
            .iter()
            .map(|adapter| (adapter.origin_name().to_string(), adapter.all_activities()))
            .collect();

        let mut activities = run_origins(origins, self.config.fail_fast).await?;
        sort_activities(&mut activities, order);
        Ok(activities)
    }
}

/// Joins one task per origin. With fail-fast the first failure aborts the
/// whole aggregation; otherwise a failing origin contributes nothing.
async fn run_origins<T>(
    origins: Vec<(String, BoxFuture<'_, Result<Vec<T>>>)>,
    fail_fast: bool,
) -> Result<Vec<T>> {
    if fail_fast {
        let results = future::try_join_all(origins.into_iter().map(|(origin, task)| async move {
            task.await.map_err(|err| err.for_origin(&origin))
        }))
        .await?;
        return Ok(results.into_iter().flatten().collect());
    }

    let settled = future::join_all(
        origins
            .into_iter()
            .map(|(origin, task)| async move { (origin, task.await) }),
    )
    .await;

    let mut merged = Vec::new();
    for (origin, result) in settled {
        match result {
            Ok(records) => merged.extend(records),
            Err(err) => {
                warn!(origin = %origin, error = %err, "provider failed; contributing no records");
            }
        }
    }
    Ok(merged)
}

/// Stable sort by timestamp. Records without a parseable timestamp sort
/// last in either order.
pub fn sort_activities(activities: &mut [Activity], order: SortOrder) {
    activities.sort_by(|a, b| {
        match (a.parsed_timestamp(), b.parsed_timestamp()) {
            (Some(left), Some(right)) => match order {
                SortOrder::Ascending => left.cmp(&right),
                SortOrder::Descending => right.cmp(&left),
            },
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
}
