//! Account-chain wallet adapter for Etherscan-compatible explorers.
//!
//! Ethereum and BSC expose the same explorer API surface; one adapter
//! parameterized by a chain descriptor covers both.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, instrument, warn};

use crate::config::Wallet;
use crate::error::{Error, Result};
use crate::model::{Activity, Asset};
use crate::price::rate_for;
use crate::providers::util::{format_timestamp_secs, status_from_confirmations, tx_direction};
use crate::providers::{Provider, ProviderContext};
use crate::record::{ActivityDraft, RecordStamper};
use crate::retry::{ErrorClass, RetryPolicy};
use crate::units;

#[derive(Debug, Clone, Copy)]
pub struct EvmChainSpec {
    pub provider_name: &'static str,
    pub coin_name: &'static str,
    pub ticker: &'static str,
    pub transfer_label: &'static str,
    pub decimals: u32,
}

pub const ETHEREUM: EvmChainSpec = EvmChainSpec {
    provider_name: "Etherscan",
    coin_name: "Ethereum",
    ticker: "ETH",
    transfer_label: "ERC20 - Token Transfer Event",
    decimals: 18,
};

pub const BSC: EvmChainSpec = EvmChainSpec {
    provider_name: "BscScan",
    coin_name: "BNB",
    ticker: "BNB",
    transfer_label: "BEP20 - Token Transfer Event",
    decimals: 18,
};

pub struct EvmProvider {
    base_url: String,
    api_key: Option<String>,
    address: String,
    chain: EvmChainSpec,
    stamper: RecordStamper,
    ctx: ProviderContext,
    policy: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct ExplorerEnvelope {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NormalTransaction {
    #[serde(default)]
    from: String,
    #[serde(default)]
    to: String,
    #[serde(default)]
    value: String,
    #[serde(rename = "timeStamp", default)]
    time_stamp: String,
    #[serde(default)]
    confirmations: String,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct InternalTransaction {
    #[serde(default)]
    from: String,
    #[serde(default)]
    to: String,
    #[serde(default)]
    value: String,
    #[serde(rename = "timeStamp", default)]
    time_stamp: String,
    #[serde(rename = "isError", default)]
    is_error: String,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenTransfer {
    #[serde(default)]
    from: String,
    #[serde(default)]
    to: String,
    #[serde(default)]
    value: String,
    #[serde(rename = "timeStamp", default)]
    time_stamp: String,
    #[serde(default)]
    confirmations: String,
    #[serde(rename = "contractAddress", default)]
    contract_address: String,
    #[serde(rename = "tokenName", default)]
    token_name: String,
    #[serde(rename = "tokenSymbol", default)]
    token_symbol: String,
    #[serde(rename = "tokenDecimal", default)]
    token_decimal: String,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
struct TokenMeta {
    name: String,
    symbol: String,
    decimals: String,
}

impl EvmProvider {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        wallet: &Wallet,
        chain: EvmChainSpec,
        ctx: ProviderContext,
    ) -> Self {
        EvmProvider {
            base_url: base_url.to_string(),
            api_key,
            address: wallet.address.clone(),
            chain,
            stamper: RecordStamper::wallet(&wallet.name),
            ctx,
            policy: RetryPolicy::chain_explorer(),
        }
    }

    fn classify(err: &Error) -> ErrorClass {
        match err {
            Error::RateLimited { .. } => ErrorClass::RateLimited,
            Error::Transport(_) => ErrorClass::Transient,
            Error::EmptyResult { .. } => ErrorClass::RecoverableEmpty,
            _ => ErrorClass::Fatal,
        }
    }

    async fn query(&self, action: &str, extra: &[(&str, &str)]) -> Result<serde_json::Value> {
        let client = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .timeout(crate::HTTP_TIMEOUT)
            .build()?;

        let mut request = client
            .get(&self.base_url)
            .query(&[("module", "account"), ("action", action)])
            .query(extra);
        if let Some(key) = &self.api_key {
            request = request.query(&[("apikey", key.as_str())]);
        }

        debug!(action, "Querying {}", self.chain.provider_name);
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Api {
                provider: self.chain.provider_name,
                message: format!("HTTP {status}"),
            });
        }

        let envelope: ExplorerEnvelope = serde_json::from_str(&response.text().await?)?;
        if envelope.status != "0" {
            return Ok(envelope.result);
        }

        // A zero status covers three distinct conditions; the reply body is
        // the only way to tell them apart.
        let result_text = envelope.result.as_str().unwrap_or_default();
        if result_text.contains("rate limit") || envelope.message.contains("rate limit") {
            return Err(Error::RateLimited {
                provider: self.chain.provider_name,
            });
        }
        if envelope.message.starts_with("No transactions found") {
            return Err(Error::EmptyResult {
                provider: self.chain.provider_name,
                message: envelope.message,
            });
        }
        Err(Error::Api {
            provider: self.chain.provider_name,
            message: format!("{} - {}", envelope.message, result_text),
        })
    }

    async fn fetch_list<T: DeserializeOwned>(&self, action: &str) -> Result<Option<Vec<T>>> {
        self.policy
            .attempt(
                self.chain.provider_name,
                || async {
                    let value = self
                        .query(action, &[("address", self.address.as_str())])
                        .await?;
                    Ok(serde_json::from_value(value)?)
                },
                Self::classify,
            )
            .await
    }

    async fn fetch_native_balance(&self) -> Result<Option<String>> {
        self.policy
            .attempt(
                self.chain.provider_name,
                || async {
                    let value = self
                        .query("balance", &[("address", self.address.as_str())])
                        .await?;
                    Ok(serde_json::from_value(value)?)
                },
                Self::classify,
            )
            .await
    }

    async fn fetch_token_balance(&self, contract: &str) -> Result<Option<String>> {
        self.policy
            .attempt(
                self.chain.provider_name,
                || async {
                    let value = self
                        .query(
                            "tokenbalance",
                            &[
                                ("address", self.address.as_str()),
                                ("contractaddress", contract),
                            ],
                        )
                        .await?;
                    Ok(serde_json::from_value(value)?)
                },
                Self::classify,
            )
            .await
    }

    async fn token_transfer_events(&self) -> Result<Option<Vec<TokenTransfer>>> {
        self.fetch_list("tokentx").await
    }
}

#[async_trait]
impl Provider for EvmProvider {
    fn origin_name(&self) -> &str {
        self.stamper.origin_name()
    }

    #[instrument(name = "EvmAssets", skip(self), fields(chain = self.chain.provider_name, address = %self.address))]
    async fn all_assets(&self) -> Result<Vec<Asset>> {
        let mut assets = Vec::new();

        if let Some(raw) = self.fetch_native_balance().await? {
            let balance = units::from_base_str(&raw, self.chain.decimals)?;
            if !balance.is_zero() {
                let rates = self
                    .ctx
                    .rates
                    .rates(&[self.chain.ticker.to_string()], &self.ctx.fiat)
                    .await?;
                let rate = rate_for(&rates, self.chain.ticker, &self.ctx.fiat);
                assets.push(self.stamper.asset(
                    self.chain.coin_name,
                    self.chain.ticker,
                    balance,
                    balance * rate,
                ));
            }
        }

        let Some(transfers) = self.token_transfer_events().await? else {
            return Ok(assets);
        };

        // Every contract seen in a transfer event is a token the wallet may
        // still hold; discover first, price the whole set in one batch, then
        // fetch per-contract balances.
        let mut discovered: BTreeMap<String, TokenMeta> = BTreeMap::new();
        for transfer in &transfers {
            discovered.insert(
                transfer.contract_address.clone(),
                TokenMeta {
                    name: transfer.token_name.clone(),
                    symbol: transfer.token_symbol.clone(),
                    decimals: transfer.token_decimal.clone(),
                },
            );
        }

        let symbols: Vec<String> = discovered.values().map(|meta| meta.symbol.clone()).collect();
        let rates = self.ctx.rates.rates(&symbols, &self.ctx.fiat).await?;

        for (contract, meta) in &discovered {
            let Some(raw) = self.fetch_token_balance(contract).await? else {
                continue;
            };

            let Ok(decimals) = meta.decimals.parse::<u32>() else {
                warn!(contract = %contract, decimals = %meta.decimals, "skipping token with unusable decimals");
                continue;
            };
            let balance = match units::from_base_str(&raw, decimals) {
                Ok(balance) => balance,
                Err(err) => {
                    warn!(contract = %contract, error = %err, "skipping token with unusable balance");
                    continue;
                }
            };
            if balance.is_zero() {
                continue;
            }

            let rate = rate_for(&rates, &meta.symbol, &self.ctx.fiat);
            assets.push(self.stamper.asset(&meta.name, &meta.symbol, balance, balance * rate));
        }

        Ok(assets)
    }

    #[instrument(name = "EvmActivities", skip(self), fields(chain = self.chain.provider_name, address = %self.address))]
    async fn all_activities(&self) -> Result<Vec<Activity>> {
        let mut activities = Vec::new();

        if let Some(transactions) = self.fetch_list::<NormalTransaction>("txlist").await? {
            for tx in transactions {
                let amount = match units::from_base_str(&tx.value, self.chain.decimals) {
                    Ok(amount) => amount,
                    Err(err) => {
                        warn!(error = %err, "skipping transaction with unusable value");
                        continue;
                    }
                };
                let confirmations = tx.confirmations.parse().unwrap_or(0);
                activities.push(self.stamper.activity(ActivityDraft {
                    action: tx_direction(&self.address, &tx.from, &tx.to),
                    amount,
                    currency: self.chain.ticker.to_string(),
                    date: tx.time_stamp.parse().ok().and_then(format_timestamp_secs),
                    transaction_type: Some("Normal Transaction".to_string()),
                    status: Some(status_from_confirmations(confirmations).to_string()),
                    details: Some(json!({ "raw": serde_json::to_value(&tx)? })),
                }));
            }
        }

        if let Some(transactions) = self.fetch_list::<InternalTransaction>("txlistinternal").await? {
            for tx in transactions {
                let amount = match units::from_base_str(&tx.value, self.chain.decimals) {
                    Ok(amount) => amount,
                    Err(err) => {
                        warn!(error = %err, "skipping internal transaction with unusable value");
                        continue;
                    }
                };
                activities.push(self.stamper.activity(ActivityDraft {
                    action: tx_direction(&self.address, &tx.from, &tx.to),
                    amount,
                    currency: self.chain.ticker.to_string(),
                    date: tx.time_stamp.parse().ok().and_then(format_timestamp_secs),
                    transaction_type: Some("Internal Transaction".to_string()),
                    status: Some(format!("isError: {}", tx.is_error)),
                    details: Some(json!({ "raw": serde_json::to_value(&tx)? })),
                }));
            }
        }

        if let Some(transfers) = self.token_transfer_events().await? {
            for transfer in transfers {
                let Ok(decimals) = transfer.token_decimal.parse::<u32>() else {
                    warn!(
                        contract = %transfer.contract_address,
                        "skipping transfer with unusable decimals"
                    );
                    continue;
                };
                let amount = match units::from_base_str(&transfer.value, decimals) {
                    Ok(amount) => amount,
                    Err(err) => {
                        warn!(error = %err, "skipping transfer with unusable value");
                        continue;
                    }
                };
                let confirmations = transfer.confirmations.parse().unwrap_or(0);
                activities.push(self.stamper.activity(ActivityDraft {
                    action: tx_direction(&self.address, &transfer.from, &transfer.to),
                    amount,
                    currency: transfer.token_symbol.clone(),
                    date: transfer
                        .time_stamp
                        .parse()
                        .ok()
                        .and_then(format_timestamp_secs),
                    transaction_type: Some(self.chain.transfer_label.to_string()),
                    status: Some(status_from_confirmations(confirmations).to_string()),
                    details: Some(json!({ "raw": serde_json::to_value(&transfer)? })),
                }));
            }
        }

        Ok(activities)
    }
}
