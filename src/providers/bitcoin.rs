//! Bitcoin wallet adapter backed by the btc.com block explorer

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument};

use crate::config::Wallet;
use crate::error::{Error, Result};
use crate::model::{Action, Activity, Asset};
use crate::price::rate_for;
use crate::providers::util::{format_timestamp_secs, status_from_confirmations};
use crate::providers::{Provider, ProviderContext};
use crate::record::{ActivityDraft, RecordStamper};
use crate::retry::{ErrorClass, RetryPolicy};
use crate::units;

const PROVIDER: &str = "btc.com";

// btc.com has no structured throttle signal; a rate-limited request gets a
// plain-text "Don't abuse the API" body instead of JSON.
const THROTTLE_PREFIX: &str = "Don't abus";

pub struct BitcoinProvider {
    base_url: String,
    address: String,
    stamper: RecordStamper,
    ctx: ProviderContext,
    policy: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    data: Option<T>,
    err_no: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AddressDetails {
    balance: i64,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TransactionPage {
    #[serde(default)]
    list: Vec<BtcTransaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BtcTransaction {
    hash: String,
    block_time: i64,
    confirmations: u64,
    inputs_value: i64,
    #[serde(default)]
    inputs: Vec<TxInput>,
    #[serde(default)]
    outputs: Vec<TxOutput>,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TxInput {
    #[serde(default)]
    prev_addresses: Vec<String>,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TxOutput {
    #[serde(default)]
    addresses: Vec<String>,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

impl BitcoinProvider {
    pub fn new(base_url: &str, wallet: &Wallet, ctx: ProviderContext) -> Self {
        BitcoinProvider {
            base_url: base_url.to_string(),
            address: wallet.address.clone(),
            stamper: RecordStamper::wallet(&wallet.name),
            ctx,
            policy: RetryPolicy::block_explorer(),
        }
    }

    fn classify(err: &Error) -> ErrorClass {
        match err {
            Error::RateLimited { .. } => ErrorClass::RateLimited,
            _ => ErrorClass::Fatal,
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Requesting {}", url);

        let client = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .timeout(crate::HTTP_TIMEOUT)
            .build()?;
        let response = client.get(&url).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(Error::Api {
                provider: PROVIDER,
                message: format!("HTTP {status}: {text}"),
            });
        }
        if text.trim_start().starts_with(THROTTLE_PREFIX) {
            return Err(Error::RateLimited { provider: PROVIDER });
        }

        let envelope: Envelope<T> = serde_json::from_str(&text)?;
        if envelope.err_no != 0 {
            return Err(Error::Api {
                provider: PROVIDER,
                message: format!("err_no {}: {}", envelope.err_no, envelope.message),
            });
        }
        envelope.data.ok_or_else(|| Error::Api {
            provider: PROVIDER,
            message: "reply carried no data".to_string(),
        })
    }

    async fn address_details(&self) -> Result<Option<AddressDetails>> {
        let path = format!("/address/{}", self.address);
        self.policy
            .attempt(PROVIDER, || self.fetch::<AddressDetails>(&path), Self::classify)
            .await
    }

    async fn address_transactions(&self) -> Result<Option<TransactionPage>> {
        let path = format!("/address/{}/tx", self.address);
        self.policy
            .attempt(PROVIDER, || self.fetch::<TransactionPage>(&path), Self::classify)
            .await
    }
}

#[async_trait]
impl Provider for BitcoinProvider {
    fn origin_name(&self) -> &str {
        self.stamper.origin_name()
    }

    #[instrument(name = "BitcoinAssets", skip(self), fields(address = %self.address))]
    async fn all_assets(&self) -> Result<Vec<Asset>> {
        let Some(details) = self.address_details().await? else {
            return Ok(Vec::new());
        };

        let balance = units::satoshi_to_btc(Decimal::from(details.balance))?;
        if balance.is_zero() {
            return Ok(Vec::new());
        }

        let rates = self
            .ctx
            .rates
            .rates(&["BTC".to_string()], &self.ctx.fiat)
            .await?;
        let rate = rate_for(&rates, "BTC", &self.ctx.fiat);

        Ok(vec![self.stamper.asset("Bitcoin", "BTC", balance, balance * rate)])
    }

    #[instrument(name = "BitcoinActivities", skip(self), fields(address = %self.address))]
    async fn all_activities(&self) -> Result<Vec<Activity>> {
        let Some(page) = self.address_transactions().await? else {
            return Ok(Vec::new());
        };

        let mut activities = Vec::new();
        for tx in page.list {
            let from_addresses: Vec<&str> = tx
                .inputs
                .iter()
                .flat_map(|input| input.prev_addresses.iter().map(String::as_str))
                .collect();
            let to_addresses: Vec<&str> = tx
                .outputs
                .iter()
                .flat_map(|output| output.addresses.iter().map(String::as_str))
                .collect();

            let action = if from_addresses.contains(&self.address.as_str()) {
                Action::Out
            } else if to_addresses.contains(&self.address.as_str()) {
                Action::In
            } else {
                Action::Unknown
            };

            let amount = units::satoshi_to_btc(Decimal::from(tx.inputs_value))?;
            let details = json!({
                "raw": serde_json::to_value(&tx)?,
                "parsed": {
                    "fromAddresses": from_addresses.join(", "),
                    "toAddresses": to_addresses.join(", "),
                },
            });

            activities.push(self.stamper.activity(ActivityDraft {
                action,
                amount,
                currency: "BTC".to_string(),
                date: format_timestamp_secs(tx.block_time),
                transaction_type: Some("Transaction".to_string()),
                status: Some(status_from_confirmations(tx.confirmations).to_string()),
                details: Some(details),
            }));
        }

        Ok(activities)
    }
}
