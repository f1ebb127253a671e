//! Binance exchange adapter.
//!
//! Balances live on several sub-accounts (spot, margin, futures, earn);
//! they are fetched concurrently, merged by ticker and priced in one batch.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use crate::config::ExchangeCredential;
use crate::error::{Error, Result};
use crate::model::{Action, Activity, Asset};
use crate::names::display_name;
use crate::price::rate_for;
use crate::providers::util::format_timestamp_millis;
use crate::providers::{Provider, ProviderContext, sign};
use crate::record::{ActivityDraft, RecordStamper};

const PROVIDER: &str = "Binance";
const RECV_WINDOW: u64 = 5_000;
// 2009-01-03; predates any fiat order that could exist.
const FIAT_HISTORY_BEGIN_MS: u64 = 1_230_940_800_000;

const SUB_ACCOUNT_TYPES: [&str; 3] = ["SPOT", "MARGIN", "FUTURES"];

// Returned when the account has no margin/futures sub-account at all.
const NO_SUCH_ACCOUNT_CODE: i64 = -5011;

pub struct BinanceProvider {
    base_url: String,
    api_key: String,
    api_secret: String,
    stamper: RecordStamper,
    ctx: ProviderContext,
}

#[derive(Debug, Deserialize)]
struct BinanceErrorBody {
    code: i64,
    #[serde(default)]
    msg: String,
}

#[derive(Debug, Deserialize)]
struct SnapshotResponse {
    #[serde(rename = "snapshotVos", default)]
    snapshots: Vec<Snapshot>,
}

#[derive(Debug, Deserialize)]
struct Snapshot {
    #[serde(default)]
    data: Option<SnapshotData>,
}

#[derive(Debug, Deserialize)]
struct SnapshotData {
    #[serde(rename = "totalAssetOfBtc", default)]
    total_asset_of_btc: Option<Decimal>,
    #[serde(default)]
    balances: Vec<SnapshotBalance>,
}

#[derive(Debug, Clone, Deserialize)]
struct SnapshotBalance {
    asset: String,
    free: Decimal,
    locked: Decimal,
}

#[derive(Debug, Deserialize)]
struct EarnAccountResponse {
    #[serde(rename = "positionAmountVos", default)]
    positions: Vec<EarnPosition>,
}

#[derive(Debug, Deserialize)]
struct EarnPosition {
    asset: String,
    amount: Decimal,
}

#[derive(Debug, Deserialize)]
struct FiatOrdersResponse {
    #[serde(default)]
    data: Vec<FiatOrder>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FiatOrder {
    #[serde(rename = "fiatCurrency", default)]
    fiat_currency: String,
    #[serde(rename = "indicatedAmount", default)]
    indicated_amount: Decimal,
    #[serde(default)]
    method: String,
    #[serde(default)]
    status: String,
    #[serde(rename = "createTime", default)]
    create_time: i64,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Default, Clone)]
struct MergedBalance {
    free: Decimal,
    locked: Decimal,
}

impl BinanceProvider {
    pub fn new(base_url: &str, credential: &ExchangeCredential, ctx: ProviderContext) -> Self {
        BinanceProvider {
            base_url: base_url.to_string(),
            api_key: credential.api_key.clone(),
            api_secret: credential.api_secret.clone(),
            stamper: RecordStamper::exchange(PROVIDER),
            ctx,
        }
    }

    /// Signed GET against a `/sapi` endpoint. The signature is an HMAC over
    /// the full query string, appended as its final parameter.
    async fn signed_get(&self, endpoint: &str, params: &[(&str, String)]) -> Result<String> {
        let timestamp = Utc::now().timestamp_millis();
        let mut query = params
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&format!("recvWindow={RECV_WINDOW}&timestamp={timestamp}"));
        let signature = sign::hmac_sha256_hex(self.api_secret.as_bytes(), &query);

        let url = format!("{}{}?{}&signature={}", self.base_url, endpoint, query, signature);
        debug!(endpoint, "Requesting Binance endpoint");

        let client = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .timeout(crate::HTTP_TIMEOUT)
            .build()?;
        let response = client
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if status.is_success() {
            return Ok(text);
        }
        if status.as_u16() == 429 {
            return Err(Error::RateLimited { provider: PROVIDER });
        }
        if let Ok(body) = serde_json::from_str::<BinanceErrorBody>(&text) {
            return Err(Error::Api {
                provider: PROVIDER,
                message: format!("code {}: {}", body.code, body.msg),
            });
        }
        Err(Error::Api {
            provider: PROVIDER,
            message: format!("HTTP {status}: {text}"),
        })
    }

    /// Non-zero balances from the latest daily snapshot of one sub-account.
    /// An account without that sub-account type contributes nothing.
    async fn snapshot_balances(&self, kind: &str) -> Result<Vec<SnapshotBalance>> {
        let text = match self
            .signed_get(
                "/sapi/v1/accountSnapshot",
                &[("type", kind.to_string()), ("limit", "30".to_string())],
            )
            .await
        {
            Ok(text) => text,
            Err(Error::Api { message, .. }) if message.starts_with(&format!("code {NO_SUCH_ACCOUNT_CODE}")) => {
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };

        let response: SnapshotResponse = serde_json::from_str(&text)?;
        let Some(data) = response.snapshots.into_iter().next_back().and_then(|s| s.data) else {
            return Ok(Vec::new());
        };
        if data.total_asset_of_btc.unwrap_or(Decimal::ZERO).is_zero() {
            return Ok(Vec::new());
        }

        Ok(data
            .balances
            .into_iter()
            .filter(|balance| !(balance.free.is_zero() && balance.locked.is_zero()))
            .collect())
    }

    /// Simple-Earn positions, shaped like snapshot balances.
    async fn earn_balances(&self) -> Result<Vec<SnapshotBalance>> {
        let text = self
            .signed_get("/sapi/v1/lending/union/account", &[])
            .await?;
        let response: EarnAccountResponse = serde_json::from_str(&text)?;
        Ok(response
            .positions
            .into_iter()
            .filter(|position| !position.amount.is_zero())
            .map(|position| SnapshotBalance {
                asset: position.asset,
                free: position.amount,
                locked: Decimal::ZERO,
            })
            .collect())
    }

    async fn fiat_orders(&self, transaction_type: u8) -> Result<Vec<FiatOrder>> {
        let text = self
            .signed_get(
                "/sapi/v1/fiat/orders",
                &[
                    ("transactionType", transaction_type.to_string()),
                    ("beginTime", FIAT_HISTORY_BEGIN_MS.to_string()),
                ],
            )
            .await?;
        let response: FiatOrdersResponse = serde_json::from_str(&text)?;
        Ok(response.data)
    }

    fn fiat_activities(&self, orders: Vec<FiatOrder>, action: Action) -> Result<Vec<Activity>> {
        let mut activities = Vec::with_capacity(orders.len());
        for order in orders {
            activities.push(self.stamper.activity(ActivityDraft {
                action: action.clone(),
                amount: order.indicated_amount,
                currency: order.fiat_currency.clone(),
                date: format_timestamp_millis(order.create_time),
                transaction_type: Some(order.method.clone()),
                status: Some(order.status.clone()),
                details: Some(json!({ "raw": serde_json::to_value(&order)? })),
            }));
        }
        Ok(activities)
    }
}

#[async_trait]
impl Provider for BinanceProvider {
    fn origin_name(&self) -> &str {
        self.stamper.origin_name()
    }

    #[instrument(name = "BinanceAssets", skip(self))]
    async fn all_assets(&self) -> Result<Vec<Asset>> {
        let (spot, margin, futures_acct, earn) = futures::try_join!(
            self.snapshot_balances(SUB_ACCOUNT_TYPES[0]),
            self.snapshot_balances(SUB_ACCOUNT_TYPES[1]),
            self.snapshot_balances(SUB_ACCOUNT_TYPES[2]),
            self.earn_balances(),
        )?;

        let mut merged: BTreeMap<String, MergedBalance> = BTreeMap::new();
        for balance in spot
            .into_iter()
            .chain(margin)
            .chain(futures_acct)
            .chain(earn)
        {
            let entry = merged.entry(balance.asset).or_default();
            entry.free += balance.free;
            entry.locked += balance.locked;
        }

        let symbols: Vec<String> = merged.keys().cloned().collect();
        let rates = self.ctx.rates.rates(&symbols, &self.ctx.fiat).await?;

        let mut assets = Vec::new();
        for (symbol, balance) in merged {
            // Tickers the price API does not know are dropped entirely.
            if !rates.contains_key(&symbol) {
                continue;
            }
            if balance.free.is_zero() {
                continue;
            }

            let name = display_name(
                self.ctx.names.as_ref(),
                &symbol,
                &self.ctx.fallback_name,
            )
            .await;
            let value = balance.free * rate_for(&rates, &symbol, &self.ctx.fiat);
            assets.push(self.stamper.asset(&name, &symbol, balance.free, value));
        }

        Ok(assets)
    }

    #[instrument(name = "BinanceActivities", skip(self))]
    async fn all_activities(&self) -> Result<Vec<Activity>> {
        let deposits = self.fiat_orders(0).await?;
        let withdrawals = self.fiat_orders(1).await?;

        let mut activities = self.fiat_activities(deposits, Action::Deposit)?;
        activities.extend(self.fiat_activities(withdrawals, Action::Withdraw)?);
        Ok(activities)
    }
}
