//! Crypto.com exchange adapter

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::config::ExchangeCredential;
use crate::error::{Error, Result};
use crate::model::{Action, Activity, Asset};
use crate::names::display_name;
use crate::providers::util::format_timestamp_millis;
use crate::providers::{Provider, ProviderContext, sign};
use crate::record::{ActivityDraft, RecordStamper};

const PROVIDER: &str = "CryptoCom";

const USER_BALANCE_METHOD: &str = "private/user-balance";
const USER_BALANCE_ID: u64 = 11;
const TRANSACTIONS_METHOD: &str = "private/get-transactions";
const TRANSACTIONS_ID: u64 = 1;

pub struct CryptoComProvider {
    base_url: String,
    api_key: String,
    api_secret: String,
    stamper: RecordStamper,
    ctx: ProviderContext,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct DataPage<T> {
    #[serde(default)]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct UserBalance {
    #[serde(default)]
    position_balances: Vec<PositionBalance>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PositionBalance {
    instrument_name: String,
    quantity: Decimal,
    market_value: Decimal,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Transaction {
    #[serde(default)]
    journal_type: String,
    #[serde(default)]
    transaction_qty: Decimal,
    #[serde(default)]
    instrument_name: String,
    #[serde(default)]
    event_timestamp_ms: i64,
    #[serde(default)]
    side: Option<String>,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

impl CryptoComProvider {
    pub fn new(base_url: &str, credential: &ExchangeCredential, ctx: ProviderContext) -> Self {
        CryptoComProvider {
            base_url: base_url.to_string(),
            api_key: credential.api_key.clone(),
            api_secret: credential.api_secret.clone(),
            stamper: RecordStamper::exchange(PROVIDER),
            ctx,
        }
    }

    /// Signed JSON-RPC style call. The signature covers method + id +
    /// api key + sorted-params string + nonce; params are always empty here.
    async fn signed_call<T: DeserializeOwned>(&self, method: &str, id: u64) -> Result<T> {
        let nonce = Utc::now().timestamp_millis() as u64;
        let params_string = "";
        let payload = format!("{method}{id}{}{params_string}{nonce}", self.api_key);
        let signature = sign::hmac_sha256_hex(self.api_secret.as_bytes(), &payload);

        let body = json!({
            "id": id,
            "method": method,
            "params": {},
            "api_key": self.api_key,
            "nonce": nonce,
            "sig": signature,
        });

        debug!(method, "Calling Crypto.com endpoint");
        let client = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .timeout(crate::HTTP_TIMEOUT)
            .build()?;
        let response = client
            .post(format!("{}/{}", self.base_url, method))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(Error::Api {
                provider: PROVIDER,
                message: format!("HTTP {status}: {text}"),
            });
        }

        let parsed: ApiResponse<T> = serde_json::from_str(&text)?;
        if parsed.code != 0 {
            return Err(Error::Api {
                provider: PROVIDER,
                message: format!(
                    "code {}: {}",
                    parsed.code,
                    parsed.message.unwrap_or_default()
                ),
            });
        }
        parsed.result.ok_or_else(|| Error::Api {
            provider: PROVIDER,
            message: "reply carried no result".to_string(),
        })
    }

    async fn transactions(&self) -> Result<Vec<Activity>> {
        let page: DataPage<Transaction> = self
            .signed_call(TRANSACTIONS_METHOD, TRANSACTIONS_ID)
            .await?;

        let mut activities = Vec::with_capacity(page.data.len());
        for transaction in page.data {
            activities.push(self.stamper.activity(ActivityDraft {
                action: Action::Other(transaction.journal_type.clone()),
                amount: transaction.transaction_qty,
                currency: transaction.instrument_name.clone(),
                date: format_timestamp_millis(transaction.event_timestamp_ms),
                transaction_type: transaction.side.clone(),
                status: None,
                details: Some(json!({ "raw": serde_json::to_value(&transaction)? })),
            }));
        }
        Ok(activities)
    }
}

#[async_trait]
impl Provider for CryptoComProvider {
    fn origin_name(&self) -> &str {
        self.stamper.origin_name()
    }

    #[instrument(name = "CryptoComAssets", skip(self))]
    async fn all_assets(&self) -> Result<Vec<Asset>> {
        let page: DataPage<UserBalance> = self
            .signed_call(USER_BALANCE_METHOD, USER_BALANCE_ID)
            .await?;
        let Some(account) = page.data.first() else {
            return Ok(Vec::new());
        };

        // Position balances already carry a fiat market value; no separate
        // pricing pass is needed.
        let mut assets = Vec::new();
        for position in &account.position_balances {
            if position.quantity.is_zero() {
                continue;
            }
            let name = display_name(
                self.ctx.names.as_ref(),
                &position.instrument_name,
                &self.ctx.fallback_name,
            )
            .await;
            assets.push(self.stamper.asset(
                &name,
                &position.instrument_name,
                position.quantity,
                position.market_value,
            ));
        }
        Ok(assets)
    }

    #[instrument(name = "CryptoComActivities", skip(self))]
    async fn all_activities(&self) -> Result<Vec<Activity>> {
        match self.transactions().await {
            Ok(activities) => Ok(activities),
            Err(err) => {
                warn!(error = %err, "Crypto.com transactions unavailable");
                Ok(Vec::new())
            }
        }
    }
}
