//! Bitfinex exchange adapter.
//!
//! The v2 API encodes records as positional JSON arrays; field offsets
//! follow the published wire format for wallets and movements.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use std::str::FromStr;
use tracing::{debug, instrument, warn};

use crate::config::ExchangeCredential;
use crate::error::{Error, Result};
use crate::model::{Action, Activity, Asset};
use crate::names::display_name;
use crate::price::rate_for;
use crate::providers::util::format_timestamp_millis;
use crate::providers::{Provider, ProviderContext, sign};
use crate::record::{ActivityDraft, RecordStamper};

const PROVIDER: &str = "Bitfinex";

// Wallet row offsets.
const WALLET_CURRENCY: usize = 1;
const WALLET_BALANCE: usize = 2;

// Movement row offsets.
const MOVEMENT_ID: usize = 0;
const MOVEMENT_CURRENCY: usize = 1;
const MOVEMENT_CURRENCY_NAME: usize = 2;
const MOVEMENT_MTS_STARTED: usize = 5;
const MOVEMENT_MTS_UPDATED: usize = 6;
const MOVEMENT_STATUS: usize = 9;
const MOVEMENT_AMOUNT: usize = 12;
const MOVEMENT_FEES: usize = 13;
const MOVEMENT_DESTINATION: usize = 16;
const MOVEMENT_TRANSACTION_ID: usize = 20;
const MOVEMENT_NOTE: usize = 21;

pub struct BitfinexProvider {
    base_url: String,
    api_key: String,
    api_secret: String,
    stamper: RecordStamper,
    ctx: ProviderContext,
}

fn field(row: &Value, index: usize) -> Value {
    row.get(index).cloned().unwrap_or(Value::Null)
}

fn field_str(row: &Value, index: usize) -> Option<String> {
    row.get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn field_i64(row: &Value, index: usize) -> Option<i64> {
    row.get(index).and_then(Value::as_i64)
}

/// Amounts arrive as JSON numbers; parse their decimal rendering rather
/// than routing the value through binary floating point arithmetic.
fn field_decimal(row: &Value, index: usize) -> Result<Decimal> {
    match row.get(index) {
        Some(Value::Number(number)) => Decimal::from_str(&number.to_string())
            .map_err(|_| Error::InvalidNumeric(number.to_string())),
        Some(Value::String(text)) => {
            Decimal::from_str(text).map_err(|_| Error::InvalidNumeric(text.clone()))
        }
        other => Err(Error::InvalidNumeric(format!("{other:?}"))),
    }
}

impl BitfinexProvider {
    pub fn new(base_url: &str, credential: &ExchangeCredential, ctx: ProviderContext) -> Self {
        BitfinexProvider {
            base_url: base_url.to_string(),
            api_key: credential.api_key.clone(),
            api_secret: credential.api_secret.clone(),
            stamper: RecordStamper::exchange(PROVIDER),
            ctx,
        }
    }

    /// Authenticated POST; the signature covers `/api` + endpoint + nonce +
    /// raw body, HMAC-SHA384 hex.
    async fn auth_post(&self, endpoint: &str) -> Result<Vec<Value>> {
        let nonce = Utc::now().timestamp_millis().to_string();
        let body = "{}";
        let payload = format!("/api{endpoint}{nonce}{body}");
        let signature = sign::hmac_sha384_hex(self.api_secret.as_bytes(), &payload);

        debug!(endpoint, "Calling Bitfinex endpoint");
        let client = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .timeout(crate::HTTP_TIMEOUT)
            .build()?;
        let response = client
            .post(format!("{}{}", self.base_url, endpoint))
            .header("bfx-nonce", nonce)
            .header("bfx-apikey", &self.api_key)
            .header("bfx-signature", signature)
            .header("Content-Type", "application/json")
            .body(body)
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
        Ok(serde_json::from_str(&text)?)
    }

    async fn movements(&self) -> Result<Vec<Activity>> {
        let rows = self.auth_post("/v2/auth/r/movements/hist").await?;

        let mut activities = Vec::with_capacity(rows.len());
        for row in rows {
            let amount = match field_decimal(&row, MOVEMENT_AMOUNT) {
                Ok(amount) => amount,
                Err(err) => {
                    warn!(error = %err, "skipping movement with unusable amount");
                    continue;
                }
            };
            let currency = field_str(&row, MOVEMENT_CURRENCY).unwrap_or_default();
            let transaction_id =
                field_str(&row, MOVEMENT_TRANSACTION_ID).unwrap_or_default();

            let details = json!({
                "raw": {
                    "id": field(&row, MOVEMENT_ID),
                    "currency": field(&row, MOVEMENT_CURRENCY),
                    "currencyName": field(&row, MOVEMENT_CURRENCY_NAME),
                    "mtsStarted": field(&row, MOVEMENT_MTS_STARTED),
                    "mtsUpdated": field(&row, MOVEMENT_MTS_UPDATED),
                    "status": field(&row, MOVEMENT_STATUS),
                    "amount": field(&row, MOVEMENT_AMOUNT),
                    "fees": field(&row, MOVEMENT_FEES),
                    "destinationAddress": field(&row, MOVEMENT_DESTINATION),
                    "transactionId": field(&row, MOVEMENT_TRANSACTION_ID),
                    "note": field(&row, MOVEMENT_NOTE),
                },
            });

            activities.push(self.stamper.activity(ActivityDraft {
                action: Action::Transferred,
                amount,
                currency,
                date: field_i64(&row, MOVEMENT_MTS_STARTED).and_then(format_timestamp_millis),
                transaction_type: Some(format!("txid: {transaction_id}")),
                status: field_str(&row, MOVEMENT_STATUS),
                details: Some(details),
            }));
        }
        Ok(activities)
    }
}

#[async_trait]
impl Provider for BitfinexProvider {
    fn origin_name(&self) -> &str {
        self.stamper.origin_name()
    }

    #[instrument(name = "BitfinexAssets", skip(self))]
    async fn all_assets(&self) -> Result<Vec<Asset>> {
        let rows = self.auth_post("/v2/auth/r/wallets").await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let symbols: Vec<String> = rows
            .iter()
            .filter_map(|row| field_str(row, WALLET_CURRENCY))
            .collect();
        let rates = self.ctx.rates.rates(&symbols, &self.ctx.fiat).await?;

        let mut assets = Vec::new();
        for row in &rows {
            let Some(symbol) = field_str(row, WALLET_CURRENCY) else {
                continue;
            };
            let balance = match field_decimal(row, WALLET_BALANCE) {
                Ok(balance) => balance,
                Err(err) => {
                    warn!(symbol, error = %err, "skipping wallet with unusable balance");
                    continue;
                }
            };
            if balance.is_zero() {
                continue;
            }

            let name = display_name(
                self.ctx.names.as_ref(),
                &symbol,
                &self.ctx.fallback_name,
            )
            .await;
            let value = balance * rate_for(&rates, &symbol, &self.ctx.fiat);
            assets.push(self.stamper.asset(&name, &symbol, balance, value));
        }
        Ok(assets)
    }

    #[instrument(name = "BitfinexActivities", skip(self))]
    async fn all_activities(&self) -> Result<Vec<Activity>> {
        match self.movements().await {
            Ok(activities) => Ok(activities),
            Err(err) => {
                warn!(error = %err, "Bitfinex movements unavailable");
                Ok(Vec::new())
            }
        }
    }
}
