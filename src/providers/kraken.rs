//! Kraken exchange adapter

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

use crate::config::ExchangeCredential;
use crate::error::{Error, Result};
use crate::model::{Action, Activity, Asset};
use crate::names::display_name;
use crate::price::rate_for;
use crate::providers::util::format_timestamp_secs;
use crate::providers::{Provider, ProviderContext, sign};
use crate::record::{ActivityDraft, RecordStamper};

const PROVIDER: &str = "Kraken";

pub struct KrakenProvider {
    base_url: String,
    api_key: String,
    api_secret: String,
    stamper: RecordStamper,
    ctx: ProviderContext,
}

#[derive(Debug, Deserialize)]
struct KrakenResponse<T> {
    #[serde(default)]
    error: Vec<String>,
    #[serde(default)]
    result: Option<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KrakenTransfer {
    #[serde(default)]
    method: String,
    asset: String,
    #[serde(default)]
    txid: String,
    amount: Decimal,
    time: i64,
    #[serde(default)]
    status: String,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TradesHistory {
    #[serde(default)]
    count: i64,
    #[serde(default)]
    trades: HashMap<String, KrakenTrade>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KrakenTrade {
    pair: String,
    time: f64,
    #[serde(default)]
    ordertype: String,
    price: Decimal,
    #[serde(default)]
    posstatus: Option<String>,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

impl KrakenProvider {
    pub fn new(base_url: &str, credential: &ExchangeCredential, ctx: ProviderContext) -> Self {
        KrakenProvider {
            base_url: base_url.to_string(),
            api_key: credential.api_key.clone(),
            api_secret: credential.api_secret.clone(),
            stamper: RecordStamper::exchange(PROVIDER),
            ctx,
        }
    }

    /// API-Sign: HMAC-SHA512 of `path + SHA256(nonce + postdata)` keyed with
    /// the base64-decoded secret, base64-encoded.
    fn sign_request(&self, path: &str, nonce: u64, postdata: &str) -> Result<String> {
        let secret = BASE64.decode(&self.api_secret).map_err(|e| Error::Api {
            provider: PROVIDER,
            message: format!("API secret is not valid base64: {e}"),
        })?;

        let digest = sign::sha256(format!("{nonce}{postdata}").as_bytes());
        let mut payload = path.as_bytes().to_vec();
        payload.extend(digest);
        Ok(sign::hmac_sha512_base64(&secret, &payload))
    }

    async fn private_call<T: DeserializeOwned>(&self, method: &str) -> Result<KrakenResponse<T>> {
        let path = format!("/0/private/{method}");
        let nonce = Utc::now().timestamp_millis() as u64;
        let postdata = format!("nonce={nonce}");
        let signature = self.sign_request(&path, nonce, &postdata)?;

        debug!(method, "Calling Kraken private endpoint");
        let client = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .timeout(crate::HTTP_TIMEOUT)
            .build()?;
        let response = client
            .post(format!("{}{}", self.base_url, path))
            .header("API-Key", &self.api_key)
            .header("API-Sign", signature)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(postdata)
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

    fn transfer_activities(
        &self,
        transfers: Vec<KrakenTransfer>,
        action: Action,
    ) -> Result<Vec<Activity>> {
        let mut activities = Vec::with_capacity(transfers.len());
        for transfer in transfers {
            activities.push(self.stamper.activity(ActivityDraft {
                action: action.clone(),
                amount: transfer.amount,
                currency: transfer.asset.clone(),
                date: format_timestamp_secs(transfer.time),
                transaction_type: Some(format!("txid: {}", transfer.txid)),
                status: Some(transfer.status.clone()),
                details: Some(json!({ "raw": serde_json::to_value(&transfer)? })),
            }));
        }
        Ok(activities)
    }

    async fn deposits(&self) -> Result<Vec<Activity>> {
        let response: KrakenResponse<Vec<KrakenTransfer>> =
            self.private_call("DepositStatus").await?;
        if !response.error.is_empty() {
            warn!(errors = ?response.error, "Kraken DepositStatus returned errors");
            return Ok(Vec::new());
        }
        self.transfer_activities(response.result.unwrap_or_default(), Action::Deposit)
    }

    async fn withdrawals(&self) -> Result<Vec<Activity>> {
        let response: KrakenResponse<Vec<KrakenTransfer>> =
            self.private_call("WithdrawStatus").await?;
        if !response.error.is_empty() {
            warn!(errors = ?response.error, "Kraken WithdrawStatus returned errors");
            return Ok(Vec::new());
        }
        self.transfer_activities(response.result.unwrap_or_default(), Action::Withdraw)
    }

    async fn trades(&self) -> Result<Vec<Activity>> {
        let response: KrakenResponse<TradesHistory> = self.private_call("TradesHistory").await?;
        if !response.error.is_empty() {
            warn!(errors = ?response.error, "Kraken TradesHistory returned errors");
            return Ok(Vec::new());
        }
        let Some(history) = response.result else {
            return Ok(Vec::new());
        };
        if history.count <= 0 {
            return Ok(Vec::new());
        }

        let mut activities = Vec::with_capacity(history.trades.len());
        for trade in history.trades.into_values() {
            activities.push(self.stamper.activity(ActivityDraft {
                action: Action::Other("Trade".to_string()),
                amount: trade.price,
                currency: trade.pair.clone(),
                date: format_timestamp_secs(trade.time as i64),
                transaction_type: Some(format!(
                    "Pair: {} | Price: {} | Order type: {}",
                    trade.pair, trade.price, trade.ordertype
                )),
                status: trade.posstatus.clone(),
                details: Some(json!({ "raw": serde_json::to_value(&trade)? })),
            }));
        }
        Ok(activities)
    }
}

#[async_trait]
impl Provider for KrakenProvider {
    fn origin_name(&self) -> &str {
        self.stamper.origin_name()
    }

    #[instrument(name = "KrakenAssets", skip(self))]
    async fn all_assets(&self) -> Result<Vec<Asset>> {
        let response: KrakenResponse<HashMap<String, Decimal>> =
            self.private_call("Balance").await?;
        if !response.error.is_empty() {
            warn!(errors = ?response.error, "Kraken Balance returned errors");
            return Ok(Vec::new());
        }
        let balances = response.result.unwrap_or_default();

        let mut symbols: Vec<String> = balances.keys().cloned().collect();
        symbols.sort();
        let rates = self.ctx.rates.rates(&symbols, &self.ctx.fiat).await?;

        let mut assets = Vec::new();
        for symbol in symbols {
            let balance = balances[&symbol];
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

    #[instrument(name = "KrakenActivities", skip(self))]
    async fn all_activities(&self) -> Result<Vec<Activity>> {
        // Each history endpoint degrades to empty on its own; a transport
        // failure on one still fails the whole method.
        let mut activities = self.deposits().await?;
        activities.extend(self.withdrawals().await?);
        activities.extend(self.trades().await?);
        Ok(activities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExchangeKind;
    use crate::providers::testing;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credential() -> ExchangeCredential {
        ExchangeCredential {
            exchange: ExchangeKind::Kraken,
            api_key: "test-key".to_string(),
            api_secret: BASE64.encode("kraken-test-secret"),
            active: true,
        }
    }

    async fn mount_private(server: &MockServer, endpoint: &str, body: &str) {
        Mock::given(method("POST"))
            .and(path(format!("/0/private/{endpoint}")))
            .and(header_exists("API-Sign"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_assets_price_batch_and_skip_zero_balances() {
        let exchange = MockServer::start().await;
        let prices = MockServer::start().await;

        mount_private(
            &exchange,
            "Balance",
            r#"{"error":[],"result":{"BTC":"0.75","ETH":"0","OBSCURECOIN":"10"}}"#,
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/data/pricemulti"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"BTC":{"USD":30000},"ETH":{"USD":2000}}"#,
            ))
            .expect(1)
            .mount(&prices)
            .await;

        let provider =
            KrakenProvider::new(&exchange.uri(), &credential(), testing::context(&prices.uri()));
        let assets = provider.all_assets().await.unwrap();

        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].symbol, "BTC");
        assert_eq!(assets[0].value, dec!(22500));
        // Unpriced ticker keeps its balance with a zero value.
        assert_eq!(assets[1].symbol, "OBSCURECOIN");
        assert_eq!(assets[1].balance, dec!(10));
        assert_eq!(assets[1].value, Decimal::ZERO);
        assert_eq!(assets[1].name, "");
    }

    #[tokio::test]
    async fn test_error_array_degrades_to_empty() {
        let exchange = MockServer::start().await;

        mount_private(
            &exchange,
            "Balance",
            r#"{"error":["EAPI:Invalid key"],"result":null}"#,
        )
        .await;

        let provider = KrakenProvider::new(
            &exchange.uri(),
            &credential(),
            testing::context("http://127.0.0.1:1"),
        );
        let assets = provider.all_assets().await.unwrap();
        assert!(assets.is_empty());
    }

    #[tokio::test]
    async fn test_activities_merge_transfers_and_trades() {
        let exchange = MockServer::start().await;

        mount_private(
            &exchange,
            "DepositStatus",
            r#"{"error":[],"result":[
                {"method":"Bitcoin","aclass":"currency","asset":"BTC","refid":"r1",
                 "txid":"dep-tx-1","info":"addr","amount":"0.5","fee":"0",
                 "time":1680345000,"status":"Success"}
            ]}"#,
        )
        .await;
        mount_private(
            &exchange,
            "WithdrawStatus",
            r#"{"error":[],"result":[
                {"method":"Ether","aclass":"currency","asset":"ETH","refid":"r2",
                 "txid":"wd-tx-1","info":"addr","amount":"1.25","fee":"0.004",
                 "time":1680400000,"status":"Pending"}
            ]}"#,
        )
        .await;
        mount_private(
            &exchange,
            "TradesHistory",
            r#"{"error":[],"result":{"count":1,"trades":{
                "TX1":{"ordertxid":"o1","pair":"XBTUSD","time":1680420000.5,
                       "type":"buy","ordertype":"limit","price":"30000.1","cost":"3000.01",
                       "fee":"4.8","vol":"0.1","posstatus":"closed"}
            }}}"#,
        )
        .await;

        let provider = KrakenProvider::new(
            &exchange.uri(),
            &credential(),
            testing::context("http://127.0.0.1:1"),
        );
        let activities = provider.all_activities().await.unwrap();

        assert_eq!(activities.len(), 3);
        assert_eq!(activities[0].action, Action::Deposit);
        assert_eq!(activities[0].amount, dec!(0.5));
        assert_eq!(activities[0].currency, "BTC");
        assert_eq!(
            activities[0].transaction_type.as_deref(),
            Some("txid: dep-tx-1")
        );
        assert_eq!(activities[1].action, Action::Withdraw);
        assert_eq!(activities[1].status.as_deref(), Some("Pending"));
        assert_eq!(activities[2].action, Action::Other("Trade".to_string()));
        assert_eq!(activities[2].amount, dec!(30000.1));
        assert_eq!(activities[2].currency, "XBTUSD");
        assert_eq!(
            activities[2].details.as_ref().unwrap()["raw"]["ordertxid"],
            "o1"
        );
    }

    #[tokio::test]
    async fn test_failing_history_endpoint_degrades_but_others_survive() {
        let exchange = MockServer::start().await;

        mount_private(
            &exchange,
            "DepositStatus",
            r#"{"error":["EGeneral:Internal error"],"result":null}"#,
        )
        .await;
        mount_private(&exchange, "WithdrawStatus", r#"{"error":[],"result":[]}"#).await;
        mount_private(
            &exchange,
            "TradesHistory",
            r#"{"error":[],"result":{"count":0,"trades":{}}}"#,
        )
        .await;

        let provider = KrakenProvider::new(
            &exchange.uri(),
            &credential(),
            testing::context("http://127.0.0.1:1"),
        );
        let activities = provider.all_activities().await.unwrap();
        assert!(activities.is_empty());
    }
}
