use std::fs;

use chainfolio::config::AppConfig;
use chainfolio::model::OriginType;
use chainfolio::{Aggregator, SortOrder};
use rust_decimal_macros::dec;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BTC_ADDRESS: &str = "1BoatSLRHtKNngkdXEeobR76b53LETtpyT";

mod test_utils {
    use super::*;

    pub async fn mount_btc_details(server: &MockServer, balance: i64) {
        let body = format!(
            r#"{{"data":{{"address":"{BTC_ADDRESS}","balance":{balance}}},"err_no":0,"message":"success"}}"#
        );
        Mock::given(method("GET"))
            .and(path(format!("/address/{BTC_ADDRESS}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    pub async fn mount_btc_transactions(server: &MockServer, body: String) {
        Mock::given(method("GET"))
            .and(path(format!("/address/{BTC_ADDRESS}/tx")))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    pub async fn mount_kraken(server: &MockServer, endpoint: &str, body: &str) {
        Mock::given(method("POST"))
            .and(path(format!("/0/private/{endpoint}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
            .mount(server)
            .await;
    }

    pub async fn mount_rates(server: &MockServer, body: &str) {
        Mock::given(method("GET"))
            .and(path("/data/pricemulti"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
            .mount(server)
            .await;
    }

    pub fn config_yaml(
        prices: &MockServer,
        kraken: &MockServer,
        bitcoin: &MockServer,
        fail_fast: bool,
        extra_wallets: &str,
        extra_providers: &str,
    ) -> String {
        format!(
            r#"
currency: "USD"
fail_fast: {fail_fast}
accounts:
  exchanges:
    - exchange: Kraken
      api_key: "test-key"
      api_secret: "a3Jha2VuLXRlc3Qtc2VjcmV0"
  wallets:
    - name: "cold storage"
      address: "{BTC_ADDRESS}"
      chain: Bitcoin
{extra_wallets}
providers:
  kraken:
    base_url: {kraken_url}
  bitcoin:
    base_url: {bitcoin_url}
{extra_providers}
price:
  base_url: {price_url}
"#,
            kraken_url = kraken.uri(),
            bitcoin_url = bitcoin.uri(),
            price_url = prices.uri(),
        )
    }

    pub fn load_config(yaml: &str) -> AppConfig {
        let config_file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
        fs::write(config_file.path(), yaml).expect("Failed to write config file");
        AppConfig::load_from_path(config_file.path()).expect("Failed to load config")
    }
}

#[test_log::test(tokio::test)]
async fn test_asset_list_merges_exchange_and_wallet_origins() {
    let prices = MockServer::start().await;
    let kraken = MockServer::start().await;
    let bitcoin = MockServer::start().await;

    test_utils::mount_kraken(
        &kraken,
        "Balance",
        r#"{"error":[],"result":{"ETH":"2.0"}}"#,
    )
    .await;
    test_utils::mount_btc_details(&bitcoin, 150_000_000).await;
    test_utils::mount_rates(
        &prices,
        r#"{"BTC":{"USD":30000},"ETH":{"USD":2000}}"#,
    )
    .await;

    let config = test_utils::load_config(&test_utils::config_yaml(
        &prices, &kraken, &bitcoin, false, "", "",
    ));
    let accounts = config.accounts.clone();
    let aggregator = Aggregator::new(config);

    let assets = aggregator.asset_list(&accounts).await.unwrap();

    // Exchanges contribute before wallets.
    assert_eq!(assets.len(), 2);
    assert_eq!(assets[0].origin_type, OriginType::Exchange);
    assert_eq!(assets[0].origin_name, "Kraken");
    assert_eq!(assets[0].symbol, "ETH");
    assert_eq!(assets[0].value, dec!(4000.0));
    assert_eq!(assets[1].origin_type, OriginType::Wallet);
    assert_eq!(assets[1].origin_name, "cold storage");
    assert_eq!(assets[1].balance, dec!(1.5));
    assert_eq!(assets[1].value, dec!(45000));

    for asset in &assets {
        assert!(!asset.balance.is_zero());
    }
}

#[test_log::test(tokio::test)]
async fn test_activities_merge_and_sort_descending_across_origins() {
    let prices = MockServer::start().await;
    let kraken = MockServer::start().await;
    let bitcoin = MockServer::start().await;

    test_utils::mount_kraken(
        &kraken,
        "DepositStatus",
        r#"{"error":[],"result":[
            {"method":"Bitcoin","asset":"BTC","txid":"dep-1","amount":"0.5",
             "time":1680430000,"status":"Success"}
        ]}"#,
    )
    .await;
    test_utils::mount_kraken(&kraken, "WithdrawStatus", r#"{"error":[],"result":[]}"#).await;
    test_utils::mount_kraken(
        &kraken,
        "TradesHistory",
        r#"{"error":[],"result":{"count":0,"trades":{}}}"#,
    )
    .await;
    test_utils::mount_btc_transactions(
        &bitcoin,
        format!(
            r#"{{"data":{{"list":[
                {{"hash":"old","block_time":1680000000,"confirmations":100,"inputs_value":10000000,
                  "inputs":[{{"prev_addresses":["{BTC_ADDRESS}"]}}],"outputs":[{{"addresses":["other"]}}]}},
                {{"hash":"new","block_time":1680500000,"confirmations":1,"inputs_value":20000000,
                  "inputs":[{{"prev_addresses":["other"]}}],"outputs":[{{"addresses":["{BTC_ADDRESS}"]}}]}}
            ]}},"err_no":0,"message":"success"}}"#
        ),
    )
    .await;
    test_utils::mount_rates(&prices, r#"{}"#).await;

    let config = test_utils::load_config(&test_utils::config_yaml(
        &prices, &kraken, &bitcoin, false, "", "",
    ));
    let accounts = config.accounts.clone();
    let aggregator = Aggregator::new(config);

    let activities = aggregator
        .activities(&accounts, SortOrder::Descending)
        .await
        .unwrap();

    assert_eq!(activities.len(), 3);
    // Newest first, regardless of which origin produced it.
    let hashes_or_txids: Vec<&str> = activities
        .iter()
        .map(|a| a.date.as_deref().unwrap())
        .collect();
    assert_eq!(
        hashes_or_txids,
        vec![
            "2023-04-03T05:33:20.000Z", // btc "new"
            "2023-04-02T10:06:40.000Z", // kraken deposit
            "2023-03-28T10:40:00.000Z", // btc "old"
        ]
    );

    for pair in activities.windows(2) {
        let (left, right) = (
            pair[0].parsed_timestamp().unwrap(),
            pair[1].parsed_timestamp().unwrap(),
        );
        assert!(left >= right);
    }

    let ascending = aggregator
        .activities(&accounts, SortOrder::Ascending)
        .await
        .unwrap();
    assert_eq!(
        ascending[0].date.as_deref(),
        Some("2023-03-28T10:40:00.000Z")
    );
}

#[test_log::test(tokio::test)]
async fn test_failing_origin_is_isolated_from_the_rest() {
    let prices = MockServer::start().await;
    let kraken = MockServer::start().await;
    let bitcoin = MockServer::start().await;
    let broken_explorer = MockServer::start().await;

    test_utils::mount_kraken(
        &kraken,
        "Balance",
        r#"{"error":[],"result":{"ETH":"2.0"}}"#,
    )
    .await;
    test_utils::mount_btc_details(&bitcoin, 100_000_000).await;
    test_utils::mount_rates(
        &prices,
        r#"{"BTC":{"USD":30000},"ETH":{"USD":2000}}"#,
    )
    .await;
    // The Ethereum explorer is down hard; its origin must not poison the rest.
    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&broken_explorer)
        .await;

    let extra_wallet = r#"    - name: "hot wallet"
      address: "0xabc"
      chain: Ethereum"#;
    let extra_provider = format!(
        "  ethereum:\n    base_url: {}/api",
        broken_explorer.uri()
    );

    let config = test_utils::load_config(&test_utils::config_yaml(
        &prices,
        &kraken,
        &bitcoin,
        false,
        extra_wallet,
        &extra_provider,
    ));
    let accounts = config.accounts.clone();
    let aggregator = Aggregator::new(config);

    let assets = aggregator.asset_list(&accounts).await.unwrap();

    let origins: Vec<&str> = assets.iter().map(|a| a.origin_name.as_str()).collect();
    assert_eq!(origins, vec!["Kraken", "cold storage"]);
}

#[test_log::test(tokio::test)]
async fn test_fail_fast_aborts_on_first_provider_error() {
    let prices = MockServer::start().await;
    let kraken = MockServer::start().await;
    let bitcoin = MockServer::start().await;

    // Kraken is healthy, the Bitcoin explorer rejects the address.
    test_utils::mount_kraken(
        &kraken,
        "Balance",
        r#"{"error":[],"result":{"ETH":"2.0"}}"#,
    )
    .await;
    Mock::given(method("GET"))
        .and(path(format!("/address/{BTC_ADDRESS}")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"data":null,"err_no":1,"message":"invalid address"}"#),
        )
        .mount(&bitcoin)
        .await;
    test_utils::mount_rates(&prices, r#"{"ETH":{"USD":2000}}"#).await;

    let config = test_utils::load_config(&test_utils::config_yaml(
        &prices, &kraken, &bitcoin, true, "", "",
    ));
    let accounts = config.accounts.clone();
    let aggregator = Aggregator::new(config);

    let result = aggregator.asset_list(&accounts).await;
    match result {
        Err(chainfolio::Error::Provider { origin, .. }) => {
            assert_eq!(origin, "cold storage");
        }
        other => panic!("expected provider error, got {other:?}"),
    }
}

#[test_log::test(tokio::test)]
async fn test_price_batching_is_one_call_for_the_whole_origin() {
    let prices = MockServer::start().await;
    let kraken = MockServer::start().await;
    let bitcoin = MockServer::start().await;

    test_utils::mount_kraken(
        &kraken,
        "Balance",
        r#"{"error":[],"result":{"ADA":"1","BTC":"1","DOT":"1","ETH":"1","XRP":"1"}}"#,
    )
    .await;
    test_utils::mount_btc_details(&bitcoin, 0).await;

    // Five assets on the origin, exactly one batched price call.
    Mock::given(method("GET"))
        .and(path("/data/pricemulti"))
        .and(query_param("fsyms", "ADA,BTC,DOT,ETH,XRP"))
        .and(query_param("tsyms", "USD"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"ADA":{"USD":1},"BTC":{"USD":2},"DOT":{"USD":3},"ETH":{"USD":4},"XRP":{"USD":5}}"#,
        ))
        .expect(1)
        .mount(&prices)
        .await;

    let config = test_utils::load_config(&test_utils::config_yaml(
        &prices, &kraken, &bitcoin, false, "", "",
    ));
    let accounts = config.accounts.clone();
    let aggregator = Aggregator::new(config);

    let assets = aggregator.asset_list(&accounts).await.unwrap();
    assert_eq!(assets.len(), 5);
}
