// Price oracle integration tests
// HTTP ticker parsing and failure classification against a mock server

mod common;

use anyhow::Result;
use common::counterparty;
use p2p_market::database::{CounterpartyRepository, MemoryStore};
use p2p_market::models::CounterpartySide;
use p2p_market::services::{CounterpartyPool, HttpPriceOracle, PriceOracle};
use p2p_market::TradeError;
use rust_decimal::Decimal;
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn ticker(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/ticker"))
        .respond_with(response)
        .mount(server)
        .await;
}

fn oracle_for(server: &MockServer, field: &str) -> HttpPriceOracle {
    HttpPriceOracle::new(
        format!("{}/ticker", server.uri()),
        field,
        Duration::from_secs(2),
    )
}

#[tokio::test]
async fn test_reads_string_price() -> Result<()> {
    let server = MockServer::start().await;
    ticker(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "symbol": "SPOTUSDT", "price": "0.04251" })),
    )
    .await;

    let price = oracle_for(&server, "price").current_market_price().await?;
    assert_eq!(price, Decimal::from_str("0.04251")?);

    Ok(())
}

#[tokio::test]
async fn test_reads_numeric_price_from_custom_field() -> Result<()> {
    let server = MockServer::start().await;
    ticker(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "last": 1.25 })),
    )
    .await;

    let price = oracle_for(&server, "last").current_market_price().await?;
    assert_eq!(price, Decimal::from_str("1.25")?);

    Ok(())
}

#[tokio::test]
async fn test_upstream_error_is_unavailable() {
    let server = MockServer::start().await;
    ticker(&server, ResponseTemplate::new(500)).await;

    let err = oracle_for(&server, "price")
        .current_market_price()
        .await
        .unwrap_err();
    assert!(matches!(err, TradeError::OracleUnavailable(_)));
    assert!(!err.is_business_rejection());
}

#[tokio::test]
async fn test_unreachable_host_is_unavailable() {
    let oracle = HttpPriceOracle::new(
        "http://127.0.0.1:1/ticker",
        "price",
        Duration::from_millis(500),
    );

    let err = oracle.current_market_price().await.unwrap_err();
    assert!(matches!(err, TradeError::OracleUnavailable(_)));
}

#[tokio::test]
async fn test_bad_payloads_are_malformed() {
    let cases = vec![
        ResponseTemplate::new(200).set_body_string("not json"),
        ResponseTemplate::new(200).set_body_json(json!({ "bid": "1.0" })),
        ResponseTemplate::new(200).set_body_json(json!({ "price": "abc" })),
        ResponseTemplate::new(200).set_body_json(json!({ "price": "-2" })),
        ResponseTemplate::new(200).set_body_json(json!({ "price": 0 })),
        ResponseTemplate::new(200).set_body_json(json!({ "price": null })),
    ];

    for response in cases {
        let server = MockServer::start().await;
        ticker(&server, response).await;

        let err = oracle_for(&server, "price")
            .current_market_price()
            .await
            .unwrap_err();
        assert!(
            matches!(err, TradeError::OracleMalformed(_)),
            "expected malformed, got {:?}",
            err
        );
    }
}

#[tokio::test]
async fn test_price_refresh_through_http_oracle() -> Result<()> {
    let server = MockServer::start().await;
    ticker(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "price": "20" })),
    )
    .await;

    let store = Arc::new(MemoryStore::new());
    let records: Vec<_> = (1..=3)
        .map(|tier| counterparty(CounterpartySide::Seller, tier, 50, 500, Decimal::ONE))
        .collect();
    store.insert_many(&records).await?;

    let pool = CounterpartyPool::new(store.clone(), Arc::new(oracle_for(&server, "price")), 4);
    let report = pool.refresh_prices(CounterpartySide::Seller).await?;
    assert_eq!(report.updated, 3);

    for record in store.list_all(CounterpartySide::Seller).await? {
        assert!(record.price > Decimal::from(20));
        assert!(record.price <= Decimal::from_str("20.32")?);
    }

    Ok(())
}
