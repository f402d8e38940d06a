// Counterparty pool integration tests
// Seeding, the status/limit/price refreshes and matching against the in-memory store

mod common;

use anyhow::Result;
use common::{counterparty, Harness};
use p2p_market::database::{CounterpartyRepository, LimitUpdate};
use p2p_market::models::{CounterpartySide, CounterpartyStatus};
use p2p_market::services::counterparty_pool::{draw_limits, quote_price};
use p2p_market::TradeError;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

fn dec(value: i64) -> Decimal {
    Decimal::from(value)
}

#[tokio::test]
async fn test_seed_only_fills_empty_sides() -> Result<()> {
    let h = Harness::new(0.0);

    let inserted = h.pool.seed_if_empty(5).await?;
    assert_eq!(inserted, 10);
    assert_eq!(h.repos.counterparties.count(CounterpartySide::Buyer).await?, 5);
    assert_eq!(h.repos.counterparties.count(CounterpartySide::Seller).await?, 5);

    let again = h.pool.seed_if_empty(5).await?;
    assert_eq!(again, 0);
    assert_eq!(h.repos.counterparties.count(CounterpartySide::Seller).await?, 5);

    for side in [CounterpartySide::Buyer, CounterpartySide::Seller] {
        for record in h.repos.counterparties.list_all(side).await? {
            assert_eq!(record.side, side);
            assert!((1..=3).contains(&record.vip_tier));
            assert!(record.min_limit <= record.max_limit);
            assert!(record.price > Decimal::ZERO);
            assert!(!record.display_name.is_empty());
        }
    }

    Ok(())
}

#[tokio::test]
async fn test_seed_fails_without_market_price() -> Result<()> {
    let h = Harness::new(0.0);
    h.oracle.set_price(None);

    let err = h.pool.seed_if_empty(5).await.unwrap_err();
    assert!(matches!(err, TradeError::OracleUnavailable(_)));
    assert_eq!(h.repos.counterparties.count(CounterpartySide::Buyer).await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_refresh_limits_keeps_bands_ordered() -> Result<()> {
    let h = Harness::new(0.0);
    h.pool.seed_if_empty(20).await?;

    let report = h.pool.refresh_limits().await?;
    assert_eq!(report.updated, 40);
    assert!(report.failed.is_empty());

    for side in [CounterpartySide::Buyer, CounterpartySide::Seller] {
        for record in h.repos.counterparties.list_all(side).await? {
            assert!(record.min_limit >= dec(30));
            assert!(record.min_limit <= record.max_limit);
            assert!(record.max_limit <= record.min_limit * dec(4));
        }
    }

    Ok(())
}

#[tokio::test]
async fn test_refresh_prices_tracks_market() -> Result<()> {
    let h = Harness::new(0.0);
    h.pool.seed_if_empty(15).await?;
    h.oracle.set_price(Some(dec(10)));

    let sellers = h.pool.refresh_prices(CounterpartySide::Seller).await?;
    let buyers = h.pool.refresh_prices(CounterpartySide::Buyer).await?;
    assert_eq!(sellers.updated, 15);
    assert_eq!(buyers.updated, 15);

    for record in h.repos.counterparties.list_all(CounterpartySide::Seller).await? {
        assert!(record.price > dec(10), "seller {} at {}", record.id, record.price);
        assert!(record.price <= Decimal::new(1016, 2));
    }
    for record in h.repos.counterparties.list_all(CounterpartySide::Buyer).await? {
        assert!(record.price < dec(10), "buyer {} at {}", record.id, record.price);
        assert!(record.price >= Decimal::new(985, 2));
    }

    Ok(())
}

#[tokio::test]
async fn test_price_refresh_aborts_on_oracle_failure() -> Result<()> {
    let h = Harness::new(0.0);
    h.pool.seed_if_empty(10).await?;

    let before: HashMap<Uuid, Decimal> = h
        .repos
        .counterparties
        .list_all(CounterpartySide::Seller)
        .await?
        .into_iter()
        .map(|c| (c.id, c.price))
        .collect();

    h.oracle.set_price(None);
    let err = h
        .pool
        .refresh_prices(CounterpartySide::Seller)
        .await
        .unwrap_err();
    assert!(matches!(err, TradeError::OracleUnavailable(_)));

    h.oracle.set_price(Some(Decimal::ZERO));
    let err = h
        .pool
        .refresh_prices(CounterpartySide::Seller)
        .await
        .unwrap_err();
    assert!(matches!(err, TradeError::OracleMalformed(_)));

    for record in h.repos.counterparties.list_all(CounterpartySide::Seller).await? {
        assert_eq!(before.get(&record.id), Some(&record.price));
    }

    Ok(())
}

#[tokio::test]
async fn test_seller_status_always_changes() -> Result<()> {
    let h = Harness::new(0.0);
    for _ in 0..30 {
        h.add_counterparty(CounterpartySide::Seller, 1, 50, 500, dec(2))
            .await;
    }

    let report = h.pool.refresh_statuses().await?;
    assert_eq!(report.updated, 30);

    for record in h.repos.counterparties.list_all(CounterpartySide::Seller).await? {
        assert_ne!(record.status, CounterpartyStatus::Online);
    }

    Ok(())
}

#[tokio::test]
async fn test_bulk_updates_report_per_record_failures() -> Result<()> {
    let h = Harness::new(0.0);
    let known = h
        .add_counterparty(CounterpartySide::Buyer, 2, 100, 300, dec(2))
        .await;
    let missing = Uuid::new_v4();

    let report = h
        .repos
        .counterparties
        .bulk_update_status(&[
            (known.id, CounterpartyStatus::Recently),
            (missing, CounterpartyStatus::Offline),
        ])
        .await?;
    assert_eq!(report.updated, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, missing);

    let report = h
        .repos
        .counterparties
        .bulk_update_limits(&[LimitUpdate {
            id: known.id,
            min_limit: dec(400),
            max_limit: dec(200),
        }])
        .await?;
    assert_eq!(report.updated, 0);
    assert_eq!(report.failed.len(), 1);

    let report = h
        .repos
        .counterparties
        .bulk_update_price(&[(known.id, dec(-1))])
        .await?;
    assert_eq!(report.failed.len(), 1);

    let stored = h
        .repos
        .counterparties
        .list_all(CounterpartySide::Buyer)
        .await?
        .into_iter()
        .find(|c| c.id == known.id)
        .expect("record kept");
    assert_eq!(stored.status, CounterpartyStatus::Recently);
    assert_eq!(stored.min_limit, dec(100));
    assert_eq!(stored.max_limit, dec(300));
    assert_eq!(stored.price, dec(2));

    Ok(())
}

#[tokio::test]
async fn test_find_match_filters_side_tier_status_and_band() -> Result<()> {
    let h = Harness::new(0.0);
    let wanted = h
        .add_counterparty(CounterpartySide::Seller, 2, 100, 300, dec(2))
        .await;
    h.add_counterparty(CounterpartySide::Buyer, 2, 100, 300, dec(2))
        .await;
    h.add_counterparty(CounterpartySide::Seller, 3, 100, 300, dec(2))
        .await;
    let mut away = counterparty(CounterpartySide::Seller, 2, 100, 300, dec(2));
    away.status = CounterpartyStatus::Recently;
    h.repos.counterparties.insert_many(&[away]).await?;

    for _ in 0..10 {
        let found = h
            .pool
            .find_match(CounterpartySide::Seller, 2, dec(200))
            .await?
            .expect("one online tier-2 seller");
        assert_eq!(found.id, wanted.id);
    }

    assert!(h
        .pool
        .find_match(CounterpartySide::Seller, 2, dec(301))
        .await?
        .is_none());
    assert!(h
        .pool
        .find_match(CounterpartySide::Seller, 1, dec(200))
        .await?
        .is_none());

    Ok(())
}

#[tokio::test]
async fn test_generate_does_not_persist() -> Result<()> {
    let h = Harness::new(0.0);
    let records = h.pool.generate(CounterpartySide::Buyer, 7).await?;
    assert_eq!(records.len(), 7);
    assert!(records.iter().all(|r| r.side == CounterpartySide::Buyer));
    assert_eq!(h.repos.counterparties.count(CounterpartySide::Buyer).await?, 0);
    Ok(())
}

proptest! {
    #[test]
    fn prop_limits_are_ordered(seed in any::<u64>()) {
        let mut rng = StdRng::seed_from_u64(seed);
        let (min, max) = draw_limits(&mut rng);
        prop_assert!(min >= dec(30) && min <= dec(5000));
        prop_assert_eq!(min.fract(), Decimal::ZERO);
        prop_assert!(max >= min * dec(2));
        prop_assert!(max <= min * dec(4));
    }

    #[test]
    fn prop_quotes_straddle_market(seed in any::<u64>(), tier in 1i16..=3, market in 1i64..100_000) {
        let mut rng = StdRng::seed_from_u64(seed);
        let market = dec(market);

        let bid = quote_price(&mut rng, CounterpartySide::Buyer, tier, market, 4);
        let ask = quote_price(&mut rng, CounterpartySide::Seller, tier, market, 4);

        prop_assert!(bid < market);
        prop_assert!(ask > market);
        prop_assert!(bid >= market * Decimal::new(985, 3) - Decimal::new(1, 4));
        prop_assert!(ask <= market * Decimal::new(1016, 3) + Decimal::new(1, 4));
        prop_assert!(bid.scale() <= 4 && ask.scale() <= 4);
    }
}
