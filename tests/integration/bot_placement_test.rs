// Bot placement integration tests
// Order bots trade through the order lifecycle; profit bots credit FLEX once per day

mod common;

use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use common::Harness;
use p2p_market::models::{
    BotSettings, BotStrategy, CounterpartySide, LedgerKind, OrderSide, OrderSource, UserAccount,
};
use p2p_market::services::CreateOrderRequest;
use rust_decimal::Decimal;

fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
}

fn dec(value: i64) -> Decimal {
    Decimal::from(value)
}

async fn bot_account(
    h: &Harness,
    strategy: BotStrategy,
    side: OrderSide,
    amount: i64,
    usdt: i64,
    spot: i64,
) -> UserAccount {
    let mut account = UserAccount::new("bot-user", 1);
    account.usdt_balance = dec(usdt);
    account.spot_balance = dec(spot);
    account.bot = BotSettings {
        enabled: true,
        strategy,
        side,
        amount: dec(amount),
        min_balance: dec(50),
        vip_tier: 1,
        last_run_at: None,
    };
    h.insert_account(&account).await;
    account
}

#[tokio::test]
async fn test_order_bot_places_buy() -> Result<()> {
    let h = Harness::new(0.0);
    h.add_counterparty(CounterpartySide::Seller, 1, 50, 500, dec(2))
        .await;
    let account = bot_account(&h, BotStrategy::PlaceOrders, OrderSide::Buy, 100, 1000, 0).await;

    let report = h.bots.run_order_bots_at(noon()).await?;
    assert_eq!(report.processed, 1);
    assert_eq!(report.succeeded, 1);

    let orders = h.orders.list_orders(account.id, None).await?;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].source, OrderSource::Bot);
    assert_eq!(orders[0].side, OrderSide::Buy);
    assert_eq!(orders[0].quote_amount, dec(100));

    let stored = h.account(account.id).await;
    assert_eq!(stored.bot.last_run_at, Some(noon()));
    // Placement never moves balances
    assert_eq!(stored.usdt_balance, dec(1000));

    Ok(())
}

#[tokio::test]
async fn test_order_bot_places_sell_without_ceiling() -> Result<()> {
    let h = Harness::new(0.0);
    h.add_counterparty(CounterpartySide::Buyer, 1, 500, 2000, dec(2))
        .await;
    let account = bot_account(&h, BotStrategy::PlaceOrders, OrderSide::Sell, 900, 0, 1000).await;

    let report = h.bots.run_order_bots_at(noon()).await?;
    assert_eq!(report.succeeded, 1);

    let orders = h.orders.list_orders(account.id, None).await?;
    assert_eq!(orders[0].side, OrderSide::Sell);
    assert_eq!(orders[0].base_amount, dec(900));

    Ok(())
}

#[tokio::test]
async fn test_order_bot_skips_busy_bucket() -> Result<()> {
    let h = Harness::new(0.0);
    h.add_counterparty(CounterpartySide::Seller, 1, 50, 500, dec(2))
        .await;
    h.add_counterparty(CounterpartySide::Buyer, 1, 10, 500, dec(2))
        .await;
    let account = bot_account(&h, BotStrategy::PlaceOrders, OrderSide::Sell, 20, 1000, 100).await;

    // A manual order earlier in the same ten-minute bucket
    h.orders
        .create_order_at(
            account.id,
            CreateOrderRequest::manual(OrderSide::Buy, dec(100)),
            noon() + Duration::minutes(1),
        )
        .await?;

    let report = h.bots.run_order_bots_at(noon() + Duration::minutes(5)).await?;
    assert_eq!(report.succeeded, 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(h.orders.list_orders(account.id, None).await?.len(), 1);
    assert_eq!(h.account(account.id).await.bot.last_run_at, None);

    // The next bucket is free
    let report = h.bots.run_order_bots_at(noon() + Duration::minutes(10)).await?;
    assert_eq!(report.succeeded, 1);

    Ok(())
}

#[tokio::test]
async fn test_order_bot_keeps_minimum_balance() -> Result<()> {
    let h = Harness::new(0.0);
    h.add_counterparty(CounterpartySide::Seller, 1, 50, 500, dec(2))
        .await;
    // 100 to trade plus 50 to keep, only 120 available
    let account = bot_account(&h, BotStrategy::PlaceOrders, OrderSide::Buy, 100, 120, 0).await;

    let report = h.bots.run_order_bots_at(noon()).await?;
    assert_eq!(report.skipped, 1);
    assert!(h.orders.list_orders(account.id, None).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_order_bot_respects_tier_ceiling() -> Result<()> {
    let h = Harness::new(0.0);
    h.add_counterparty(CounterpartySide::Seller, 1, 50, 1000, dec(2))
        .await;
    let account = bot_account(&h, BotStrategy::PlaceOrders, OrderSide::Buy, 600, 5000, 0).await;

    let report = h.bots.run_order_bots_at(noon()).await?;
    assert_eq!(report.succeeded, 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 0);
    assert!(h.orders.list_orders(account.id, None).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_order_bot_skips_without_liquidity() -> Result<()> {
    let h = Harness::new(0.0);
    h.add_counterparty(CounterpartySide::Seller, 2, 50, 500, dec(2))
        .await;
    let account = bot_account(&h, BotStrategy::PlaceOrders, OrderSide::Buy, 100, 1000, 0).await;

    let report = h.bots.run_order_bots_at(noon()).await?;
    assert_eq!(report.skipped, 1);
    assert!(h.orders.list_orders(account.id, None).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_disabled_and_other_strategy_accounts_are_ignored() -> Result<()> {
    let h = Harness::new(0.0);
    h.add_counterparty(CounterpartySide::Seller, 1, 50, 500, dec(2))
        .await;

    let mut disabled = UserAccount::new("manual-only", 1);
    disabled.usdt_balance = dec(1000);
    disabled.bot.amount = dec(100);
    h.insert_account(&disabled).await;

    bot_account(&h, BotStrategy::CreditProfit, OrderSide::Buy, 100, 1000, 0).await;

    let report = h.bots.run_order_bots_at(noon()).await?;
    assert_eq!(report.processed, 0);

    Ok(())
}

#[tokio::test]
async fn test_profit_bot_credits_once_per_day() -> Result<()> {
    let h = Harness::new(0.0);
    let account = bot_account(&h, BotStrategy::CreditProfit, OrderSide::Buy, 1000, 0, 0).await;

    let report = h.bots.run_profit_bots_at(noon()).await?;
    assert_eq!(report.succeeded, 1);

    let first = h.account(account.id).await.flex_balance;
    assert!(first >= dec(5) && first <= dec(10), "credited {}", first);

    let report = h.bots.run_profit_bots_at(noon() + Duration::hours(6)).await?;
    assert_eq!(report.succeeded, 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(h.account(account.id).await.flex_balance, first);

    let report = h.bots.run_profit_bots_at(noon() + Duration::days(1)).await?;
    assert_eq!(report.succeeded, 1);
    let stored = h.account(account.id).await;
    assert!(stored.flex_balance > first);
    assert_eq!(stored.usdt_balance, Decimal::ZERO);
    assert_eq!(stored.spot_balance, Decimal::ZERO);

    // Profit never goes through the order book
    assert!(h.orders.list_orders(account.id, None).await?.is_empty());

    let ledger = h.orders.recent_transactions(account.id).await?;
    assert_eq!(ledger.len(), 2);
    assert!(ledger.iter().all(|e| e.kind == LedgerKind::BotProfit));
    assert!(ledger.iter().all(|e| e.order_id.is_none()));

    Ok(())
}

#[tokio::test]
async fn test_profit_bot_skips_zero_amount() -> Result<()> {
    let h = Harness::new(0.0);
    let account = bot_account(&h, BotStrategy::CreditProfit, OrderSide::Buy, 0, 0, 0).await;

    let report = h.bots.run_profit_bots_at(noon()).await?;
    assert_eq!(report.skipped, 1);
    assert_eq!(h.account(account.id).await.flex_balance, Decimal::ZERO);

    Ok(())
}
