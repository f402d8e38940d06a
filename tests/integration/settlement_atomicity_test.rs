// Settlement atomicity tests
// Failing stores and stale reads must never leave a half-applied settlement

mod common;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use common::Harness;
use p2p_market::database::{
    AccountRepository, MemoryStore, OrderRepository, Repositories, SettlementApplied,
    SettlementRepository, SettlementWrite,
};
use p2p_market::models::{
    Asset, BotStrategy, CounterpartySide, LedgerEntry, Order, OrderSide, OrderStatus, UserAccount,
};
use p2p_market::services::{CreateOrderRequest, SettlementOutcome, SettlementTrigger};
use p2p_market::TradeError;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
}

fn dec(value: i64) -> Decimal {
    Decimal::from(value)
}

/// Fails the first `failures` settlement writes before touching the store
struct FlakySettlements {
    inner: Arc<MemoryStore>,
    failures: AtomicUsize,
}

#[async_trait]
impl SettlementRepository for FlakySettlements {
    async fn apply_settlement(
        &self,
        write: &SettlementWrite,
    ) -> p2p_market::Result<SettlementApplied> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(TradeError::Internal("connection reset".to_string()));
        }
        self.inner.apply_settlement(write).await
    }
}

/// Refuses every SPOT credit made through `adjust_balance`
struct SpotCreditRefused {
    inner: Arc<MemoryStore>,
}

#[async_trait]
impl AccountRepository for SpotCreditRefused {
    async fn insert(&self, account: &UserAccount) -> p2p_market::Result<()> {
        AccountRepository::insert(self.inner.as_ref(), account).await
    }

    async fn find_by_id(&self, id: Uuid) -> p2p_market::Result<Option<UserAccount>> {
        AccountRepository::find_by_id(self.inner.as_ref(), id).await
    }

    async fn adjust_balance(
        &self,
        user_id: Uuid,
        asset: Asset,
        delta: Decimal,
        expected_minimum: Decimal,
    ) -> p2p_market::Result<Decimal> {
        if asset == Asset::Spot && delta > Decimal::ZERO {
            return Err(TradeError::Internal("connection reset".to_string()));
        }
        self.inner
            .adjust_balance(user_id, asset, delta, expected_minimum)
            .await
    }

    async fn append_ledger_entry(&self, entry: &LedgerEntry) -> p2p_market::Result<()> {
        self.inner.append_ledger_entry(entry).await
    }

    async fn recent_ledger(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> p2p_market::Result<Vec<LedgerEntry>> {
        self.inner.recent_ledger(user_id, limit).await
    }

    async fn list_bot_enabled(&self, strategy: BotStrategy) -> p2p_market::Result<Vec<UserAccount>> {
        self.inner.list_bot_enabled(strategy).await
    }

    async fn record_bot_run(&self, user_id: Uuid, at: DateTime<Utc>) -> p2p_market::Result<()> {
        self.inner.record_bot_run(user_id, at).await
    }
}

/// Reads every order as still pending, like a replica lagging behind the primary
struct StaleOrders {
    inner: Arc<MemoryStore>,
}

#[async_trait]
impl OrderRepository for StaleOrders {
    async fn insert(&self, order: &Order) -> p2p_market::Result<()> {
        OrderRepository::insert(self.inner.as_ref(), order).await
    }

    async fn find_by_id(&self, id: Uuid) -> p2p_market::Result<Option<Order>> {
        let order = OrderRepository::find_by_id(self.inner.as_ref(), id).await?;
        Ok(order.map(|mut o| {
            o.status = OrderStatus::Pending;
            o.completed_at = None;
            o
        }))
    }

    async fn find_pending_with_expiry_before(
        &self,
        t: DateTime<Utc>,
    ) -> p2p_market::Result<Vec<Order>> {
        self.inner.find_pending_with_expiry_before(t).await
    }

    async fn find_pending_expiring_after(&self, t: DateTime<Utc>) -> p2p_market::Result<Vec<Order>> {
        self.inner.find_pending_expiring_after(t).await
    }

    async fn find_completed_for_user_in_range(
        &self,
        user_id: Uuid,
        side: OrderSide,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> p2p_market::Result<Vec<Order>> {
        self.inner
            .find_completed_for_user_in_range(user_id, side, start, end)
            .await
    }

    async fn find_pending_for_user(
        &self,
        user_id: Uuid,
        side: OrderSide,
    ) -> p2p_market::Result<Vec<Order>> {
        self.inner.find_pending_for_user(user_id, side).await
    }

    async fn find_for_user_created_between(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> p2p_market::Result<Vec<Order>> {
        self.inner
            .find_for_user_created_between(user_id, start, end)
            .await
    }

    async fn list_for_user(&self, user_id: Uuid, limit: i64) -> p2p_market::Result<Vec<Order>> {
        self.inner.list_for_user(user_id, limit).await
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: OrderStatus,
        new: OrderStatus,
        completed_at: DateTime<Utc>,
    ) -> p2p_market::Result<bool> {
        self.inner.update_status(id, expected, new, completed_at).await
    }
}

async fn pending_buy(h: &Harness, user: &UserAccount, amount: i64) -> Result<Order> {
    h.add_counterparty(CounterpartySide::Seller, 1, 10, 1000, dec(2))
        .await;
    let order = h
        .orders
        .create_order_at(user.id, CreateOrderRequest::manual(OrderSide::Buy, dec(amount)), noon())
        .await?;
    Ok(order)
}

async fn ledger_len(h: &Harness, user_id: Uuid) -> usize {
    h.store
        .recent_ledger(user_id, 50)
        .await
        .expect("read ledger")
        .len()
}

async fn stored_order(h: &Harness, id: Uuid) -> Order {
    OrderRepository::find_by_id(h.store.as_ref(), id)
        .await
        .expect("load order")
        .expect("order exists")
}

#[tokio::test]
async fn test_failed_settlement_write_leaves_order_retryable() -> Result<()> {
    let h = Harness::new(0.0);
    let user = h.add_user(1, 1000, 0).await;
    let order = pending_buy(&h, &user, 100).await?;

    let repos = Repositories {
        settlements: Arc::new(FlakySettlements {
            inner: h.store.clone(),
            failures: AtomicUsize::new(1),
        }),
        ..h.repos.clone()
    };
    let service = h.instance_over(repos);

    let err = service
        .settle_order_at(order.id, SettlementTrigger::Expiry, order.auto_complete_at)
        .await
        .unwrap_err();
    assert!(matches!(err, TradeError::Internal(_)));

    assert_eq!(stored_order(&h, order.id).await.status, OrderStatus::Pending);
    let account = h.account(user.id).await;
    assert_eq!(account.usdt_balance, dec(1000));
    assert_eq!(account.spot_balance, Decimal::ZERO);
    assert_eq!(ledger_len(&h, user.id).await, 0);

    let retried = service
        .settle_order_at(order.id, SettlementTrigger::Expiry, order.auto_complete_at)
        .await?;
    assert!(matches!(retried, SettlementOutcome::Settled(_)));

    let account = h.account(user.id).await;
    assert_eq!(account.usdt_balance, dec(900));
    assert_eq!(account.spot_balance, dec(50));
    assert_eq!(ledger_len(&h, user.id).await, 1);
    Ok(())
}

#[tokio::test]
async fn test_settlement_does_not_depend_on_separate_credit_call() -> Result<()> {
    let h = Harness::new(0.0);
    let user = h.add_user(1, 1000, 0).await;
    let order = pending_buy(&h, &user, 100).await?;

    let repos = Repositories {
        accounts: Arc::new(SpotCreditRefused {
            inner: h.store.clone(),
        }),
        ..h.repos.clone()
    };
    let service = h.instance_over(repos);

    let outcome = service
        .settle_order_at(order.id, SettlementTrigger::Expiry, order.auto_complete_at)
        .await?;
    assert!(matches!(outcome, SettlementOutcome::Settled(_)));

    let account = h.account(user.id).await;
    assert_eq!(account.usdt_balance, dec(900));
    assert_eq!(account.spot_balance, dec(50));
    assert_eq!(ledger_len(&h, user.id).await, 1);
    Ok(())
}

#[tokio::test]
async fn test_credit_failure_rolls_back_debit_and_status() -> Result<()> {
    let h = Harness::new(0.0);
    let mut user = UserAccount::new("whale", 1);
    user.usdt_balance = dec(1000);
    user.spot_balance = Decimal::MAX;
    h.insert_account(&user).await;
    let order = pending_buy(&h, &user, 100).await?;

    for _ in 0..2 {
        let err = h
            .orders
            .settle_order_at(order.id, SettlementTrigger::Expiry, order.auto_complete_at)
            .await
            .unwrap_err();
        assert!(matches!(err, TradeError::Internal(_)));

        let stored = stored_order(&h, order.id).await;
        assert_eq!(stored.status, OrderStatus::Pending);
        assert!(stored.completed_at.is_none());
        let account = h.account(user.id).await;
        assert_eq!(account.usdt_balance, dec(1000));
        assert_eq!(account.spot_balance, Decimal::MAX);
        assert_eq!(ledger_len(&h, user.id).await, 0);
    }
    Ok(())
}

#[tokio::test]
async fn test_losing_settler_after_stale_read_applies_nothing() -> Result<()> {
    let h = Harness::new(0.0);
    let user = h.add_user(1, 1000, 0).await;
    let order = pending_buy(&h, &user, 100).await?;

    let first = h
        .orders
        .settle_order_at(order.id, SettlementTrigger::Expiry, order.auto_complete_at)
        .await?;
    assert!(matches!(first, SettlementOutcome::Settled(_)));

    let repos = Repositories {
        orders: Arc::new(StaleOrders {
            inner: h.store.clone(),
        }),
        ..h.repos.clone()
    };
    let lagging = h.instance_over(repos);

    let second = lagging
        .settle_order_at(order.id, SettlementTrigger::Early, order.auto_complete_at)
        .await?;
    assert_eq!(second, SettlementOutcome::NotPending(OrderStatus::Completed));

    let account = h.account(user.id).await;
    assert_eq!(account.usdt_balance, dec(900));
    assert_eq!(account.spot_balance, dec(50));
    assert_eq!(ledger_len(&h, user.id).await, 1);
    Ok(())
}

#[tokio::test]
async fn test_settling_cancelled_order_after_stale_read_moves_no_funds() -> Result<()> {
    let h = Harness::new(0.0);
    let user = h.add_user(1, 1000, 0).await;
    let order = pending_buy(&h, &user, 100).await?;

    h.orders.cancel_order_at(order.id, user.id, noon()).await?;

    let repos = Repositories {
        orders: Arc::new(StaleOrders {
            inner: h.store.clone(),
        }),
        ..h.repos.clone()
    };
    let lagging = h.instance_over(repos);

    let outcome = lagging
        .settle_order_at(order.id, SettlementTrigger::Expiry, order.auto_complete_at)
        .await?;
    assert_eq!(outcome, SettlementOutcome::NotPending(OrderStatus::Cancelled));

    assert_eq!(stored_order(&h, order.id).await.status, OrderStatus::Cancelled);
    let account = h.account(user.id).await;
    assert_eq!(account.usdt_balance, dec(1000));
    assert_eq!(account.spot_balance, Decimal::ZERO);
    assert_eq!(ledger_len(&h, user.id).await, 0);
    Ok(())
}
