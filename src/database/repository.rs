//! Repository traits the trading core is written against.
//!
//! Both the Postgres store and the in-memory store implement these. Every
//! mutating operation is conditional so concurrent callers cannot apply the
//! same transition twice.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Asset, BotStrategy, BulkUpdateReport, Counterparty, CounterpartySide, CounterpartyStatus,
    LedgerEntry, Order, OrderSide, OrderStatus, UserAccount,
};

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<()>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>>;

    /// Pending orders whose auto-complete deadline is at or before `t`
    async fn find_pending_with_expiry_before(&self, t: DateTime<Utc>) -> Result<Vec<Order>>;

    /// Pending orders whose auto-complete deadline is still after `t`
    async fn find_pending_expiring_after(&self, t: DateTime<Utc>) -> Result<Vec<Order>>;

    async fn find_completed_for_user_in_range(
        &self,
        user_id: Uuid,
        side: OrderSide,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Order>>;

    async fn find_pending_for_user(&self, user_id: Uuid, side: OrderSide) -> Result<Vec<Order>>;

    /// Orders of any status created inside `[start, end)`
    async fn find_for_user_created_between(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Order>>;

    /// Most recent first
    async fn list_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<Order>>;

    /// Moves `id` from `expected` to `new` only if it is still `expected`.
    /// Returns whether the row changed.
    async fn update_status(
        &self,
        id: Uuid,
        expected: OrderStatus,
        new: OrderStatus,
        completed_at: DateTime<Utc>,
    ) -> Result<bool>;
}

/// New limit band for one counterparty
#[derive(Debug, Clone, Copy)]
pub struct LimitUpdate {
    pub id: Uuid,
    pub min_limit: Decimal,
    pub max_limit: Decimal,
}

#[async_trait]
pub trait CounterpartyRepository: Send + Sync {
    async fn insert_many(&self, records: &[Counterparty]) -> Result<usize>;

    async fn list_all(&self, side: CounterpartySide) -> Result<Vec<Counterparty>>;

    async fn count(&self, side: CounterpartySide) -> Result<i64>;

    /// One online record of `side` and `tier` whose band contains `amount`
    async fn find_match(
        &self,
        side: CounterpartySide,
        tier: i16,
        amount: Decimal,
    ) -> Result<Option<Counterparty>>;

    async fn bulk_update_status(
        &self,
        updates: &[(Uuid, CounterpartyStatus)],
    ) -> Result<BulkUpdateReport>;

    /// Records whose new band has `min > max` are rejected individually
    async fn bulk_update_limits(&self, updates: &[LimitUpdate]) -> Result<BulkUpdateReport>;

    async fn bulk_update_price(&self, updates: &[(Uuid, Decimal)]) -> Result<BulkUpdateReport>;
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn insert(&self, account: &UserAccount) -> Result<()>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserAccount>>;

    /// Adds `delta` to one ledger and returns the new balance. Fails with
    /// `InsufficientBalance`, leaving the balance untouched, when the result
    /// would fall below `expected_minimum`.
    async fn adjust_balance(
        &self,
        user_id: Uuid,
        asset: Asset,
        delta: Decimal,
        expected_minimum: Decimal,
    ) -> Result<Decimal>;

    async fn append_ledger_entry(&self, entry: &LedgerEntry) -> Result<()>;

    /// Most recent first
    async fn recent_ledger(&self, user_id: Uuid, limit: usize) -> Result<Vec<LedgerEntry>>;

    async fn list_bot_enabled(&self, strategy: BotStrategy) -> Result<Vec<UserAccount>>;

    async fn record_bot_run(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()>;
}

/// Every write one settlement makes
#[derive(Debug, Clone)]
pub struct SettlementWrite {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub debit_asset: Asset,
    pub debit_amount: Decimal,
    pub credit_asset: Asset,
    pub credit_amount: Decimal,
    pub entry: LedgerEntry,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementApplied {
    Applied,
    /// Nothing written; the order had already left `pending`
    NotPending(OrderStatus),
    /// Nothing written; the debit balance is below the debit amount
    InsufficientBalance { available: Decimal },
}

#[async_trait]
pub trait SettlementRepository: Send + Sync {
    /// Applies the debit, the `pending -> completed` claim, the credit and the
    /// ledger entry as one unit. On any error or refusal none of them persist.
    async fn apply_settlement(&self, write: &SettlementWrite) -> Result<SettlementApplied>;
}

/// The stores wired together
#[derive(Clone)]
pub struct Repositories {
    pub orders: Arc<dyn OrderRepository>,
    pub counterparties: Arc<dyn CounterpartyRepository>,
    pub accounts: Arc<dyn AccountRepository>,
    pub settlements: Arc<dyn SettlementRepository>,
}

impl Repositories {
    /// Backs every repository with one store value
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: OrderRepository
            + CounterpartyRepository
            + AccountRepository
            + SettlementRepository
            + 'static,
    {
        Self {
            orders: store.clone(),
            counterparties: store.clone(),
            accounts: store.clone(),
            settlements: store,
        }
    }
}
