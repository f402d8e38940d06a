//! In-memory store backing the `memory` storage backend and the test suite.
//!
//! Each record lives in a `DashMap` entry, so conditional updates are atomic
//! per record the same way a single-row `UPDATE ... WHERE` is in Postgres.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::seq::SliceRandom;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::repository::{
    AccountRepository, CounterpartyRepository, LimitUpdate, OrderRepository, SettlementApplied,
    SettlementRepository, SettlementWrite,
};
use crate::error::{Result, TradeError};
use crate::models::{
    Asset, BotStrategy, BulkUpdateReport, Counterparty, CounterpartySide, CounterpartyStatus,
    LedgerEntry, Order, OrderSide, OrderStatus, UserAccount,
};

#[derive(Default)]
pub struct MemoryStore {
    orders: DashMap<Uuid, Order>,
    counterparties: DashMap<Uuid, Counterparty>,
    accounts: DashMap<Uuid, UserAccount>,
    ledger: DashMap<Uuid, Vec<LedgerEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect_orders<F>(&self, filter: F) -> Vec<Order>
    where
        F: Fn(&Order) -> bool,
    {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by_key(|o| o.created_at);
        orders
    }

    fn update_each<T, F>(&self, updates: &[T], id_of: fn(&T) -> Uuid, apply: F) -> BulkUpdateReport
    where
        F: Fn(&mut Counterparty, &T) -> std::result::Result<(), String>,
    {
        let mut report = BulkUpdateReport::default();
        for update in updates {
            let id = id_of(update);
            match self.counterparties.get_mut(&id) {
                Some(mut record) => match apply(&mut *record, update) {
                    Ok(()) => {
                        record.updated_at = Utc::now();
                        report.updated += 1;
                    }
                    Err(reason) => report.record_failure(id, reason),
                },
                None => report.record_failure(id, "counterparty not found"),
            }
        }
        report
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        if self.orders.contains_key(&order.id) {
            return Err(TradeError::Validation(format!(
                "Order {} already exists",
                order.id
            )));
        }
        self.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.orders.get(&id).map(|o| o.value().clone()))
    }

    async fn find_pending_with_expiry_before(&self, t: DateTime<Utc>) -> Result<Vec<Order>> {
        Ok(self.collect_orders(|o| o.is_pending() && o.auto_complete_at <= t))
    }

    async fn find_pending_expiring_after(&self, t: DateTime<Utc>) -> Result<Vec<Order>> {
        Ok(self.collect_orders(|o| o.is_pending() && o.auto_complete_at > t))
    }

    async fn find_completed_for_user_in_range(
        &self,
        user_id: Uuid,
        side: OrderSide,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Order>> {
        Ok(self.collect_orders(|o| {
            o.user_id == user_id
                && o.side == side
                && o.status == OrderStatus::Completed
                && o.completed_at.is_some_and(|at| start <= at && at <= end)
        }))
    }

    async fn find_pending_for_user(&self, user_id: Uuid, side: OrderSide) -> Result<Vec<Order>> {
        Ok(self.collect_orders(|o| o.user_id == user_id && o.side == side && o.is_pending()))
    }

    async fn find_for_user_created_between(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Order>> {
        Ok(self.collect_orders(|o| {
            o.user_id == user_id && start <= o.created_at && o.created_at < end
        }))
    }

    async fn list_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<Order>> {
        let mut orders = self.collect_orders(|o| o.user_id == user_id);
        orders.reverse();
        orders.truncate(limit.max(0) as usize);
        Ok(orders)
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: OrderStatus,
        new: OrderStatus,
        completed_at: DateTime<Utc>,
    ) -> Result<bool> {
        if !expected.can_transition_to(new) {
            return Err(TradeError::Validation(format!(
                "Illegal order transition {} -> {}",
                expected, new
            )));
        }

        match self.orders.get_mut(&id) {
            Some(mut order) if order.status == expected => {
                order.status = new;
                order.completed_at = Some(completed_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl CounterpartyRepository for MemoryStore {
    async fn insert_many(&self, records: &[Counterparty]) -> Result<usize> {
        for record in records {
            self.counterparties.insert(record.id, record.clone());
        }
        Ok(records.len())
    }

    async fn list_all(&self, side: CounterpartySide) -> Result<Vec<Counterparty>> {
        let mut records: Vec<Counterparty> = self
            .counterparties
            .iter()
            .filter(|c| c.side == side)
            .map(|c| c.value().clone())
            .collect();
        records.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(records)
    }

    async fn count(&self, side: CounterpartySide) -> Result<i64> {
        Ok(self.counterparties.iter().filter(|c| c.side == side).count() as i64)
    }

    async fn find_match(
        &self,
        side: CounterpartySide,
        tier: i16,
        amount: Decimal,
    ) -> Result<Option<Counterparty>> {
        let candidates: Vec<Counterparty> = self
            .counterparties
            .iter()
            .filter(|c| c.side == side && c.can_fill(tier, amount))
            .map(|c| c.value().clone())
            .collect();

        let picked = {
            let mut rng = rand::thread_rng();
            candidates.choose(&mut rng).cloned()
        };
        Ok(picked)
    }

    async fn bulk_update_status(
        &self,
        updates: &[(Uuid, CounterpartyStatus)],
    ) -> Result<BulkUpdateReport> {
        Ok(self.update_each(updates, |u| u.0, |record, (_, status)| {
            record.status = *status;
            Ok(())
        }))
    }

    async fn bulk_update_limits(&self, updates: &[LimitUpdate]) -> Result<BulkUpdateReport> {
        Ok(self.update_each(updates, |u| u.id, |record, update| {
            if update.min_limit > update.max_limit {
                return Err(format!(
                    "min limit {} exceeds max limit {}",
                    update.min_limit, update.max_limit
                ));
            }
            record.min_limit = update.min_limit;
            record.max_limit = update.max_limit;
            Ok(())
        }))
    }

    async fn bulk_update_price(&self, updates: &[(Uuid, Decimal)]) -> Result<BulkUpdateReport> {
        Ok(self.update_each(updates, |u| u.0, |record, (_, price)| {
            if *price <= Decimal::ZERO {
                return Err(format!("non-positive price {}", price));
            }
            record.price = *price;
            Ok(())
        }))
    }
}

#[async_trait]
impl AccountRepository for MemoryStore {
    async fn insert(&self, account: &UserAccount) -> Result<()> {
        self.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserAccount>> {
        Ok(self.accounts.get(&id).map(|a| a.value().clone()))
    }

    async fn adjust_balance(
        &self,
        user_id: Uuid,
        asset: Asset,
        delta: Decimal,
        expected_minimum: Decimal,
    ) -> Result<Decimal> {
        let mut account = self
            .accounts
            .get_mut(&user_id)
            .ok_or(TradeError::UserNotFound(user_id))?;

        let balance = account.balance_mut(asset);
        let next = *balance + delta;
        if next < expected_minimum {
            return Err(TradeError::InsufficientBalance {
                asset,
                required: expected_minimum - delta,
                available: *balance,
            });
        }
        *balance = next;
        Ok(next)
    }

    async fn append_ledger_entry(&self, entry: &LedgerEntry) -> Result<()> {
        if !self.accounts.contains_key(&entry.user_id) {
            return Err(TradeError::UserNotFound(entry.user_id));
        }
        self.ledger
            .entry(entry.user_id)
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn recent_ledger(&self, user_id: Uuid, limit: usize) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .ledger
            .get(&user_id)
            .map(|entries| entries.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn list_bot_enabled(&self, strategy: BotStrategy) -> Result<Vec<UserAccount>> {
        Ok(self
            .accounts
            .iter()
            .filter(|a| a.bot.enabled && a.bot.strategy == strategy)
            .map(|a| a.value().clone())
            .collect())
    }

    async fn record_bot_run(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut account = self
            .accounts
            .get_mut(&user_id)
            .ok_or(TradeError::UserNotFound(user_id))?;
        account.bot.last_run_at = Some(at);
        Ok(())
    }
}

#[async_trait]
impl SettlementRepository for MemoryStore {
    async fn apply_settlement(&self, write: &SettlementWrite) -> Result<SettlementApplied> {
        // Order entry before account entry; nothing else holds both
        let mut order = self
            .orders
            .get_mut(&write.order_id)
            .ok_or(TradeError::OrderNotFound(write.order_id))?;
        if order.status != OrderStatus::Pending {
            return Ok(SettlementApplied::NotPending(order.status));
        }

        let mut account = self
            .accounts
            .get_mut(&write.user_id)
            .ok_or(TradeError::UserNotFound(write.user_id))?;
        let available = account.balance(write.debit_asset);
        if available < write.debit_amount {
            return Ok(SettlementApplied::InsufficientBalance { available });
        }

        // Stage both balance moves so a failed credit leaves the account as it was
        let mut staged = account.value().clone();
        *staged.balance_mut(write.debit_asset) -= write.debit_amount;
        let credited = staged
            .balance(write.credit_asset)
            .checked_add(write.credit_amount)
            .ok_or_else(|| {
                TradeError::Internal(format!(
                    "crediting {} {} to {} overflows",
                    write.credit_amount, write.credit_asset, write.user_id
                ))
            })?;
        *staged.balance_mut(write.credit_asset) = credited;

        *account = staged;
        order.status = OrderStatus::Completed;
        order.completed_at = Some(write.completed_at);
        self.ledger
            .entry(write.user_id)
            .or_default()
            .push(write.entry.clone());
        Ok(SettlementApplied::Applied)
    }
}
