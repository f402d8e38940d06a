//! Postgres-backed repositories.
//!
//! Status transitions are conditional `UPDATE ... WHERE status = $expected`
//! and balance adjustments are guarded `UPDATE ... WHERE balance + delta >= min`,
//! so the database itself refuses a second settlement or a negative balance
//! even when several instances run the sweeps. A settlement's writes share one
//! transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgExecutor, PgPool};
use tracing::{debug, warn};
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

const ORDER_COLUMNS: &str = r#"
    id, user_id, counterparty_id, counterparty_name, side, source, price,
    base_amount, quote_amount, status, created_at, completed_at,
    countdown_ends_at, auto_complete_at
"#;

const COUNTERPARTY_COLUMNS: &str = r#"
    id, display_name, side, vip_tier, status, min_limit, max_limit, price,
    rating, trade_count, reviews, updated_at
"#;

const ACCOUNT_COLUMNS: &str = r#"
    id, display_name, vip_tier, usdt_balance, spot_balance, flex_balance,
    bot_enabled, bot_strategy, bot_side, bot_amount, bot_min_balance,
    bot_vip_tier, bot_last_run_at, created_at
"#;

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    fn balance_column(asset: Asset) -> &'static str {
        match asset {
            Asset::Usdt => "usdt_balance",
            Asset::Spot => "spot_balance",
            Asset::Flex => "flex_balance",
        }
    }

    async fn fetch_orders(&self, filter: &str, binds: OrderBinds) -> Result<Vec<Order>> {
        let sql = format!("SELECT {} FROM p2p_orders WHERE {}", ORDER_COLUMNS, filter);
        let mut query = sqlx::query_as::<_, Order>(&sql);
        if let Some(user_id) = binds.user_id {
            query = query.bind(user_id);
        }
        if let Some(side) = binds.side {
            query = query.bind(side);
        }
        for ts in binds.timestamps {
            query = query.bind(ts);
        }
        Ok(query.fetch_all(&self.db).await?)
    }
}

async fn insert_ledger_entry<'e, E>(executor: E, entry: &LedgerEntry) -> Result<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO ledger_entries (
            id, user_id, order_id, kind, debit_asset, debit_amount,
            credit_asset, credit_amount, description, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(entry.id)
    .bind(entry.user_id)
    .bind(entry.order_id)
    .bind(entry.kind)
    .bind(entry.debit_asset)
    .bind(entry.debit_amount)
    .bind(entry.credit_asset)
    .bind(entry.credit_amount)
    .bind(&entry.description)
    .bind(entry.created_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Positional binds for the order filters above, applied in field order
#[derive(Default)]
struct OrderBinds {
    user_id: Option<Uuid>,
    side: Option<OrderSide>,
    timestamps: Vec<DateTime<Utc>>,
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO p2p_orders (
                id, user_id, counterparty_id, counterparty_name, side, source, price,
                base_amount, quote_amount, status, created_at, completed_at,
                countdown_ends_at, auto_complete_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(order.counterparty_id)
        .bind(&order.counterparty_name)
        .bind(order.side)
        .bind(order.source)
        .bind(order.price)
        .bind(order.base_amount)
        .bind(order.quote_amount)
        .bind(order.status)
        .bind(order.created_at)
        .bind(order.completed_at)
        .bind(order.countdown_ends_at)
        .bind(order.auto_complete_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>> {
        let sql = format!("SELECT {} FROM p2p_orders WHERE id = $1", ORDER_COLUMNS);
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(order)
    }

    async fn find_pending_with_expiry_before(&self, t: DateTime<Utc>) -> Result<Vec<Order>> {
        self.fetch_orders(
            "status = 'pending' AND auto_complete_at <= $1 ORDER BY auto_complete_at ASC",
            OrderBinds {
                timestamps: vec![t],
                ..Default::default()
            },
        )
        .await
    }

    async fn find_pending_expiring_after(&self, t: DateTime<Utc>) -> Result<Vec<Order>> {
        self.fetch_orders(
            "status = 'pending' AND auto_complete_at > $1 ORDER BY created_at ASC",
            OrderBinds {
                timestamps: vec![t],
                ..Default::default()
            },
        )
        .await
    }

    async fn find_completed_for_user_in_range(
        &self,
        user_id: Uuid,
        side: OrderSide,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Order>> {
        self.fetch_orders(
            r#"user_id = $1 AND side = $2 AND status = 'completed'
               AND completed_at >= $3 AND completed_at <= $4
               ORDER BY completed_at ASC"#,
            OrderBinds {
                user_id: Some(user_id),
                side: Some(side),
                timestamps: vec![start, end],
            },
        )
        .await
    }

    async fn find_pending_for_user(&self, user_id: Uuid, side: OrderSide) -> Result<Vec<Order>> {
        self.fetch_orders(
            "user_id = $1 AND side = $2 AND status = 'pending' ORDER BY created_at ASC",
            OrderBinds {
                user_id: Some(user_id),
                side: Some(side),
                ..Default::default()
            },
        )
        .await
    }

    async fn find_for_user_created_between(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Order>> {
        self.fetch_orders(
            "user_id = $1 AND created_at >= $2 AND created_at < $3 ORDER BY created_at ASC",
            OrderBinds {
                user_id: Some(user_id),
                timestamps: vec![start, end],
                ..Default::default()
            },
        )
        .await
    }

    async fn list_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<Order>> {
        let sql = format!(
            "SELECT {} FROM p2p_orders WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
            ORDER_COLUMNS
        );
        let orders = sqlx::query_as::<_, Order>(&sql)
            .bind(user_id)
            .bind(limit)
            .fetch_all(&self.db)
            .await?;
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

        let result = sqlx::query(
            r#"
            UPDATE p2p_orders
            SET status = $1, completed_at = $2
            WHERE id = $3 AND status = $4
            "#,
        )
        .bind(new)
        .bind(completed_at)
        .bind(id)
        .bind(expected)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl CounterpartyRepository for PgStore {
    async fn insert_many(&self, records: &[Counterparty]) -> Result<usize> {
        let mut tx = self.db.begin().await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO p2p_counterparties (
                    id, display_name, side, vip_tier, status, min_limit, max_limit,
                    price, rating, trade_count, reviews, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(record.id)
            .bind(&record.display_name)
            .bind(record.side)
            .bind(record.vip_tier)
            .bind(record.status)
            .bind(record.min_limit)
            .bind(record.max_limit)
            .bind(record.price)
            .bind(record.rating)
            .bind(record.trade_count)
            .bind(&record.reviews)
            .bind(record.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(records.len())
    }

    async fn list_all(&self, side: CounterpartySide) -> Result<Vec<Counterparty>> {
        let sql = format!(
            "SELECT {} FROM p2p_counterparties WHERE side = $1 ORDER BY display_name ASC",
            COUNTERPARTY_COLUMNS
        );
        let records = sqlx::query_as::<_, Counterparty>(&sql)
            .bind(side)
            .fetch_all(&self.db)
            .await?;
        Ok(records)
    }

    async fn count(&self, side: CounterpartySide) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM p2p_counterparties WHERE side = $1")
            .bind(side)
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }

    async fn find_match(
        &self,
        side: CounterpartySide,
        tier: i16,
        amount: Decimal,
    ) -> Result<Option<Counterparty>> {
        let sql = format!(
            r#"
            SELECT {} FROM p2p_counterparties
            WHERE side = $1 AND vip_tier = $2 AND status = 'online'
              AND min_limit <= $3 AND max_limit >= $3
            ORDER BY random()
            LIMIT 1
            "#,
            COUNTERPARTY_COLUMNS
        );
        let record = sqlx::query_as::<_, Counterparty>(&sql)
            .bind(side)
            .bind(tier)
            .bind(amount)
            .fetch_optional(&self.db)
            .await?;
        Ok(record)
    }

    async fn bulk_update_status(
        &self,
        updates: &[(Uuid, CounterpartyStatus)],
    ) -> Result<BulkUpdateReport> {
        let mut report = BulkUpdateReport::default();

        for (id, status) in updates {
            let outcome = sqlx::query(
                "UPDATE p2p_counterparties SET status = $1, updated_at = NOW() WHERE id = $2",
            )
            .bind(status)
            .bind(id)
            .execute(&self.db)
            .await;
            tally(&mut report, *id, outcome);
        }

        Ok(report)
    }

    async fn bulk_update_limits(&self, updates: &[LimitUpdate]) -> Result<BulkUpdateReport> {
        let mut report = BulkUpdateReport::default();

        for update in updates {
            if update.min_limit > update.max_limit {
                report.record_failure(update.id, "min limit exceeds max limit");
                continue;
            }
            let outcome = sqlx::query(
                r#"
                UPDATE p2p_counterparties
                SET min_limit = $1, max_limit = $2, updated_at = NOW()
                WHERE id = $3
                "#,
            )
            .bind(update.min_limit)
            .bind(update.max_limit)
            .bind(update.id)
            .execute(&self.db)
            .await;
            tally(&mut report, update.id, outcome);
        }

        Ok(report)
    }

    async fn bulk_update_price(&self, updates: &[(Uuid, Decimal)]) -> Result<BulkUpdateReport> {
        let mut report = BulkUpdateReport::default();

        for (id, price) in updates {
            if *price <= Decimal::ZERO {
                report.record_failure(*id, "non-positive price");
                continue;
            }
            let outcome = sqlx::query(
                "UPDATE p2p_counterparties SET price = $1, updated_at = NOW() WHERE id = $2",
            )
            .bind(price)
            .bind(id)
            .execute(&self.db)
            .await;
            tally(&mut report, *id, outcome);
        }

        Ok(report)
    }
}

fn tally(
    report: &mut BulkUpdateReport,
    id: Uuid,
    outcome: std::result::Result<sqlx::postgres::PgQueryResult, sqlx::Error>,
) {
    match outcome {
        Ok(result) if result.rows_affected() == 1 => report.updated += 1,
        Ok(_) => report.record_failure(id, "counterparty not found"),
        Err(e) => {
            warn!("Counterparty {} update failed: {}", id, e);
            report.record_failure(id, e.to_string());
        }
    }
}

#[async_trait]
impl AccountRepository for PgStore {
    async fn insert(&self, account: &UserAccount) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_accounts (
                id, display_name, vip_tier, usdt_balance, spot_balance, flex_balance,
                bot_enabled, bot_strategy, bot_side, bot_amount, bot_min_balance,
                bot_vip_tier, bot_last_run_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(account.id)
        .bind(&account.display_name)
        .bind(account.vip_tier)
        .bind(account.usdt_balance)
        .bind(account.spot_balance)
        .bind(account.flex_balance)
        .bind(account.bot.enabled)
        .bind(account.bot.strategy)
        .bind(account.bot.side)
        .bind(account.bot.amount)
        .bind(account.bot.min_balance)
        .bind(account.bot.vip_tier)
        .bind(account.bot.last_run_at)
        .bind(account.created_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserAccount>> {
        let sql = format!("SELECT {} FROM user_accounts WHERE id = $1", ACCOUNT_COLUMNS);
        let account = sqlx::query_as::<_, UserAccount>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(account)
    }

    async fn adjust_balance(
        &self,
        user_id: Uuid,
        asset: Asset,
        delta: Decimal,
        expected_minimum: Decimal,
    ) -> Result<Decimal> {
        let column = Self::balance_column(asset);
        let sql = format!(
            r#"
            UPDATE user_accounts
            SET {col} = {col} + $2
            WHERE id = $1 AND {col} + $2 >= $3
            RETURNING {col}
            "#,
            col = column
        );

        let updated: Option<Decimal> = sqlx::query_scalar(&sql)
            .bind(user_id)
            .bind(delta)
            .bind(expected_minimum)
            .fetch_optional(&self.db)
            .await?;

        if let Some(balance) = updated {
            debug!("Adjusted {} of {} by {} -> {}", asset, user_id, delta, balance);
            return Ok(balance);
        }

        // Either the account is missing or the guard refused the change
        let current: Option<Decimal> =
            sqlx::query_scalar(&format!("SELECT {} FROM user_accounts WHERE id = $1", column))
                .bind(user_id)
                .fetch_optional(&self.db)
                .await?;

        match current {
            Some(available) => Err(TradeError::InsufficientBalance {
                asset,
                required: expected_minimum - delta,
                available,
            }),
            None => Err(TradeError::UserNotFound(user_id)),
        }
    }

    async fn append_ledger_entry(&self, entry: &LedgerEntry) -> Result<()> {
        insert_ledger_entry(&self.db, entry).await
    }

    async fn recent_ledger(&self, user_id: Uuid, limit: usize) -> Result<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, user_id, order_id, kind, debit_asset, debit_amount,
                   credit_asset, credit_amount, description, created_at
            FROM ledger_entries
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.db)
        .await?;
        Ok(entries)
    }

    async fn list_bot_enabled(&self, strategy: BotStrategy) -> Result<Vec<UserAccount>> {
        let sql = format!(
            "SELECT {} FROM user_accounts WHERE bot_enabled = TRUE AND bot_strategy = $1",
            ACCOUNT_COLUMNS
        );
        let accounts = sqlx::query_as::<_, UserAccount>(&sql)
            .bind(strategy)
            .fetch_all(&self.db)
            .await?;
        Ok(accounts)
    }

    async fn record_bot_run(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query("UPDATE user_accounts SET bot_last_run_at = $1 WHERE id = $2")
            .bind(at)
            .bind(user_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(TradeError::UserNotFound(user_id));
        }
        Ok(())
    }
}

#[async_trait]
impl SettlementRepository for PgStore {
    async fn apply_settlement(&self, write: &SettlementWrite) -> Result<SettlementApplied> {
        // Dropping `tx` without commit rolls every step back
        let mut tx = self.db.begin().await?;

        let status: Option<OrderStatus> =
            sqlx::query_scalar("SELECT status FROM p2p_orders WHERE id = $1 FOR UPDATE")
                .bind(write.order_id)
                .fetch_optional(&mut *tx)
                .await?;
        match status {
            None => return Err(TradeError::OrderNotFound(write.order_id)),
            Some(OrderStatus::Pending) => {}
            Some(status) => return Ok(SettlementApplied::NotPending(status)),
        }

        let debit_column = Self::balance_column(write.debit_asset);
        let available: Option<Decimal> = sqlx::query_scalar(&format!(
            "SELECT {} FROM user_accounts WHERE id = $1 FOR UPDATE",
            debit_column
        ))
        .bind(write.user_id)
        .fetch_optional(&mut *tx)
        .await?;
        let available = available.ok_or(TradeError::UserNotFound(write.user_id))?;
        if available < write.debit_amount {
            return Ok(SettlementApplied::InsufficientBalance { available });
        }

        sqlx::query(&format!(
            "UPDATE user_accounts SET {col} = {col} - $2 WHERE id = $1 AND {col} >= $2",
            col = debit_column
        ))
        .bind(write.user_id)
        .bind(write.debit_amount)
        .execute(&mut *tx)
        .await?;

        let claimed = sqlx::query(
            r#"
            UPDATE p2p_orders
            SET status = $1, completed_at = $2
            WHERE id = $3 AND status = $4
            "#,
        )
        .bind(OrderStatus::Completed)
        .bind(write.completed_at)
        .bind(write.order_id)
        .bind(OrderStatus::Pending)
        .execute(&mut *tx)
        .await?;
        if claimed.rows_affected() != 1 {
            return Err(TradeError::Internal(format!(
                "locked order {} was not claimable",
                write.order_id
            )));
        }

        sqlx::query(&format!(
            "UPDATE user_accounts SET {col} = {col} + $2 WHERE id = $1",
            col = Self::balance_column(write.credit_asset)
        ))
        .bind(write.user_id)
        .bind(write.credit_amount)
        .execute(&mut *tx)
        .await?;

        insert_ledger_entry(&mut *tx, &write.entry).await?;

        tx.commit().await?;

        debug!(
            "Settled order {} for {}: -{} {} +{} {}",
            write.order_id,
            write.user_id,
            write.debit_amount,
            write.debit_asset,
            write.credit_amount,
            write.credit_asset
        );
        Ok(SettlementApplied::Applied)
    }
}
