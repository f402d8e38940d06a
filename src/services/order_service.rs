//! Order lifecycle: creation against the counterparty pool, at-most-once
//! settlement, cancellation and manual completion.
//!
//! Locks are always taken order first, then user. Settlement hands the debit,
//! the `pending -> completed` claim, the credit and the ledger entry to the
//! store as one unit, so a second process racing on the same order cannot
//! apply the balance change twice and a failed step leaves nothing behind.

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::TradingConfig;
use crate::constants::counterparty::{MAX_TIER, MIN_TIER};
use crate::constants::trading::ORDER_HISTORY_LIMIT;
use crate::database::{Repositories, SettlementApplied, SettlementWrite};
use crate::error::{Result, TradeError};
use crate::models::{
    Asset, LedgerEntry, LedgerKind, Order, OrderSide, OrderSource, OrderStatus, UserAccount,
};
use crate::services::counterparty_pool::CounterpartyPool;
use crate::utils::{utc_day_window, KeyedMutex};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub side: OrderSide,
    /// Quote (USDT) for buys, base (SPOT) for sells
    pub amount: Decimal,
    /// Overrides the account's VIP tier for matching
    pub vip_tier: Option<i16>,
    /// Upper bound on a buy amount, supplied by bot callers
    pub trade_ceiling: Option<Decimal>,
    pub source: OrderSource,
}

impl CreateOrderRequest {
    pub fn manual(side: OrderSide, amount: Decimal) -> Self {
        Self {
            side,
            amount,
            vip_tier: None,
            trade_ceiling: None,
            source: OrderSource::Manual,
        }
    }
}

/// What caused a settlement attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementTrigger {
    Expiry,
    Early,
    Manual,
}

impl SettlementTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expiry => "expiry",
            Self::Early => "early",
            Self::Manual => "manual",
        }
    }
}

/// Expected results of `settle_order`; faults come back as `Err`
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    Settled(Order),
    /// Already completed or cancelled, nothing applied
    NotPending(OrderStatus),
    /// Debit balance too low; the order stays pending for a later sweep
    InsufficientBalance {
        asset: Asset,
        required: Decimal,
        available: Decimal,
    },
}

#[derive(Clone)]
pub struct OrderService {
    repos: Repositories,
    pool: CounterpartyPool,
    config: TradingConfig,
    order_locks: KeyedMutex,
    user_locks: KeyedMutex,
}

impl OrderService {
    pub fn new(repos: Repositories, pool: CounterpartyPool, config: TradingConfig) -> Self {
        Self {
            repos,
            pool,
            config,
            order_locks: KeyedMutex::new(),
            user_locks: KeyedMutex::new(),
        }
    }

    pub async fn create_order(&self, user_id: Uuid, request: CreateOrderRequest) -> Result<Order> {
        self.create_order_at(user_id, request, Utc::now()).await
    }

    /// Creates a pending order. Balances are not touched until settlement.
    #[instrument(skip(self), fields(side = %request.side, amount = %request.amount))]
    pub async fn create_order_at(
        &self,
        user_id: Uuid,
        request: CreateOrderRequest,
        now: DateTime<Utc>,
    ) -> Result<Order> {
        let amount = request.amount.round_dp(self.config.amount_decimals);
        if amount <= Decimal::ZERO {
            return Err(TradeError::InvalidAmount(format!(
                "amount must be positive, got {}",
                request.amount
            )));
        }
        if let Some(tier) = request.vip_tier {
            if !(MIN_TIER..=MAX_TIER).contains(&tier) {
                return Err(TradeError::Validation(format!(
                    "VIP tier must be between {} and {}, got {}",
                    MIN_TIER, MAX_TIER, tier
                )));
            }
        }

        // Serializes the daily-limit check with the insert for this user
        let _user_guard = self.user_locks.lock(user_id).await;

        let account = self.load_account(user_id).await?;
        let side = request.side;
        let tier = request.vip_tier.unwrap_or(account.vip_tier);

        let (day_start, day_end) = utc_day_window(now);
        let completed_today = self
            .repos
            .orders
            .find_completed_for_user_in_range(user_id, side, day_start, day_end)
            .await?;
        if !completed_today.is_empty() {
            return Err(TradeError::DailyLimitExceeded { side });
        }

        // A pending order of the same direction would also settle today
        let pending = self.repos.orders.find_pending_for_user(user_id, side).await?;
        if !pending.is_empty() {
            return Err(TradeError::DailyLimitExceeded { side });
        }

        let debit_asset = side.debit_asset();
        let available = account.balance(debit_asset);
        if available < amount {
            return Err(TradeError::InsufficientBalance {
                asset: debit_asset,
                required: amount,
                available,
            });
        }

        if side == OrderSide::Buy {
            if let Some(ceiling) = request.trade_ceiling {
                if amount > ceiling {
                    return Err(TradeError::TradeLimitExceeded { amount, ceiling });
                }
            }
        }

        let counterparty_side = side.counterparty_side();
        let counterparty = self
            .pool
            .find_match(counterparty_side, tier, amount)
            .await?
            .ok_or(TradeError::NoLiquidity {
                side: counterparty_side,
                tier,
                amount,
            })?;

        let price = counterparty.price;
        if price <= Decimal::ZERO {
            return Err(TradeError::Internal(format!(
                "counterparty {} has non-positive price {}",
                counterparty.id, price
            )));
        }

        let (base_amount, quote_amount) = match side {
            OrderSide::Buy => ((amount / price).round_dp(self.config.amount_decimals), amount),
            OrderSide::Sell => (amount, (amount * price).round_dp(self.config.amount_decimals)),
        };
        if base_amount <= Decimal::ZERO || quote_amount <= Decimal::ZERO {
            return Err(TradeError::InvalidAmount(format!(
                "amount {} is too small at price {}",
                amount, price
            )));
        }

        let delay_secs = rand::thread_rng()
            .gen_range(self.config.auto_complete_min_secs..=self.config.auto_complete_max_secs);

        let order = Order {
            id: Uuid::new_v4(),
            user_id,
            counterparty_id: counterparty.id,
            counterparty_name: counterparty.display_name.clone(),
            side,
            source: request.source,
            price,
            base_amount,
            quote_amount,
            status: OrderStatus::Pending,
            created_at: now,
            completed_at: None,
            countdown_ends_at: now + Duration::seconds(self.config.display_countdown_secs),
            auto_complete_at: now + Duration::seconds(delay_secs),
        };

        self.repos.orders.insert(&order).await?;

        counter!("p2p_orders_created_total", "side" => side.to_string()).increment(1);
        info!(
            "📝 Order {} created: {} {} base / {} quote @ {} with {}",
            order.id, side, base_amount, quote_amount, price, order.counterparty_name
        );

        Ok(order)
    }

    pub async fn settle_order(
        &self,
        order_id: Uuid,
        trigger: SettlementTrigger,
    ) -> Result<SettlementOutcome> {
        self.settle_order_at(order_id, trigger, Utc::now()).await
    }

    /// Idempotent. Applies debit, credit and ledger entry at most once per order.
    #[instrument(skip(self, trigger), fields(trigger = trigger.as_str()))]
    pub async fn settle_order_at(
        &self,
        order_id: Uuid,
        trigger: SettlementTrigger,
        now: DateTime<Utc>,
    ) -> Result<SettlementOutcome> {
        let _order_guard = self.order_locks.lock(order_id).await;

        let mut order = self.load_order(order_id).await?;
        if !order.is_pending() {
            debug!("Order {} already {}, skipping", order_id, order.status);
            counter!("p2p_settlement_skipped_total", "reason" => "not_pending").increment(1);
            return Ok(SettlementOutcome::NotPending(order.status));
        }

        let _user_guard = self.user_locks.lock(order.user_id).await;

        let account = self.load_account(order.user_id).await?;
        let (debit_asset, debit_amount) = order.debit();
        let (credit_asset, credit_amount) = order.credit();

        let available = account.balance(debit_asset);
        if available < debit_amount {
            return Ok(self.soft_fail(&order, debit_asset, debit_amount, available));
        }

        let write = SettlementWrite {
            order_id,
            user_id: order.user_id,
            debit_asset,
            debit_amount,
            credit_asset,
            credit_amount,
            entry: LedgerEntry {
                id: Uuid::new_v4(),
                user_id: order.user_id,
                order_id: Some(order.id),
                kind: match order.side {
                    OrderSide::Buy => LedgerKind::Buy,
                    OrderSide::Sell => LedgerKind::Sell,
                },
                debit_asset: Some(debit_asset),
                debit_amount: Some(debit_amount),
                credit_asset,
                credit_amount,
                description: format!(
                    "P2P {} with {}: {} {} for {} {} @ {}",
                    order.side,
                    order.counterparty_name,
                    debit_amount,
                    debit_asset,
                    credit_amount,
                    credit_asset,
                    order.price
                ),
                created_at: now,
            },
            completed_at: now,
        };

        match self.repos.settlements.apply_settlement(&write).await? {
            SettlementApplied::Applied => {}
            SettlementApplied::NotPending(status) => {
                // Another process settled or cancelled it between our read and the write
                counter!("p2p_settlement_skipped_total", "reason" => "claim_lost").increment(1);
                return Ok(SettlementOutcome::NotPending(status));
            }
            SettlementApplied::InsufficientBalance { available } => {
                return Ok(self.soft_fail(&order, debit_asset, debit_amount, available));
            }
        }

        order.status = OrderStatus::Completed;
        order.completed_at = Some(now);

        counter!("p2p_orders_settled_total", "trigger" => trigger.as_str()).increment(1);
        info!(
            "✅ Order {} settled ({}): -{} {} +{} {}",
            order_id,
            trigger.as_str(),
            debit_amount,
            debit_asset,
            credit_amount,
            credit_asset
        );

        Ok(SettlementOutcome::Settled(order))
    }

    fn soft_fail(
        &self,
        order: &Order,
        asset: Asset,
        required: Decimal,
        available: Decimal,
    ) -> SettlementOutcome {
        counter!("p2p_settlement_skipped_total", "reason" => "insufficient_balance").increment(1);
        warn!(
            "Order {} left pending: {} {} required, {} available",
            order.id, required, asset, available
        );
        SettlementOutcome::InsufficientBalance {
            asset,
            required,
            available,
        }
    }

    pub async fn cancel_order(&self, order_id: Uuid, user_id: Uuid) -> Result<Order> {
        self.cancel_order_at(order_id, user_id, Utc::now()).await
    }

    /// Only pending orders can be cancelled; no balance effect
    #[instrument(skip(self))]
    pub async fn cancel_order_at(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Order> {
        let _order_guard = self.order_locks.lock(order_id).await;

        let mut order = self.load_owned_order(order_id, user_id).await?;
        if !order.is_pending() {
            return Err(TradeError::OrderNotPending {
                order_id,
                status: order.status,
            });
        }

        let cancelled = self
            .repos
            .orders
            .update_status(order_id, OrderStatus::Pending, OrderStatus::Cancelled, now)
            .await?;
        if !cancelled {
            let status = self.load_order(order_id).await?.status;
            return Err(TradeError::OrderNotPending { order_id, status });
        }

        order.status = OrderStatus::Cancelled;
        order.completed_at = Some(now);

        counter!("p2p_orders_cancelled_total").increment(1);
        info!("🚫 Order {} cancelled by {}", order_id, user_id);
        Ok(order)
    }

    pub async fn complete_order(&self, order_id: Uuid, user_id: Uuid) -> Result<Order> {
        self.complete_order_at(order_id, user_id, Utc::now()).await
    }

    /// User-triggered completion, allowed once the auto-complete deadline has passed
    #[instrument(skip(self))]
    pub async fn complete_order_at(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Order> {
        let order = self.load_owned_order(order_id, user_id).await?;
        if !order.is_pending() {
            return Err(TradeError::OrderNotPending {
                order_id,
                status: order.status,
            });
        }
        if !order.is_due(now) {
            return Err(TradeError::NotYetEligible {
                order_id,
                eligible_at: order.auto_complete_at,
            });
        }

        match self
            .settle_order_at(order_id, SettlementTrigger::Manual, now)
            .await?
        {
            SettlementOutcome::Settled(order) => Ok(order),
            SettlementOutcome::NotPending(status) => {
                Err(TradeError::OrderNotPending { order_id, status })
            }
            SettlementOutcome::InsufficientBalance {
                asset,
                required,
                available,
            } => Err(TradeError::InsufficientBalance {
                asset,
                required,
                available,
            }),
        }
    }

    pub async fn get_order(&self, order_id: Uuid, user_id: Uuid) -> Result<Order> {
        self.load_owned_order(order_id, user_id).await
    }

    /// Newest first
    pub async fn list_orders(&self, user_id: Uuid, limit: Option<i64>) -> Result<Vec<Order>> {
        let limit = limit.unwrap_or(ORDER_HISTORY_LIMIT).clamp(1, ORDER_HISTORY_LIMIT);
        self.repos.orders.list_for_user(user_id, limit).await
    }

    /// Ledger entries inside the display window, newest first
    pub async fn recent_transactions(&self, user_id: Uuid) -> Result<Vec<LedgerEntry>> {
        self.load_account(user_id).await?;
        self.repos
            .accounts
            .recent_ledger(user_id, self.config.ledger_display_window)
            .await
    }

    /// Drops idle lock entries; returns how many were removed
    pub fn prune_locks(&self) -> usize {
        self.order_locks.prune() + self.user_locks.prune()
    }

    async fn load_order(&self, order_id: Uuid) -> Result<Order> {
        self.repos
            .orders
            .find_by_id(order_id)
            .await?
            .ok_or(TradeError::OrderNotFound(order_id))
    }

    /// Orders owned by someone else read as not found
    async fn load_owned_order(&self, order_id: Uuid, user_id: Uuid) -> Result<Order> {
        let order = self.load_order(order_id).await?;
        if order.user_id != user_id {
            return Err(TradeError::OrderNotFound(order_id));
        }
        Ok(order)
    }

    async fn load_account(&self, user_id: Uuid) -> Result<UserAccount> {
        self.repos
            .accounts
            .find_by_id(user_id)
            .await?
            .ok_or(TradeError::UserNotFound(user_id))
    }
}
