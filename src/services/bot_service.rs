//! Automated trading for accounts with the bot flag set.
//!
//! `PlaceOrders` accounts trade through `OrderService::create_order`;
//! `CreditProfit` accounts get a simulated daily profit credited to FLEX
//! without any order being created.

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::BotConfig;
use crate::constants::trading::AMOUNT_DECIMALS;
use crate::database::Repositories;
use crate::error::{Result, TradeError};
use crate::models::{
    Asset, BotStrategy, LedgerEntry, LedgerKind, OrderSide, OrderSource, OrderStatus, UserAccount,
};
use crate::services::counterparty_pool::CounterpartyPool;
use crate::services::order_service::{CreateOrderRequest, OrderService};
use crate::utils::random::uniform_decimal;
use crate::utils::{bucket_window, utc_day_window};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BotRunReport {
    pub processed: usize,
    /// Orders placed or profits credited
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Why an account was passed over this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoAmount,
    InsufficientBalance,
    NoLiquidity,
    WindowBusy,
    AlreadyCreditedToday,
}

impl SkipReason {
    fn as_str(&self) -> &'static str {
        match self {
            Self::NoAmount => "no_amount",
            Self::InsufficientBalance => "insufficient_balance",
            Self::NoLiquidity => "no_liquidity",
            Self::WindowBusy => "window_busy",
            Self::AlreadyCreditedToday => "already_credited",
        }
    }
}

#[derive(Clone)]
pub struct BotService {
    repos: Repositories,
    order_service: OrderService,
    pool: CounterpartyPool,
    config: BotConfig,
}

impl BotService {
    pub fn new(
        repos: Repositories,
        order_service: OrderService,
        pool: CounterpartyPool,
        config: BotConfig,
    ) -> Self {
        Self {
            repos,
            order_service,
            pool,
            config,
        }
    }

    pub async fn run_order_bots(&self) -> Result<BotRunReport> {
        self.run_order_bots_at(Utc::now()).await
    }

    /// One placement attempt per eligible account. Rejections skip the account silently.
    #[instrument(skip(self))]
    pub async fn run_order_bots_at(&self, now: DateTime<Utc>) -> Result<BotRunReport> {
        let accounts = self
            .repos
            .accounts
            .list_bot_enabled(BotStrategy::PlaceOrders)
            .await?;
        let mut report = BotRunReport::default();

        for account in accounts {
            report.processed += 1;

            match self.check_order_bot(&account, now).await {
                Ok(None) => {}
                Ok(Some(reason)) => {
                    debug!("Order bot for {} skipped: {}", account.id, reason.as_str());
                    counter!("p2p_bot_runs_total", "strategy" => "place_orders", "outcome" => reason.as_str())
                        .increment(1);
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Order bot eligibility check for {} failed: {}", account.id, e);
                    report.failed += 1;
                    continue;
                }
            }

            let bot = &account.bot;
            let request = CreateOrderRequest {
                side: bot.side,
                amount: bot.amount,
                vip_tier: Some(bot.vip_tier),
                trade_ceiling: match bot.side {
                    OrderSide::Buy => Some(self.config.trade_ceiling(bot.vip_tier)),
                    OrderSide::Sell => None,
                },
                source: OrderSource::Bot,
            };

            match self.order_service.create_order_at(account.id, request, now).await {
                Ok(order) => {
                    if let Err(e) = self.repos.accounts.record_bot_run(account.id, now).await {
                        warn!("Recording bot run for {} failed: {}", account.id, e);
                    }
                    counter!("p2p_bot_runs_total", "strategy" => "place_orders", "outcome" => "placed")
                        .increment(1);
                    info!("🤖 Bot placed order {} for {}", order.id, account.id);
                    report.succeeded += 1;
                }
                Err(e) if e.is_business_rejection() => {
                    debug!("Bot order for {} rejected: {}", account.id, e);
                    counter!("p2p_bot_runs_total", "strategy" => "place_orders", "outcome" => "rejected")
                        .increment(1);
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!("Bot order for {} failed: {}", account.id, e);
                    counter!("p2p_bot_runs_total", "strategy" => "place_orders", "outcome" => "error")
                        .increment(1);
                    report.failed += 1;
                }
            }
        }

        if report.processed > 0 {
            info!(
                "🤖 Order bots: {} placed, {} skipped, {} failed",
                report.succeeded, report.skipped, report.failed
            );
        }
        Ok(report)
    }

    /// `Some(reason)` when the account must not trade this cycle
    async fn check_order_bot(
        &self,
        account: &UserAccount,
        now: DateTime<Utc>,
    ) -> Result<Option<SkipReason>> {
        let bot = &account.bot;
        if bot.amount <= Decimal::ZERO {
            return Ok(Some(SkipReason::NoAmount));
        }

        if account.balance(bot.side.debit_asset()) < bot.amount + bot.min_balance {
            return Ok(Some(SkipReason::InsufficientBalance));
        }

        let liquidity = self
            .pool
            .find_match(bot.side.counterparty_side(), bot.vip_tier, bot.amount)
            .await?;
        if liquidity.is_none() {
            return Ok(Some(SkipReason::NoLiquidity));
        }

        let (bucket_start, bucket_end) = bucket_window(now, self.config.settlement_bucket_secs);
        let created_in_bucket = self
            .repos
            .orders
            .find_for_user_created_between(account.id, bucket_start, bucket_end)
            .await?;
        if created_in_bucket
            .iter()
            .any(|o| o.status != OrderStatus::Cancelled)
        {
            return Ok(Some(SkipReason::WindowBusy));
        }

        let settled_in_bucket = self
            .repos
            .orders
            .find_completed_for_user_in_range(
                account.id,
                bot.side,
                bucket_start,
                bucket_end - Duration::milliseconds(1),
            )
            .await?;
        if !settled_in_bucket.is_empty() {
            return Ok(Some(SkipReason::WindowBusy));
        }

        Ok(None)
    }

    pub async fn run_profit_bots(&self) -> Result<BotRunReport> {
        self.run_profit_bots_at(Utc::now()).await
    }

    /// Credits each `CreditProfit` account at most once per UTC day
    #[instrument(skip(self))]
    pub async fn run_profit_bots_at(&self, now: DateTime<Utc>) -> Result<BotRunReport> {
        let accounts = self
            .repos
            .accounts
            .list_bot_enabled(BotStrategy::CreditProfit)
            .await?;
        let mut report = BotRunReport::default();

        for account in accounts {
            report.processed += 1;

            match self.credit_profit(&account, now).await {
                Ok(None) => {
                    counter!("p2p_bot_runs_total", "strategy" => "credit_profit", "outcome" => "credited")
                        .increment(1);
                    report.succeeded += 1;
                }
                Ok(Some(reason)) => {
                    debug!("Profit bot for {} skipped: {}", account.id, reason.as_str());
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!("Profit bot for {} failed: {}", account.id, e);
                    counter!("p2p_bot_runs_total", "strategy" => "credit_profit", "outcome" => "error")
                        .increment(1);
                    report.failed += 1;
                }
            }
        }

        if report.processed > 0 {
            info!(
                "💰 Profit bots: {} credited, {} skipped, {} failed",
                report.succeeded, report.skipped, report.failed
            );
        }
        Ok(report)
    }

    async fn credit_profit(
        &self,
        account: &UserAccount,
        now: DateTime<Utc>,
    ) -> Result<Option<SkipReason>> {
        let bot = &account.bot;
        if bot.amount <= Decimal::ZERO {
            return Ok(Some(SkipReason::NoAmount));
        }

        let (day_start, day_end) = utc_day_window(now);
        if let Some(last) = bot.last_run_at {
            if last >= day_start && last <= day_end {
                return Ok(Some(SkipReason::AlreadyCreditedToday));
            }
        }

        let profit = self.draw_profit(bot.vip_tier, bot.amount);
        if profit <= Decimal::ZERO {
            return Err(TradeError::Internal(format!(
                "non-positive profit {} drawn for {}",
                profit, account.id
            )));
        }

        // Recorded first: at most one credit per day even if the credit below fails
        self.repos.accounts.record_bot_run(account.id, now).await?;
        self.repos
            .accounts
            .adjust_balance(account.id, Asset::Flex, profit, Decimal::ZERO)
            .await?;

        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            user_id: account.id,
            order_id: None,
            kind: LedgerKind::BotProfit,
            debit_asset: None,
            debit_amount: None,
            credit_asset: Asset::Flex,
            credit_amount: profit,
            description: format!("Bot profit on {} at tier {}", bot.amount, bot.vip_tier),
            created_at: now,
        };
        self.repos.accounts.append_ledger_entry(&entry).await?;

        info!("💰 Credited {} FLEX bot profit to {}", profit, account.id);
        Ok(None)
    }

    fn draw_profit(&self, tier: i16, amount: Decimal) -> Decimal {
        let (low, high) = self.config.profit_band(tier);
        let percent = uniform_decimal(&mut rand::thread_rng(), low, high, 4);
        (amount * percent / Decimal::ONE_HUNDRED).round_dp(AMOUNT_DECIMALS)
    }
}
