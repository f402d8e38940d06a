use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::OrderSide;

/// The three independent balance ledgers of an account
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "varchar", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Asset {
    Usdt,
    Spot,
    Flex,
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Usdt => write!(f, "USDT"),
            Self::Spot => write!(f, "SPOT"),
            Self::Flex => write!(f, "FLEX"),
        }
    }
}

/// Which automated-trading primitive runs for an account
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BotStrategy {
    /// Places real orders through the order lifecycle engine
    PlaceOrders,
    /// Credits a simulated profit straight to FLEX
    CreditProfit,
}

impl std::fmt::Display for BotStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PlaceOrders => write!(f, "place_orders"),
            Self::CreditProfit => write!(f, "credit_profit"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct BotSettings {
    #[sqlx(rename = "bot_enabled")]
    pub enabled: bool,
    #[sqlx(rename = "bot_strategy")]
    pub strategy: BotStrategy,
    #[sqlx(rename = "bot_side")]
    pub side: OrderSide,
    #[sqlx(rename = "bot_amount")]
    pub amount: Decimal,
    /// Balance that must remain available beyond `amount`
    #[sqlx(rename = "bot_min_balance")]
    pub min_balance: Decimal,
    #[sqlx(rename = "bot_vip_tier")]
    pub vip_tier: i16,
    #[sqlx(rename = "bot_last_run_at")]
    pub last_run_at: Option<DateTime<Utc>>,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            strategy: BotStrategy::PlaceOrders,
            side: OrderSide::Buy,
            amount: Decimal::ZERO,
            min_balance: Decimal::ZERO,
            vip_tier: 1,
            last_run_at: None,
        }
    }
}

/// User account as seen by the trading core
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct UserAccount {
    pub id: Uuid,
    pub display_name: String,
    pub vip_tier: i16,
    pub usdt_balance: Decimal,
    pub spot_balance: Decimal,
    pub flex_balance: Decimal,
    #[sqlx(flatten)]
    pub bot: BotSettings,
    pub created_at: DateTime<Utc>,
}

impl UserAccount {
    pub fn new(display_name: impl Into<String>, vip_tier: i16) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name: display_name.into(),
            vip_tier,
            usdt_balance: Decimal::ZERO,
            spot_balance: Decimal::ZERO,
            flex_balance: Decimal::ZERO,
            bot: BotSettings::default(),
            created_at: Utc::now(),
        }
    }

    pub fn balance(&self, asset: Asset) -> Decimal {
        match asset {
            Asset::Usdt => self.usdt_balance,
            Asset::Spot => self.spot_balance,
            Asset::Flex => self.flex_balance,
        }
    }

    pub fn balance_mut(&mut self, asset: Asset) -> &mut Decimal {
        match asset {
            Asset::Usdt => &mut self.usdt_balance,
            Asset::Spot => &mut self.spot_balance,
            Asset::Flex => &mut self.flex_balance,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    Buy,
    Sell,
    BotProfit,
}

/// Append-only transaction record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub order_id: Option<Uuid>,
    pub kind: LedgerKind,
    pub debit_asset: Option<Asset>,
    pub debit_amount: Option<Decimal>,
    pub credit_asset: Asset,
    pub credit_amount: Decimal,
    pub description: String,
    pub created_at: DateTime<Utc>,
}
