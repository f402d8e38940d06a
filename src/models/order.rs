use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{Asset, CounterpartySide};

/// Direction of a user order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Ledger the settlement debits: USDT for buys, SPOT for sells
    pub fn debit_asset(&self) -> Asset {
        match self {
            OrderSide::Buy => Asset::Usdt,
            OrderSide::Sell => Asset::Spot,
        }
    }

    /// Ledger the settlement credits
    pub fn credit_asset(&self) -> Asset {
        match self {
            OrderSide::Buy => Asset::Spot,
            OrderSide::Sell => Asset::Usdt,
        }
    }

    /// A user buy is filled by a synthetic seller and vice versa
    pub fn counterparty_side(&self) -> CounterpartySide {
        match self {
            OrderSide::Buy => CounterpartySide::Seller,
            OrderSide::Sell => CounterpartySide::Buyer,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

impl std::str::FromStr for OrderSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Ok(Self::Buy),
            "sell" => Ok(Self::Sell),
            _ => Err(format!("Invalid order side: {}", s)),
        }
    }
}

/// Order status. Transitions only ever leave `Pending`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Completed)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Who placed the order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderSource {
    Manual,
    Bot,
}

/// One P2P trade intent against a synthetic counterparty.
///
/// The counterparty price is snapshotted at creation and never re-read.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub counterparty_id: Uuid,
    pub counterparty_name: String,
    pub side: OrderSide,
    pub source: OrderSource,
    pub price: Decimal,
    pub base_amount: Decimal,
    pub quote_amount: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub countdown_ends_at: DateTime<Utc>,
    pub auto_complete_at: DateTime<Utc>,
}

impl Order {
    /// Asset and amount removed from the user on settlement
    pub fn debit(&self) -> (Asset, Decimal) {
        match self.side {
            OrderSide::Buy => (Asset::Usdt, self.quote_amount),
            OrderSide::Sell => (Asset::Spot, self.base_amount),
        }
    }

    /// Asset and amount added to the user on settlement
    pub fn credit(&self) -> (Asset, Decimal) {
        match self.side {
            OrderSide::Buy => (Asset::Spot, self.base_amount),
            OrderSide::Sell => (Asset::Usdt, self.quote_amount),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }

    /// Auto-complete deadline has passed
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.auto_complete_at <= now
    }
}
