use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Which side of the book a synthetic record quotes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CounterpartySide {
    Buyer,
    Seller,
}

impl std::fmt::Display for CounterpartySide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buyer => write!(f, "buyer"),
            Self::Seller => write!(f, "seller"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CounterpartyStatus {
    Online,
    Offline,
    Recently,
}

impl CounterpartyStatus {
    pub const ALL: [CounterpartyStatus; 3] = [
        CounterpartyStatus::Online,
        CounterpartyStatus::Offline,
        CounterpartyStatus::Recently,
    ];
}

impl std::fmt::Display for CounterpartyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
            Self::Recently => write!(f, "recently"),
        }
    }
}

/// Synthetic liquidity provider
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Counterparty {
    pub id: Uuid,
    pub display_name: String,
    pub side: CounterpartySide,
    pub vip_tier: i16,
    pub status: CounterpartyStatus,
    pub min_limit: Decimal,
    pub max_limit: Decimal,
    pub price: Decimal,
    pub rating: Decimal,
    pub trade_count: i32,
    pub reviews: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl Counterparty {
    /// Amount falls inside the inclusive [min, max] band
    pub fn covers(&self, amount: Decimal) -> bool {
        self.min_limit <= amount && amount <= self.max_limit
    }

    pub fn can_fill(&self, tier: i16, amount: Decimal) -> bool {
        self.status == CounterpartyStatus::Online && self.vip_tier == tier && self.covers(amount)
    }
}

/// Outcome of a per-record bulk update
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkUpdateReport {
    pub updated: usize,
    pub failed: Vec<(Uuid, String)>,
}

impl BulkUpdateReport {
    pub fn record_failure(&mut self, id: Uuid, reason: impl Into<String>) {
        self.failed.push((id, reason.into()));
    }
}
