use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::models::{Asset, CounterpartySide, OrderSide, OrderStatus};

pub type Result<T> = std::result::Result<T, TradeError>;

/// Error codes for categorizing errors
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Validation errors (3xxx)
    #[serde(rename = "VAL_3001")]
    InvalidInput,
    #[serde(rename = "VAL_3005")]
    InvalidAmount,

    // Resource errors (4xxx)
    #[serde(rename = "RES_4001")]
    OrderNotFound,
    #[serde(rename = "RES_4002")]
    UserNotFound,
    #[serde(rename = "RES_4003")]
    OrderNotPending,

    // Business logic errors (5xxx)
    #[serde(rename = "BIZ_5001")]
    InsufficientBalance,
    #[serde(rename = "BIZ_5002")]
    NoLiquidity,
    #[serde(rename = "BIZ_5003")]
    DailyLimitExceeded,
    #[serde(rename = "BIZ_5004")]
    NotYetEligible,
    #[serde(rename = "BIZ_5005")]
    TradeLimitExceeded,

    // Database errors (7xxx)
    #[serde(rename = "DB_7002")]
    QueryFailed,

    // External service errors (8xxx)
    #[serde(rename = "EXT_8001")]
    OracleUnavailable,
    #[serde(rename = "EXT_8002")]
    OracleMalformed,
    #[serde(rename = "EXT_8003")]
    LockServiceFailed,

    // Internal errors (9xxx)
    #[serde(rename = "INT_9999")]
    InternalServerError,
}

impl ErrorCode {
    /// Get numeric code
    pub fn code(&self) -> u16 {
        match self {
            ErrorCode::InvalidInput => 3001,
            ErrorCode::InvalidAmount => 3005,

            ErrorCode::OrderNotFound => 4001,
            ErrorCode::UserNotFound => 4002,
            ErrorCode::OrderNotPending => 4003,

            ErrorCode::InsufficientBalance => 5001,
            ErrorCode::NoLiquidity => 5002,
            ErrorCode::DailyLimitExceeded => 5003,
            ErrorCode::NotYetEligible => 5004,
            ErrorCode::TradeLimitExceeded => 5005,

            ErrorCode::QueryFailed => 7002,

            ErrorCode::OracleUnavailable => 8001,
            ErrorCode::OracleMalformed => 8002,
            ErrorCode::LockServiceFailed => 8003,

            ErrorCode::InternalServerError => 9999,
        }
    }

    /// Get user-friendly message
    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "Invalid input provided",
            ErrorCode::InvalidAmount => "Invalid amount provided",

            ErrorCode::OrderNotFound => "The requested order was not found",
            ErrorCode::UserNotFound => "The requested account was not found",
            ErrorCode::OrderNotPending => "This order is no longer pending",

            ErrorCode::InsufficientBalance => "Insufficient balance to complete this trade",
            ErrorCode::NoLiquidity => "No counterparty is available for this amount right now",
            ErrorCode::DailyLimitExceeded => "You have already traded in this direction today",
            ErrorCode::NotYetEligible => "This order cannot be completed yet",
            ErrorCode::TradeLimitExceeded => "The amount exceeds your trade limit",

            ErrorCode::QueryFailed => "Database query failed",

            ErrorCode::OracleUnavailable => "Market price source is currently unavailable",
            ErrorCode::OracleMalformed => "Market price source returned invalid data",
            ErrorCode::LockServiceFailed => "Lock service error occurred",

            ErrorCode::InternalServerError => "An internal error occurred",
        }
    }
}

/// Reason code plus message handed to whatever surface reports the failure
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub code: ErrorCode,
    pub code_number: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Error)]
pub enum TradeError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Daily limit reached for {side} orders")]
    DailyLimitExceeded { side: OrderSide },

    #[error("Insufficient {asset} balance: required {required}, available {available}")]
    InsufficientBalance {
        asset: Asset,
        required: Decimal,
        available: Decimal,
    },

    #[error("Amount {amount} exceeds trade ceiling {ceiling}")]
    TradeLimitExceeded { amount: Decimal, ceiling: Decimal },

    #[error("No online {side} at tier {tier} covers amount {amount}")]
    NoLiquidity {
        side: CounterpartySide,
        tier: i16,
        amount: Decimal,
    },

    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("User not found: {0}")]
    UserNotFound(Uuid),

    #[error("Order {order_id} is {status}, not pending")]
    OrderNotPending { order_id: Uuid, status: OrderStatus },

    #[error("Order {order_id} can be completed from {eligible_at}")]
    NotYetEligible {
        order_id: Uuid,
        eligible_at: DateTime<Utc>,
    },

    #[error("Price oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("Price oracle returned malformed data: {0}")]
    OracleMalformed(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TradeError {
    /// Get error code
    pub fn error_code(&self) -> ErrorCode {
        match self {
            TradeError::Validation(_) => ErrorCode::InvalidInput,
            TradeError::InvalidAmount(_) => ErrorCode::InvalidAmount,
            TradeError::DailyLimitExceeded { .. } => ErrorCode::DailyLimitExceeded,
            TradeError::InsufficientBalance { .. } => ErrorCode::InsufficientBalance,
            TradeError::TradeLimitExceeded { .. } => ErrorCode::TradeLimitExceeded,
            TradeError::NoLiquidity { .. } => ErrorCode::NoLiquidity,
            TradeError::OrderNotFound(_) => ErrorCode::OrderNotFound,
            TradeError::UserNotFound(_) => ErrorCode::UserNotFound,
            TradeError::OrderNotPending { .. } => ErrorCode::OrderNotPending,
            TradeError::NotYetEligible { .. } => ErrorCode::NotYetEligible,
            TradeError::OracleUnavailable(_) => ErrorCode::OracleUnavailable,
            TradeError::OracleMalformed(_) => ErrorCode::OracleMalformed,
            TradeError::Database(_) => ErrorCode::QueryFailed,
            TradeError::Redis(_) => ErrorCode::LockServiceFailed,
            TradeError::Internal(_) => ErrorCode::InternalServerError,
        }
    }

    /// Expected outcomes a caller may surface or skip, as opposed to faults
    pub fn is_business_rejection(&self) -> bool {
        !matches!(
            self,
            TradeError::OracleUnavailable(_)
                | TradeError::OracleMalformed(_)
                | TradeError::Database(_)
                | TradeError::Redis(_)
                | TradeError::Internal(_)
        )
    }

    /// Reason code and message for the surrounding surface
    pub fn detail(&self) -> ErrorDetail {
        let code = self.error_code();
        let details = if self.is_business_rejection() {
            Some(self.to_string())
        } else {
            None
        };

        ErrorDetail {
            code,
            code_number: code.code(),
            message: code.message().to_string(),
            details,
        }
    }

    /// Log error with appropriate level
    pub fn log(&self, context: &str) {
        match self {
            TradeError::OrderNotPending { .. } | TradeError::NotYetEligible { .. } => {
                debug!(context = %context, error = %self, "Order state conflict");
            }
            e if e.is_business_rejection() => {
                warn!(context = %context, error = %self, "Trade rejected");
            }
            _ => {
                error!(context = %context, error = %self, "Trade operation failed");
            }
        }
    }
}
