//! Reference market price used to derive every counterparty quote.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::OracleConfig;
use crate::error::{Result, TradeError};

#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Fails with `OracleUnavailable` when the source is unreachable and
    /// `OracleMalformed` when it answers with something that is not a positive price.
    async fn current_market_price(&self) -> Result<Decimal>;
}

/// Reads the price from a JSON ticker endpoint
#[derive(Clone)]
pub struct HttpPriceOracle {
    client: Client,
    url: String,
    field: String,
}

impl HttpPriceOracle {
    pub fn new(url: impl Into<String>, field: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            client,
            url: url.into(),
            field: field.into(),
        }
    }

    pub fn from_config(config: &OracleConfig, url: &str) -> Self {
        Self::new(url, config.field.clone(), Duration::from_secs(config.timeout_secs))
    }

    fn extract_price(&self, body: &Value) -> Result<Decimal> {
        let raw = body.get(&self.field).ok_or_else(|| {
            TradeError::OracleMalformed(format!("field '{}' missing from response", self.field))
        })?;

        let price = match raw {
            Value::String(s) => Decimal::from_str(s.trim()).map_err(|e| {
                TradeError::OracleMalformed(format!("'{}' is not a decimal: {}", s, e))
            })?,
            Value::Number(n) => Decimal::from_str(&n.to_string()).map_err(|e| {
                TradeError::OracleMalformed(format!("'{}' is not a decimal: {}", n, e))
            })?,
            other => {
                return Err(TradeError::OracleMalformed(format!(
                    "unexpected price value: {}",
                    other
                )))
            }
        };

        if price <= Decimal::ZERO {
            return Err(TradeError::OracleMalformed(format!(
                "non-positive price: {}",
                price
            )));
        }
        Ok(price)
    }
}

#[async_trait]
impl PriceOracle for HttpPriceOracle {
    async fn current_market_price(&self) -> Result<Decimal> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| TradeError::OracleUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Price oracle answered with status {}", status);
            return Err(TradeError::OracleUnavailable(format!(
                "upstream status {}",
                status
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| TradeError::OracleMalformed(e.to_string()))?;

        let price = self.extract_price(&body)?;
        debug!("Market price from oracle: {}", price);
        Ok(price)
    }
}

/// Fixed price, settable at runtime. `None` behaves like an unreachable source.
#[derive(Debug, Default)]
pub struct StaticPriceOracle {
    price: RwLock<Option<Decimal>>,
}

impl StaticPriceOracle {
    pub fn new(price: Decimal) -> Self {
        Self {
            price: RwLock::new(Some(price)),
        }
    }

    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn set_price(&self, price: Option<Decimal>) {
        match self.price.write() {
            Ok(mut guard) => *guard = price,
            Err(poisoned) => *poisoned.into_inner() = price,
        }
    }
}

#[async_trait]
impl PriceOracle for StaticPriceOracle {
    async fn current_market_price(&self) -> Result<Decimal> {
        let price = match self.price.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        };
        match price {
            Some(p) if p > Decimal::ZERO => Ok(p),
            Some(p) => Err(TradeError::OracleMalformed(format!(
                "non-positive price: {}",
                p
            ))),
            None => Err(TradeError::OracleUnavailable(
                "no static price configured".to_string(),
            )),
        }
    }
}
