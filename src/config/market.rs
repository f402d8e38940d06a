use anyhow::{anyhow, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use tracing::{info, warn};

use crate::constants::{bot, schedule, trading};

/// Overrides `target` from `name` when the variable is set, parses and passes `valid`
pub(crate) fn env_override<T>(name: &str, target: &mut T, valid: impl Fn(&T) -> bool)
where
    T: FromStr + std::fmt::Display,
{
    let Ok(raw) = env::var(name) else {
        return;
    };
    match raw.parse::<T>() {
        Ok(value) if valid(&value) => {
            info!("Using custom {}: {}", name, value);
            *target = value;
        }
        Ok(_) => warn!("Invalid {}: {}, using default", name, raw),
        Err(_) => warn!("Failed to parse {}: {}, using default", name, raw),
    }
}

/// Where the reference market price comes from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// JSON endpoint; `None` means the static fallback price is used
    pub url: Option<String>,

    /// Top-level field holding the price (default: "price")
    pub field: String,

    pub timeout_secs: u64,

    /// Price served when no URL is configured
    pub fallback_price: Option<Decimal>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            url: None,
            field: "price".to_string(),
            timeout_secs: 10,
            fallback_price: None,
        }
    }
}

impl OracleConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        config.url = env::var("PRICE_ORACLE_URL").ok().filter(|u| !u.is_empty());
        if let Ok(field) = env::var("PRICE_ORACLE_FIELD") {
            if !field.is_empty() {
                config.field = field;
            }
        }
        env_override("PRICE_ORACLE_TIMEOUT_SECS", &mut config.timeout_secs, |v| *v > 0);

        if let Ok(raw) = env::var("PRICE_ORACLE_FALLBACK") {
            let price = Decimal::from_str(&raw)
                .map_err(|e| anyhow!("PRICE_ORACLE_FALLBACK is not a decimal: {}", e))?;
            if price <= Decimal::ZERO {
                return Err(anyhow!("PRICE_ORACLE_FALLBACK must be > 0"));
            }
            config.fallback_price = Some(price);
        }

        Ok(config)
    }
}

/// Order lifecycle timing and precision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Countdown shown to the user (default: 600)
    pub display_countdown_secs: i64,

    /// Real auto-complete delay is drawn from `[min, max]`
    pub auto_complete_min_secs: i64,
    pub auto_complete_max_secs: i64,

    pub amount_decimals: u32,
    pub price_decimals: u32,

    /// Ledger entries returned by `recent_transactions`
    pub ledger_display_window: usize,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            display_countdown_secs: trading::DISPLAY_COUNTDOWN_SECS,
            auto_complete_min_secs: trading::AUTO_COMPLETE_MIN_SECS,
            auto_complete_max_secs: trading::AUTO_COMPLETE_MAX_SECS,
            amount_decimals: trading::AMOUNT_DECIMALS,
            price_decimals: trading::PRICE_DECIMALS,
            ledger_display_window: trading::LEDGER_DISPLAY_WINDOW,
        }
    }
}

impl TradingConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        env_override(
            "TRADING_DISPLAY_COUNTDOWN_SECS",
            &mut config.display_countdown_secs,
            |v| *v > 0,
        );
        env_override(
            "TRADING_AUTO_COMPLETE_MIN_SECS",
            &mut config.auto_complete_min_secs,
            |v| *v > 0,
        );
        env_override(
            "TRADING_AUTO_COMPLETE_MAX_SECS",
            &mut config.auto_complete_max_secs,
            |v| *v > 0,
        );
        env_override(
            "TRADING_LEDGER_DISPLAY_WINDOW",
            &mut config.ledger_display_window,
            |v| *v > 0,
        );

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.auto_complete_min_secs > self.auto_complete_max_secs {
            return Err(anyhow!(
                "Auto-complete window is inverted: {}s > {}s",
                self.auto_complete_min_secs,
                self.auto_complete_max_secs
            ));
        }
        Ok(())
    }
}

/// Cadence of the background jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub expiry_sweep_interval_secs: u64,
    pub early_completion_interval_secs: u64,

    /// Chance per order per early-completion tick (default: 0.12)
    pub early_completion_probability: f64,

    pub status_refresh_interval_secs: u64,
    pub limit_refresh_interval_secs: u64,
    pub price_refresh_interval_secs: u64,
    pub bot_interval_secs: u64,

    /// TTL of the per-tick Redis lock when running several instances
    pub job_lock_ttl_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            expiry_sweep_interval_secs: schedule::EXPIRY_SWEEP_INTERVAL_SECS,
            early_completion_interval_secs: schedule::EARLY_COMPLETION_INTERVAL_SECS,
            early_completion_probability: schedule::EARLY_COMPLETION_PROBABILITY,
            status_refresh_interval_secs: schedule::STATUS_REFRESH_INTERVAL_SECS,
            limit_refresh_interval_secs: schedule::LIMIT_REFRESH_INTERVAL_SECS,
            price_refresh_interval_secs: schedule::PRICE_REFRESH_INTERVAL_SECS,
            bot_interval_secs: schedule::BOT_INTERVAL_SECS,
            job_lock_ttl_secs: schedule::JOB_LOCK_TTL_SECS,
        }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        env_override("SCHEDULER_ENABLED", &mut config.enabled, |_| true);
        env_override(
            "EXPIRY_SWEEP_INTERVAL_SECS",
            &mut config.expiry_sweep_interval_secs,
            |v| *v > 0,
        );
        env_override(
            "EARLY_COMPLETION_INTERVAL_SECS",
            &mut config.early_completion_interval_secs,
            |v| *v > 0,
        );
        env_override(
            "EARLY_COMPLETION_PROBABILITY",
            &mut config.early_completion_probability,
            |v| (0.0..=1.0).contains(v),
        );
        env_override(
            "STATUS_REFRESH_INTERVAL_SECS",
            &mut config.status_refresh_interval_secs,
            |v| *v > 0,
        );
        env_override(
            "LIMIT_REFRESH_INTERVAL_SECS",
            &mut config.limit_refresh_interval_secs,
            |v| *v > 0,
        );
        env_override(
            "PRICE_REFRESH_INTERVAL_SECS",
            &mut config.price_refresh_interval_secs,
            |v| *v > 0,
        );
        env_override("BOT_INTERVAL_SECS", &mut config.bot_interval_secs, |v| *v > 0);
        env_override("JOB_LOCK_TTL_SECS", &mut config.job_lock_ttl_secs, |v| *v > 0);

        Ok(config)
    }
}

/// Automated trading parameters, indexed by VIP tier 1..=3
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Largest quote amount an order bot may buy per run
    pub tier_trade_ceilings: [Decimal; 3],

    /// Daily profit as a percent of the configured amount
    pub profit_percent_bands: [(f64, f64); 3],

    /// An order bot skips its run if one of its orders settled in the current bucket
    pub settlement_bucket_secs: i64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            tier_trade_ceilings: bot::TIER_TRADE_CEILINGS.map(Decimal::from),
            profit_percent_bands: bot::PROFIT_PERCENT_BANDS,
            settlement_bucket_secs: bot::SETTLEMENT_BUCKET_SECS,
        }
    }
}

impl BotConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        for (index, ceiling) in config.tier_trade_ceilings.iter_mut().enumerate() {
            let name = format!("BOT_TIER{}_TRADE_CEILING", index + 1);
            env_override(&name, ceiling, |v| *v > Decimal::ZERO);
        }
        env_override(
            "BOT_SETTLEMENT_BUCKET_SECS",
            &mut config.settlement_bucket_secs,
            |v| *v > 0,
        );

        Ok(config)
    }

    fn tier_index(tier: i16) -> usize {
        (tier.clamp(1, 3) - 1) as usize
    }

    pub fn trade_ceiling(&self, tier: i16) -> Decimal {
        self.tier_trade_ceilings[Self::tier_index(tier)]
    }

    pub fn profit_band(&self, tier: i16) -> (f64, f64) {
        self.profit_percent_bands[Self::tier_index(tier)]
    }
}
