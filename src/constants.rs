//! Application constants and configuration values.
//!
//! This module centralizes the fixed market parameters so the sweeps,
//! the counterparty pool and the configuration defaults agree on them.

/// Order lifecycle timing and precision
pub mod trading {
    /// Countdown shown to the user, always exactly ten minutes
    pub const DISPLAY_COUNTDOWN_SECS: i64 = 600;

    /// Earliest auto-complete deadline after creation
    pub const AUTO_COMPLETE_MIN_SECS: i64 = 60;

    /// Latest auto-complete deadline after creation
    pub const AUTO_COMPLETE_MAX_SECS: i64 = 600;

    /// Decimal places kept on base/quote amounts
    pub const AMOUNT_DECIMALS: u32 = 8;

    /// Decimal places kept on counterparty prices
    pub const PRICE_DECIMALS: u32 = 4;

    /// Number of ledger entries returned for the recent-transactions view
    pub const LEDGER_DISPLAY_WINDOW: usize = 50;

    /// Default page size for order history
    pub const ORDER_HISTORY_LIMIT: i64 = 100;
}

/// Scheduler periods
pub mod schedule {
    pub const EXPIRY_SWEEP_INTERVAL_SECS: u64 = 10;
    pub const EARLY_COMPLETION_INTERVAL_SECS: u64 = 60;
    pub const STATUS_REFRESH_INTERVAL_SECS: u64 = 20 * 60;
    pub const LIMIT_REFRESH_INTERVAL_SECS: u64 = 24 * 60 * 60;
    pub const PRICE_REFRESH_INTERVAL_SECS: u64 = 24 * 60 * 60;
    pub const BOT_INTERVAL_SECS: u64 = 60 * 60;

    /// Chance that a not-yet-due pending order settles on one early sweep
    pub const EARLY_COMPLETION_PROBABILITY: f64 = 0.12;

    /// TTL of the per-job Redis lock, shorter than the fastest sweep period
    pub const JOB_LOCK_TTL_SECS: u64 = 8;
}

/// Counterparty liquidity model
pub mod counterparty {
    /// Minimum-limit buckets in USDT, one is chosen uniformly per refresh
    pub const LIMIT_BUCKETS: [(u32, u32); 5] = [
        (30, 150),
        (150, 500),
        (500, 1000),
        (1000, 2000),
        (2000, 5000),
    ];

    /// Maximum limit is `min * factor`, factor uniform in this range
    pub const MAX_LIMIT_FACTOR: (f64, f64) = (2.0, 4.0);

    /// Buyer markdown percent bands, indexed by tier - 1
    pub const BUYER_PERCENT_BANDS: [(f64, f64); 3] = [(1.0, 1.05), (1.2, 1.25), (1.45, 1.5)];

    /// Seller markup percent bands, indexed by tier - 1
    pub const SELLER_PERCENT_BANDS: [(f64, f64); 3] = [(1.0, 1.15), (1.2, 1.35), (1.35, 1.6)];

    /// Ratings are drawn from this range when a record is generated
    pub const RATING_RANGE: (f64, f64) = (4.5, 5.0);

    /// Records per side generated when the pool starts empty
    pub const SEED_PER_SIDE: usize = 60;

    pub const MIN_TIER: i16 = 1;
    pub const MAX_TIER: i16 = 3;
}

/// Automated trading
pub mod bot {
    /// Buy ceiling in USDT per tier, indexed by tier - 1
    pub const TIER_TRADE_CEILINGS: [u32; 3] = [500, 2000, 5000];

    /// Simulated profit percent bands per tier for the profit bot
    pub const PROFIT_PERCENT_BANDS: [(f64, f64); 3] = [(0.5, 1.0), (1.0, 1.5), (1.5, 2.2)];

    /// Width of the duplicate-placement bucket
    pub const SETTLEMENT_BUCKET_SECS: i64 = 600;
}

/// Database constants
pub mod database {
    /// Default max connections in pool
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 20;

    /// Connection acquire timeout in seconds
    pub const ACQUIRE_TIMEOUT_SECONDS: u64 = 3;

    /// Idle connection timeout in seconds
    pub const IDLE_TIMEOUT_SECONDS: u64 = 180;
}
