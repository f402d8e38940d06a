//! Application startup: storage backend, price oracle and service wiring.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::config::{Config, OracleConfig, StorageBackend};
use crate::constants::counterparty::SEED_PER_SIDE;
use crate::database::{self, MemoryStore, PgStore, Repositories};
use crate::error::TradeError;
use crate::services::{
    BotService, CounterpartyPool, HttpPriceOracle, MarketScheduler, OrderService, PriceOracle,
    RedisLock, SettlementSweeper, StaticPriceOracle,
};

/// Builds every service and seeds the counterparty pool. The scheduler is not started.
pub async fn initialize_app(config: &Config) -> Result<AppState> {
    info!("🚀 Starting P2P market ({} backend)", backend_name(config.storage_backend));

    let repos = setup_repositories(config).await?;
    let oracle = setup_oracle(&config.oracle);

    let counterparty_pool = CounterpartyPool::new(
        repos.counterparties.clone(),
        oracle.clone(),
        config.trading.price_decimals,
    );
    match counterparty_pool.seed_if_empty(SEED_PER_SIDE).await {
        Ok(_) => {}
        Err(e @ (TradeError::OracleUnavailable(_) | TradeError::OracleMalformed(_))) => {
            warn!("Counterparty seeding skipped: {}", e);
        }
        Err(e) => return Err(e.into()),
    }

    let order_service = OrderService::new(
        repos.clone(),
        counterparty_pool.clone(),
        config.trading.clone(),
    );
    info!("✅ Order service initialized");

    let settlement_sweeper = SettlementSweeper::new(
        repos.orders.clone(),
        order_service.clone(),
        config.scheduler.early_completion_probability,
    );

    let bot_service = BotService::new(
        repos.clone(),
        order_service.clone(),
        counterparty_pool.clone(),
        config.bot.clone(),
    );
    info!("✅ Bot service initialized");

    let job_lock = match &config.redis_url {
        Some(url) => {
            let lock = RedisLock::new(url, Duration::from_secs(config.scheduler.job_lock_ttl_secs))
                .map_err(|e| anyhow::anyhow!("Invalid REDIS_URL: {}", e))?;
            info!("✅ Redis job locks enabled");
            Some(lock)
        }
        None => {
            info!("Redis not configured, jobs run without cross-instance locks");
            None
        }
    };

    let scheduler = Arc::new(MarketScheduler::new(
        settlement_sweeper.clone(),
        counterparty_pool.clone(),
        bot_service.clone(),
        config.scheduler.clone(),
        job_lock,
    ));

    Ok(AppState {
        config: config.clone(),
        repos,
        oracle,
        counterparty_pool,
        order_service,
        settlement_sweeper,
        bot_service,
        scheduler,
    })
}

async fn setup_repositories(config: &Config) -> Result<Repositories> {
    match config.storage_backend {
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for postgres"))?;
            let db_pool = database::setup_database(url, config.max_connections).await?;
            database::run_migrations(&db_pool).await?;
            info!("✅ PostgreSQL store ready");
            Ok(Repositories::from_store(Arc::new(PgStore::new(db_pool))))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory store, state is lost on restart");
            Ok(Repositories::from_store(Arc::new(MemoryStore::new())))
        }
    }
}

fn setup_oracle(config: &OracleConfig) -> Arc<dyn PriceOracle> {
    match (&config.url, config.fallback_price) {
        (Some(url), _) => {
            info!("✅ Price oracle: {} (field '{}')", url, config.field);
            Arc::new(HttpPriceOracle::from_config(config, url))
        }
        (None, Some(price)) => {
            info!("✅ Static price oracle at {}", price);
            Arc::new(StaticPriceOracle::new(price))
        }
        (None, None) => {
            warn!("No price oracle configured, price refreshes will fail");
            Arc::new(StaticPriceOracle::unavailable())
        }
    }
}

fn backend_name(backend: StorageBackend) -> &'static str {
    match backend {
        StorageBackend::Postgres => "postgres",
        StorageBackend::Memory => "memory",
    }
}
