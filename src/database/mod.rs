use anyhow::Result;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use std::time::Duration;
use tracing::{info, warn};

use crate::constants::database::{ACQUIRE_TIMEOUT_SECONDS, IDLE_TIMEOUT_SECONDS};

pub mod memory;
pub mod postgres;
pub mod repository;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use repository::{
    AccountRepository, CounterpartyRepository, LimitUpdate, OrderRepository, Repositories,
    SettlementApplied, SettlementRepository, SettlementWrite,
};

pub type DatabasePool = Pool<Postgres>;

pub async fn setup_database(database_url: &str, max_connections: u32) -> Result<DatabasePool> {
    info!("Connecting to database (max {} connections)", max_connections);

    if !database_url.contains("sslmode=require")
        && !database_url.contains("sslmode=verify-ca")
        && !database_url.contains("sslmode=verify-full")
    {
        warn!("Database connection does not enforce SSL. Consider adding sslmode=require to connection string");
    }

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(ACQUIRE_TIMEOUT_SECONDS))
        .idle_timeout(Duration::from_secs(IDLE_TIMEOUT_SECONDS))
        .test_before_acquire(true)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                // Day windows are computed in UTC
                sqlx::query("SET timezone = 'UTC'").execute(&mut *conn).await?;
                sqlx::query("SET statement_timeout = '15s'")
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await?;

    let start_time = std::time::Instant::now();
    sqlx::query("SELECT 1").execute(&pool).await?;
    info!(
        "✅ Database connection established successfully in {:?}",
        start_time.elapsed()
    );

    Ok(pool)
}

pub async fn run_migrations(pool: &DatabasePool) -> Result<()> {
    info!("Running database migrations");

    sqlx::migrate!("./migrations").run(pool).await?;

    info!("Database migrations completed successfully");
    Ok(())
}
