use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

use crate::constants::database::DEFAULT_MAX_CONNECTIONS;

pub mod market;
pub use market::{BotConfig, OracleConfig, SchedulerConfig, TradingConfig};

/// Which store backs the repositories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow::anyhow!("Unknown STORAGE_BACKEND: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub environment: String,
    pub storage_backend: StorageBackend,
    pub database_url: Option<String>,
    pub max_connections: u32,
    /// Enables cross-instance job locks when set
    pub redis_url: Option<String>,
    /// `json` or `pretty`
    pub log_format: String,
    pub oracle: OracleConfig,
    pub trading: TradingConfig,
    pub scheduler: SchedulerConfig,
    pub bot: BotConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let storage_backend: StorageBackend = env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .parse()?;

        let database_url = env::var("DATABASE_URL").ok();
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            return Err(anyhow::anyhow!(
                "DATABASE_URL environment variable is required for the postgres backend"
            ));
        }

        Ok(Config {
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            storage_backend,
            database_url,
            max_connections: env::var("MAX_CONNECTIONS")
                .unwrap_or_else(|_| DEFAULT_MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(DEFAULT_MAX_CONNECTIONS),
            redis_url: env::var("REDIS_URL").ok().filter(|u| !u.is_empty()),
            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            oracle: OracleConfig::from_env()
                .map_err(|e| anyhow::anyhow!("Failed to load oracle config: {}", e))?,
            trading: TradingConfig::from_env()
                .map_err(|e| anyhow::anyhow!("Failed to load trading config: {}", e))?,
            scheduler: SchedulerConfig::from_env()
                .map_err(|e| anyhow::anyhow!("Failed to load scheduler config: {}", e))?,
            bot: BotConfig::from_env()
                .map_err(|e| anyhow::anyhow!("Failed to load bot config: {}", e))?,
        })
    }

    /// Config for the in-memory backend with every default applied
    pub fn for_memory() -> Self {
        Self {
            environment: "test".to_string(),
            storage_backend: StorageBackend::Memory,
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            redis_url: None,
            log_format: "pretty".to_string(),
            oracle: OracleConfig::default(),
            trading: TradingConfig::default(),
            scheduler: SchedulerConfig::default(),
            bot: BotConfig::default(),
        }
    }
}
