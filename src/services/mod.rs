// Trading core services
pub mod bot_service;
pub mod counterparty_pool;
pub mod market_scheduler;
pub mod order_service;
pub mod price_oracle;
pub mod redis_lock;
pub mod settlement_scheduler;

pub use bot_service::{BotRunReport, BotService};
pub use counterparty_pool::CounterpartyPool;
pub use market_scheduler::{MarketJob, MarketScheduler};
pub use order_service::{
    CreateOrderRequest, OrderService, SettlementOutcome, SettlementTrigger,
};
pub use price_oracle::{HttpPriceOracle, PriceOracle, StaticPriceOracle};
pub use redis_lock::RedisLock;
pub use settlement_scheduler::{SettlementSweeper, SweepReport};
