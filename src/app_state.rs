//! Shared handles to every trading service.

use std::sync::Arc;

use crate::config::Config;
use crate::database::Repositories;
use crate::services::{
    BotService, CounterpartyPool, MarketScheduler, OrderService, PriceOracle, SettlementSweeper,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Order, counterparty and account stores
    pub repos: Repositories,
    pub oracle: Arc<dyn PriceOracle>,
    pub counterparty_pool: CounterpartyPool,
    pub order_service: OrderService,
    pub settlement_sweeper: SettlementSweeper,
    pub bot_service: BotService,
    /// Hosts the periodic jobs; started separately from construction
    pub scheduler: Arc<MarketScheduler>,
}
