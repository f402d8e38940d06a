// Shared fixtures for the integration tests
// Everything runs against the in-memory store
#![allow(dead_code)]

use chrono::Utc;
use p2p_market::config::{BotConfig, TradingConfig};
use p2p_market::database::{
    AccountRepository, CounterpartyRepository, MemoryStore, Repositories,
};
use p2p_market::models::{
    Counterparty, CounterpartySide, CounterpartyStatus, UserAccount,
};
use p2p_market::services::{
    BotService, CounterpartyPool, OrderService, SettlementSweeper, StaticPriceOracle,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub repos: Repositories,
    pub oracle: Arc<StaticPriceOracle>,
    pub pool: CounterpartyPool,
    pub orders: OrderService,
    pub sweeper: SettlementSweeper,
    pub bots: BotService,
}

impl Harness {
    pub fn new(early_probability: f64) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_test_writer()
            .try_init();

        let store = Arc::new(MemoryStore::new());
        let repos = Repositories::from_store(store.clone());
        let oracle = Arc::new(StaticPriceOracle::new(Decimal::ONE));
        let pool = CounterpartyPool::new(repos.counterparties.clone(), oracle.clone(), 4);
        let orders = OrderService::new(repos.clone(), pool.clone(), TradingConfig::default());
        let sweeper = SettlementSweeper::new(repos.orders.clone(), orders.clone(), early_probability);
        let bots = BotService::new(
            repos.clone(),
            orders.clone(),
            pool.clone(),
            BotConfig::default(),
        );

        Self {
            store,
            repos,
            oracle,
            pool,
            orders,
            sweeper,
            bots,
        }
    }

    /// A second order service over the same store, as another process would have
    pub fn second_instance(&self) -> OrderService {
        self.instance_over(self.repos.clone())
    }

    /// An order service wired to substitute repositories
    pub fn instance_over(&self, repos: Repositories) -> OrderService {
        OrderService::new(repos, self.pool.clone(), TradingConfig::default())
    }

    pub async fn add_counterparty(
        &self,
        side: CounterpartySide,
        tier: i16,
        min: i64,
        max: i64,
        price: Decimal,
    ) -> Counterparty {
        let record = counterparty(side, tier, min, max, price);
        CounterpartyRepository::insert_many(self.store.as_ref(), &[record.clone()])
            .await
            .expect("insert counterparty");
        record
    }

    pub async fn add_user(&self, tier: i16, usdt: i64, spot: i64) -> UserAccount {
        let mut account = UserAccount::new(format!("user-{}", Uuid::new_v4()), tier);
        account.usdt_balance = Decimal::from(usdt);
        account.spot_balance = Decimal::from(spot);
        AccountRepository::insert(self.store.as_ref(), &account)
            .await
            .expect("insert account");
        account
    }

    pub async fn insert_account(&self, account: &UserAccount) {
        AccountRepository::insert(self.store.as_ref(), account)
            .await
            .expect("insert account");
    }

    pub async fn account(&self, id: Uuid) -> UserAccount {
        AccountRepository::find_by_id(self.store.as_ref(), id)
            .await
            .expect("load account")
            .expect("account exists")
    }
}

pub fn counterparty(
    side: CounterpartySide,
    tier: i16,
    min: i64,
    max: i64,
    price: Decimal,
) -> Counterparty {
    Counterparty {
        id: Uuid::new_v4(),
        display_name: format!("{}-{}", side, Uuid::new_v4().simple()),
        side,
        vip_tier: tier,
        status: CounterpartyStatus::Online,
        min_limit: Decimal::from(min),
        max_limit: Decimal::from(max),
        price,
        rating: Decimal::new(48, 1),
        trade_count: 250,
        reviews: vec!["Fast release".to_string(), "Reliable".to_string()],
        updated_at: Utc::now(),
    }
}
