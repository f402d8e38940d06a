//! Synthetic liquidity: generation and the periodic status, limit and price refreshes.

use chrono::Utc;
use metrics::counter;
use rand::seq::SliceRandom;
use rand::Rng;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::constants::counterparty::{
    BUYER_PERCENT_BANDS, LIMIT_BUCKETS, MAX_LIMIT_FACTOR, MAX_TIER, MIN_TIER, RATING_RANGE,
    SELLER_PERCENT_BANDS,
};
use crate::database::{CounterpartyRepository, LimitUpdate};
use crate::error::Result;
use crate::models::{BulkUpdateReport, Counterparty, CounterpartySide, CounterpartyStatus};
use crate::services::price_oracle::PriceOracle;
use crate::utils::random::uniform_decimal;

const NAME_PREFIXES: [&str; 12] = [
    "Swift", "Crypto", "Golden", "Silver", "Blue", "Prime", "Nova", "Lucky", "Royal", "Iron",
    "Bright", "Alpha",
];

const NAME_SUFFIXES: [&str; 10] = [
    "Trader", "Exchange", "Merchant", "Desk", "Capital", "Wallet", "Market", "OTC", "Bridge",
    "Ventures",
];

const REVIEW_SNIPPETS: [&str; 8] = [
    "Fast release, smooth trade",
    "Very responsive, recommended",
    "Paid on time, no issues",
    "Good price and quick confirmation",
    "Reliable counterparty",
    "Second trade with them, still great",
    "Patient and helpful",
    "Completed within minutes",
];

/// Draws a fresh `[min, max]` band: min from a random bucket, max = min × factor
pub fn draw_limits<R: Rng + ?Sized>(rng: &mut R) -> (Decimal, Decimal) {
    let (low, high) = LIMIT_BUCKETS[rng.gen_range(0..LIMIT_BUCKETS.len())];
    let min_limit = Decimal::from(rng.gen_range(low..=high));
    let factor = uniform_decimal(rng, MAX_LIMIT_FACTOR.0, MAX_LIMIT_FACTOR.1, 2);
    let max_limit = (min_limit * factor).round_dp(2);
    (min_limit, max_limit)
}

/// Quote for one record: buyers sit below market, sellers above
pub fn quote_price<R: Rng + ?Sized>(
    rng: &mut R,
    side: CounterpartySide,
    tier: i16,
    market_price: Decimal,
    decimals: u32,
) -> Decimal {
    let index = (tier.clamp(MIN_TIER, MAX_TIER) - MIN_TIER) as usize;
    let (low, high) = match side {
        CounterpartySide::Buyer => BUYER_PERCENT_BANDS[index],
        CounterpartySide::Seller => SELLER_PERCENT_BANDS[index],
    };
    let percent = uniform_decimal(rng, low, high, 4) / Decimal::ONE_HUNDRED;
    let factor = match side {
        CounterpartySide::Buyer => Decimal::ONE - percent,
        CounterpartySide::Seller => Decimal::ONE + percent,
    };
    (market_price * factor).round_dp(decimals)
}

/// Uniform draw over every status. Sellers always move to a different one.
pub fn next_status<R: Rng + ?Sized>(
    rng: &mut R,
    side: CounterpartySide,
    current: CounterpartyStatus,
) -> CounterpartyStatus {
    let candidates: Vec<CounterpartyStatus> = match side {
        CounterpartySide::Seller if CounterpartyStatus::ALL.len() > 1 => CounterpartyStatus::ALL
            .into_iter()
            .filter(|s| *s != current)
            .collect(),
        _ => CounterpartyStatus::ALL.to_vec(),
    };
    candidates.choose(rng).copied().unwrap_or(current)
}

/// Builds `count` synthetic records quoted against `market_price`
pub fn build_records<R: Rng + ?Sized>(
    rng: &mut R,
    side: CounterpartySide,
    count: usize,
    market_price: Decimal,
    price_decimals: u32,
) -> Vec<Counterparty> {
    let now = Utc::now();

    (0..count)
        .map(|_| {
            let tier = rng.gen_range(MIN_TIER..=MAX_TIER);
            let (min_limit, max_limit) = draw_limits(rng);
            let display_name = format!(
                "{}{}{}",
                NAME_PREFIXES.choose(rng).copied().unwrap_or("P2P"),
                NAME_SUFFIXES.choose(rng).copied().unwrap_or("Trader"),
                rng.gen_range(10..1000)
            );
            let reviews = REVIEW_SNIPPETS
                .choose_multiple(rng, 2)
                .map(|s| s.to_string())
                .collect();

            Counterparty {
                id: Uuid::new_v4(),
                display_name,
                side,
                vip_tier: tier,
                status: *CounterpartyStatus::ALL
                    .choose(rng)
                    .unwrap_or(&CounterpartyStatus::Online),
                min_limit,
                max_limit,
                price: quote_price(rng, side, tier, market_price, price_decimals),
                rating: uniform_decimal(rng, RATING_RANGE.0, RATING_RANGE.1, 2),
                trade_count: rng.gen_range(20..=5000),
                reviews,
                updated_at: now,
            }
        })
        .collect()
}

#[derive(Clone)]
pub struct CounterpartyPool {
    repo: Arc<dyn CounterpartyRepository>,
    oracle: Arc<dyn PriceOracle>,
    price_decimals: u32,
}

impl CounterpartyPool {
    pub fn new(
        repo: Arc<dyn CounterpartyRepository>,
        oracle: Arc<dyn PriceOracle>,
        price_decimals: u32,
    ) -> Self {
        Self {
            repo,
            oracle,
            price_decimals,
        }
    }

    /// Generates `count` records priced off the current oracle quote. Nothing is persisted.
    pub async fn generate(&self, side: CounterpartySide, count: usize) -> Result<Vec<Counterparty>> {
        let market_price = self.oracle.current_market_price().await?;
        let mut rng = rand::thread_rng();
        Ok(build_records(
            &mut rng,
            side,
            count,
            market_price,
            self.price_decimals,
        ))
    }

    /// Seeds `per_side` buyers and sellers when that side has no records yet
    #[instrument(skip(self))]
    pub async fn seed_if_empty(&self, per_side: usize) -> Result<usize> {
        let mut inserted = 0;

        for side in [CounterpartySide::Buyer, CounterpartySide::Seller] {
            if self.repo.count(side).await? > 0 {
                debug!("Counterparty pool already has {} records", side);
                continue;
            }
            let records = self.generate(side, per_side).await?;
            inserted += self.repo.insert_many(&records).await?;
        }

        if inserted > 0 {
            info!("🌱 Seeded {} synthetic counterparties", inserted);
        }
        Ok(inserted)
    }

    /// New limit band for every record of both sides
    #[instrument(skip(self))]
    pub async fn refresh_limits(&self) -> Result<BulkUpdateReport> {
        let mut report = BulkUpdateReport::default();

        for side in [CounterpartySide::Buyer, CounterpartySide::Seller] {
            let records = self.repo.list_all(side).await?;
            let updates: Vec<LimitUpdate> = {
                let mut rng = rand::thread_rng();
                records
                    .iter()
                    .map(|record| {
                        let (min_limit, max_limit) = draw_limits(&mut rng);
                        LimitUpdate {
                            id: record.id,
                            min_limit,
                            max_limit,
                        }
                    })
                    .collect()
            };

            let side_report = self.repo.bulk_update_limits(&updates).await?;
            merge(&mut report, side_report);
        }

        log_report("limits", &report);
        Ok(report)
    }

    /// Re-quotes every record of `side` against the current market price.
    /// An oracle failure aborts the refresh and leaves the previous prices in place.
    #[instrument(skip(self))]
    pub async fn refresh_prices(&self, side: CounterpartySide) -> Result<BulkUpdateReport> {
        let market_price = match self.oracle.current_market_price().await {
            Ok(price) => price,
            Err(e) => {
                counter!("p2p_counterparty_refresh_failures_total", "job" => "prices").increment(1);
                warn!("Price refresh for {}s aborted: {}", side, e);
                return Err(e);
            }
        };

        let records = self.repo.list_all(side).await?;
        let updates: Vec<(Uuid, Decimal)> = {
            let mut rng = rand::thread_rng();
            records
                .iter()
                .map(|record| {
                    (
                        record.id,
                        quote_price(
                            &mut rng,
                            side,
                            record.vip_tier,
                            market_price,
                            self.price_decimals,
                        ),
                    )
                })
                .collect()
        };

        let report = self.repo.bulk_update_price(&updates).await?;
        log_report("prices", &report);
        Ok(report)
    }

    /// Independent status reassignment for every record
    #[instrument(skip(self))]
    pub async fn refresh_statuses(&self) -> Result<BulkUpdateReport> {
        let mut report = BulkUpdateReport::default();

        for side in [CounterpartySide::Buyer, CounterpartySide::Seller] {
            let records = self.repo.list_all(side).await?;
            let updates: Vec<(Uuid, CounterpartyStatus)> = {
                let mut rng = rand::thread_rng();
                records
                    .iter()
                    .map(|record| (record.id, next_status(&mut rng, side, record.status)))
                    .collect()
            };

            let side_report = self.repo.bulk_update_status(&updates).await?;
            merge(&mut report, side_report);
        }

        log_report("statuses", &report);
        Ok(report)
    }

    /// `None` means no liquidity for this tier and amount
    pub async fn find_match(
        &self,
        side: CounterpartySide,
        tier: i16,
        amount: Decimal,
    ) -> Result<Option<Counterparty>> {
        self.repo.find_match(side, tier, amount).await
    }
}

fn merge(into: &mut BulkUpdateReport, other: BulkUpdateReport) {
    into.updated += other.updated;
    into.failed.extend(other.failed);
}

fn log_report(job: &'static str, report: &BulkUpdateReport) {
    if report.failed.is_empty() {
        info!("🔄 Refreshed counterparty {} ({} records)", job, report.updated);
        return;
    }
    counter!("p2p_counterparty_refresh_failures_total", "job" => job)
        .increment(report.failed.len() as u64);
    for (id, reason) in &report.failed {
        warn!("Counterparty {} {} refresh failed: {}", id, job, reason);
    }
    info!(
        "🔄 Refreshed counterparty {} ({} updated, {} failed)",
        job,
        report.updated,
        report.failed.len()
    );
}
