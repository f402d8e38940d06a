//! Sweep entry points that drive pending orders to settlement.
//!
//! Both sweeps funnel into `OrderService::settle_order`; a failure on one
//! order is logged and the sweep moves on to the next.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::database::OrderRepository;
use crate::error::Result;
use crate::models::Order;
use crate::services::order_service::{OrderService, SettlementOutcome, SettlementTrigger};
use crate::utils::random::chance;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Orders the sweep selected for an attempt
    pub attempted: usize,
    pub settled: usize,
    /// Already terminal, or left pending for lack of balance
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct SettlementSweeper {
    orders: Arc<dyn OrderRepository>,
    order_service: OrderService,
    early_probability: f64,
}

impl SettlementSweeper {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        order_service: OrderService,
        early_probability: f64,
    ) -> Self {
        Self {
            orders,
            order_service,
            early_probability,
        }
    }

    pub async fn run_expiry_sweep(&self) -> Result<SweepReport> {
        self.run_expiry_sweep_at(Utc::now()).await
    }

    /// Settles every pending order whose auto-complete deadline has passed
    pub async fn run_expiry_sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let due = self.orders.find_pending_with_expiry_before(now).await?;
        if due.is_empty() {
            return Ok(SweepReport::default());
        }

        let report = self.settle_all(due, SettlementTrigger::Expiry, now).await;
        info!(
            "⏰ Expiry sweep: {} settled, {} skipped, {} failed",
            report.settled, report.skipped, report.failed
        );

        let pruned = self.order_service.prune_locks();
        if pruned > 0 {
            debug!("Pruned {} idle settlement locks", pruned);
        }
        Ok(report)
    }

    pub async fn run_early_completion_sweep(&self) -> Result<SweepReport> {
        self.run_early_completion_sweep_at(Utc::now()).await
    }

    /// Settles each not-yet-due pending order with the configured probability
    pub async fn run_early_completion_sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let candidates = self.orders.find_pending_expiring_after(now).await?;

        let selected: Vec<Order> = {
            let mut rng = rand::thread_rng();
            candidates
                .into_iter()
                .filter(|_| chance(&mut rng, self.early_probability))
                .collect()
        };
        if selected.is_empty() {
            return Ok(SweepReport::default());
        }

        let report = self.settle_all(selected, SettlementTrigger::Early, now).await;
        info!(
            "🎲 Early completion sweep: {} settled, {} skipped, {} failed",
            report.settled, report.skipped, report.failed
        );
        Ok(report)
    }

    async fn settle_all(
        &self,
        orders: Vec<Order>,
        trigger: SettlementTrigger,
        now: DateTime<Utc>,
    ) -> SweepReport {
        let mut report = SweepReport::default();

        for order in orders {
            report.attempted += 1;
            match self
                .order_service
                .settle_order_at(order.id, trigger, now)
                .await
            {
                Ok(SettlementOutcome::Settled(_)) => report.settled += 1,
                Ok(_) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    error!("Settlement of order {} failed: {}", order.id, e);
                }
            }
        }

        report
    }
}
