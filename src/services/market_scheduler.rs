use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::models::CounterpartySide;
use crate::services::bot_service::BotService;
use crate::services::counterparty_pool::CounterpartyPool;
use crate::services::redis_lock::RedisLock;
use crate::services::settlement_scheduler::SettlementSweeper;

/// Periodic jobs hosted by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketJob {
    ExpirySweep,
    EarlyCompletion,
    StatusRefresh,
    LimitRefresh,
    PriceRefresh,
    OrderBots,
    ProfitBots,
}

impl MarketJob {
    pub const ALL: [MarketJob; 7] = [
        MarketJob::ExpirySweep,
        MarketJob::EarlyCompletion,
        MarketJob::StatusRefresh,
        MarketJob::LimitRefresh,
        MarketJob::PriceRefresh,
        MarketJob::OrderBots,
        MarketJob::ProfitBots,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ExpirySweep => "expiry_sweep",
            Self::EarlyCompletion => "early_completion",
            Self::StatusRefresh => "status_refresh",
            Self::LimitRefresh => "limit_refresh",
            Self::PriceRefresh => "price_refresh",
            Self::OrderBots => "order_bots",
            Self::ProfitBots => "profit_bots",
        }
    }

    pub fn period(&self, config: &SchedulerConfig) -> Duration {
        let secs = match self {
            Self::ExpirySweep => config.expiry_sweep_interval_secs,
            Self::EarlyCompletion => config.early_completion_interval_secs,
            Self::StatusRefresh => config.status_refresh_interval_secs,
            Self::LimitRefresh => config.limit_refresh_interval_secs,
            Self::PriceRefresh => config.price_refresh_interval_secs,
            Self::OrderBots | Self::ProfitBots => config.bot_interval_secs,
        };
        Duration::from_secs(secs.max(1))
    }
}

/// Everything a job tick needs, cloned into each task
#[derive(Clone)]
struct JobContext {
    sweeper: SettlementSweeper,
    pool: CounterpartyPool,
    bots: BotService,
    job_lock: Option<RedisLock>,
}

impl JobContext {
    async fn run(&self, job: MarketJob) {
        let lease = match &self.job_lock {
            Some(lock) => match lock.try_acquire(job.name()).await {
                Ok(Some(lease)) => Some(lease),
                Ok(None) => {
                    debug!("Skipping {} tick, another instance holds it", job.name());
                    return;
                }
                Err(e) => {
                    warn!("Job lock for {} unavailable, running unlocked: {}", job.name(), e);
                    None
                }
            },
            None => None,
        };

        self.dispatch(job).await;

        if let (Some(lock), Some(lease)) = (&self.job_lock, lease) {
            if let Err(e) = lock.release(&lease).await {
                warn!("Failed to release job lock for {}: {}", job.name(), e);
            }
        }
    }

    async fn dispatch(&self, job: MarketJob) {
        let outcome = match job {
            MarketJob::ExpirySweep => self.sweeper.run_expiry_sweep().await.map(|_| ()),
            MarketJob::EarlyCompletion => {
                self.sweeper.run_early_completion_sweep().await.map(|_| ())
            }
            MarketJob::StatusRefresh => self.pool.refresh_statuses().await.map(|_| ()),
            MarketJob::LimitRefresh => self.pool.refresh_limits().await.map(|_| ()),
            MarketJob::PriceRefresh => {
                // Each side aborts independently when the oracle fails
                for side in [CounterpartySide::Buyer, CounterpartySide::Seller] {
                    if let Err(e) = self.pool.refresh_prices(side).await {
                        error!("Price refresh for {}s failed: {}", side, e);
                    }
                }
                Ok(())
            }
            MarketJob::OrderBots => self.bots.run_order_bots().await.map(|_| ()),
            MarketJob::ProfitBots => self.bots.run_profit_bots().await.map(|_| ()),
        };

        if let Err(e) = outcome {
            error!("Error during {} tick: {}", job.name(), e);
        }
    }
}

pub struct MarketScheduler {
    context: JobContext,
    config: SchedulerConfig,
    is_running: Arc<AtomicBool>,
    shutdown_sender: broadcast::Sender<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl MarketScheduler {
    pub fn new(
        sweeper: SettlementSweeper,
        pool: CounterpartyPool,
        bots: BotService,
        config: SchedulerConfig,
        job_lock: Option<RedisLock>,
    ) -> Self {
        let (shutdown_sender, _) = broadcast::channel(1);

        Self {
            context: JobContext {
                sweeper,
                pool,
                bots,
                job_lock,
            },
            config,
            is_running: Arc::new(AtomicBool::new(false)),
            shutdown_sender,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    /// Spawns one task per job
    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            info!("Market scheduler is disabled");
            return Ok(());
        }
        if self.is_running.swap(true, Ordering::SeqCst) {
            warn!("Market scheduler is already running");
            return Ok(());
        }

        info!("Starting market scheduler with configuration: {:?}", self.config);

        let mut handles = self.handles.lock().await;
        for job in MarketJob::ALL {
            let period = job.period(&self.config);
            let context = self.context.clone();
            let is_running = self.is_running.clone();
            let mut shutdown = self.shutdown_sender.subscribe();

            handles.push(tokio::spawn(async move {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if !is_running.load(Ordering::Relaxed) {
                                break;
                            }
                            context.run(job).await;
                        }
                        _ = shutdown.recv() => {
                            break;
                        }
                    }
                }

                debug!("Job {} stopped", job.name());
            }));
            info!("⏱️ Scheduled {} every {:?}", job.name(), period);
        }

        info!("Market scheduler started successfully");
        Ok(())
    }

    /// Signals every job and waits for in-flight ticks to finish
    pub async fn stop(&self) -> Result<()> {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Stopping market scheduler...");

        let _ = self.shutdown_sender.send(());

        let handles: Vec<JoinHandle<()>> = self.handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Scheduler task ended abnormally: {}", e);
            }
        }

        info!("Market scheduler stopped");
        Ok(())
    }

    /// Runs one job immediately on the current task
    pub async fn run_once(&self, job: MarketJob) {
        self.context.run(job).await;
    }
}
