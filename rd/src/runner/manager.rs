//! PacketRunner - owner loop for a single packet
//!
//! The runner is responsible for:
//! - Registering strategies with the dashboard
//! - Spawning ready workers as tokio tasks
//! - Draining replies as they are released
//! - Escalating from soft timeouts to the hard deadline
//! - Canceling and reaping workers once every request is answered

use std::sync::Arc;

use eyre::{Context, Result};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::dashboard::{
    Dashboard, DashboardConfig, DashboardStats, MajorEvents, ReadyWorker, Strategy, TimeoutMode, WorkerContext,
};
use crate::domain::{PacketId, Reply};

/// What the owner loop observed while running a packet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunnerStats {
    pub workers_started: u64,
    pub soft_timeouts: u32,
    pub hard_timeout: bool,
    pub workers_aborted: usize,
    pub elapsed_ms: u64,
}

/// Every reply for a packet, in release order
#[derive(Debug, Clone, Serialize)]
pub struct PacketOutcome {
    #[serde(rename = "packet-id")]
    pub packet_id: PacketId,
    pub replies: Vec<Reply>,
    pub runner: RunnerStats,
    pub dashboard: DashboardStats,
}

/// Runs packets against a fixed set of strategies
pub struct PacketRunner {
    config: DashboardConfig,
    strategies: Vec<(Arc<dyn Strategy>, u32)>,
}

impl PacketRunner {
    pub fn new(config: DashboardConfig) -> Self {
        debug!(?config, "PacketRunner::new: called");
        Self {
            config,
            strategies: Vec::new(),
        }
    }

    /// Add a strategy with its retry budget
    pub fn with_strategy(mut self, strategy: Arc<dyn Strategy>, max_tries: u32) -> Self {
        debug!(strategy = %strategy.name(), max_tries, "PacketRunner::with_strategy: called");
        self.strategies.push((strategy, max_tries));
        self
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    /// Answer every identifier, returning once the last reply is released
    pub async fn run<I, S>(&self, identifiers: I) -> Result<PacketOutcome>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let started_at = Instant::now();
        let dashboard = Arc::new(Dashboard::new(self.config.clone(), identifiers));
        let packet_id = dashboard.packet_id().clone();
        info!(%packet_id, strategies = self.strategies.len(), "PacketRunner starting");

        dashboard
            .use_strategies(self.strategies.iter().cloned())
            .await
            .context("Failed to register strategies")?;

        let hard_deadline = started_at + self.config.hard_timeout();
        let mut stats = RunnerStats::default();
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        let mut replies = Vec::new();

        loop {
            for ready in dashboard.get_ready_workers().await {
                stats.workers_started += 1;
                tasks.push(spawn_worker(&dashboard, ready));
            }

            let remaining = hard_deadline.saturating_duration_since(Instant::now());
            let (wait, mode) = if remaining <= self.config.soft_timeout() {
                (remaining, TimeoutMode::Hard)
            } else {
                (self.config.soft_timeout(), TimeoutMode::Soft)
            };

            let events = dashboard.wait_for_major_event(wait, mode).await;
            debug!(%packet_id, %events, ?mode, "PacketRunner::run: major event");

            if events.contains(MajorEvents::TIMEOUT) {
                match mode {
                    TimeoutMode::Soft => stats.soft_timeouts += 1,
                    TimeoutMode::Hard => stats.hard_timeout = true,
                }
            }
            if events.contains(MajorEvents::REPLY_AVAILABLE) {
                let released = dashboard.get_available_replies().await;
                debug!(%packet_id, count = released.len(), "PacketRunner::run: replies drained");
                replies.extend(released);
            }
            if events.contains(MajorEvents::FULLY_REPLIED) {
                break;
            }

            tasks.retain(|t| !t.is_finished());
        }

        let canceled = dashboard.cancel_live_workers().await;
        stats.workers_aborted = self.reap(tasks).await;
        stats.elapsed_ms = started_at.elapsed().as_millis() as u64;

        info!(
            %packet_id,
            replies = replies.len(),
            workers_started = stats.workers_started,
            canceled,
            hard_timeout = stats.hard_timeout,
            elapsed_ms = stats.elapsed_ms,
            "PacketRunner finished"
        );

        Ok(PacketOutcome {
            packet_id,
            replies,
            runner: stats,
            dashboard: dashboard.stats().await,
        })
    }

    /// Give canceled workers the grace period, then abort what is left
    async fn reap(&self, mut tasks: Vec<JoinHandle<()>>) -> usize {
        tasks.retain(|t| !t.is_finished());
        if tasks.is_empty() {
            return 0;
        }

        let grace = self.config.shutdown_grace();
        debug!(count = tasks.len(), ?grace, "PacketRunner::reap: waiting for workers");
        if tokio::time::timeout(grace, futures::future::join_all(tasks.iter_mut()))
            .await
            .is_ok()
        {
            return 0;
        }

        let mut aborted = 0;
        for task in &tasks {
            if !task.is_finished() {
                task.abort();
                aborted += 1;
            }
        }
        warn!(aborted, "Workers did not exit within the shutdown grace period");
        aborted
    }
}

/// Start a worker; it is always marked done when `run` returns
fn spawn_worker(dashboard: &Arc<Dashboard>, ready: ReadyWorker) -> JoinHandle<()> {
    let ctx = WorkerContext::new(dashboard.clone(), ready.id);
    tokio::spawn(async move {
        debug!(worker_id = %ready.id, strategy = %ready.strategy, "Worker starting");
        if let Err(e) = ready.worker.run(ctx.clone()).await {
            warn!(worker_id = %ready.id, strategy = %ready.strategy, "Worker failed: {:#}", e);
        }
        if let Err(e) = ctx.done().await {
            debug!(worker_id = %ready.id, "Worker completion not recorded: {}", e);
        }
    })
}
