//! Worker and strategy contracts, plus the records the dashboard keeps for them

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::debug;

use crate::domain::{Event, EventPattern, RequestId, ResultMask, StrategyId, WorkerId};

use super::context::WorkerContext;
use super::core::Dashboard;

/// Lifecycle of a worker, and of the strategy that spawns it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Progress {
    /// Cannot start yet
    Unready,
    /// May be started
    Ready,
    /// An attempt is in flight
    Running,
    /// No further attempts
    Done,
}

/// One attempt by a retrieval strategy to answer part of a packet
///
/// `cancel`, `clone_unstarted` and `progress` are called with the dashboard
/// lock held and must not block.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Do the retrieval work, reporting through `ctx`
    async fn run(&self, ctx: WorkerContext) -> eyre::Result<()>;

    /// Ask the worker to stop producing events; cooperative
    fn cancel(&self);

    /// A fresh, not-yet-started copy used for a retry
    fn clone_unstarted(&self) -> Arc<dyn Worker>;

    fn progress(&self) -> Progress;
}

/// A source of workers with its own identity
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    /// Factory for the first worker; retries are cloned from it
    fn new_worker(&self, dashboard: &Dashboard) -> Arc<dyn Worker>;

    /// Forecasts known before any worker runs, applied to every try
    fn forecasts(&self, _requests: &[(RequestId, String)]) -> Vec<(RequestId, ResultMask)> {
        Vec::new()
    }
}

/// Result of a worker's rendezvous wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Another worker delivered a matching event
    Matched(Event),
    /// The pattern can no longer be satisfied
    Unsatisfiable,
    /// The caller's timeout elapsed first
    TimedOut,
}

/// A worker handed to the owner to be started
#[derive(Clone)]
pub struct ReadyWorker {
    pub id: WorkerId,
    pub strategy: String,
    pub worker: Arc<dyn Worker>,
}

impl std::fmt::Debug for ReadyWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadyWorker")
            .field("id", &self.id)
            .field("strategy", &self.strategy)
            .finish()
    }
}

/// A parked rendezvous: the pattern plus the one-shot used to wake it
pub(crate) struct Waiter {
    pub pattern: EventPattern,
    tx: oneshot::Sender<WaitOutcome>,
}

impl Waiter {
    pub fn new(pattern: EventPattern, tx: oneshot::Sender<WaitOutcome>) -> Self {
        Self { pattern, tx }
    }
}

pub(crate) struct WorkerRecord {
    pub id: WorkerId,
    pub strategy_id: StrategyId,
    pub worker: Arc<dyn Worker>,
    pub started: bool,
    pub done: bool,
    pub canceled: bool,
    pub waiting_for: Option<Waiter>,
}

impl WorkerRecord {
    pub fn new(id: WorkerId, strategy_id: StrategyId, worker: Arc<dyn Worker>) -> Self {
        Self {
            id,
            strategy_id,
            worker,
            started: false,
            done: false,
            canceled: false,
            waiting_for: None,
        }
    }

    /// Wake a parked rendezvous; the waiter is taken out before it is fired
    pub fn wake(&mut self, outcome: WaitOutcome) -> bool {
        match self.waiting_for.take() {
            Some(waiter) => {
                debug!(worker_id = %self.id, ?outcome, "WorkerRecord::wake: waking rendezvous");
                let _ = waiter.tx.send(outcome);
                true
            }
            None => false,
        }
    }
}

pub(crate) struct StrategyRecord {
    pub id: StrategyId,
    pub name: String,
    pub progress: Progress,
    /// Template every retry is cloned from
    pub first_worker: WorkerId,
    /// The registered, not-yet-started worker for the next try
    pub pending: Option<WorkerId>,
    pub tries_available: u32,
    pub tries_used: u32,
    /// Forecasts supplied before the first worker started; inherited by clones
    pub prestart_forecasts: HashMap<RequestId, ResultMask>,
}

impl StrategyRecord {
    pub fn new(id: StrategyId, name: impl Into<String>, first_worker: WorkerId, tries_available: u32) -> Self {
        Self {
            id,
            name: name.into(),
            progress: Progress::Ready,
            first_worker,
            pending: Some(first_worker),
            tries_available,
            tries_used: 0,
            prestart_forecasts: HashMap::new(),
        }
    }

    pub fn has_budget(&self) -> bool {
        self.tries_used < self.tries_available
    }

    pub fn has_started(&self) -> bool {
        self.tries_used > 0
    }

    /// Account for one handed-out try
    pub fn consume_try(&mut self) {
        self.tries_used += 1;
        self.progress = if self.has_budget() {
            Progress::Running
        } else {
            Progress::Done
        };
        debug!(
            strategy = %self.name,
            tries_used = self.tries_used,
            tries_available = self.tries_available,
            progress = ?self.progress,
            "StrategyRecord::consume_try"
        );
    }

    /// True when the owner may start the pending worker now
    pub fn is_ready(&self) -> bool {
        self.progress == Progress::Ready && self.has_budget() && self.pending.is_some()
    }

    /// Intersect a prestart forecast into the template
    pub fn record_prestart(&mut self, request_id: RequestId, mask: ResultMask) -> ResultMask {
        let entry = self.prestart_forecasts.entry(request_id).or_insert(ResultMask::ANY);
        *entry = *entry & mask;
        *entry
    }

    pub fn prestart_forecast(&self, request_id: RequestId) -> ResultMask {
        self.prestart_forecasts
            .get(&request_id)
            .copied()
            .unwrap_or(ResultMask::ANY)
    }
}
