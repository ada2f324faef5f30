//! Dashboard implementation
//!
//! One `Dashboard` owns every record for one packet. Workers call the
//! ingestion methods concurrently; the packet owner drains replies and starts
//! workers. All record state sits behind a single lock; critical sections
//! never await anything else. The owner sleeps on a `Notify`, whose stored
//! permit behaves like a capacity-1 semaphore, and each worker rendezvous gets
//! its own one-shot channel.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Notify, RwLock, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::domain::{
    Delivered, Event, EventKind, EventPattern, MainReply, PacketId, Reply, RequestId, ResultMask, StrategyId,
    WorkerId,
};

use super::config::DashboardConfig;
use super::error::{DashboardError, DashboardResult};
use super::major::{MajorEvents, TimeoutMode};
use super::request::{RequestRecord, RequestState};
use super::worker::{
    Progress, ReadyWorker, Strategy, StrategyRecord, WaitOutcome, Waiter, Worker, WorkerRecord,
};

/// Counters for observability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub workers_registered: u64,
    pub workers_started: u64,
    pub events_accepted: u64,
    pub main_replacements: u64,
    pub forecasts_narrowed: u64,
    pub synonyms_learned: u64,
    pub replies_sent: u64,
    pub rendezvous_wakeups: u64,
    pub dropped_after_cancel: u64,
    pub soft_timeouts: u64,
    pub hard_timeouts: u64,
}

/// Point-in-time view of a strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategySnapshot {
    pub name: String,
    pub progress: Progress,
    pub first_worker: WorkerId,
    pub tries_used: u32,
    pub tries_available: u32,
}

/// State protected by the dashboard lock
struct DashboardInner {
    strict_order: bool,
    /// Indexed by `RequestId`, in submission order
    requests: Vec<RequestRecord>,
    /// Indexed by `WorkerId`
    workers: Vec<WorkerRecord>,
    /// Indexed by `StrategyId`
    strategies: Vec<StrategyRecord>,
    /// Requests ready to be drained by the owner
    ready: VecDeque<RequestId>,
    /// Requests not yet sent
    unsent: usize,
    /// First request not yet released (strict order)
    next_unreleased: usize,
    hard_timed_out: bool,
    stats: DashboardStats,
}

impl DashboardInner {
    fn request(&self, id: RequestId) -> DashboardResult<&RequestRecord> {
        self.requests.get(id.index()).ok_or(DashboardError::UnknownRequest(id))
    }

    fn request_mut(&mut self, id: RequestId) -> DashboardResult<&mut RequestRecord> {
        self.requests
            .get_mut(id.index())
            .ok_or(DashboardError::UnknownRequest(id))
    }

    fn worker(&self, id: WorkerId) -> DashboardResult<&WorkerRecord> {
        self.workers.get(id.index()).ok_or(DashboardError::UnknownWorker(id))
    }

    fn worker_mut(&mut self, id: WorkerId) -> DashboardResult<&mut WorkerRecord> {
        self.workers.get_mut(id.index()).ok_or(DashboardError::UnknownWorker(id))
    }

    /// A worker that may still report: known and not marked done
    fn live_worker(&self, id: WorkerId) -> DashboardResult<&WorkerRecord> {
        let worker = self.worker(id)?;
        if worker.done {
            return Err(DashboardError::WorkerAlreadyDone(id));
        }
        Ok(worker)
    }

    fn strategy_name(&self, worker_id: WorkerId) -> String {
        self.workers
            .get(worker_id.index())
            .and_then(|w| self.strategies.get(w.strategy_id.index()))
            .map(|s| s.name.clone())
            .unwrap_or_default()
    }

    fn check_not_registered(&self, worker: &Arc<dyn Worker>) -> DashboardResult<()> {
        match self.workers.iter().find(|w| Arc::ptr_eq(&w.worker, worker)) {
            Some(existing) => Err(DashboardError::DuplicateWorker(existing.id)),
            None => Ok(()),
        }
    }

    /// Append a worker record and give it a forecast slot on every request
    fn register(&mut self, strategy_id: StrategyId, worker: Arc<dyn Worker>) -> DashboardResult<WorkerId> {
        self.check_not_registered(&worker)?;
        let strategy = self
            .strategies
            .get(strategy_id.index())
            .ok_or(DashboardError::UnknownStrategy(strategy_id))?;

        let id = WorkerId::new(self.workers.len());
        for request in &mut self.requests {
            request.push_worker(strategy.prestart_forecast(request.id));
        }
        self.workers.push(WorkerRecord::new(id, strategy_id, worker));
        self.stats.workers_registered += 1;
        debug!(worker_id = %id, strategy = %strategy.name, "DashboardInner::register: worker registered");
        Ok(id)
    }

    /// Queue a request whose answer can no longer change; true if anything was released
    fn queue_if_newly_complete(&mut self, id: RequestId) -> bool {
        let strict_order = self.strict_order;
        let Some(request) = self.requests.get_mut(id.index()) else {
            return false;
        };
        if request.state != RequestState::Incomplete || request.is_still_incomplete() {
            return false;
        }

        if !strict_order {
            debug!(request_id = %id, "DashboardInner::queue_if_newly_complete: queued");
            request.advance(RequestState::Queued);
            self.ready.push_back(id);
            return true;
        }

        debug!(request_id = %id, "DashboardInner::queue_if_newly_complete: queueable");
        request.advance(RequestState::Queueable);
        self.release_prefix()
    }

    /// Release the contiguous run of queueable requests at the front
    fn release_prefix(&mut self) -> bool {
        let mut released = false;
        while let Some(request) = self.requests.get_mut(self.next_unreleased) {
            match request.state {
                RequestState::Incomplete => break,
                RequestState::Queueable => {
                    debug!(request_id = %request.id, "DashboardInner::release_prefix: released in order");
                    request.advance(RequestState::Queued);
                    self.ready.push_back(request.id);
                    released = true;
                }
                RequestState::Queued | RequestState::Sent => {}
            }
            self.next_unreleased += 1;
        }
        released
    }

    fn reevaluate(&mut self, ids: Vec<RequestId>) -> bool {
        let mut released = false;
        for id in ids {
            released |= self.queue_if_newly_complete(id);
        }
        released
    }

    /// Drop one worker's forecasts everywhere; returns the incomplete requests it touched
    fn clear_worker_forecasts(&mut self, worker_id: WorkerId) -> Vec<RequestId> {
        self.requests
            .iter_mut()
            .filter_map(|r| (r.clear_worker(worker_id) && r.state == RequestState::Incomplete).then_some(r.id))
            .collect()
    }

    fn pattern_unsatisfiable(&self, worker_id: WorkerId, pattern: &EventPattern) -> bool {
        match self.requests.get(pattern.request_id.index()) {
            None => true,
            Some(request) => {
                request.state.is_complete() || !request.summary_excluding(worker_id).intersects(pattern.kinds)
            }
        }
    }

    /// Wake parked rendezvous that `event` satisfies, or that can no longer be satisfied
    fn wake_waiters(&mut self, event: Option<&Event>) {
        let wakes: Vec<(usize, WaitOutcome)> = self
            .workers
            .iter()
            .filter_map(|w| {
                let waiter = w.waiting_for.as_ref()?;
                match event {
                    Some(ev) if ev.worker_id != w.id && waiter.pattern.matches(ev) => {
                        Some((w.id.index(), WaitOutcome::Matched(*ev)))
                    }
                    _ if self.pattern_unsatisfiable(w.id, &waiter.pattern) => {
                        Some((w.id.index(), WaitOutcome::Unsatisfiable))
                    }
                    _ => None,
                }
            })
            .collect();

        for (index, outcome) in wakes {
            if self.workers[index].wake(outcome) {
                self.stats.rendezvous_wakeups += 1;
            }
        }
    }

    fn strategy_ready(&self, strategy: &StrategyRecord) -> bool {
        if strategy.is_ready() {
            return true;
        }
        strategy.progress == Progress::Unready
            && strategy.has_budget()
            && strategy
                .pending
                .and_then(|p| self.workers.get(p.index()))
                .is_some_and(|w| w.worker.progress() != Progress::Unready)
    }

    fn promote_unready(&mut self) {
        let promote: Vec<usize> = self
            .strategies
            .iter()
            .filter(|s| s.progress == Progress::Unready && self.strategy_ready(s))
            .map(|s| s.id.index())
            .collect();
        for index in promote {
            debug!(strategy = %self.strategies[index].name, "DashboardInner::promote_unready: ready");
            self.strategies[index].progress = Progress::Ready;
        }
    }

    /// Hand out the pending worker of a ready strategy and line up its successor
    fn take_ready_worker(&mut self, strategy_id: StrategyId) -> DashboardResult<Option<ReadyWorker>> {
        let strategy = self
            .strategies
            .get_mut(strategy_id.index())
            .ok_or(DashboardError::UnknownStrategy(strategy_id))?;
        if !strategy.is_ready() {
            return Ok(None);
        }
        let Some(worker_id) = strategy.pending.take() else {
            return Ok(None);
        };
        strategy.consume_try();
        let needs_successor = strategy.has_budget();
        let name = strategy.name.clone();

        let record = self.worker_mut(worker_id)?;
        record.started = true;
        let worker = record.worker.clone();
        self.stats.workers_started += 1;

        if needs_successor {
            let successor = self.register(strategy_id, worker.clone_unstarted())?;
            self.strategies[strategy_id.index()].pending = Some(successor);
        }

        debug!(%worker_id, strategy = %name, "DashboardInner::take_ready_worker: handed out");
        Ok(Some(ReadyWorker {
            id: worker_id,
            strategy: name,
            worker,
        }))
    }

    fn major_events(&self) -> MajorEvents {
        let mut events = MajorEvents::NONE;
        if !self.ready.is_empty() {
            events |= MajorEvents::REPLY_AVAILABLE;
        }
        if !self.hard_timed_out && self.strategies.iter().any(|s| self.strategy_ready(s)) {
            events |= MajorEvents::WORKER_READY;
        }
        if self.unsent == 0 {
            events |= MajorEvents::FULLY_REPLIED;
        }
        events
    }

    fn apply_soft_timeout(&mut self) {
        self.stats.soft_timeouts += 1;
        for strategy in &mut self.strategies {
            if strategy.progress == Progress::Running && strategy.has_budget() {
                debug!(strategy = %strategy.name, "DashboardInner::apply_soft_timeout: ready for retry");
                strategy.progress = Progress::Ready;
            }
        }
    }

    /// Cancel everything and release every open request; returns the workers to cancel
    fn apply_hard_timeout(&mut self) -> Vec<Arc<dyn Worker>> {
        self.stats.hard_timeouts += 1;
        self.hard_timed_out = true;

        for strategy in &mut self.strategies {
            strategy.progress = Progress::Done;
            strategy.pending = None;
        }

        let mut cancels = Vec::new();
        for worker in &mut self.workers {
            if worker.done || worker.canceled {
                continue;
            }
            worker.canceled = true;
            if !worker.started {
                worker.done = true;
            }
            worker.wake(WaitOutcome::Unsatisfiable);
            cancels.push(worker.worker.clone());
        }

        for request in &mut self.requests {
            if request.state < RequestState::Queued {
                debug!(request_id = %request.id, "DashboardInner::apply_hard_timeout: forced release");
                request.advance(RequestState::Queued);
                self.ready.push_back(request.id);
            }
        }
        self.next_unreleased = self.requests.len();
        cancels
    }

    fn delivered(&self, event: Event, payload: &Value) -> Delivered {
        Delivered {
            kind: event.kind,
            worker_id: event.worker_id,
            strategy: self.strategy_name(event.worker_id),
            payload: payload.clone(),
        }
    }

    fn build_reply(&self, request: &RequestRecord) -> Reply {
        let main = match &request.main {
            Some(held) => MainReply::Delivered(self.delivered(held.event, &held.payload)),
            None => MainReply::NoReply {
                tried: self
                    .strategies
                    .iter()
                    .filter(|s| s.has_started())
                    .map(|s| s.name.clone())
                    .collect(),
            },
        };
        let synonyms = if request.had_synonym_update {
            request
                .identifiers
                .iter()
                .filter(|id| **id != request.identifier)
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        Reply {
            request_id: request.id,
            identifier: request.identifier.clone(),
            main,
            supplementary: request
                .supplementary
                .iter()
                .map(|h| self.delivered(h.event, &h.payload))
                .collect(),
            synonyms,
        }
    }
}

/// Reply-aggregation coordinator for one packet
pub struct Dashboard {
    packet_id: PacketId,
    config: DashboardConfig,
    inner: RwLock<DashboardInner>,
    notify: Notify,
}

impl Dashboard {
    /// Create a dashboard for a packet of requests, one per identifier
    pub fn new<I, S>(config: DashboardConfig, identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let packet_id = PacketId::generate();
        let requests: Vec<RequestRecord> = identifiers
            .into_iter()
            .enumerate()
            .map(|(i, id)| RequestRecord::new(RequestId::new(i), id))
            .collect();
        info!(
            %packet_id,
            requests = requests.len(),
            strict_order = config.strict_order,
            "Dashboard created"
        );

        Self {
            packet_id,
            inner: RwLock::new(DashboardInner {
                strict_order: config.strict_order,
                unsent: requests.len(),
                requests,
                workers: Vec::new(),
                strategies: Vec::new(),
                ready: VecDeque::new(),
                next_unreleased: 0,
                hard_timed_out: false,
                stats: DashboardStats::default(),
            }),
            config,
            notify: Notify::new(),
        }
    }

    pub fn packet_id(&self) -> &PacketId {
        &self.packet_id
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    /// Wake the owner; a permit is stored if it is not waiting yet
    fn signal_owner(&self) {
        self.notify.notify_one();
    }

    // === Strategy and worker lifecycle ===

    /// Register a strategy with a retry budget and create its first worker
    pub async fn use_strategy(&self, strategy: Arc<dyn Strategy>, max_tries: u32) -> DashboardResult<StrategyId> {
        debug!(packet_id = %self.packet_id, strategy = %strategy.name(), max_tries, "Dashboard::use_strategy: called");
        let (strategy_id, worker_id, forecasts) = self.add_strategy(strategy, max_tries).await?;
        self.apply_prestart(worker_id, forecasts).await?;
        self.signal_owner();
        Ok(strategy_id)
    }

    /// Register several strategies before any of their forecasts apply
    ///
    /// A forecast only settles a request once every competitor has a slot,
    /// so packets answered by forecast-ahead strategies register them this way.
    pub async fn use_strategies(
        &self,
        strategies: impl IntoIterator<Item = (Arc<dyn Strategy>, u32)>,
    ) -> DashboardResult<Vec<StrategyId>> {
        debug!(packet_id = %self.packet_id, "Dashboard::use_strategies: called");
        let mut added = Vec::new();
        for (strategy, max_tries) in strategies {
            added.push(self.add_strategy(strategy, max_tries).await?);
        }

        let mut ids = Vec::with_capacity(added.len());
        for (strategy_id, worker_id, forecasts) in added {
            self.apply_prestart(worker_id, forecasts).await?;
            ids.push(strategy_id);
        }
        self.signal_owner();
        Ok(ids)
    }

    /// Create the strategy record and first worker; forecasts are returned, not applied
    async fn add_strategy(
        &self,
        strategy: Arc<dyn Strategy>,
        max_tries: u32,
    ) -> DashboardResult<(StrategyId, WorkerId, Vec<(RequestId, ResultMask)>)> {
        let name = strategy.name().to_string();
        if max_tries == 0 {
            error!(strategy = %name, "Strategy registered without tries");
            return Err(DashboardError::NoTries(name));
        }

        let worker = strategy.new_worker(self);
        let forecasts = strategy.forecasts(&self.request_list().await);

        let mut inner = self.inner.write().await;
        inner.check_not_registered(&worker)?;
        let strategy_id = StrategyId::new(inner.strategies.len());
        let worker_id = WorkerId::new(inner.workers.len());
        let mut record = StrategyRecord::new(strategy_id, name.clone(), worker_id, max_tries);
        if worker.progress() == Progress::Unready {
            record.progress = Progress::Unready;
        }
        inner.strategies.push(record);
        inner.register(strategy_id, worker)?;

        info!(packet_id = %self.packet_id, %strategy_id, strategy = %name, max_tries, "Strategy registered");
        Ok((strategy_id, worker_id, forecasts))
    }

    async fn apply_prestart(&self, worker_id: WorkerId, forecasts: Vec<(RequestId, ResultMask)>) -> DashboardResult<()> {
        for (request_id, mask) in forecasts {
            self.accept_status_forecast(worker_id, request_id, mask).await?;
        }
        Ok(())
    }

    /// Register an extra worker for an existing strategy
    pub async fn register_worker(
        &self,
        strategy_id: StrategyId,
        worker: Arc<dyn Worker>,
    ) -> DashboardResult<WorkerId> {
        debug!(%strategy_id, "Dashboard::register_worker: called");
        let mut inner = self.inner.write().await;
        inner.register(strategy_id, worker).inspect_err(|e| {
            error!(%strategy_id, "Worker registration rejected: {}", e);
        })
    }

    /// Workers the owner may start now
    pub async fn get_ready_workers(&self) -> Vec<ReadyWorker> {
        debug!("Dashboard::get_ready_workers: called");
        let mut inner = self.inner.write().await;
        if inner.hard_timed_out {
            debug!("Dashboard::get_ready_workers: hard timeout already fired");
            return Vec::new();
        }
        inner.promote_unready();

        let ids: Vec<StrategyId> = inner.strategies.iter().map(|s| s.id).collect();
        let mut ready = Vec::new();
        for id in ids {
            match inner.take_ready_worker(id) {
                Ok(Some(worker)) => ready.push(worker),
                Ok(None) => {}
                Err(e) => error!(strategy_id = %id, "Failed to hand out worker: {}", e),
            }
        }
        ready
    }

    /// A not-yet-started retry for the strategy that owns `worker_id`, if one is due
    pub async fn get_replacement(&self, worker_id: WorkerId) -> DashboardResult<Option<ReadyWorker>> {
        debug!(%worker_id, "Dashboard::get_replacement: called");
        let mut inner = self.inner.write().await;
        let strategy_id = inner.worker(worker_id)?.strategy_id;
        if inner.hard_timed_out {
            return Ok(None);
        }
        inner.promote_unready();
        inner.take_ready_worker(strategy_id)
    }

    /// Stop retrying the strategy that owns `worker_id`
    pub async fn cancel_retries(&self, worker_id: WorkerId) -> DashboardResult<()> {
        debug!(%worker_id, "Dashboard::cancel_retries: called");
        let (released, cancels) = {
            let mut inner = self.inner.write().await;
            let strategy_id = inner.worker(worker_id)?.strategy_id;
            let strategy = &mut inner.strategies[strategy_id.index()];
            strategy.progress = Progress::Done;
            let pending = strategy.pending.take();

            let mut cancels = Vec::new();
            let mut released = false;
            if let Some(pending) = pending {
                let record = inner.worker_mut(pending)?;
                record.canceled = true;
                record.done = true;
                cancels.push(record.worker.clone());
                let touched = inner.clear_worker_forecasts(pending);
                released = inner.reevaluate(touched);
            }
            inner.wake_waiters(None);
            (released, cancels)
        };

        for worker in cancels {
            worker.cancel();
        }
        if released {
            self.signal_owner();
        }
        Ok(())
    }

    /// Release a worker that has finished; its forecasts no longer count
    pub async fn mark_worker_done(&self, worker_id: WorkerId) -> DashboardResult<()> {
        debug!(%worker_id, "Dashboard::mark_worker_done: called");
        let wake_owner = {
            let mut inner = self.inner.write().await;
            let worker = inner.worker_mut(worker_id)?;
            if worker.done {
                error!(%worker_id, "Worker marked done twice");
                return Err(DashboardError::WorkerAlreadyDone(worker_id));
            }
            worker.done = true;
            worker.wake(WaitOutcome::Unsatisfiable);
            let strategy_id = worker.strategy_id;
            let started = worker.started;

            let touched = inner.clear_worker_forecasts(worker_id);
            let released = inner.reevaluate(touched);

            let mut retry_ready = false;
            if started && !inner.hard_timed_out {
                let any_open = inner.requests.iter().any(|r| r.state == RequestState::Incomplete);
                let strategy = &mut inner.strategies[strategy_id.index()];
                if strategy.progress == Progress::Running && strategy.has_budget() && any_open {
                    debug!(strategy = %strategy.name, "Dashboard::mark_worker_done: strategy ready for retry");
                    strategy.progress = Progress::Ready;
                    retry_ready = true;
                }
            }
            inner.wake_waiters(None);
            released || retry_ready
        };

        if wake_owner {
            self.signal_owner();
        }
        Ok(())
    }

    /// Ask every started, unfinished worker to stop and defuse its rendezvous; returns how many were asked
    pub async fn cancel_live_workers(&self) -> usize {
        debug!("Dashboard::cancel_live_workers: called");
        let cancels: Vec<Arc<dyn Worker>> = {
            let mut inner = self.inner.write().await;
            for strategy in &mut inner.strategies {
                strategy.progress = Progress::Done;
            }
            inner
                .workers
                .iter_mut()
                .filter(|w| w.started && !w.done && !w.canceled)
                .map(|w| {
                    w.canceled = true;
                    w.wake(WaitOutcome::Unsatisfiable);
                    w.worker.clone()
                })
                .collect()
        };
        for worker in &cancels {
            worker.cancel();
        }
        cancels.len()
    }

    // === Ingestion (workers) ===

    /// Narrow what a worker may still produce for a request
    pub async fn accept_status_forecast(
        &self,
        worker_id: WorkerId,
        request_id: RequestId,
        mask: ResultMask,
    ) -> DashboardResult<()> {
        debug!(%worker_id, %request_id, %mask, "Dashboard::accept_status_forecast: called");
        let released = {
            let mut inner = self.inner.write().await;
            let worker = inner.live_worker(worker_id)?;
            let (canceled, strategy_id, started) = (worker.canceled, worker.strategy_id, worker.started);
            if canceled {
                debug!(%worker_id, "Dashboard::accept_status_forecast: worker canceled, dropping");
                inner.stats.dropped_after_cancel += 1;
                return Ok(());
            }

            let request = inner.request_mut(request_id)?;
            if request.state == RequestState::Sent {
                debug!(%request_id, "Dashboard::accept_status_forecast: request already sent, ignoring");
                return Ok(());
            }
            let narrowed = request.narrow_forecast(worker_id, mask);
            inner.stats.forecasts_narrowed += 1;

            let strategy = &mut inner.strategies[strategy_id.index()];
            if !started && !strategy.has_started() {
                let template = strategy.record_prestart(request_id, mask);
                debug!(strategy = %strategy.name, %request_id, %template, "Dashboard::accept_status_forecast: prestart forecast");
            }
            debug!(%worker_id, %request_id, %narrowed, "Forecast narrowed");

            let released = inner.queue_if_newly_complete(request_id);
            inner.wake_waiters(None);
            released
        };

        if released {
            self.signal_owner();
        }
        Ok(())
    }

    /// Accept a delivered result (main or supplementary)
    pub async fn accept_reply_updater(&self, event: Event, payload: Value) -> DashboardResult<()> {
        debug!(worker_id = %event.worker_id, request_id = %event.request_id, kind = %event.kind, "Dashboard::accept_reply_updater: called");
        if !event.kind.is_result() {
            error!(kind = %event.kind, "Synonym update passed to reply updater");
            return Err(DashboardError::InvalidEventKind {
                kind: event.kind,
                operation: "accept_reply_updater",
            });
        }

        let released = {
            let mut inner = self.inner.write().await;
            if inner.live_worker(event.worker_id)?.canceled {
                debug!(worker_id = %event.worker_id, "Dashboard::accept_reply_updater: worker canceled, dropping");
                inner.stats.dropped_after_cancel += 1;
                return Ok(());
            }

            let request = inner.request_mut(event.request_id)?;
            request.ensure_open().inspect_err(|e| {
                debug!(request_id = %event.request_id, "Dashboard::accept_reply_updater: {}", e);
            })?;
            if event.kind.is_main() && !request.forecasts(event.worker_id, event.kind) {
                error!(worker_id = %event.worker_id, request_id = %event.request_id, kind = %event.kind, "Result outside the worker's forecast");
                return Err(DashboardError::NotForecast {
                    worker_id: event.worker_id,
                    request_id: event.request_id,
                    kind: event.kind,
                });
            }
            let replaced = request.accept_result(event, payload);
            request.clear_forecast_bit(event.worker_id, event.kind);

            inner.stats.events_accepted += 1;
            if replaced {
                inner.stats.main_replacements += 1;
            }

            let released = inner.queue_if_newly_complete(event.request_id);
            inner.wake_waiters(Some(&event));
            released
        };

        if released {
            self.signal_owner();
        }
        Ok(())
    }

    /// Merge identifier aliases a worker discovered for a request
    pub async fn accept_synonyms<I, S>(&self, event: Event, discovered: I) -> DashboardResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        debug!(worker_id = %event.worker_id, request_id = %event.request_id, "Dashboard::accept_synonyms: called");
        if event.kind != EventKind::SynonymUpdate {
            return Err(DashboardError::InvalidEventKind {
                kind: event.kind,
                operation: "accept_synonyms",
            });
        }

        let released = {
            let mut inner = self.inner.write().await;
            if inner.live_worker(event.worker_id)?.canceled {
                inner.stats.dropped_after_cancel += 1;
                return Ok(());
            }

            let request = inner.request_mut(event.request_id)?;
            request.ensure_open().inspect_err(|e| {
                debug!(request_id = %event.request_id, "Dashboard::accept_synonyms: {}", e);
            })?;
            let added = request.add_identifiers(discovered);
            request.clear_forecast_bit(event.worker_id, EventKind::SynonymUpdate);
            debug!(request_id = %event.request_id, ?added, "Synonyms merged");
            inner.stats.synonyms_learned += added.len() as u64;

            let released = inner.queue_if_newly_complete(event.request_id);
            inner.wake_waiters(Some(&event));
            released
        };

        if released {
            self.signal_owner();
        }
        Ok(())
    }

    /// Park a worker until another worker's event matches `pattern`
    ///
    /// Returns at once when the held main result already matches or when
    /// nobody else could still produce a matching event.
    pub async fn wait_for_matching_event(
        &self,
        worker_id: WorkerId,
        pattern: EventPattern,
        timeout: Option<Duration>,
    ) -> DashboardResult<WaitOutcome> {
        debug!(%worker_id, request_id = %pattern.request_id, kinds = %pattern.kinds, "Dashboard::wait_for_matching_event: called");
        let mut rx = {
            let mut inner = self.inner.write().await;
            let worker = inner.live_worker(worker_id)?;
            if worker.waiting_for.is_some() {
                return Err(DashboardError::AlreadyWaiting(worker_id));
            }

            let request = inner.request(pattern.request_id)?;
            if let Some(held) = &request.main
                && held.event.worker_id != worker_id
                && pattern.kinds.contains(held.event.kind)
            {
                return Ok(WaitOutcome::Matched(held.event));
            }
            if inner.pattern_unsatisfiable(worker_id, &pattern) {
                return Ok(WaitOutcome::Unsatisfiable);
            }

            let (tx, rx) = oneshot::channel();
            inner.worker_mut(worker_id)?.waiting_for = Some(Waiter::new(pattern, tx));
            rx
        };

        let Some(timeout) = timeout else {
            return Ok(rx.await.unwrap_or(WaitOutcome::Unsatisfiable));
        };

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(outcome) => Ok(outcome.unwrap_or(WaitOutcome::Unsatisfiable)),
            Err(_) => {
                let mut inner = self.inner.write().await;
                if let Ok(worker) = inner.worker_mut(worker_id) {
                    worker.waiting_for = None;
                }
                // A wake may have landed between the timeout and the lock
                Ok(rx.try_recv().unwrap_or(WaitOutcome::TimedOut))
            }
        }
    }

    // === Consumption (owner) ===

    /// Drain every released reply, marking each request sent
    pub async fn get_available_replies(&self) -> Vec<Reply> {
        debug!("Dashboard::get_available_replies: called");
        let mut inner = self.inner.write().await;
        let mut replies = Vec::with_capacity(inner.ready.len());
        while let Some(id) = inner.ready.pop_front() {
            let reply = inner.build_reply(&inner.requests[id.index()]);
            inner.requests[id.index()].advance(RequestState::Sent);
            inner.unsent -= 1;
            inner.stats.replies_sent += 1;
            debug!(request_id = %id, strength = %reply.strength(), "Reply released");
            replies.push(reply);
        }
        replies
    }

    /// Block until something the owner cares about happens, or `timeout` elapses
    pub async fn wait_for_major_event(&self, timeout: Duration, mode: TimeoutMode) -> MajorEvents {
        debug!(?timeout, ?mode, "Dashboard::wait_for_major_event: called");
        let deadline = Instant::now() + timeout;
        loop {
            let events = self.inner.read().await.major_events();
            if !events.is_empty() {
                debug!(%events, "Dashboard::wait_for_major_event: woke");
                return events;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            if tokio::time::timeout(remaining, self.notify.notified()).await.is_err() {
                break;
            }
        }

        let cancels = {
            let mut inner = self.inner.write().await;
            match mode {
                TimeoutMode::Soft => {
                    debug!(packet_id = %self.packet_id, "Soft timeout");
                    inner.apply_soft_timeout();
                    Vec::new()
                }
                TimeoutMode::Hard => {
                    warn!(packet_id = %self.packet_id, unsent = inner.unsent, "Hard timeout, answering remaining requests");
                    inner.apply_hard_timeout()
                }
            }
        };
        for worker in cancels {
            worker.cancel();
        }

        self.inner.read().await.major_events() | MajorEvents::TIMEOUT
    }

    // === Queries ===

    pub async fn len(&self) -> usize {
        self.inner.read().await.requests.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Every request with its submitted identifier
    pub async fn request_list(&self) -> Vec<(RequestId, String)> {
        let inner = self.inner.read().await;
        inner.requests.iter().map(|r| (r.id, r.identifier.clone())).collect()
    }

    /// Incomplete requests with all identifiers known for them so far
    pub async fn pending_requests(&self) -> Vec<(RequestId, Vec<String>)> {
        let inner = self.inner.read().await;
        inner
            .requests
            .iter()
            .filter(|r| r.state == RequestState::Incomplete)
            .map(|r| (r.id, r.identifiers.iter().cloned().collect()))
            .collect()
    }

    pub async fn identifiers(&self, request_id: RequestId) -> DashboardResult<Vec<String>> {
        let inner = self.inner.read().await;
        Ok(inner.request(request_id)?.identifiers.iter().cloned().collect())
    }

    pub async fn request_state(&self, request_id: RequestId) -> DashboardResult<RequestState> {
        Ok(self.inner.read().await.request(request_id)?.state)
    }

    pub async fn forecast_summary(&self, request_id: RequestId) -> DashboardResult<ResultMask> {
        Ok(self.inner.read().await.request(request_id)?.summary())
    }

    pub async fn main_result_kind(&self, request_id: RequestId) -> DashboardResult<Option<EventKind>> {
        Ok(self.inner.read().await.request(request_id)?.main_kind())
    }

    pub async fn strategy_snapshot(&self, strategy_id: StrategyId) -> DashboardResult<StrategySnapshot> {
        let inner = self.inner.read().await;
        let s = inner
            .strategies
            .get(strategy_id.index())
            .ok_or(DashboardError::UnknownStrategy(strategy_id))?;
        Ok(StrategySnapshot {
            name: s.name.clone(),
            progress: s.progress,
            first_worker: s.first_worker,
            tries_used: s.tries_used,
            tries_available: s.tries_available,
        })
    }

    pub async fn unsent(&self) -> usize {
        self.inner.read().await.unsent
    }

    pub async fn stats(&self) -> DashboardStats {
        self.inner.read().await.stats.clone()
    }
}
