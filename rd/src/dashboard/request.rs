//! Per-request accumulated state and the forecast algebra

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::domain::{Event, EventKind, RequestId, ResultMask, WorkerId};

use super::error::{DashboardError, DashboardResult};

/// Lifecycle of a request; only ever moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    /// Some worker may still improve the answer
    Incomplete,
    /// Complete, but held back behind an earlier incomplete request (strict order)
    Queueable,
    /// In the ready FIFO, waiting to be drained
    Queued,
    /// Released to the owner
    Sent,
}

impl RequestState {
    /// True once nothing more will be waited for
    pub fn is_complete(self) -> bool {
        self != Self::Incomplete
    }

    /// True once the request sits in, or has left, the ready FIFO
    pub fn is_released(self) -> bool {
        self >= Self::Queued
    }
}

/// A delivered result kept on a request
#[derive(Debug, Clone)]
pub(crate) struct Held {
    pub event: Event,
    pub payload: Value,
}

/// Per-request state owned by the dashboard
#[derive(Debug)]
pub(crate) struct RequestRecord {
    pub id: RequestId,
    pub identifier: String,
    pub state: RequestState,
    /// One entry per registered worker, indexed by `WorkerId`
    forecasts: Vec<ResultMask>,
    /// OR of `forecasts`, kept in step by `update_forecast_summary`
    summary: ResultMask,
    pub main: Option<Held>,
    pub supplementary: Vec<Held>,
    pub had_synonym_update: bool,
    pub identifiers: BTreeSet<String>,
}

impl RequestRecord {
    pub fn new(id: RequestId, identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        let mut identifiers = BTreeSet::new();
        identifiers.insert(identifier.clone());
        Self {
            id,
            identifier,
            state: RequestState::Incomplete,
            forecasts: Vec::new(),
            summary: ResultMask::EMPTY,
            main: None,
            supplementary: Vec::new(),
            had_synonym_update: false,
            identifiers,
        }
    }

    /// Extend the forecast array for a newly registered worker
    pub fn push_worker(&mut self, forecast: ResultMask) {
        self.forecasts.push(forecast);
        self.summary |= forecast;
    }

    pub fn summary(&self) -> ResultMask {
        self.summary
    }

    /// What every worker other than `worker_id` might still produce
    pub fn summary_excluding(&self, worker_id: WorkerId) -> ResultMask {
        self.forecasts
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != worker_id.index())
            .fold(ResultMask::EMPTY, |acc, (_, f)| acc | *f)
    }

    pub fn update_forecast_summary(&mut self) {
        self.summary = self.forecasts.iter().fold(ResultMask::EMPTY, |acc, f| acc | *f);
    }

    /// Narrow one worker's forecast; forecasts never grow
    pub fn narrow_forecast(&mut self, worker_id: WorkerId, mask: ResultMask) -> ResultMask {
        let slot = &mut self.forecasts[worker_id.index()];
        *slot = *slot & mask;
        let narrowed = *slot;
        self.update_forecast_summary();
        narrowed
    }

    /// True while `worker_id` may still deliver `kind`
    pub fn forecasts(&self, worker_id: WorkerId, kind: EventKind) -> bool {
        self.forecasts
            .get(worker_id.index())
            .is_some_and(|f| f.contains(kind))
    }

    /// Refuse new events once the request is decided
    pub fn ensure_open(&self) -> DashboardResult<()> {
        match self.state {
            RequestState::Incomplete => Ok(()),
            RequestState::Sent => Err(DashboardError::AlreadySent(self.id)),
            RequestState::Queueable | RequestState::Queued => Err(DashboardError::AlreadyComplete(self.id)),
        }
    }

    pub fn clear_forecast_bit(&mut self, worker_id: WorkerId, kind: EventKind) {
        let slot = &mut self.forecasts[worker_id.index()];
        *slot = slot.without(kind);
        self.update_forecast_summary();
    }

    /// Forget everything a worker might still produce; true if it had forecast anything
    pub fn clear_worker(&mut self, worker_id: WorkerId) -> bool {
        let slot = &mut self.forecasts[worker_id.index()];
        let had_any = !slot.is_empty();
        *slot = ResultMask::EMPTY;
        self.update_forecast_summary();
        had_any
    }

    pub fn main_kind(&self) -> Option<EventKind> {
        self.main.as_ref().map(|h| h.event.kind)
    }

    /// Single source of truth for whether this request may still change
    pub fn is_still_incomplete(&self) -> bool {
        if self.state != RequestState::Incomplete {
            return false;
        }
        if self.summary.is_settled() {
            return false;
        }
        let Some(main) = self.main_kind() else {
            return true;
        };
        if self.summary.contains(EventKind::Supplementary) {
            return true;
        }
        self.summary.intersects(main.stronger_types())
    }

    /// Record a delivered result; returns true if it became the main result
    pub fn accept_result(&mut self, event: Event, payload: Value) -> bool {
        if event.kind == EventKind::Supplementary {
            self.supplementary.push(Held { event, payload });
            return false;
        }

        let replaces = match self.main_kind() {
            None => true,
            Some(held) => event.kind.beats(held),
        };
        if replaces {
            debug!(request_id = %self.id, kind = %event.kind, "RequestRecord::accept_result: new main result");
            self.main = Some(Held { event, payload });
        }
        replaces
    }

    /// Merge discovered aliases; returns the ones not already known
    pub fn add_identifiers<I, S>(&mut self, ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut added = Vec::new();
        for id in ids {
            let id = id.into();
            if self.identifiers.insert(id.clone()) {
                added.push(id);
            }
        }
        self.had_synonym_update = true;
        added
    }

    pub fn advance(&mut self, state: RequestState) {
        debug_assert!(state >= self.state, "request state must not move backwards");
        self.state = self.state.max(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record_with_workers(forecasts: &[ResultMask]) -> RequestRecord {
        let mut record = RequestRecord::new(RequestId::new(0), "acc-0");
        for f in forecasts {
            record.push_worker(*f);
        }
        record
    }

    fn event(kind: EventKind, worker: usize) -> Event {
        Event::new(kind, RequestId::new(0), WorkerId::new(worker))
    }

    #[test]
    fn test_summary_is_or_of_forecasts() {
        let mut record = record_with_workers(&[ResultMask::WEAK_MAIN, ResultMask::ERROR]);
        assert_eq!(record.summary(), ResultMask::WEAK_MAIN | ResultMask::ERROR);

        record.narrow_forecast(WorkerId::new(1), ResultMask::EMPTY);
        assert_eq!(record.summary(), ResultMask::WEAK_MAIN);
        assert_eq!(record.summary_excluding(WorkerId::new(0)), ResultMask::EMPTY);
    }

    #[test]
    fn test_forecast_only_shrinks() {
        let mut record = record_with_workers(&[ResultMask::WEAK_MAIN]);
        let narrowed = record.narrow_forecast(WorkerId::new(0), ResultMask::ANY);
        assert_eq!(narrowed, ResultMask::WEAK_MAIN);
    }

    #[test]
    fn test_incomplete_without_main() {
        let record = record_with_workers(&[ResultMask::ERROR]);
        assert!(record.is_still_incomplete());
    }

    #[test]
    fn test_complete_when_forecast_settled() {
        let record = record_with_workers(&[ResultMask::SYNONYM_UPDATE]);
        assert!(!record.is_still_incomplete());
    }

    #[test]
    fn test_complete_when_nothing_stronger_forecast() {
        let mut record = record_with_workers(&[ResultMask::WEAK_MAIN | ResultMask::ERROR]);
        record.accept_result(event(EventKind::WeakMain, 0), json!("weak"));
        assert!(!record.is_still_incomplete());
    }

    #[test]
    fn test_incomplete_while_supplementary_forecast() {
        let mut record = record_with_workers(&[ResultMask::SUPPLEMENTARY]);
        record.accept_result(event(EventKind::StrongMain, 0), json!("strong"));
        assert!(record.is_still_incomplete());

        record.clear_forecast_bit(WorkerId::new(0), EventKind::Supplementary);
        assert!(!record.is_still_incomplete());
    }

    #[test]
    fn test_incomplete_while_stronger_forecast() {
        let mut record = record_with_workers(&[ResultMask::STRONG_MAIN]);
        record.accept_result(event(EventKind::WeakMain, 0), json!("weak"));
        assert!(record.is_still_incomplete());
    }

    #[test]
    fn test_main_never_downgraded() {
        let mut record = record_with_workers(&[ResultMask::ANY]);
        assert!(record.accept_result(event(EventKind::StrongMain, 0), json!("strong")));
        assert!(!record.accept_result(event(EventKind::WeakMain, 0), json!("weak")));
        assert!(!record.accept_result(event(EventKind::StrongMain, 0), json!("second")));
        assert_eq!(record.main_kind(), Some(EventKind::StrongMain));
        assert_eq!(record.main.as_ref().unwrap().payload, json!("strong"));
    }

    #[test]
    fn test_supplementary_accumulates() {
        let mut record = record_with_workers(&[ResultMask::ANY]);
        record.accept_result(event(EventKind::Supplementary, 0), json!(1));
        record.accept_result(event(EventKind::Supplementary, 0), json!(2));
        assert_eq!(record.supplementary.len(), 2);
        assert!(record.main.is_none());
    }

    #[test]
    fn test_add_identifiers_reports_new_only() {
        let mut record = record_with_workers(&[]);
        let added = record.add_identifiers(["acc-0", "gi-42"]);
        assert_eq!(added, vec!["gi-42".to_string()]);
        assert!(record.had_synonym_update);
        assert_eq!(record.identifiers.len(), 2);
    }

    #[test]
    fn test_complete_state_short_circuits() {
        let mut record = record_with_workers(&[ResultMask::ANY]);
        record.advance(RequestState::Queued);
        assert!(!record.is_still_incomplete());
        assert!(RequestState::Queued.is_released());
        assert!(!RequestState::Queueable.is_released());
    }

    #[test]
    fn test_decided_request_is_closed() {
        let mut record = record_with_workers(&[ResultMask::WEAK_MAIN]);
        assert!(record.ensure_open().is_ok());
        assert!(record.forecasts(WorkerId::new(0), EventKind::WeakMain));
        assert!(!record.forecasts(WorkerId::new(0), EventKind::StrongMain));
        assert!(!record.forecasts(WorkerId::new(3), EventKind::WeakMain));

        record.advance(RequestState::Queueable);
        assert_eq!(record.ensure_open(), Err(DashboardError::AlreadyComplete(RequestId::new(0))));
        record.advance(RequestState::Sent);
        assert_eq!(record.ensure_open(), Err(DashboardError::AlreadySent(RequestId::new(0))));
    }
}
