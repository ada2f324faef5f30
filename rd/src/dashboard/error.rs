//! Dashboard error types
//!
//! Every variant marks a collaborator bug (a misuse of the ingestion or
//! consumption API), not a runtime condition. Timeouts and missing answers are
//! never errors; they surface as synthesized replies.

use thiserror::Error;

use crate::domain::{EventKind, RequestId, StrategyId, WorkerId};

/// Errors from dashboard operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DashboardError {
    #[error("Unknown request: {0}")]
    UnknownRequest(RequestId),

    #[error("Unknown worker: {0}")]
    UnknownWorker(WorkerId),

    #[error("Unknown strategy: {0}")]
    UnknownStrategy(StrategyId),

    #[error("Worker already registered as {0}")]
    DuplicateWorker(WorkerId),

    #[error("Request {0} was already sent")]
    AlreadySent(RequestId),

    #[error("Request {0} is already complete")]
    AlreadyComplete(RequestId),

    #[error("Worker {worker_id} no longer forecasts {kind} for {request_id}")]
    NotForecast {
        worker_id: WorkerId,
        request_id: RequestId,
        kind: EventKind,
    },

    #[error("Event kind {kind} is not accepted by {operation}")]
    InvalidEventKind { kind: EventKind, operation: &'static str },

    #[error("Worker {0} was already marked done")]
    WorkerAlreadyDone(WorkerId),

    #[error("Worker {0} is already waiting for an event")]
    AlreadyWaiting(WorkerId),

    #[error("Strategy {0} must allow at least one try")]
    NoTries(String),
}

impl DashboardError {
    /// True for the race a worker can hit when a request completes under it
    pub fn is_already_sent(&self) -> bool {
        matches!(self, DashboardError::AlreadySent(_))
    }

    /// True when the request no longer takes events, sent or not
    pub fn is_request_closed(&self) -> bool {
        matches!(self, DashboardError::AlreadySent(_) | DashboardError::AlreadyComplete(_))
    }
}

/// Result alias for dashboard operations
pub type DashboardResult<T> = Result<T, DashboardError>;
