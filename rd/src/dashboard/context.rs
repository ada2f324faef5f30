//! WorkerContext - a worker's handle onto its dashboard

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::domain::{Event, EventKind, EventPattern, RequestId, ResultMask, WorkerId};

use super::core::Dashboard;
use super::error::DashboardResult;
use super::worker::WaitOutcome;

/// Binds a worker id to the shared dashboard
///
/// Cheap to clone. Every call goes through the dashboard's ingestion API
/// with this worker's id filled in.
#[derive(Clone)]
pub struct WorkerContext {
    dashboard: Arc<Dashboard>,
    worker_id: WorkerId,
}

impl WorkerContext {
    pub fn new(dashboard: Arc<Dashboard>, worker_id: WorkerId) -> Self {
        debug!(%worker_id, "WorkerContext::new: called");
        Self { dashboard, worker_id }
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    pub fn dashboard(&self) -> &Arc<Dashboard> {
        &self.dashboard
    }

    /// Requests still open, with every identifier known for them
    pub async fn pending_requests(&self) -> Vec<(RequestId, Vec<String>)> {
        self.dashboard.pending_requests().await
    }

    /// Narrow what this worker may still produce for a request
    pub async fn forecast(&self, request_id: RequestId, mask: ResultMask) -> DashboardResult<()> {
        self.dashboard
            .accept_status_forecast(self.worker_id, request_id, mask)
            .await
    }

    /// Deliver a result for a request
    pub async fn reply(&self, request_id: RequestId, kind: EventKind, payload: Value) -> DashboardResult<()> {
        let event = Event::new(kind, request_id, self.worker_id);
        self.dashboard.accept_reply_updater(event, payload).await
    }

    /// Report identifier aliases learned for a request
    pub async fn synonyms(&self, request_id: RequestId, ids: Vec<String>) -> DashboardResult<()> {
        let event = Event::new(EventKind::SynonymUpdate, request_id, self.worker_id);
        self.dashboard.accept_synonyms(event, ids).await
    }

    /// Wait for a sibling worker to deliver one of `kinds` for a request
    pub async fn wait_for(
        &self,
        request_id: RequestId,
        kinds: ResultMask,
        timeout: Option<Duration>,
    ) -> DashboardResult<WaitOutcome> {
        self.dashboard
            .wait_for_matching_event(self.worker_id, EventPattern::new(request_id, kinds), timeout)
            .await
    }

    /// Further tries of this worker's strategy are pointless
    pub async fn cancel_retries(&self) -> DashboardResult<()> {
        self.dashboard.cancel_retries(self.worker_id).await
    }

    /// Report that this worker has finished
    pub async fn done(&self) -> DashboardResult<()> {
        self.dashboard.mark_worker_done(self.worker_id).await
    }
}
