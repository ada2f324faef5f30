//! Test doubles for dashboard unit tests

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;

use crate::domain::{RequestId, ResultMask};

use super::context::WorkerContext;
use super::core::Dashboard;
use super::worker::{Progress, Strategy, Worker};

/// A worker that does nothing on its own; tests drive the dashboard directly
pub(crate) struct ScriptedWorker {
    pub attempt: u32,
    pub canceled: Arc<AtomicBool>,
    pub unready: Arc<AtomicBool>,
    pub cancel_calls: Arc<AtomicU32>,
}

#[async_trait]
impl Worker for ScriptedWorker {
    async fn run(&self, _ctx: WorkerContext) -> eyre::Result<()> {
        Ok(())
    }

    fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn clone_unstarted(&self) -> Arc<dyn Worker> {
        Arc::new(ScriptedWorker {
            attempt: self.attempt + 1,
            canceled: Arc::new(AtomicBool::new(false)),
            unready: self.unready.clone(),
            cancel_calls: self.cancel_calls.clone(),
        })
    }

    fn progress(&self) -> Progress {
        if self.unready.load(Ordering::SeqCst) {
            Progress::Unready
        } else {
            Progress::Ready
        }
    }
}

pub(crate) struct ScriptedStrategy {
    pub name: String,
    pub prestart: Vec<(RequestId, ResultMask)>,
    pub unready: Arc<AtomicBool>,
    pub cancel_calls: Arc<AtomicU32>,
}

impl ScriptedStrategy {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            prestart: Vec::new(),
            unready: Arc::new(AtomicBool::new(false)),
            cancel_calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn with_prestart(mut self, request: usize, mask: ResultMask) -> Self {
        self.prestart.push((RequestId::new(request), mask));
        self
    }

    pub fn unready(self) -> Self {
        self.unready.store(true, Ordering::SeqCst);
        self
    }
}

impl Strategy for ScriptedStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn new_worker(&self, _dashboard: &Dashboard) -> Arc<dyn Worker> {
        Arc::new(ScriptedWorker {
            attempt: 0,
            canceled: Arc::new(AtomicBool::new(false)),
            unready: self.unready.clone(),
            cancel_calls: self.cancel_calls.clone(),
        })
    }

    fn forecasts(&self, _requests: &[(RequestId, String)]) -> Vec<(RequestId, ResultMask)> {
        self.prestart.clone()
    }
}
