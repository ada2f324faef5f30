//! SimStrategy - a configurable in-process retrieval strategy
//!
//! Each worker sleeps for a jittered latency, then answers every pending
//! request from its rule table. Rules can name a result kind, identifier
//! aliases to report, and a supplementary result. Unmatched requests fall back
//! to the strategy's default kind. A strategy can also fail its first tries,
//! publish its forecasts before starting, and wait for a sibling to discover
//! aliases before looking a request up.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use eyre::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::dashboard::{Dashboard, DashboardError, Progress, Strategy, WaitOutcome, Worker, WorkerContext};
use crate::domain::{EventKind, RequestId, ResultMask};

/// Outcome for one identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimRule {
    pub identifier: String,

    /// Result kind to deliver; none means the lookup finds nothing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<EventKind>,

    /// Aliases reported for the request
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<String>,

    /// Also deliver a supplementary result
    #[serde(default)]
    pub supplementary: bool,
}

impl SimRule {
    pub fn new(identifier: impl Into<String>, kind: Option<EventKind>) -> Self {
        Self {
            identifier: identifier.into(),
            kind,
            synonyms: Vec::new(),
            supplementary: false,
        }
    }

    pub fn with_synonyms<I, S>(mut self, synonyms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.synonyms = synonyms.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_supplementary(mut self) -> Self {
        self.supplementary = true;
        self
    }
}

/// Definition of a simulated strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimStrategyConfig {
    pub name: String,

    #[serde(rename = "max-tries", default = "default_max_tries")]
    pub max_tries: u32,

    #[serde(rename = "latency-ms", default)]
    pub latency_ms: u64,

    /// Upper bound of the random delay added to `latency-ms`
    #[serde(rename = "jitter-ms", default)]
    pub jitter_ms: u64,

    /// Result for identifiers no rule names
    #[serde(rename = "default-kind", default, skip_serializing_if = "Option::is_none")]
    pub default_kind: Option<EventKind>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<SimRule>,

    /// Publish forecasts from the rule table before any worker starts
    #[serde(rename = "forecast-ahead", default)]
    pub forecast_ahead: bool,

    /// Tries that fail before doing any work
    #[serde(rename = "fail-first-tries", default)]
    pub fail_first_tries: u32,

    /// Wait this long for a sibling to report aliases when no rule matches
    #[serde(rename = "await-synonyms-ms", default, skip_serializing_if = "Option::is_none")]
    pub await_synonyms_ms: Option<u64>,
}

fn default_max_tries() -> u32 {
    debug!("default_max_tries: called");
    1
}

impl SimStrategyConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_tries: 1,
            latency_ms: 0,
            jitter_ms: 0,
            default_kind: None,
            rules: Vec::new(),
            forecast_ahead: false,
            fail_first_tries: 0,
            await_synonyms_ms: None,
        }
    }

    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = max_tries;
        self
    }

    pub fn with_latency(mut self, latency_ms: u64, jitter_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self.jitter_ms = jitter_ms;
        self
    }

    pub fn with_default_kind(mut self, kind: EventKind) -> Self {
        self.default_kind = Some(kind);
        self
    }

    pub fn with_rule(mut self, rule: SimRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn forecasting_ahead(mut self) -> Self {
        self.forecast_ahead = true;
        self
    }

    pub fn failing_first(mut self, tries: u32) -> Self {
        self.fail_first_tries = tries;
        self
    }

    pub fn awaiting_synonyms(mut self, wait_ms: u64) -> Self {
        self.await_synonyms_ms = Some(wait_ms);
        self
    }

    /// Look a request up by any of its known identifiers
    pub fn plan<'a>(&'a self, identifiers: &[String]) -> Plan<'a> {
        match self
            .rules
            .iter()
            .find(|rule| identifiers.iter().any(|id| *id == rule.identifier))
        {
            Some(rule) => Plan {
                kind: rule.kind,
                synonyms: &rule.synonyms,
                supplementary: rule.supplementary,
                matched: true,
            },
            None => Plan {
                kind: self.default_kind,
                synonyms: &[],
                supplementary: false,
                matched: false,
            },
        }
    }

    fn latency(&self) -> Duration {
        let jitter = if self.jitter_ms > 0 {
            rand::rng().random_range(0..=self.jitter_ms)
        } else {
            0
        };
        Duration::from_millis(self.latency_ms + jitter)
    }
}

/// What a worker will deliver for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan<'a> {
    pub kind: Option<EventKind>,
    pub synonyms: &'a [String],
    pub supplementary: bool,
    /// A rule named one of the identifiers
    pub matched: bool,
}

impl Plan<'_> {
    /// Every event kind this plan can produce
    pub fn mask(&self) -> ResultMask {
        let mut mask = ResultMask::EMPTY;
        if let Some(kind) = self.kind {
            mask |= ResultMask::from(kind);
        }
        if self.supplementary {
            mask |= ResultMask::SUPPLEMENTARY;
        }
        if !self.synonyms.is_empty() {
            mask |= ResultMask::SYNONYM_UPDATE;
        }
        mask
    }
}

/// Strategy backed by a `SimStrategyConfig`
pub struct SimStrategy {
    config: Arc<SimStrategyConfig>,
}

impl SimStrategy {
    pub fn new(config: SimStrategyConfig) -> Self {
        debug!(name = %config.name, "SimStrategy::new: called");
        Self {
            config: Arc::new(config),
        }
    }

    pub fn max_tries(&self) -> u32 {
        self.config.max_tries
    }

    pub fn config(&self) -> &SimStrategyConfig {
        &self.config
    }
}

impl Strategy for SimStrategy {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn new_worker(&self, _dashboard: &Dashboard) -> Arc<dyn Worker> {
        Arc::new(SimWorker::new(self.config.clone(), 0))
    }

    fn forecasts(&self, requests: &[(RequestId, String)]) -> Vec<(RequestId, ResultMask)> {
        if !self.config.forecast_ahead {
            return Vec::new();
        }
        requests
            .iter()
            .filter_map(|(request_id, identifier)| {
                let plan = self.config.plan(std::slice::from_ref(identifier));
                // An alias may still redirect the lookup
                if self.config.await_synonyms_ms.is_some() && !plan.matched {
                    return None;
                }
                Some((*request_id, plan.mask()))
            })
            .collect()
    }
}

/// One try of a `SimStrategy`
pub struct SimWorker {
    config: Arc<SimStrategyConfig>,
    attempt: u32,
    canceled: AtomicBool,
    cancel_notify: Notify,
}

impl SimWorker {
    fn new(config: Arc<SimStrategyConfig>, attempt: u32) -> Self {
        Self {
            config,
            attempt,
            canceled: AtomicBool::new(false),
            cancel_notify: Notify::new(),
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Sleep unless canceled first; false when canceled
    async fn pause(&self, duration: Duration) -> bool {
        if self.is_canceled() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => !self.is_canceled(),
            _ = self.cancel_notify.notified() => false,
        }
    }

    fn payload(&self, identifier: &str, kind: EventKind) -> Value {
        json!({
            "source": self.config.name,
            "attempt": self.attempt + 1,
            "identifier": identifier,
            "kind": kind,
        })
    }

    /// Give a sibling the chance to report an alias a rule knows
    async fn resolve_identifiers(
        &self,
        ctx: &WorkerContext,
        request_id: RequestId,
        identifiers: Vec<String>,
    ) -> Result<Vec<String>, DashboardError> {
        let Some(wait_ms) = self.config.await_synonyms_ms else {
            return Ok(identifiers);
        };
        if self.config.plan(&identifiers).matched {
            return Ok(identifiers);
        }

        debug!(worker_id = %ctx.worker_id(), %request_id, "SimWorker::resolve_identifiers: waiting for aliases");
        match ctx
            .wait_for(request_id, ResultMask::SYNONYM_UPDATE, Some(Duration::from_millis(wait_ms)))
            .await?
        {
            WaitOutcome::Matched(_) => ctx.dashboard().identifiers(request_id).await,
            WaitOutcome::Unsatisfiable | WaitOutcome::TimedOut => Ok(identifiers),
        }
    }

    async fn answer(
        &self,
        ctx: &WorkerContext,
        request_id: RequestId,
        identifiers: &[String],
    ) -> Result<Option<EventKind>, DashboardError> {
        let plan = self.config.plan(identifiers);
        let identifier = identifiers.first().map(String::as_str).unwrap_or_default();

        if !plan.synonyms.is_empty() {
            ctx.synonyms(request_id, plan.synonyms.to_vec()).await?;
        }
        if plan.supplementary {
            ctx.reply(
                request_id,
                EventKind::Supplementary,
                self.payload(identifier, EventKind::Supplementary),
            )
            .await?;
        }
        if let Some(kind) = plan.kind {
            ctx.reply(request_id, kind, self.payload(identifier, kind)).await?;
        }
        ctx.forecast(request_id, ResultMask::EMPTY).await?;
        Ok(plan.kind)
    }
}

#[async_trait]
impl Worker for SimWorker {
    async fn run(&self, ctx: WorkerContext) -> Result<()> {
        let worker_id = ctx.worker_id();
        debug!(%worker_id, strategy = %self.config.name, attempt = self.attempt, "SimWorker::run: called");

        if !self.pause(self.config.latency()).await {
            debug!(%worker_id, "SimWorker::run: canceled before lookup");
            return Ok(());
        }
        if self.attempt < self.config.fail_first_tries {
            eyre::bail!("{} failed on try {}", self.config.name, self.attempt + 1);
        }

        let mut answered = 0;
        let mut all_strong = true;
        for (request_id, identifiers) in ctx.pending_requests().await {
            if self.is_canceled() {
                return Ok(());
            }

            let result = match self.resolve_identifiers(&ctx, request_id, identifiers).await {
                Ok(identifiers) => self.answer(&ctx, request_id, &identifiers).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(Some(kind)) => {
                    answered += 1;
                    all_strong &= kind == EventKind::StrongMain;
                }
                Ok(None) => all_strong = false,
                Err(e) if e.is_request_closed() => {
                    debug!(%worker_id, %request_id, "SimWorker::run: request already decided");
                }
                Err(e) => return Err(e).context(format!("{} failed on {}", self.config.name, request_id)),
            }
        }

        if answered > 0 && all_strong {
            info!(%worker_id, strategy = %self.config.name, "Every answer is strong, canceling retries");
            ctx.cancel_retries().await?;
        }
        Ok(())
    }

    fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
        self.cancel_notify.notify_one();
    }

    fn clone_unstarted(&self) -> Arc<dyn Worker> {
        Arc::new(SimWorker::new(self.config.clone(), self.attempt + 1))
    }

    fn progress(&self) -> Progress {
        if self.is_canceled() {
            Progress::Done
        } else {
            Progress::Ready
        }
    }
}
