//! Dashboard for aggregating worker replies
//!
//! The dashboard merges what competing strategies deliver for a packet into
//! exactly one reply per request:
//! - **Ingestion:** forecasts, results and synonyms from workers
//! - **Release:** completeness checks and (optionally strict) ordering
//! - **Lifecycle:** strategy retry budgets, soft and hard timeouts
//! - **Rendezvous:** workers waiting on each other's events

mod config;
mod context;
mod core;
mod error;
mod major;
mod request;
mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use config::DashboardConfig;
pub use context::WorkerContext;
pub use core::{Dashboard, DashboardStats, StrategySnapshot};
pub use error::{DashboardError, DashboardResult};
pub use major::{MajorEvents, TimeoutMode};
pub use request::RequestState;
pub use worker::{Progress, ReadyWorker, Strategy, WaitOutcome, Worker};
