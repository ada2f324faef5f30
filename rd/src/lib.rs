//! replydash - reply aggregation for hedged retrieval packets
//!
//! A packet is a batch of requests, each naming a sequence or record by
//! identifier. Several retrieval strategies race to answer it. Each try of a
//! strategy is a worker that reports results, forecasts and discovered
//! aliases to a shared [`dashboard::Dashboard`], which decides when a
//! request's answer can no longer improve and releases exactly one reply per
//! request.
//!
//! # Modules
//!
//! - [`domain`] - Identifiers, event kinds and reply types
//! - [`dashboard`] - The aggregation coordinator and worker contracts
//! - [`runner`] - Owner loop that drives a packet to completion
//! - [`strategy`] - Simulated in-process strategies
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod dashboard;
pub mod domain;
pub mod runner;
pub mod strategy;

pub use config::Config;
pub use dashboard::{Dashboard, DashboardConfig, DashboardError, Strategy, Worker, WorkerContext};
pub use domain::{EventKind, Reply, RequestId, ResultMask};
pub use runner::{PacketOutcome, PacketRunner};
