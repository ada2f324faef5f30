//! Retrieval strategies that plug into the dashboard

mod sim;

pub use sim::{Plan, SimRule, SimStrategy, SimStrategyConfig, SimWorker};
