//! Dashboard configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Per-packet dashboard configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Release replies in submission order
    #[serde(rename = "strict-order", default)]
    pub strict_order: bool,

    /// Owner wait before running strategies may be retried
    #[serde(rename = "soft-timeout-ms", default = "default_soft_timeout_ms")]
    pub soft_timeout_ms: u64,

    /// Deadline after which every unanswered request gets a synthesized reply
    #[serde(rename = "hard-timeout-ms", default = "default_hard_timeout_ms")]
    pub hard_timeout_ms: u64,

    /// How long canceled workers get to wind down once the packet is answered
    #[serde(rename = "shutdown-grace-ms", default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_soft_timeout_ms() -> u64 {
    debug!("default_soft_timeout_ms: called");
    2_000
}

fn default_hard_timeout_ms() -> u64 {
    debug!("default_hard_timeout_ms: called");
    10_000
}

fn default_shutdown_grace_ms() -> u64 {
    debug!("default_shutdown_grace_ms: called");
    500
}

impl Default for DashboardConfig {
    fn default() -> Self {
        debug!("DashboardConfig::default: called");
        Self {
            strict_order: false,
            soft_timeout_ms: 2_000,
            hard_timeout_ms: 10_000,
            shutdown_grace_ms: 500,
        }
    }
}

impl DashboardConfig {
    pub fn soft_timeout(&self) -> Duration {
        Duration::from_millis(self.soft_timeout_ms)
    }

    pub fn hard_timeout(&self) -> Duration {
        Duration::from_millis(self.hard_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Same configuration with strict ordering switched on or off
    pub fn with_strict_order(mut self, strict_order: bool) -> Self {
        self.strict_order = strict_order;
        self
    }
}
