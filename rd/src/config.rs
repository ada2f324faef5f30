//! replydash configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::dashboard::DashboardConfig;
use crate::domain::EventKind;
use crate::runner::PacketRunner;
use crate::strategy::{SimRule, SimStrategy, SimStrategyConfig};

/// Main replydash configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Timeouts and ordering for every packet
    pub dashboard: DashboardConfig,

    /// Simulated strategies the CLI runs packets against
    pub strategies: Vec<SimStrategyConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dashboard: DashboardConfig::default(),
            strategies: default_strategies(),
        }
    }
}

/// A fast cache with weak answers and a slower authoritative source
fn default_strategies() -> Vec<SimStrategyConfig> {
    vec![
        SimStrategyConfig::new("cache")
            .with_latency(5, 10)
            .with_default_kind(EventKind::WeakMain)
            .forecasting_ahead(),
        SimStrategyConfig::new("primary")
            .with_max_tries(2)
            .with_latency(50, 100)
            .with_default_kind(EventKind::StrongMain)
            .with_rule(SimRule::new("missing", None)),
    ]
}

impl Config {
    /// Check the configuration before running anything
    pub fn validate(&self) -> Result<()> {
        if self.dashboard.soft_timeout_ms == 0 {
            return Err(eyre::eyre!("dashboard.soft-timeout-ms must be greater than zero"));
        }
        if self.dashboard.hard_timeout_ms < self.dashboard.soft_timeout_ms {
            return Err(eyre::eyre!(
                "dashboard.hard-timeout-ms ({}) is shorter than soft-timeout-ms ({})",
                self.dashboard.hard_timeout_ms,
                self.dashboard.soft_timeout_ms
            ));
        }
        if self.strategies.is_empty() {
            return Err(eyre::eyre!("No strategies configured"));
        }
        if let Some(s) = self.strategies.iter().find(|s| s.max_tries == 0) {
            return Err(eyre::eyre!("Strategy {} must allow at least one try", s.name));
        }
        Ok(())
    }

    /// A runner wired with every configured strategy
    pub fn runner(&self) -> PacketRunner {
        self.strategies.iter().fold(PacketRunner::new(self.dashboard.clone()), |runner, s| {
            let strategy = SimStrategy::new(s.clone());
            let max_tries = strategy.max_tries();
            runner.with_strategy(Arc::new(strategy), max_tries)
        })
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .replydash.yml
        let local_config = PathBuf::from(".replydash.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/replydash/replydash.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("replydash").join("replydash.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}
