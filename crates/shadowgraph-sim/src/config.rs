//! Simulator configuration types

use serde::{Deserialize, Serialize};
use shadowgraph_gossip::ShadowGraphConfig;
use std::path::Path;
use thiserror::Error;

/// Errors loading or validating a configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Complete simulator configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Traffic shape
    #[serde(default)]
    pub simulation: SimulationSettings,

    /// Shadow graph settings
    #[serde(default)]
    pub graph: ShadowGraphConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How much gossip traffic to simulate and how
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Number of simulated creators (network nodes)
    #[serde(default = "default_creators")]
    pub creators: u64,

    /// Total events to create
    #[serde(default = "default_events")]
    pub events: u64,

    /// Concurrent ingestion tasks feeding the graph
    #[serde(default = "default_ingest_tasks")]
    pub ingest_tasks: usize,

    /// Concurrent sync sessions walking the graph
    #[serde(default = "default_sync_tasks")]
    pub sync_tasks: usize,

    /// Generations kept behind the newest one
    #[serde(default = "default_expiry_window")]
    pub expiry_window: u64,

    /// Interval between expiry passes
    #[serde(default = "default_expiry_interval_ms")]
    pub expiry_interval_ms: u64,

    /// Pause between sync sessions
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,

    /// RNG seed for other-parent selection
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_creators() -> u64 {
    8
}

fn default_events() -> u64 {
    10_000
}

fn default_ingest_tasks() -> usize {
    4
}

fn default_sync_tasks() -> usize {
    2
}

fn default_expiry_window() -> u64 {
    20
}

fn default_expiry_interval_ms() -> u64 {
    50
}

fn default_sync_interval_ms() -> u64 {
    10
}

fn default_seed() -> u64 {
    42
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            creators: default_creators(),
            events: default_events(),
            ingest_tasks: default_ingest_tasks(),
            sync_tasks: default_sync_tasks(),
            expiry_window: default_expiry_window(),
            expiry_interval_ms: default_expiry_interval_ms(),
            sync_interval_ms: default_sync_interval_ms(),
            seed: default_seed(),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl SimConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.simulation;
        if sim.creators < 2 {
            return Err(ConfigError::Invalid(
                "simulation.creators must be at least 2".to_string(),
            ));
        }
        if sim.ingest_tasks == 0 {
            return Err(ConfigError::Invalid(
                "simulation.ingest_tasks must be at least 1".to_string(),
            ));
        }
        if sim.expiry_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "simulation.expiry_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Graph settings, sizing the tip check to the simulated network when
    /// no explicit size is configured
    pub fn effective_graph_config(&self) -> ShadowGraphConfig {
        if self.graph.network_size == 0 {
            ShadowGraphConfig::for_network(self.simulation.creators as usize)
        } else {
            self.graph.clone()
        }
    }
}
