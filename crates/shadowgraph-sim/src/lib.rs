//! # Shadow Graph Simulator
//!
//! Drives a shadow graph with concurrent gossip-like traffic: events are
//! created by a set of simulated creators and inserted from several tasks,
//! sync sessions walk ancestors under a reservation, and an expiry task
//! trails the newest generation.
//!
//! ## Usage
//!
//! ```bash
//! # Default run
//! shadowgraph-sim run
//!
//! # Larger network, JSON summary written to disk
//! shadowgraph-sim run --creators 32 --events 100000 --output summary.json
//!
//! # Start from a config file
//! shadowgraph-sim default-config > sim.toml
//! shadowgraph-sim run --config sim.toml --metrics
//! ```

pub mod config;
pub mod logging;
pub mod simulation;

pub use config::{ConfigError, LoggingConfig, SimConfig, SimulationSettings};
pub use logging::init_logging;
pub use simulation::{SimulationCounters, SimulationError, SimulationRunner, SimulationSummary};
