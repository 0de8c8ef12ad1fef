//! # Shadow Graph Simulator CLI
//!
//! Runs a concurrent gossip simulation against an in-memory shadow graph
//! and reports what the graph looked like at the end.

use anyhow::Context;
use clap::{Parser, Subcommand};
use shadowgraph_sim::{init_logging, SimConfig, SimulationRunner};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "shadowgraph-sim")]
#[command(version)]
#[command(about = "Concurrent gossip simulation over a shadow graph", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation
    Run {
        /// TOML configuration file
        #[arg(short, long, env = "SHADOWGRAPH_SIM_CONFIG")]
        config: Option<PathBuf>,

        /// Number of simulated creators
        #[arg(long)]
        creators: Option<u64>,

        /// Total events to create
        #[arg(short, long)]
        events: Option<u64>,

        /// Concurrent ingestion tasks
        #[arg(long)]
        ingest_tasks: Option<usize>,

        /// Concurrent sync tasks
        #[arg(long)]
        sync_tasks: Option<usize>,

        /// Generations kept behind the newest one
        #[arg(long)]
        expiry_window: Option<u64>,

        /// RNG seed
        #[arg(long)]
        seed: Option<u64>,

        /// Log JSON lines
        #[arg(long)]
        json_logs: bool,

        /// Print Prometheus metrics after the run
        #[arg(long)]
        metrics: bool,

        /// Write the summary as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the default configuration as TOML
    DefaultConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            creators,
            events,
            ingest_tasks,
            sync_tasks,
            expiry_window,
            seed,
            json_logs,
            metrics,
            output,
        } => {
            let mut sim_config = match &config {
                Some(path) => SimConfig::load(path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => SimConfig::default(),
            };

            let settings = &mut sim_config.simulation;
            if let Some(creators) = creators {
                settings.creators = creators;
            }
            if let Some(events) = events {
                settings.events = events;
            }
            if let Some(ingest_tasks) = ingest_tasks {
                settings.ingest_tasks = ingest_tasks;
            }
            if let Some(sync_tasks) = sync_tasks {
                settings.sync_tasks = sync_tasks;
            }
            if let Some(expiry_window) = expiry_window {
                settings.expiry_window = expiry_window;
            }
            if let Some(seed) = seed {
                settings.seed = seed;
            }
            sim_config.logging.json |= json_logs;

            init_logging(&sim_config.logging, cli.verbose)?;
            info!("Shadow graph simulator v{}", env!("CARGO_PKG_VERSION"));

            let runner = SimulationRunner::new(sim_config)?;
            let summary = runner.run().await?;
            summary.print_report();

            if let Some(path) = output {
                let json = serde_json::to_string_pretty(&summary)?;
                std::fs::write(&path, json)
                    .with_context(|| format!("writing {}", path.display()))?;
                info!("Summary written to {}", path.display());
            }

            if metrics {
                print!("{}", runner.render_metrics()?);
            }

            if summary.reservation_violations > 0 {
                anyhow::bail!(
                    "{} reserved ancestors were expired during sync",
                    summary.reservation_violations
                );
            }
        }

        Commands::DefaultConfig => {
            print!("{}", SimConfig::default().to_toml()?);
        }
    }

    Ok(())
}
