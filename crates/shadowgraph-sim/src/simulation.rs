//! Concurrent gossip simulation over a shared shadow graph
//!
//! Three kinds of task share one graph:
//!
//! - ingestion tasks create events and insert them, as gossip receivers do
//! - sync tasks reserve a generation, read the tips and walk ancestors for a
//!   simulated peer, as gossip senders do
//! - one expiry task raises the watermark behind the newest generation, as
//!   consensus does

use crate::config::{ConfigError, SimConfig};
use futures::future::try_join_all;
use parking_lot::{Mutex, RwLock};
use prometheus::{Encoder, Registry, TextEncoder};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use shadowgraph_core::{CreatorId, DagEvent, Generation, GossipEvent};
use shadowgraph_gossip::{targets, ShadowGraph, ShadowGraphStats};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Errors that stop a simulation run
#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Simulation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Metrics output is not UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

// ============================================================================
// EVENT SOURCE
// ============================================================================

struct SourceState {
    rng: StdRng,
    latest: Vec<Option<Arc<GossipEvent>>>,
    created: u64,
}

/// Round-robin event factory shared by the ingestion tasks.
///
/// Each creator's next event takes its own latest event as self-parent and
/// a random other creator's latest event as other-parent.
struct EventSource {
    state: Mutex<SourceState>,
    creators: u64,
    total: u64,
    newest_generation: AtomicU64,
}

impl EventSource {
    fn new(creators: u64, total: u64, seed: u64) -> Self {
        Self {
            state: Mutex::new(SourceState {
                rng: StdRng::seed_from_u64(seed),
                latest: vec![None; creators as usize],
                created: 0,
            }),
            creators,
            total,
            newest_generation: AtomicU64::new(0),
        }
    }

    fn next_event(&self) -> Option<Arc<GossipEvent>> {
        let mut state = self.state.lock();
        if state.created >= self.total {
            return None;
        }

        let sequence = state.created;
        let creator = (sequence % self.creators) as usize;
        let offset = state.rng.gen_range(1..self.creators) as usize;
        let other = (creator + offset) % self.creators as usize;

        let event = Arc::new(GossipEvent::child(
            CreatorId::from_index(creator as u64),
            state.latest[creator].as_ref().map(|e| e.descriptor()),
            state.latest[other].as_ref().map(|e| e.descriptor()),
            sequence.to_be_bytes().to_vec(),
        ));

        state.latest[creator] = Some(event.clone());
        state.created += 1;
        self.newest_generation
            .fetch_max(event.generation(), Ordering::AcqRel);
        Some(event)
    }

    fn created(&self) -> u64 {
        self.state.lock().created
    }

    fn newest_generation(&self) -> Generation {
        self.newest_generation.load(Ordering::Acquire)
    }
}

// ============================================================================
// COUNTERS
// ============================================================================

/// Live counters updated by the simulation tasks
#[derive(Debug, Default)]
pub struct SimulationCounters {
    pub events_inserted: AtomicU64,
    pub events_rejected: AtomicU64,
    pub sync_sessions: AtomicU64,
    pub ancestors_found: AtomicU64,
    pub max_ancestors: AtomicU64,
    /// Ancestors at or above a session's reserved generation that were
    /// removed before the session ended
    pub reservation_violations: AtomicU64,
    pub expiry_passes: AtomicU64,
    pub rejections: RwLock<HashMap<String, u64>>,
}

impl SimulationCounters {
    fn record_rejection(&self, label: &str) {
        self.events_rejected.fetch_add(1, Ordering::Relaxed);
        *self
            .rejections
            .write()
            .entry(label.to_string())
            .or_insert(0) += 1;
    }

    fn record_sync(&self, ancestors: u64, violations: u64) {
        self.sync_sessions.fetch_add(1, Ordering::Relaxed);
        self.ancestors_found.fetch_add(ancestors, Ordering::Relaxed);
        self.max_ancestors.fetch_max(ancestors, Ordering::Relaxed);
        self.reservation_violations
            .fetch_add(violations, Ordering::Relaxed);
    }
}

/// Outcome of a simulation run
#[derive(Debug, Clone, Serialize)]
pub struct SimulationSummary {
    pub events_created: u64,
    pub events_inserted: u64,
    pub events_rejected: u64,
    pub rejections: HashMap<String, u64>,
    pub sync_sessions: u64,
    pub ancestors_found: u64,
    pub max_ancestors: u64,
    pub reservation_violations: u64,
    pub expiry_passes: u64,
    pub newest_generation: Generation,
    pub duration_secs: f64,
    pub graph: ShadowGraphStats,
}

impl SimulationSummary {
    /// Print formatted report
    pub fn print_report(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                 SHADOW GRAPH SIMULATION                       ║");
        println!("╠══════════════════════════════════════════════════════════════╣");
        println!("║ Duration:          {:>10.2} seconds                        ║", self.duration_secs);
        println!("║ Events Created:    {:>10}                                 ║", self.events_created);
        println!("║ Events Inserted:   {:>10}                                 ║", self.events_inserted);
        println!("║ Events Rejected:   {:>10}                                 ║", self.events_rejected);
        println!("║ Newest Generation: {:>10}                                 ║", self.newest_generation);
        println!("╠══════════════════════════════════════════════════════════════╣");
        println!("║ SYNC                                                         ║");
        println!("║   sessions:        {:>10}                                 ║", self.sync_sessions);
        println!("║   ancestors:       {:>10}                                 ║", self.ancestors_found);
        println!("║   max/session:     {:>10}                                 ║", self.max_ancestors);
        println!("║   violations:      {:>10}                                 ║", self.reservation_violations);
        println!("╠══════════════════════════════════════════════════════════════╣");
        println!("║ GRAPH                                                        ║");
        println!("║   events:          {:>10}                                 ║", self.graph.events);
        println!("║   tips:            {:>10}                                 ║", self.graph.tips);
        println!("║   generations:     {:>10}                                 ║", self.graph.generations);
        println!("║   expire below:    {:>10}                                 ║", self.graph.expire_below);
        println!("║   oldest:          {:>10}                                 ║", self.graph.oldest_generation);
        println!("║   expiry passes:   {:>10}                                 ║", self.expiry_passes);

        if !self.rejections.is_empty() {
            println!("╠══════════════════════════════════════════════════════════════╣");
            println!("║ REJECTIONS                                                   ║");
            for (label, count) in &self.rejections {
                println!("║   {:20}: {:>10}                         ║", label, count);
            }
        }

        println!("╚══════════════════════════════════════════════════════════════╝\n");
    }
}

// ============================================================================
// RUNNER
// ============================================================================

/// Drives ingestion, sync and expiry tasks against one shadow graph
pub struct SimulationRunner {
    config: SimConfig,
    graph: Arc<ShadowGraph<GossipEvent>>,
    registry: Registry,
    counters: Arc<SimulationCounters>,
}

impl SimulationRunner {
    pub fn new(config: SimConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        let registry = Registry::new();
        let graph = ShadowGraph::with_registry(config.effective_graph_config(), &registry)?;

        Ok(Self {
            config,
            graph: Arc::new(graph),
            registry,
            counters: Arc::new(SimulationCounters::default()),
        })
    }

    pub fn graph(&self) -> &Arc<ShadowGraph<GossipEvent>> {
        &self.graph
    }

    pub fn counters(&self) -> &Arc<SimulationCounters> {
        &self.counters
    }

    /// Run to completion: every configured event created and offered to
    /// the graph, then one final expiry pass
    pub async fn run(&self) -> Result<SimulationSummary, SimulationError> {
        let sim = &self.config.simulation;
        info!(
            creators = sim.creators,
            events = sim.events,
            ingest_tasks = sim.ingest_tasks,
            sync_tasks = sim.sync_tasks,
            expiry_window = sim.expiry_window,
            "Starting shadow graph simulation"
        );

        let start = Instant::now();
        let source = Arc::new(EventSource::new(sim.creators, sim.events, sim.seed));
        let ingest_done = Arc::new(AtomicBool::new(false));

        let sync_handles: Vec<_> = (0..sim.sync_tasks)
            .map(|task| {
                tokio::spawn(sync_loop(
                    self.graph.clone(),
                    source.clone(),
                    self.counters.clone(),
                    ingest_done.clone(),
                    sim.seed.wrapping_add(task as u64 + 1),
                    sim.expiry_window,
                    Duration::from_millis(sim.sync_interval_ms),
                ))
            })
            .collect();

        let expiry_handle = tokio::spawn(expiry_loop(
            self.graph.clone(),
            source.clone(),
            self.counters.clone(),
            ingest_done.clone(),
            sim.expiry_window,
            Duration::from_millis(sim.expiry_interval_ms),
        ));

        let ingest_handles: Vec<_> = (0..sim.ingest_tasks)
            .map(|_| {
                tokio::spawn(ingest_loop(
                    self.graph.clone(),
                    source.clone(),
                    self.counters.clone(),
                ))
            })
            .collect();

        try_join_all(ingest_handles).await?;
        ingest_done.store(true, Ordering::Release);
        info!(created = source.created(), "Ingestion complete");

        for session in try_join_all(sync_handles).await? {
            session?;
        }
        expiry_handle.await?;

        let newest_generation = source.newest_generation();
        expire_behind(&self.graph, newest_generation, sim.expiry_window);
        self.counters.expiry_passes.fetch_add(1, Ordering::Relaxed);

        let summary = self.summary(source.created(), newest_generation, start.elapsed());
        info!(
            inserted = summary.events_inserted,
            rejected = summary.events_rejected,
            sync_sessions = summary.sync_sessions,
            tips = summary.graph.tips,
            "Simulation complete"
        );
        Ok(summary)
    }

    fn summary(
        &self,
        events_created: u64,
        newest_generation: Generation,
        elapsed: Duration,
    ) -> SimulationSummary {
        let counters = &self.counters;
        SimulationSummary {
            events_created,
            events_inserted: counters.events_inserted.load(Ordering::Relaxed),
            events_rejected: counters.events_rejected.load(Ordering::Relaxed),
            rejections: counters.rejections.read().clone(),
            sync_sessions: counters.sync_sessions.load(Ordering::Relaxed),
            ancestors_found: counters.ancestors_found.load(Ordering::Relaxed),
            max_ancestors: counters.max_ancestors.load(Ordering::Relaxed),
            reservation_violations: counters.reservation_violations.load(Ordering::Relaxed),
            expiry_passes: counters.expiry_passes.load(Ordering::Relaxed),
            newest_generation,
            duration_secs: elapsed.as_secs_f64(),
            graph: self.graph.stats(),
        }
    }

    /// Render the graph's metrics in Prometheus text format
    pub fn render_metrics(&self) -> Result<String, SimulationError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

async fn ingest_loop(
    graph: Arc<ShadowGraph<GossipEvent>>,
    source: Arc<EventSource>,
    counters: Arc<SimulationCounters>,
) {
    while let Some(event) = source.next_event() {
        match graph.add_event(Some(event)) {
            Ok(_) => {
                counters.events_inserted.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                if !e.is_benign() {
                    warn!(target: targets::SYNC, code = e.code(), "Insertion failed: {}", e);
                }
                counters.record_rejection(e.label());
            }
        }
        tokio::task::yield_now().await;
    }
}

async fn sync_loop(
    graph: Arc<ShadowGraph<GossipEvent>>,
    source: Arc<EventSource>,
    counters: Arc<SimulationCounters>,
    ingest_done: Arc<AtomicBool>,
    seed: u64,
    expiry_window: u64,
    pause: Duration,
) -> Result<(), tokio::task::JoinError> {
    let mut rng = StdRng::seed_from_u64(seed);

    while !ingest_done.load(Ordering::Acquire) {
        // the simulated peer already knows everything below this generation
        let lag = rng.gen_range(0..=expiry_window.max(1));
        let peer_known_below = source.newest_generation().saturating_sub(lag);

        let session_graph = graph.clone();
        let (ancestors, violations) =
            tokio::task::spawn_blocking(move || sync_session(&session_graph, peer_known_below))
                .await?;
        counters.record_sync(ancestors, violations);

        sleep(pause).await;
    }
    Ok(())
}

/// One sync session: pin a generation, then collect what the peer lacks.
/// Returns the ancestor count and how many pinned ancestors were removed
/// while the reservation was held.
fn sync_session(graph: &ShadowGraph<GossipEvent>, peer_known_below: Generation) -> (u64, u64) {
    let reservation = graph.reserve();
    let tips = graph.get_tips();
    let ancestors = graph.find_ancestors(&tips, |node| node.generation() >= peer_known_below);

    let violations = ancestors
        .iter()
        .filter(|node| {
            node.generation() >= reservation.generation() && !graph.is_hash_in_graph(&node.hash())
        })
        .count() as u64;

    debug!(
        target: targets::SYNC,
        reserved = reservation.generation(),
        tips = tips.len(),
        ancestors = ancestors.len(),
        "sync session"
    );
    reservation.release();
    (ancestors.len() as u64, violations)
}

async fn expiry_loop(
    graph: Arc<ShadowGraph<GossipEvent>>,
    source: Arc<EventSource>,
    counters: Arc<SimulationCounters>,
    ingest_done: Arc<AtomicBool>,
    expiry_window: u64,
    period: Duration,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while !ingest_done.load(Ordering::Acquire) {
        ticker.tick().await;
        expire_behind(&graph, source.newest_generation(), expiry_window);
        counters.expiry_passes.fetch_add(1, Ordering::Relaxed);
    }
}

/// Advance the watermark to `expiry_window` generations behind `newest`
fn expire_behind(graph: &ShadowGraph<GossipEvent>, newest: Generation, expiry_window: u64) {
    let watermark = newest.saturating_sub(expiry_window);
    if watermark > graph.expire_below_generation() {
        graph.expire_below(watermark);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config(events: u64) -> SimConfig {
        let mut config = SimConfig::default();
        config.simulation.creators = 4;
        config.simulation.events = events;
        config.simulation.ingest_tasks = 2;
        config.simulation.sync_tasks = 2;
        config.simulation.expiry_window = 5;
        config.simulation.expiry_interval_ms = 1;
        config.simulation.sync_interval_ms = 1;
        config
    }

    #[test]
    fn test_event_source_links_parents() {
        let source = EventSource::new(3, 6, 1);
        let events: Vec<_> = std::iter::from_fn(|| source.next_event()).collect();
        assert_eq!(events.len(), 6);
        assert_eq!(source.created(), 6);

        // creator 0's second event takes its first as self-parent
        assert_eq!(events[3].creator(), CreatorId::from_index(0));
        assert_eq!(events[3].self_parent(), Some(events[0].descriptor()));
        assert!(events[3].other_parent().is_some());

        let newest = events.iter().map(|e| e.generation()).max().unwrap();
        assert_eq!(source.newest_generation(), newest);
    }

    #[test]
    fn test_event_source_never_picks_self_as_other_parent() {
        let source = EventSource::new(2, 20, 3);
        let events: Vec<_> = std::iter::from_fn(|| source.next_event()).collect();
        for pair in events.windows(2).skip(1) {
            // with two creators the other parent is always the previous event
            assert_eq!(pair[1].other_parent(), Some(pair[0].descriptor()));
        }
    }

    #[test]
    fn test_expire_behind_is_monotonic() {
        let graph = ShadowGraph::<GossipEvent>::default();
        expire_behind(&graph, 10, 4);
        assert_eq!(graph.expire_below_generation(), 6);

        // a smaller newest generation must not be sent to the graph
        expire_behind(&graph, 8, 4);
        assert_eq!(graph.expire_below_generation(), 6);
    }

    #[test]
    fn test_sync_session_releases_reservation() {
        let graph = ShadowGraph::<GossipEvent>::default();
        let source = EventSource::new(3, 30, 5);
        while let Some(event) = source.next_event() {
            graph.add_event(Some(event)).unwrap();
        }

        let (ancestors, violations) = sync_session(&graph, 0);
        // every non-tip reaches a tip through its self-children
        assert!(ancestors as usize >= graph.len() - graph.tip_count());
        assert!(ancestors as usize <= graph.len());
        assert_eq!(violations, 0);
        assert_eq!(graph.oldest_reserved_generation(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_simulation_accounts_for_every_event() {
        let runner = SimulationRunner::new(small_config(400)).unwrap();
        let summary = runner.run().await.unwrap();

        assert_eq!(summary.events_created, 400);
        assert_eq!(summary.events_inserted + summary.events_rejected, 400);
        assert_eq!(summary.reservation_violations, 0);
        assert!(summary.graph.tips <= 4);
        assert_eq!(
            summary.graph.expire_below,
            summary.newest_generation.saturating_sub(5)
        );
        assert_eq!(summary.graph.oldest_reserved_generation, None);
    }

    #[tokio::test]
    async fn test_simulation_publishes_metrics() {
        let runner = SimulationRunner::new(small_config(50)).unwrap();
        runner.run().await.unwrap();

        let text = runner.render_metrics().unwrap();
        assert!(text.contains("shadowgraph_events_inserted_total"));
        assert!(text.contains("shadowgraph_tips"));
    }

    #[test]
    fn test_runner_rejects_invalid_config() {
        let mut config = SimConfig::default();
        config.simulation.ingest_tasks = 0;
        assert!(matches!(
            SimulationRunner::new(config),
            Err(SimulationError::Config(_))
        ));
    }
}
